use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{CoarseTolerances, MatchingConfig};
use crate::filters::{self, CounterDeviation};
use crate::heuristics::block::block_ratio;
use crate::heuristics::clique::{BranchAndBound, CliqueError, CliqueSolver, SearchBudget};
use crate::heuristics::dictionary::dictionary_ratio;
use crate::heuristics::grade::{self, frame_ratio};
use crate::heuristics::graph::{GraphMethod, GraphScore, GraphSimilarity};
use crate::model::{
    Annotation, CoarseCounters, Fingerprint, FingerprintRecord, InvalidFingerprint, MatchResult,
};

/// A collaborator (corpus, annotation store) failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Invalid(#[from] InvalidFingerprint),
    #[error("Corpus access failed: {0}")]
    Corpus(String),
    #[error("Clique solver failed: {0}")]
    Solver(String),
    #[error("Query was cancelled")]
    Cancelled,
    #[error("Invalid matching configuration: {0}")]
    Config(String),
}

impl From<CollaboratorError> for MatchError {
    fn from(err: CollaboratorError) -> Self {
        MatchError::Corpus(err.0)
    }
}

impl From<CliqueError> for MatchError {
    fn from(err: CliqueError) -> Self {
        MatchError::Solver(err.to_string())
    }
}

/// Supplies candidate fingerprints for a query.
///
/// Implementations may narrow the corpus with storage-level predicates derived from
/// the query counters; the coarse filter re-checks every candidate regardless.
pub trait CorpusSource {
    fn candidates(
        &self,
        query: &CoarseCounters,
        tolerances: &CoarseTolerances,
    ) -> Result<Vec<Fingerprint>, CollaboratorError>;
}

/// Supplies the human-authored annotations of a corpus function.
pub trait AnnotationStore {
    fn annotations(&self, signature: &str) -> Result<Vec<Annotation>, CollaboratorError>;
}

/// Corpus held entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCorpus {
    functions: Vec<Fingerprint>,
    signatures: HashSet<String>,
    annotations: HashMap<String, Vec<Annotation>>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fingerprint unless its signature is already present. Returns whether it was added.
    pub fn insert(&mut self, fingerprint: Fingerprint) -> bool {
        if !self.signatures.insert(fingerprint.signature().to_string()) {
            return false;
        }
        self.functions.push(fingerprint);
        true
    }

    pub fn annotate(&mut self, signature: &str, annotation: Annotation) {
        self.annotations.entry(signature.to_string()).or_default().push(annotation);
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl FromIterator<Fingerprint> for InMemoryCorpus {
    fn from_iter<I: IntoIterator<Item = Fingerprint>>(iter: I) -> Self {
        let mut corpus = Self::new();
        for fingerprint in iter {
            corpus.insert(fingerprint);
        }
        corpus
    }
}

impl CorpusSource for InMemoryCorpus {
    fn candidates(
        &self,
        _query: &CoarseCounters,
        _tolerances: &CoarseTolerances,
    ) -> Result<Vec<Fingerprint>, CollaboratorError> {
        Ok(self.functions.clone())
    }
}

impl AnnotationStore for InMemoryCorpus {
    fn annotations(&self, signature: &str) -> Result<Vec<Annotation>, CollaboratorError> {
        Ok(self.annotations.get(signature).cloned().unwrap_or_default())
    }
}

/// How many candidates each stage saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStats {
    pub corpus: usize,
    pub coarse_survivors: usize,
    pub dictionary_survivors: usize,
    pub graph_scored: usize,
    pub oversized: usize,
    pub truncated: usize,
    pub accepted: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    /// Accepted matches, best first.
    pub matches: Vec<MatchResult>,
    pub stats: QueryStats,
}

/// Stage-by-stage breakdown of one query/candidate pair, with no stage short-circuiting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub coarse: Vec<CounterDeviation>,
    pub coarse_passed: bool,
    pub dictionary_ratio: f64,
    pub dictionary_passed: bool,
    pub graph: GraphScore,
    /// Top-level block grades of the matched correspondence pairs.
    pub block_pairs: Vec<BlockPair>,
    pub frame_ratio: f64,
    pub grade: f64,
    pub accepted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockPair {
    pub query: usize,
    pub candidate: usize,
    pub ratio: f64,
}

/// Outcome of scoring one dictionary survivor.
enum Scored {
    Graded { result: MatchResult, accepted: bool },
    Oversized,
}

/// Runs the filter cascade and graph scoring for queries against a corpus.
///
/// Queries are independent: each one carries its own cancel flag, so cancelling
/// one leaves concurrent and later queries on the same matcher untouched.
pub struct Matcher {
    config: MatchingConfig,
    /// Replacement clique solver; `None` builds a budgeted `BranchAndBound` per query.
    solver: Option<Box<dyn CliqueSolver>>,
    pool: Option<rayon::ThreadPool>,
}

impl Matcher {
    pub fn new(config: MatchingConfig) -> Result<Self, MatchError> {
        config.validate().map_err(|e| MatchError::Config(e.to_string()))?;
        let pool = if config.workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.workers)
                .build()
                .map_err(|e| MatchError::Config(format!("Failed to build worker pool: {e}")))?;
            Some(pool)
        } else {
            None
        };
        Ok(Self { config, solver: None, pool })
    }

    /// Replace the clique solver. The replacement does not observe a query's cancel
    /// flag unless it was built with it.
    pub fn with_solver(mut self, solver: Box<dyn CliqueSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Clique budget from the config, polling `cancel` when given.
    fn search_budget(&self, cancel: Option<Arc<AtomicBool>>) -> SearchBudget {
        let clique = &self.config.clique;
        SearchBudget {
            node_budget: clique.node_budget,
            time_budget: (clique.time_budget_ms > 0)
                .then(|| Duration::from_millis(clique.time_budget_ms)),
            cancel,
        }
    }

    fn graph_similarity<'a>(&'a self, solver: &'a dyn CliqueSolver) -> GraphSimilarity<'a> {
        GraphSimilarity::new(&self.config.graph_block_weights, &self.config.graph, solver)
    }

    /// Run one query that cannot be cancelled from outside.
    pub fn query(
        &self,
        query: &Fingerprint,
        corpus: &dyn CorpusSource,
    ) -> Result<QueryOutcome, MatchError> {
        self.query_with_cancel(query, corpus, Arc::new(AtomicBool::new(false)))
    }

    /// Run one query that is abandoned with [`MatchError::Cancelled`] once `cancel` is raised.
    ///
    /// The flag only affects this call; the matcher stays usable afterwards.
    pub fn query_with_cancel(
        &self,
        query: &Fingerprint,
        corpus: &dyn CorpusSource,
        cancel: Arc<AtomicBool>,
    ) -> Result<QueryOutcome, MatchError> {
        if cancel.load(Ordering::Relaxed) {
            return Err(MatchError::Cancelled);
        }
        let candidates = corpus.candidates(&query.counters(), &self.config.coarse)?;

        let default_solver;
        let solver: &dyn CliqueSolver = match &self.solver {
            Some(solver) => solver.as_ref(),
            None => {
                default_solver = BranchAndBound::new(self.search_budget(Some(Arc::clone(&cancel))));
                &default_solver
            }
        };
        let run = || self.run(query, &candidates, solver, &cancel);
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    /// Validate a wire record, then run it as a query.
    pub fn query_record(
        &self,
        record: FingerprintRecord,
        corpus: &dyn CorpusSource,
    ) -> Result<QueryOutcome, MatchError> {
        let query = Fingerprint::from_record(record)?;
        self.query(&query, corpus)
    }

    fn run(
        &self,
        query: &Fingerprint,
        candidates: &[Fingerprint],
        solver: &dyn CliqueSolver,
        cancel: &AtomicBool,
    ) -> Result<QueryOutcome, MatchError> {
        let mut stats = QueryStats { corpus: candidates.len(), ..QueryStats::default() };

        let coarse = filters::coarse_filter(query, candidates, &self.config.coarse);
        stats.coarse_survivors = coarse.len();
        let survivors = filters::dictionary_filter(query, &coarse, &self.config.dictionary);
        stats.dictionary_survivors = survivors.len();
        debug!(
            query = query.signature(),
            corpus = stats.corpus,
            coarse = stats.coarse_survivors,
            dictionary = stats.dictionary_survivors,
            "filters applied"
        );

        let graph = self.graph_similarity(solver);
        let scored = survivors
            .par_iter()
            .map(|&(candidate, _)| self.score_candidate(&graph, query, candidate, cancel))
            .collect::<Result<Vec<_>, MatchError>>()?;

        if cancel.load(Ordering::Relaxed) {
            return Err(MatchError::Cancelled);
        }

        let mut matches = Vec::new();
        for outcome in scored {
            match outcome {
                Scored::Oversized => stats.oversized += 1,
                Scored::Graded { result, accepted } => {
                    stats.graph_scored += 1;
                    if !result.exact {
                        stats.truncated += 1;
                    }
                    if accepted {
                        matches.push(result);
                    }
                }
            }
        }
        stats.accepted = matches.len();
        let matches = grade::rank(matches);

        info!(
            query = query.signature(),
            corpus = stats.corpus,
            scored = stats.graph_scored,
            accepted = stats.accepted,
            "query complete"
        );
        Ok(QueryOutcome { matches, stats })
    }

    fn score_candidate(
        &self,
        graph: &GraphSimilarity<'_>,
        query: &Fingerprint,
        candidate: &Fingerprint,
        cancel: &AtomicBool,
    ) -> Result<Scored, MatchError> {
        if cancel.load(Ordering::Relaxed) {
            return Err(MatchError::Cancelled);
        }
        let score = graph.score(query, candidate)?;
        if score.method == GraphMethod::Oversized {
            return Ok(Scored::Oversized);
        }

        let frame = frame_ratio(query.frame(), candidate.frame());
        let grade = grade::grade(score.ratio, frame, &self.config.grade);
        let accepted = grade::is_accepted(grade, &self.config.grade);
        debug!(
            candidate = candidate.signature(),
            method = ?score.method,
            graph_ratio = score.ratio,
            frame_ratio = frame,
            grade,
            accepted,
            "candidate graded"
        );

        Ok(Scored::Graded {
            result: MatchResult {
                signature: candidate.signature().to_string(),
                name: candidate.name().to_string(),
                exe_name: candidate.exe_name().to_string(),
                grade,
                graph_ratio: score.ratio,
                frame_ratio: frame,
                correspondence: score.correspondence,
                exact: score.exact,
            },
            accepted,
        })
    }

    /// Every stage for one pair, regardless of earlier stages rejecting it.
    pub fn compare(&self, query: &Fingerprint, candidate: &Fingerprint) -> Result<Comparison, MatchError> {
        let coarse = filters::coarse_deviations(
            &query.counters(),
            &candidate.counters(),
            &self.config.coarse,
        );
        let coarse_passed = coarse.iter().all(CounterDeviation::passes);
        let dictionary = dictionary_ratio(&query.itype_histogram(), &candidate.itype_histogram());
        let default_solver;
        let solver: &dyn CliqueSolver = match &self.solver {
            Some(solver) => solver.as_ref(),
            None => {
                default_solver = BranchAndBound::new(self.search_budget(None));
                &default_solver
            }
        };
        let graph = self.graph_similarity(solver).score(query, candidate)?;
        let q_blocks = query.blocks();
        let c_blocks = candidate.blocks();
        let block_pairs = graph
            .correspondence
            .iter()
            .map(|&(q, c)| BlockPair {
                query: q,
                candidate: c,
                ratio: block_ratio(&q_blocks[q], &c_blocks[c], &self.config.block_weights),
            })
            .collect();
        let frame = frame_ratio(query.frame(), candidate.frame());
        let (grade, accepted) = if graph.method == GraphMethod::Oversized {
            (0.0, false)
        } else {
            let grade = grade::grade(graph.ratio, frame, &self.config.grade);
            (grade, grade::is_accepted(grade, &self.config.grade))
        };

        Ok(Comparison {
            coarse,
            coarse_passed,
            dictionary_ratio: dictionary,
            dictionary_passed: dictionary >= self.config.dictionary.itypes_threshold,
            graph,
            block_pairs,
            frame_ratio: frame,
            grade,
            accepted,
        })
    }
}
