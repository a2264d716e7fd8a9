//! Bounded maximum-weight clique search.
//!
//! The graph-similarity engine only talks to the [`CliqueSolver`] trait, so any
//! conforming solver can be swapped in. [`BranchAndBound`] is the built-in one: a
//! colouring-bounded branch and bound in the style of Carraghan-Pardalos/Tomita,
//! where each colour class contributes its heaviest vertex to the upper bound.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CliqueError {
    #[error("Expected {expected} vertex weights, got {found}")]
    WeightCountMismatch { expected: usize, found: usize },
}

/// Result of one clique search.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Clique {
    /// Vertex indices, ascending.
    pub vertices: Vec<usize>,
    pub weight: u64,
    /// `false` when the search stopped on its budget; `vertices` is then the best found so far.
    pub exact: bool,
}

/// Maximum-weight clique capability.
pub trait CliqueSolver: Send + Sync {
    /// `is_edge` is treated as undirected and only asked for `x < y`.
    fn max_weight_clique(
        &self,
        vertex_count: usize,
        weights: &[u64],
        is_edge: &dyn Fn(usize, usize) -> bool,
    ) -> Result<Clique, CliqueError>;
}

/// Limits applied to each individual search.
#[derive(Debug, Clone, Default)]
pub struct SearchBudget {
    pub node_budget: u64,
    pub time_budget: Option<Duration>,
    /// Raised by the caller to abandon the search.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Colouring-bounded branch and bound solver.
#[derive(Debug, Clone)]
pub struct BranchAndBound {
    budget: SearchBudget,
}

impl BranchAndBound {
    pub fn new(budget: SearchBudget) -> Self {
        Self { budget }
    }
}

impl CliqueSolver for BranchAndBound {
    fn max_weight_clique(
        &self,
        vertex_count: usize,
        weights: &[u64],
        is_edge: &dyn Fn(usize, usize) -> bool,
    ) -> Result<Clique, CliqueError> {
        if weights.len() != vertex_count {
            return Err(CliqueError::WeightCountMismatch {
                expected: vertex_count,
                found: weights.len(),
            });
        }

        let adjacency = BitMatrix::build(vertex_count, is_edge);
        let mut search = Search {
            adjacency: &adjacency,
            weights,
            budget: &self.budget,
            started: Instant::now(),
            expanded: 0,
            best: Vec::new(),
            best_weight: 0,
            truncated: false,
        };
        let mut current = Vec::new();
        search.expand(&mut current, 0, (0..vertex_count).collect());

        let mut vertices = search.best;
        vertices.sort_unstable();
        Ok(Clique { vertices, weight: search.best_weight, exact: !search.truncated })
    }
}

/// Dense symmetric adjacency bitset.
struct BitMatrix {
    words: usize,
    bits: Vec<u64>,
}

impl BitMatrix {
    fn build(n: usize, is_edge: &dyn Fn(usize, usize) -> bool) -> Self {
        let words = n.div_ceil(64);
        let mut matrix = Self { words, bits: vec![0; words * n] };
        for x in 0..n {
            for y in (x + 1)..n {
                if is_edge(x, y) {
                    matrix.set(x, y);
                    matrix.set(y, x);
                }
            }
        }
        matrix
    }

    fn set(&mut self, x: usize, y: usize) {
        self.bits[x * self.words + y / 64] |= 1 << (y % 64);
    }

    fn contains(&self, x: usize, y: usize) -> bool {
        self.bits[x * self.words + y / 64] & (1 << (y % 64)) != 0
    }
}

struct Search<'a> {
    adjacency: &'a BitMatrix,
    weights: &'a [u64],
    budget: &'a SearchBudget,
    started: Instant,
    expanded: u64,
    best: Vec<usize>,
    best_weight: u64,
    truncated: bool,
}

impl Search<'_> {
    fn out_of_budget(&self) -> bool {
        if self.expanded > self.budget.node_budget {
            return true;
        }
        if self.budget.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return true;
        }
        // Clock reads are comparatively expensive; sample them.
        self.expanded % 256 == 0
            && self.budget.time_budget.is_some_and(|limit| self.started.elapsed() > limit)
    }

    fn expand(&mut self, current: &mut Vec<usize>, weight: u64, candidates: Vec<usize>) {
        self.expanded += 1;
        if self.out_of_budget() {
            self.truncated = true;
            return;
        }

        let ordered = self.colour_order(&candidates);
        for idx in (0..ordered.len()).rev() {
            let (vertex, bound) = ordered[idx];
            if weight + bound <= self.best_weight {
                return;
            }

            current.push(vertex);
            let extended = weight + self.weights[vertex];
            if extended > self.best_weight {
                self.best_weight = extended;
                self.best = current.clone();
            }
            let next: Vec<usize> = ordered[..idx]
                .iter()
                .map(|&(u, _)| u)
                .filter(|&u| self.adjacency.contains(vertex, u))
                .collect();
            if !next.is_empty() {
                self.expand(current, extended, next);
            }
            current.pop();

            if self.truncated {
                return;
            }
        }
    }

    /// Greedy colouring, heaviest vertices first. Returns each vertex with the sum of
    /// the heaviest weight of every colour class up to and including its own, which
    /// bounds any clique drawn from that prefix of the order.
    fn colour_order(&self, candidates: &[usize]) -> Vec<(usize, u64)> {
        let mut sorted = candidates.to_vec();
        sorted.sort_by(|&x, &y| self.weights[y].cmp(&self.weights[x]).then(x.cmp(&y)));

        let mut classes: Vec<Vec<usize>> = Vec::new();
        for v in sorted {
            match classes
                .iter_mut()
                .find(|class| class.iter().all(|&u| !self.adjacency.contains(u, v)))
            {
                Some(class) => class.push(v),
                None => classes.push(vec![v]),
            }
        }

        let mut ordered = Vec::with_capacity(candidates.len());
        let mut bound = 0;
        for class in classes {
            bound += self.weights[class[0]];
            ordered.extend(class.into_iter().map(|v| (v, bound)));
        }
        ordered
    }
}
