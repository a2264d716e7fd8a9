//! Whole control-flow-graph similarity.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{BlockWeights, GraphConfig};
use crate::heuristics::block::block_ratio;
use crate::heuristics::clique::{CliqueError, CliqueSolver};
use crate::model::{Block, Fingerprint};

/// Which branch of the graph grader produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphMethod {
    /// Same blocks and same edges.
    Identical,
    /// Same edges and block count, different block content.
    SameTopology,
    /// Maximum-weight clique over block correspondences.
    Clique,
    /// The compatibility graph exceeded its size cutoff; not scored.
    Oversized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphScore {
    pub ratio: f64,
    pub method: GraphMethod,
    /// Matched `(query block, candidate block)` pairs, ascending.
    pub correspondence: Vec<(usize, usize)>,
    /// `false` if the clique search was truncated or the graph was oversized.
    pub exact: bool,
}

/// One hypothesised block correspondence.
#[derive(Debug, Clone, Copy)]
struct CandidateNode {
    query: usize,
    candidate: usize,
    weight: u64,
}

/// Graph grader parameterised by block weights, cutoffs and a clique solver.
pub struct GraphSimilarity<'a> {
    weights: &'a BlockWeights,
    config: &'a GraphConfig,
    solver: &'a dyn CliqueSolver,
}

impl<'a> GraphSimilarity<'a> {
    pub fn new(
        weights: &'a BlockWeights,
        config: &'a GraphConfig,
        solver: &'a dyn CliqueSolver,
    ) -> Self {
        Self { weights, config, solver }
    }

    pub fn score(&self, query: &Fingerprint, candidate: &Fingerprint) -> Result<GraphScore, CliqueError> {
        let q_graph = query.graph();
        let c_graph = candidate.graph();
        let q_blocks = query.blocks();
        let c_blocks = candidate.blocks();

        let same_edges = q_graph.edges() == c_graph.edges();
        let same_count = q_blocks.len() == c_blocks.len();

        if same_edges && same_count {
            let diagonal: Vec<(usize, usize)> = (0..q_blocks.len()).map(|i| (i, i)).collect();
            if q_blocks == c_blocks {
                return Ok(GraphScore {
                    ratio: 1.0,
                    method: GraphMethod::Identical,
                    correspondence: diagonal,
                    exact: true,
                });
            }
            return Ok(GraphScore {
                ratio: self.same_topology_ratio(&q_blocks, &c_blocks),
                method: GraphMethod::SameTopology,
                correspondence: diagonal,
                exact: true,
            });
        }

        self.clique_score(query, candidate, &q_blocks, &c_blocks)
    }

    /// Block ratios averaged per index, weighted by the combined block lengths.
    fn same_topology_ratio(&self, q_blocks: &[Block<'_>], c_blocks: &[Block<'_>]) -> f64 {
        let mut f_sum = 0.0;
        let mut d_sum = 0.0;
        for (q, c) in q_blocks.iter().zip(c_blocks) {
            let combined = (q.len() + c.len()) as f64;
            f_sum += combined;
            d_sum += combined * block_ratio(q, c, self.weights);
        }
        if f_sum > 0.0 {
            d_sum / f_sum
        } else {
            1.0
        }
    }

    fn clique_score(
        &self,
        query: &Fingerprint,
        candidate: &Fingerprint,
        q_blocks: &[Block<'_>],
        c_blocks: &[Block<'_>],
    ) -> Result<GraphScore, CliqueError> {
        let mut nodes = Vec::new();
        for (i, q) in q_blocks.iter().enumerate() {
            for (s, c) in c_blocks.iter().enumerate() {
                let ratio = block_ratio(q, c, self.weights);
                if ratio > self.config.min_node_weight {
                    nodes.push(CandidateNode {
                        query: i,
                        candidate: s,
                        weight: (ratio * 1000.0).floor() as u64,
                    });
                }
            }
        }

        if nodes.len() > self.config.max_graph_comp_size {
            warn!(
                query = query.signature(),
                candidate = candidate.signature(),
                nodes = nodes.len(),
                limit = self.config.max_graph_comp_size,
                "compatibility graph exceeds size cutoff"
            );
            return Ok(GraphScore {
                ratio: 0.0,
                method: GraphMethod::Oversized,
                correspondence: Vec::new(),
                exact: false,
            });
        }

        let q_graph = query.graph();
        let c_graph = candidate.graph();
        // Edge presence agrees for the ordered pair a -> b.
        let consistent = |a: &CandidateNode, b: &CandidateNode| {
            q_graph.has_edge(a.query, b.query) == c_graph.has_edge(a.candidate, b.candidate)
        };
        // One consistent direction is enough; back-edges of loops need not agree.
        let compatible = |x: usize, y: usize| {
            let a = &nodes[x];
            let b = &nodes[y];
            a.query != b.query
                && a.candidate != b.candidate
                && (consistent(a, b) || consistent(b, a))
        };
        let weights: Vec<u64> = nodes.iter().map(|n| n.weight).collect();
        let clique = self.solver.max_weight_clique(nodes.len(), &weights, &compatible)?;

        let size = clique.vertices.len();
        let total = q_blocks.len() + c_blocks.len() - size;
        let mut ratio = if total > 0 { size as f64 / total as f64 } else { 1.0 };
        if !clique.exact {
            warn!(
                query = query.signature(),
                candidate = candidate.signature(),
                matched = size,
                "clique search truncated; scoring best clique found"
            );
            ratio *= self.config.truncated_penalty;
        }
        debug!(
            candidate = candidate.signature(),
            nodes = nodes.len(),
            matched = size,
            weight = clique.weight,
            ratio,
            "clique graph score"
        );

        let mut correspondence: Vec<(usize, usize)> =
            clique.vertices.iter().map(|&v| (nodes[v].query, nodes[v].candidate)).collect();
        correspondence.sort_unstable();
        Ok(GraphScore { ratio, method: GraphMethod::Clique, correspondence, exact: clique.exact })
    }
}
