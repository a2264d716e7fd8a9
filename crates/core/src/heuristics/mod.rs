//! Similarity heuristics of the matching pipeline.
//!
//! - [`sequence`]: Ratcliff/Obershelp ratio over ordered sequences.
//! - [`dictionary`]: histogram (multiset) similarity.
//! - [`block`]: weighted per-block similarity over four attribute channels.
//! - [`clique`]: bounded maximum-weight clique search.
//! - [`graph`]: whole control-flow-graph similarity.
//! - [`grade`]: final grade and ranking of candidates.

pub mod block;
pub mod clique;
pub mod dictionary;
pub mod grade;
pub mod graph;
pub mod sequence;
