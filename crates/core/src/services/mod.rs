pub mod matching;

pub use matching::{
    AnnotationStore, BlockPair, CollaboratorError, Comparison, CorpusSource, InMemoryCorpus, MatchError,
    Matcher, QueryOutcome, QueryStats,
};
