pub mod corpus;
pub mod project;
pub mod query;
pub mod util;

pub use corpus::*;
pub use project::*;
pub use query::*;
pub use util::*;
