//! Feed construction: update conditions and the XML document.

pub mod conditions;
pub mod writer;

pub use conditions::{build_conditions, Combinator, Condition, ConditionSet};
pub use writer::{resolve_destination, FeedDocument, FileUpdateTask};
