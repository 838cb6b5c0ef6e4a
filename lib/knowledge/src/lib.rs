//! Known-issue knowledge base for the support-desk platform.
//!
//! Known issues live in a JSON array file. The file is parsed once per
//! process and cached; lookups match candidate keywords against each
//! record's keyword list, case-insensitively, in file order.

pub mod error;
pub mod keywords;
pub mod record;
pub mod store;

pub use error::KnowledgeError;
pub use keywords::extract_keywords;
pub use record::KnownIssueRecord;
pub use store::KnowledgeBase;
