pub mod service;
pub mod store;

pub use service::{ChatOutcome, SessionService, PLACEHOLDER_TITLE};
pub use store::{MessageRecord, RewrittenQuery, SessionRecord, SessionStore, SessionSummary};
