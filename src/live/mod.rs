//! Live sessions: continuous capture and rendering with frame dropping
//! under load.

mod report;
mod session;

pub use report::SessionReport;
pub use session::{LiveSession, SessionError, SessionOutcome};
