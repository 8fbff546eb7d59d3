//! Run orchestration: entities, journal, and the sequential loop.

pub mod journal;
pub mod orchestrator;
pub mod types;

pub use journal::{JournalError, RunJournal};
pub use orchestrator::{Orchestrator, RunError, RunInput};
pub use types::{ConfigSnapshot, CritiqueHistoryItem, FixAttempt, RenderRecord, Round, Run};
