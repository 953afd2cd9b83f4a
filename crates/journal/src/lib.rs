//! The captain's log: fast post-turn task captures and operator-visible
//! journal entries the agent proposes to itself.

pub mod capture;
pub mod entry;

pub use capture::{CaptureStore, Outcome, TaskCapture};
pub use entry::{
    EntryStatus, EntryType, JournalEntry, JournalStore, Metric, ProposedChange, TelemetryRef,
};
