//! Task queue and scheduler for background indexing work.
//!
//! The queue deduplicates pending work per file; the scheduler bounds
//! concurrent collection to a fixed number of slots, tracks in-flight work
//! and supports graceful draining. See [`TaskScheduler`] for the state
//! machine.

mod queue;
mod scheduler;

pub use queue::{IndexingTask, TaskQueue};
pub use scheduler::{
    IndexError, SchedulerConfig, TaskDisposition, TaskOutcome, TaskScheduler,
};
