//! # Octoprompt Scheduler
//!
//! The scheduler engine: computes fire times, drives a single dispatcher
//! loop over all armed schedules, delivers prompts with bounded retry,
//! enforces single-flight locking, persists last-fired state, and
//! recovers fires missed while the host was asleep.
//!
//! ## Architecture
//! ```text
//! Dispatcher (one tokio task)
//!   ├── armed map: schedule id → next fire instant
//!   ├── sleeps until the earliest deadline
//!   └── on fire → re-arm immediately, then spawn the fire task
//!
//! Fire task (per fire)
//!   ├── availability gate → concurrency gate → running-set lock
//!   ├── prompt load → delivery with 5s/15s/45s backoff
//!   └── state store + history + events (fired / succeeded / failed)
//! ```

pub mod backend;
pub mod engine;
pub mod events;
pub mod history;
pub mod state;
pub mod timing;

pub use backend::{BackendStatus, CliBackend, DeliveryBackend};
pub use engine::SchedulerEngine;
pub use events::{
    DesktopNotifier, EventKind, EventSink, Notifier, SchedulerEvent, SlackNotifier,
};
pub use history::{ExecutionHistory, ExecutionRecord, HISTORY_CAPACITY};
pub use state::StateStore;
