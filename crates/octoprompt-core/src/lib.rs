//! # Octoprompt Core
//!
//! Shared building blocks for the Octoprompt automation agent:
//! configuration loading, the schedule data model, prompt templates,
//! and the common error type.
//!
//! The scheduler engine and the HTTP gateway both sit on top of this
//! crate; neither mutates schedule definitions directly — all config
//! changes go through [`ConfigHandle`].

pub mod config;
pub mod error;
pub mod prompt;
pub mod schedule;

pub use config::{
    AppConfig, BridgeForwardConfig, ConfigHandle, GlobalOptions, HttpConfig, SlackConfig,
};
pub use error::{OctopromptError, Result};
pub use prompt::{PromptLoader, PromptTemplate};
pub use schedule::{ScheduleConfig, ScheduleOptions, ScheduleTiming};
