//! `duejobs-core`: configuration shared by the scheduler library and the worker binary.

pub mod config;
pub mod error;

pub use config::{DatabaseConfig, DuejobsConfig, SchedulerSettings};
pub use error::{ConfigError, Result};
