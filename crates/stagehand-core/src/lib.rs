//! `stagehand-core` — host context and configuration for the stagehand daemon.
//!
//! The [`Core`] is the per-process context every subsystem hangs off of: it
//! owns the loaded [`StagehandConfig`] and a small extension map through which
//! context-scoped singletons (the event dispatcher, the endpoint factory
//! registry) attach themselves lazily.

pub mod config;
pub mod core;
pub mod error;

pub use crate::config::StagehandConfig;
pub use crate::core::Core;
pub use crate::error::{Result, StagehandError};
