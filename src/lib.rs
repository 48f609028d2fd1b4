//! Background agents: scheduled agent tasks with live execution streaming.

pub mod api;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod format;
pub mod schedule;
pub mod store;
pub mod stream;
pub mod task;
