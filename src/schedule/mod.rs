//! Schedules: when a background agent task should run next.
//!
//! - `model`: the `Schedule` sum type and the due computation
//! - `cron`: the cron evaluator capability and its `cron`-crate implementation

pub mod cron;
pub mod model;

pub use self::cron::{CronEvaluator, StandardCron};
pub use self::model::{Schedule, Timestamp, is_due};
