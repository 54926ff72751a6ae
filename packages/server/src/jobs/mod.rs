//! Batch job hosting: the in-process run registry and the cron tick.

pub mod registry;
pub mod tick;

pub use registry::RunningJobs;
