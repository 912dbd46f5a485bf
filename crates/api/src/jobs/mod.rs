//! Background job scheduler and job implementations.

mod refresh_usage;
mod scheduler;

pub use refresh_usage::RefreshUsageJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
