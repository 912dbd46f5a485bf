//! Service-side collaborators of the usage engine.

pub mod app_info;
pub mod computation;
pub mod history_source;

pub use app_info::StaticAppInfoResolver;
pub use computation::{
    ComputationError, ComputationOutcome, LatestUsage, UsageComputation, UsageEngine, UsageSnapshot,
};
pub use history_source::{HistorySource, HistorySourceError, JsonFileHistorySource};
