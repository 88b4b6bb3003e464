//! Faire: scheduled topic research orchestrator.
//!
//! Watches user-defined topics by running recurring research jobs:
//! Schedule → Research → Analyze → Digest → Notify
//!
//! # Architecture
//!
//! The service is built from components that share a SQLite-backed store:
//! - **Store**: Tasks, run history, and trend rows via `rusqlite`
//! - **Scheduler**: A tick loop that fires due tasks into the executor pool
//! - **Executors**: Standard and quick research runs with tier timeouts,
//!   cancellation, and partial-result capture
//! - **Analysis**: Keyword, sentiment, and trend deltas over recent history,
//!   plus digest extraction from report text
//! - **Notify**: Broadcasts qualifying results to gateway subscribers
//! - **Gateway**: JSON HTTP API and SSE event stream via `axum`

pub mod analysis;
pub mod config;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod notify;
pub mod research;
pub mod research_http;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod test_utils;

pub use analysis::{TrendAnalyzer, TrendOutcome};
pub use config::FaireConfig;
pub use error::{FaireError, Result};
pub use executor::{ActiveRuns, QuickExecutor, RunPipeline, TaskExecutor};
pub use gateway::Gateway;
pub use notify::{NotificationDispatcher, ScheduledResultEvent};
pub use research::{ResearchEngine, ResearchJob};
pub use research_http::HttpResearchEngine;
pub use scheduler::{SchedulerManager, SchedulerStatus};
pub use store::WatchStore;
