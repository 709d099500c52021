//! tgcollect - Telegram invite-link collector
//!
//! Collects x.com posts matching a keyword and harvests the Telegram invite
//! links they embed, persisting deduplicated results to a local SQLite
//! store.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`extract`] - Invite-link extraction from raw text/HTML
//! - [`storage`] - The durable, deduplicating link store
//! - [`session`] - Login browser launch and session snapshot capture
//! - [`collect`] - Collection strategies and the run orchestrator
//! - [`log`] - The progress log-sink abstraction
//! - [`error`] - Unified error types
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tgcollect::collect::http::DesktopFetchStrategy;
//! use tgcollect::collect::orchestrator::Collector;
//! use tgcollect::config::Config;
//! use tgcollect::log::StdoutSink;
//! use tgcollect::storage::LinkStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = LinkStore::open(&config.database.path)?;
//!     let strategy = DesktopFetchStrategy::new(&config.collect)?;
//!     let report = Collector::new(store)
//!         .collect("keyword", &strategy, Arc::new(StdoutSink))
//!         .await;
//!     println!("{}", report.results_json());
//!     Ok(())
//! }
//! ```

pub mod collect;
pub mod config;
pub mod error;
pub mod extract;
pub mod log;
pub mod session;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::collect::orchestrator::{CandidateGate, Collector, RunReport};
    pub use crate::collect::{Candidate, CollectStrategy, StrategyKind};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::log::{LogSink, MemorySink, NullSink, StdoutSink};
    pub use crate::session::{SessionManager, SessionSnapshot};
    pub use crate::storage::{LinkRecord, LinkStore};
}

// Direct re-exports for convenience
pub use collect::{Candidate, StrategyKind};
pub use storage::{LinkRecord, LinkStore};
