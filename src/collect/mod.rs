//! Collection strategies and orchestration
//!
//! A strategy is one interchangeable way of turning a keyword into raw
//! content believed to contain invite links: unauthenticated HTTP against
//! the mobile or desktop search endpoint, authenticated browser automation,
//! or the official search API. Strategies never talk to the store directly;
//! every candidate passes through the orchestrator-owned
//! [`orchestrator::CandidateGate`], which handles in-run and durable
//! deduplication.

pub mod api;
pub mod browser;
pub mod http;
pub mod orchestrator;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Result;
use self::orchestrator::CandidateGate;

/// A link/source pair emitted by a strategy. Transient: candidates are
/// never persisted directly and may repeat within one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub link: String,
    pub source: String,
}

/// Errors raised while gathering raw content
#[derive(Error, Debug)]
pub enum CollectError {
    /// Page navigation failed or timed out
    #[error("Page load failed: {0}")]
    PageLoad(String),

    /// Expected content never rendered
    #[error("Timed out waiting for content: {0}")]
    ContentWait(String),

    /// The browser connection is gone
    #[error("Browser driver error: {0}")]
    Driver(String),

    /// Search endpoint answered with a non-success status
    #[error("Search endpoint returned status {0}")]
    Status(u16),

    /// Transport-level failure
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// One interchangeable harvesting backend.
#[async_trait]
pub trait CollectStrategy: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Gather content for the keyword and stream candidates through the
    /// gate. Per-page failures are handled internally; only errors that
    /// end the run early propagate.
    async fn run(&self, keyword: &str, gate: &mut CandidateGate) -> Result<()>;
}

/// Which backend a run should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Authenticated browser automation (default, highest yield)
    Browser,
    /// Plain HTTP against the mobile search endpoint
    MobileFetch,
    /// Plain HTTP against the desktop search endpoint
    DesktopFetch,
    /// Official search API
    Api,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::MobileFetch => "mobile",
            Self::DesktopFetch => "desktop",
            Self::Api => "api",
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "browser" => Ok(Self::Browser),
            "mobile" => Ok(Self::MobileFetch),
            "desktop" => Ok(Self::DesktopFetch),
            "api" => Ok(Self::Api),
            other => Err(format!(
                "unknown strategy '{other}' (expected browser, mobile, desktop or api)"
            )),
        }
    }
}

/// Draw a pacing delay from the configured bounds. Behavior-randomizing
/// only; not required to be crypto-random.
pub(crate) fn jitter_secs(bounds: (f64, f64)) -> f64 {
    let (min, max) = bounds;
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..max)
}

/// Percent-encode a keyword for a search query string.
pub(crate) fn encode_query(keyword: &str) -> String {
    url::form_urlencoded::byte_serialize(keyword.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_strategy_kind_parse() {
        assert_eq!(StrategyKind::from_str("browser").unwrap(), StrategyKind::Browser);
        assert_eq!(StrategyKind::from_str("MOBILE").unwrap(), StrategyKind::MobileFetch);
        assert_eq!(StrategyKind::from_str("desktop").unwrap(), StrategyKind::DesktopFetch);
        assert_eq!(StrategyKind::from_str("api").unwrap(), StrategyKind::Api);
        assert!(StrategyKind::from_str("carrier-pigeon").is_err());
    }

    #[test]
    fn test_jitter_within_bounds() {
        for _ in 0..50 {
            let v = jitter_secs((4.0, 8.0));
            assert!((4.0..8.0).contains(&v));
        }
        // Degenerate bounds collapse to the minimum
        assert_eq!(jitter_secs((3.0, 3.0)), 3.0);
        assert_eq!(jitter_secs((0.0, 0.0)), 0.0);
    }

    #[test]
    fn test_encode_query() {
        assert_eq!(encode_query("free crypto"), "free+crypto");
        assert_eq!(encode_query("币圈"), "%E5%B8%81%E5%9C%88");
    }
}
