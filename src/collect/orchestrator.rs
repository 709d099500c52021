//! Collection orchestrator
//!
//! One run: open the store, hand the chosen strategy a candidate gate, and
//! aggregate what survives deduplication into a [`RunReport`]. Strategy
//! failures are contained here; the caller always gets a report (possibly
//! empty, possibly marked failed), never a raw fault.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::collect::{Candidate, CollectStrategy};
use crate::log::LogSink;
use crate::storage::LinkStore;

/// What the gate did with an offered candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// New link, persisted and added to the run result
    Saved,
    /// Already offered earlier in this run
    SeenThisRun,
    /// Already known to the durable store from a previous run
    AlreadyStored,
}

/// Per-run deduplication gate.
///
/// Candidates are checked against the in-run seen-set first, then the
/// durable store, and only then persisted. The same gate instance is shared
/// across a whole run so strategies that re-discover links during
/// incremental scrolling never trigger redundant writes.
pub struct CandidateGate {
    store: LinkStore,
    keyword: String,
    sink: Arc<dyn LogSink>,
    seen: HashSet<String>,
    results: Vec<Candidate>,
    known: usize,
}

impl CandidateGate {
    pub fn new(store: LinkStore, keyword: impl Into<String>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            store,
            keyword: keyword.into(),
            sink,
            seen: HashSet::new(),
            results: Vec::new(),
            known: 0,
        }
    }

    /// Offer one candidate to the gate.
    pub fn offer(&mut self, link: &str, source: &str) -> Result<GateOutcome> {
        if !self.seen.insert(link.to_string()) {
            return Ok(GateOutcome::SeenThisRun);
        }

        if self.store.exists(link)? {
            self.known += 1;
            self.sink.line(&format!("[collector] already known: {link}"));
            return Ok(GateOutcome::AlreadyStored);
        }

        if self.store.save(link, source, &self.keyword)? {
            self.results.push(Candidate {
                link: link.to_string(),
                source: source.to_string(),
            });
            self.sink.line(&format!("[collector] saved new link: {link}"));
            Ok(GateOutcome::Saved)
        } else {
            // Lost an insert race with a concurrent writer; still known
            self.known += 1;
            Ok(GateOutcome::AlreadyStored)
        }
    }

    /// Emit a progress line through the run's sink.
    pub fn log(&self, msg: &str) {
        self.sink.line(msg);
    }

    /// Number of distinct links offered so far this run.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Number of links newly persisted this run.
    pub fn saved_count(&self) -> usize {
        self.results.len()
    }

    fn into_report(self, error: Option<String>) -> RunReport {
        RunReport {
            keyword: self.keyword,
            results: self.results,
            known: self.known,
            error,
        }
    }
}

/// Aggregated output of one collection run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub keyword: String,
    /// Links newly persisted this run, in discovery order
    pub results: Vec<Candidate>,
    /// Links skipped because the store already had them
    pub known: usize,
    /// Set when the strategy failed; results may be partial
    pub error: Option<String>,
}

impl RunReport {
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// The machine-readable boundary: one JSON array of {link, source}.
    pub fn results_json(&self) -> String {
        serde_json::to_string(&self.results).unwrap_or_else(|_| "[]".to_string())
    }

    fn failed(keyword: &str, error: String) -> Self {
        Self {
            keyword: keyword.to_string(),
            results: Vec::new(),
            known: 0,
            error: Some(error),
        }
    }
}

/// Runs strategies against the store and reports results.
pub struct Collector {
    store: LinkStore,
}

impl Collector {
    pub fn new(store: LinkStore) -> Self {
        Self { store }
    }

    /// Execute one run for a keyword with the given strategy.
    pub async fn collect(
        &self,
        keyword: &str,
        strategy: &dyn CollectStrategy,
        sink: Arc<dyn LogSink>,
    ) -> RunReport {
        sink.line(&format!(
            "[collector] starting run for \"{keyword}\" via {} strategy",
            strategy.name()
        ));

        if let Err(e) = self.store.initialize() {
            sink.line(&format!("[collector] store initialization failed: {e}"));
            return RunReport::failed(keyword, e.to_string());
        }

        let mut gate = CandidateGate::new(self.store.clone(), keyword, Arc::clone(&sink));

        let error = match strategy.run(keyword, &mut gate).await {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(error = %e, category = e.category().as_str(), "collection run failed");
                sink.line(&format!(
                    "[collector] run failed ({}): {e}",
                    e.category().as_str()
                ));
                Some(e.to_string())
            }
        };

        let report = gate.into_report(error);
        sink.line(&format!(
            "[collector] run finished: {} new, {} already known{}",
            report.results.len(),
            report.known,
            if report.is_failed() { " (failed)" } else { "" }
        ));
        report
    }
}
