use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::IndexerConfig;
use crate::error::IngestError;
use crate::source::{LogSource, SourceError};
use crate::{BatchReport, Engine};

/// Progress published for pollers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexerStatus {
    pub chain_id: Option<u64>,
    /// Latest height the source reported.
    pub chain_height: Option<u64>,
    /// Last height fully applied and reconciled.
    pub processed_height: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Processed {
        from: u64,
        to: u64,
        report: BatchReport,
        /// `to` reached the source's latest height.
        caught_up: bool,
    },
    /// Nothing new since the last poll.
    Idle,
    /// The source failed or timed out; the range will be asked for again.
    FetchFailed,
}

/// Polls a [`LogSource`] in bounded block ranges and feeds each range to the
/// engine, strictly one after another.
pub struct Indexer<S> {
    engine: Arc<Engine>,
    source: S,
    config: IndexerConfig,
    next_height: u64,
    status: watch::Sender<IndexerStatus>,
}

impl<S: LogSource> Indexer<S> {
    pub fn new(engine: Arc<Engine>, source: S, config: IndexerConfig) -> Self {
        let (status, _) = watch::channel(IndexerStatus::default());
        Self {
            engine,
            source,
            next_height: config.starting_height,
            config,
            status,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn status(&self) -> watch::Receiver<IndexerStatus> {
        self.status.subscribe()
    }

    /// First height the next poll will request.
    pub fn next_height(&self) -> u64 {
        self.next_height
    }

    async fn bounded<T>(
        &self,
        what: &'static str,
        call: impl Future<Output = Result<T, SourceError>>,
    ) -> Option<T> {
        let result = match tokio::time::timeout(self.config.fetch_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(self.config.fetch_timeout)),
        };
        result
            .inspect_err(|error| warn!(%error, what, "log source call failed"))
            .ok()
    }

    pub async fn poll_once(&mut self) -> Result<PollOutcome, IngestError> {
        let connected = self.status.borrow().chain_id.is_some();
        if !connected {
            if let Some(chain_id) = self.bounded("chain id", self.source.chain_id()).await {
                info!(chain_id, "connected to log source");
                self.status.send_modify(|s| s.chain_id = Some(chain_id));
            }
        }

        let Some(latest) = self.bounded("latest height", self.source.latest_height()).await else {
            return Ok(PollOutcome::FetchFailed);
        };
        self.status.send_modify(|s| s.chain_height = Some(latest));
        if latest < self.next_height {
            return Ok(PollOutcome::Idle);
        }

        let from = self.next_height;
        let to = latest.min(from.saturating_add(self.config.max_block_span.max(1) - 1));
        let Some(records) = self.bounded("fetch logs", self.source.fetch_logs(from, to)).await
        else {
            return Ok(PollOutcome::FetchFailed);
        };

        let report = self.engine.process_logs(records)?;
        self.next_height = to + 1;
        self.status.send_modify(|s| s.processed_height = Some(to));
        info!(
            from,
            to,
            applied = report.applied,
            skipped = report.skipped,
            removed = report.removed,
            reconciled = report.reconciled.len(),
            "processed range"
        );
        Ok(PollOutcome::Processed {
            from,
            to,
            report,
            caught_up: to >= latest,
        })
    }

    /// Poll until `shutdown` flips or a consistency violation stops ingestion.
    /// While behind the source, ranges are requested back to back.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), IngestError> {
        info!(
            endpoint = %self.config.endpoint,
            from = self.next_height,
            span = self.config.max_block_span,
            "indexer started"
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            let outcome = self.poll_once().await?;
            if matches!(outcome, PollOutcome::Processed { caught_up: false, .. }) {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => break,
            }
        }
        info!(next_height = self.next_height, "indexer stopped");
        Ok(())
    }
}
