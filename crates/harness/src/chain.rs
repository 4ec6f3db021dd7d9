use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use storesync_core::LogRecord;
use storesync_engine::{LogSource, SourceError};

#[derive(Debug, Default)]
struct ChainState {
    chain_id: u64,
    height: u64,
    logs: Vec<LogRecord>,
    failures: usize,
    fetched: Vec<(u64, u64)>,
}

/// In-memory log source. Clones share state, so a test can keep one handle
/// while the indexer owns another.
#[derive(Debug, Clone, Default)]
pub struct FakeChain {
    state: Arc<Mutex<ChainState>>,
}

impl FakeChain {
    pub fn new(chain_id: u64) -> Self {
        let chain = Self::default();
        chain.state.lock().chain_id = chain_id;
        chain
    }

    /// Append records, raising the height to cover them.
    pub fn push(&self, records: impl IntoIterator<Item = LogRecord>) {
        let mut state = self.state.lock();
        for record in records {
            state.height = state.height.max(record.block_number);
            state.logs.push(record);
        }
    }

    pub fn set_height(&self, height: u64) {
        self.state.lock().height = height;
    }

    /// Fail the next `n` calls of any kind.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().failures = n;
    }

    /// Ranges passed to `fetch_logs` that succeeded, in call order.
    pub fn fetched_ranges(&self) -> Vec<(u64, u64)> {
        self.state.lock().fetched.clone()
    }

    fn check_failure(state: &mut ChainState) -> Result<(), SourceError> {
        if state.failures > 0 {
            state.failures -= 1;
            return Err(SourceError::Transport("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LogSource for FakeChain {
    async fn chain_id(&self) -> Result<u64, SourceError> {
        let mut state = self.state.lock();
        Self::check_failure(&mut state)?;
        Ok(state.chain_id)
    }

    async fn latest_height(&self) -> Result<u64, SourceError> {
        let mut state = self.state.lock();
        Self::check_failure(&mut state)?;
        Ok(state.height)
    }

    async fn fetch_logs(&self, from: u64, to: u64) -> Result<Vec<LogRecord>, SourceError> {
        let mut state = self.state.lock();
        Self::check_failure(&mut state)?;
        state.fetched.push((from, to));
        Ok(state
            .logs
            .iter()
            .filter(|r| (from..=to).contains(&r.block_number))
            .cloned()
            .collect())
    }
}
