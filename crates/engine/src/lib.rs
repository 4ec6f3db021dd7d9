pub mod config;
pub mod error;
pub mod indexer;
pub mod ingest;
pub mod overlay;
pub mod reconcile;
pub mod rpc;
pub mod source;

pub use config::IndexerConfig;
pub use error::{EngineError, IngestError};
pub use indexer::{Indexer, IndexerStatus, PollOutcome};
pub use ingest::{dispatch, normalize, Applied};
pub use overlay::{PendingTransactions, UnconfirmedTransaction};
pub use reconcile::{BatchReconciler, ConsistencyViolation};
pub use rpc::RpcLogSource;
pub use source::{LogSource, SourceError};

use std::collections::BTreeMap;
use std::sync::Arc;

use storesync_core::{Address, Field, FieldValue, LogRecord, MudMutation, TxHash};
use storesync_storage::{ChangeEvent, MemoryStore};
use tracing::{debug, warn};

/// What one call to [`Engine::process_logs`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub received: usize,
    /// Dropped because a reorg retracted them.
    pub removed: usize,
    /// Emitted by a world other than the configured one.
    pub foreign: usize,
    pub applied: usize,
    /// Schema and metadata registrations.
    pub registered: usize,
    /// Records that failed to decode or apply.
    pub skipped: usize,
    /// Pending transactions confirmed and verified in this batch.
    pub reconciled: Vec<TxHash>,
}

/// Confirmed table state plus the speculative overlay on top of it.
///
/// One ingestion loop calls [`Engine::process_logs`]; any number of other
/// threads may submit predictions and read rows at the same time.
pub struct Engine {
    store: Arc<MemoryStore>,
    pending: PendingTransactions,
    world: Option<Address>,
}

impl Engine {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            pending: PendingTransactions::new(),
            world: None,
        }
    }

    pub fn from_config(config: &IndexerConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new(config.change_log_capacity)))
            .with_world(config.world_address)
    }

    /// Ignore records from every other store contract.
    pub fn with_world(mut self, world: Option<Address>) -> Self {
        self.world = world;
        self
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn pending(&self) -> &PendingTransactions {
        &self.pending
    }

    // ========================================================================
    // Speculative Overlay
    // ========================================================================

    /// Record what `tx_hash` is expected to do once it confirms. The
    /// mutations are not validated; the next batch carrying the hash checks
    /// them against the confirmed log.
    pub fn submit_prediction(&self, tx_hash: TxHash, mutations: Vec<MudMutation>) {
        debug!(tx = %tx_hash, mutations = mutations.len(), "prediction submitted");
        self.pending.submit(tx_hash, mutations);
        self.store.touch();
    }

    pub fn read_row(&self, table: &str, key: &str) -> Option<Vec<Field>> {
        self.pending.read_row(&self.store, table, key)
    }

    pub fn read_all_rows(&self, table: &str) -> BTreeMap<String, Vec<Field>> {
        self.pending.read_all_rows(&self.store, table)
    }

    /// Like [`Engine::read_row`], but tells an unknown table apart from an
    /// absent row.
    pub fn read_row_by_name(&self, table: &str, key: &str) -> Result<Vec<Field>, EngineError> {
        if let Some(row) = self.read_row(table, key) {
            return Ok(row);
        }
        if self.store.find_table(table).is_none() {
            return Err(EngineError::TableNotFound(table.to_string()));
        }
        Err(EngineError::RowNotFound {
            table: table.to_string(),
            key: key.to_string(),
        })
    }

    pub fn read_field(&self, table: &str, key: &str, field: &str) -> Result<FieldValue, EngineError> {
        self.read_row_by_name(table, key)?
            .into_iter()
            .find(|f| f.name == field)
            .map(|f| f.value)
            .ok_or_else(|| EngineError::FieldNotFound {
                table: table.to_string(),
                field: field.to_string(),
            })
    }

    /// First field of the row, for single-value tables.
    pub fn read_value(&self, table: &str, key: &str) -> Result<FieldValue, EngineError> {
        self.read_row_by_name(table, key)?
            .into_iter()
            .next()
            .map(|f| f.value)
            .ok_or_else(|| EngineError::RowNotFound {
                table: table.to_string(),
                key: key.to_string(),
            })
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, tx_hash: TxHash) -> bool {
        self.pending.is_pending(tx_hash)
    }

    // ========================================================================
    // Confirmed State
    // ========================================================================

    /// Confirmed row only, ignoring predictions.
    pub fn get_row(&self, table: &str, key: &str) -> Option<Vec<Field>> {
        self.store.find_table(table)?.row(key)
    }

    pub fn get_rows(&self, table: &str) -> BTreeMap<String, Vec<Field>> {
        self.store
            .find_table(table)
            .map(|t| t.rows())
            .unwrap_or_default()
    }

    pub fn last_update(&self) -> u64 {
        self.store.last_update()
    }

    pub fn revision(&self) -> u64 {
        self.store.revision()
    }

    pub fn changes_since(&self, sequence: u64) -> Vec<ChangeEvent> {
        self.store.changes_since(sequence)
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Apply one batch of log records and reconcile the predictions it
    /// confirms.
    ///
    /// Undecodable records are logged and skipped. A contradicted or
    /// unconfirmed prediction aborts with [`IngestError::Consistency`]; the
    /// caller must stop ingesting.
    pub fn process_logs(&self, records: Vec<LogRecord>) -> Result<BatchReport, IngestError> {
        let mut report = BatchReport {
            received: records.len(),
            ..BatchReport::default()
        };
        let records = normalize(records);
        report.removed = report.received - records.len();

        let mut reconciler = BatchReconciler::new();
        for record in &records {
            if self.world.is_some_and(|world| world != record.address) {
                report.foreign += 1;
                continue;
            }

            let applied = if reconciler.first_sight(record.tx_hash) {
                // Retire the pending entry and apply under the same lock so
                // readers see the prediction or the confirmed row, never neither.
                let mut pending = self.pending.write();
                if let Some(entry) = overlay::take(&mut pending, record.tx_hash) {
                    reconciler.claim(entry);
                }
                dispatch(&self.store, record)
            } else {
                dispatch(&self.store, record)
            };

            match applied {
                Ok(Applied::Row(mutation)) => {
                    report.applied += 1;
                    reconciler.verify(record.tx_hash, &mutation)?;
                }
                Ok(Applied::Schema(_) | Applied::Metadata(_)) => report.registered += 1,
                Ok(Applied::Ignored) => {}
                Err(e) => {
                    report.skipped += 1;
                    warn!(
                        block = record.block_number,
                        index = record.log_index,
                        tx = %record.tx_hash,
                        event = %record.discriminator(),
                        error = %e,
                        "skipping record"
                    );
                }
            }
        }

        report.reconciled = reconciler.finish()?;
        Ok(report)
    }
}
