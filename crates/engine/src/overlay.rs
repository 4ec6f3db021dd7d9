use std::collections::BTreeMap;

use parking_lot::{RwLock, RwLockWriteGuard};
use storesync_core::{Field, MudMutation, TxHash};
use storesync_storage::MemoryStore;

/// Predicted effects of a submitted but unconfirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnconfirmedTransaction {
    pub tx_hash: TxHash,
    pub mutations: Vec<MudMutation>,
}

/// The live pending list, in submission order.
///
/// Lock order: this list before any table. Readers hold the read lock while
/// falling back to confirmed rows, and ingestion holds the write lock while it
/// retires an entry and applies the record that confirmed it, so a reader
/// never sees a row in neither place.
#[derive(Debug, Default)]
pub struct PendingTransactions {
    entries: RwLock<Vec<UnconfirmedTransaction>>,
}

impl PendingTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&self, tx_hash: TxHash, mutations: Vec<MudMutation>) {
        self.entries.write().push(UnconfirmedTransaction { tx_hash, mutations });
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Vec<UnconfirmedTransaction>> {
        self.entries.write()
    }

    /// Remove and return everything submitted under `tx_hash`.
    pub fn take(&self, tx_hash: TxHash) -> Option<UnconfirmedTransaction> {
        take(&mut self.entries.write(), tx_hash)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn is_pending(&self, tx_hash: TxHash) -> bool {
        self.entries.read().iter().any(|e| e.tx_hash == tx_hash)
    }

    pub fn snapshot(&self) -> Vec<UnconfirmedTransaction> {
        self.entries.read().clone()
    }

    /// Overlay read: the most recently submitted prediction for the row, or
    /// the confirmed row. `None` means absent, including a predicted delete.
    pub fn read_row(&self, store: &MemoryStore, table: &str, key: &str) -> Option<Vec<Field>> {
        let entries = self.entries.read();
        if let Some(predicted) = latest(&entries, table, key) {
            return predicted.fields.clone();
        }
        store.find_table(table)?.row(key)
    }

    /// Confirmed rows of `table` with every pending prediction laid over them
    /// in submission order.
    pub fn read_all_rows(&self, store: &MemoryStore, table: &str) -> BTreeMap<String, Vec<Field>> {
        let entries = self.entries.read();
        let mut rows = store
            .find_table(table)
            .map(|t| t.rows())
            .unwrap_or_default();
        for mutation in entries.iter().flat_map(|e| &e.mutations) {
            if mutation.table != table {
                continue;
            }
            match &mutation.fields {
                Some(fields) => {
                    rows.insert(mutation.key.clone(), fields.clone());
                }
                None => {
                    rows.remove(&mutation.key);
                }
            }
        }
        rows
    }
}

pub(crate) fn take(
    entries: &mut Vec<UnconfirmedTransaction>,
    tx_hash: TxHash,
) -> Option<UnconfirmedTransaction> {
    let mut claimed: Option<UnconfirmedTransaction> = None;
    entries.retain(|entry| {
        if entry.tx_hash != tx_hash {
            return true;
        }
        match &mut claimed {
            Some(c) => c.mutations.extend(entry.mutations.iter().cloned()),
            None => claimed = Some(entry.clone()),
        }
        false
    });
    claimed
}

fn latest<'a>(
    entries: &'a [UnconfirmedTransaction],
    table: &str,
    key: &str,
) -> Option<&'a MudMutation> {
    entries
        .iter()
        .rev()
        .find_map(|e| e.mutations.iter().rev().find(|m| m.touches(table, key)))
}
