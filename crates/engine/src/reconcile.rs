use std::collections::{HashMap, HashSet};

use storesync_core::{MudMutation, TxHash};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::overlay::UnconfirmedTransaction;

const MISSING: &str = "<missing>";

/// A prediction that the confirmed log contradicted. Ingestion cannot
/// continue past one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyViolation {
    #[error(
        "tx {tx_hash}: {table} {key} field {index} predicted {predicted}, confirmed {confirmed}"
    )]
    FieldMismatch {
        tx_hash: TxHash,
        table: String,
        key: String,
        index: usize,
        predicted: String,
        confirmed: String,
    },

    #[error("tx {tx_hash}: {table} {key} predicted {predicted:?}, confirmed {confirmed:?}")]
    DeleteMismatch {
        tx_hash: TxHash,
        table: String,
        key: String,
        predicted: String,
        confirmed: String,
    },

    #[error("tx {tx_hash}: {remaining} predicted mutations never confirmed")]
    UnconfirmedPredictions { tx_hash: TxHash, remaining: usize },
}

impl ConsistencyViolation {
    pub fn tx_hash(&self) -> TxHash {
        match self {
            Self::FieldMismatch { tx_hash, .. }
            | Self::DeleteMismatch { tx_hash, .. }
            | Self::UnconfirmedPredictions { tx_hash, .. } => *tx_hash,
        }
    }
}

/// Per-batch reconciliation state.
///
/// A hash is claimed the first time any record carrying it shows up; its
/// predictions then wait here until a confirmed mutation for the same row
/// retires them. Anything still waiting at [`BatchReconciler::finish`] is a
/// violation.
#[derive(Debug, Default)]
pub struct BatchReconciler {
    seen: HashSet<TxHash>,
    awaiting: HashMap<TxHash, Vec<MudMutation>>,
    claimed: Vec<TxHash>,
}

impl BatchReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly once per hash per batch.
    pub fn first_sight(&mut self, tx_hash: TxHash) -> bool {
        self.seen.insert(tx_hash)
    }

    pub fn claim(&mut self, entry: UnconfirmedTransaction) {
        debug!(
            tx = %entry.tx_hash,
            predictions = entry.mutations.len(),
            "pending transaction seen in log"
        );
        self.claimed.push(entry.tx_hash);
        self.awaiting.insert(entry.tx_hash, entry.mutations);
    }

    /// Check a confirmed mutation against the first outstanding prediction for
    /// the same row. Returns whether a prediction was retired.
    pub fn verify(
        &mut self,
        tx_hash: TxHash,
        confirmed: &MudMutation,
    ) -> Result<bool, ConsistencyViolation> {
        let Some(awaiting) = self.awaiting.get_mut(&tx_hash) else {
            return Ok(false);
        };
        let Some(at) = awaiting
            .iter()
            .position(|m| m.touches(&confirmed.table, &confirmed.key))
        else {
            return Ok(false);
        };
        let predicted = awaiting.remove(at);
        compare(tx_hash, &predicted, confirmed).inspect_err(|violation| {
            error!(%violation, "prediction contradicted by confirmed log");
        })?;
        if awaiting.is_empty() {
            info!(tx = %tx_hash, "pending transaction reconciled");
        }
        Ok(true)
    }

    pub fn outstanding(&self, tx_hash: TxHash) -> usize {
        self.awaiting.get(&tx_hash).map_or(0, Vec::len)
    }

    /// Close the batch. Returns the hashes whose predictions were all confirmed.
    pub fn finish(self) -> Result<Vec<TxHash>, ConsistencyViolation> {
        for tx_hash in &self.claimed {
            let remaining = self.awaiting.get(tx_hash).map_or(0, Vec::len);
            if remaining > 0 {
                let violation = ConsistencyViolation::UnconfirmedPredictions {
                    tx_hash: *tx_hash,
                    remaining,
                };
                error!(%violation, "batch ended with predictions outstanding");
                return Err(violation);
            }
        }
        Ok(self.claimed)
    }
}

/// Positional comparison on canonical renderings. Field names are not compared.
fn compare(
    tx_hash: TxHash,
    predicted: &MudMutation,
    confirmed: &MudMutation,
) -> Result<(), ConsistencyViolation> {
    let (p, c) = match (&predicted.fields, &confirmed.fields) {
        (None, None) => return Ok(()),
        (Some(p), Some(c)) => (p, c),
        _ => {
            return Err(ConsistencyViolation::DeleteMismatch {
                tx_hash,
                table: confirmed.table.clone(),
                key: confirmed.key.clone(),
                predicted: predicted.rendered(),
                confirmed: confirmed.rendered(),
            });
        }
    };
    // trailing confirmed fields are not checked
    for (index, field) in p.iter().enumerate() {
        let want = field.value.to_string();
        let got = c.get(index).map(|f| f.value.to_string());
        if got.as_deref() != Some(want.as_str()) {
            return Err(ConsistencyViolation::FieldMismatch {
                tx_hash,
                table: confirmed.table.clone(),
                key: confirmed.key.clone(),
                index,
                predicted: want,
                confirmed: got.unwrap_or_else(|| MISSING.to_string()),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use storesync_core::Field;

    fn tx(n: u8) -> TxHash {
        TxHash::from_bytes([n; 32])
    }

    fn pos(x: u64, y: u64) -> MudMutation {
        MudMutation::set("Position", "0x01", vec![Field::new("x", x), Field::new("y", y)])
    }

    fn claimed(reconciler: &mut BatchReconciler, n: u8, mutations: Vec<MudMutation>) {
        assert!(reconciler.first_sight(tx(n)));
        reconciler.claim(UnconfirmedTransaction {
            tx_hash: tx(n),
            mutations,
        });
    }

    #[test]
    fn matching_confirmation_drains() {
        let mut r = BatchReconciler::new();
        claimed(&mut r, 1, vec![pos(3, 4)]);
        assert!(!r.first_sight(tx(1)));
        assert_eq!(r.outstanding(tx(1)), 1);
        assert!(r.verify(tx(1), &pos(3, 4)).unwrap());
        assert_eq!(r.outstanding(tx(1)), 0);
        assert_eq!(r.finish().unwrap(), vec![tx(1)]);
    }

    #[test]
    fn field_mismatch_is_reported_with_position() {
        let mut r = BatchReconciler::new();
        claimed(&mut r, 1, vec![pos(3, 4)]);
        let err = r.verify(tx(1), &pos(3, 5)).unwrap_err();
        assert_eq!(
            err,
            ConsistencyViolation::FieldMismatch {
                tx_hash: tx(1),
                table: "Position".into(),
                key: "0x01".into(),
                index: 1,
                predicted: "4".into(),
                confirmed: "5".into(),
            }
        );
    }

    #[test]
    fn missing_confirmed_field_is_mismatch() {
        let mut r = BatchReconciler::new();
        claimed(&mut r, 1, vec![pos(3, 4)]);
        let short = MudMutation::set("Position", "0x01", vec![Field::new("x", 3u64)]);
        match r.verify(tx(1), &short).unwrap_err() {
            ConsistencyViolation::FieldMismatch { index, confirmed, .. } => {
                assert_eq!(index, 1);
                assert_eq!(confirmed, MISSING);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn extra_confirmed_fields_are_not_compared() {
        let mut r = BatchReconciler::new();
        let partial = MudMutation::set("Position", "0x01", vec![Field::new("x", 3u64)]);
        claimed(&mut r, 1, vec![partial]);
        assert!(r.verify(tx(1), &pos(3, 4)).unwrap());
        assert_eq!(r.finish().unwrap(), vec![tx(1)]);
    }

    #[test]
    fn delete_against_set_is_mismatch() {
        let mut r = BatchReconciler::new();
        claimed(&mut r, 1, vec![MudMutation::delete("Position", "0x01")]);
        let err = r.verify(tx(1), &pos(1, 1)).unwrap_err();
        assert!(matches!(err, ConsistencyViolation::DeleteMismatch { .. }));

        let mut r = BatchReconciler::new();
        claimed(&mut r, 2, vec![MudMutation::delete("Position", "0x01")]);
        assert!(r.verify(tx(2), &MudMutation::delete("Position", "0x01")).unwrap());
    }

    #[test]
    fn unpredicted_rows_are_ignored() {
        let mut r = BatchReconciler::new();
        claimed(&mut r, 1, vec![pos(3, 4)]);
        let other = MudMutation::set("Health", "0x01", vec![Field::new("hp", 9u64)]);
        assert!(!r.verify(tx(1), &other).unwrap());
        assert!(!r.verify(tx(9), &pos(0, 0)).unwrap());
        assert!(r.verify(tx(1), &pos(3, 4)).unwrap());
    }

    #[test]
    fn leftover_prediction_fails_batch() {
        let mut r = BatchReconciler::new();
        claimed(&mut r, 1, vec![pos(3, 4), MudMutation::delete("Card", "0x02")]);
        r.verify(tx(1), &pos(3, 4)).unwrap();
        let err = r.finish().unwrap_err();
        assert_eq!(
            err,
            ConsistencyViolation::UnconfirmedPredictions {
                tx_hash: tx(1),
                remaining: 1,
            }
        );
        assert_eq!(err.tx_hash(), tx(1));
    }

    #[test]
    fn predictions_for_one_row_retire_in_order() {
        let mut r = BatchReconciler::new();
        claimed(&mut r, 1, vec![pos(1, 1), pos(2, 2)]);
        assert!(r.verify(tx(1), &pos(1, 1)).unwrap());
        assert!(r.verify(tx(1), &pos(2, 2)).unwrap());
        assert!(r.finish().is_ok());
    }
}
