use std::sync::Arc;
use std::thread;

use storesync_core::{Field, FieldValue, MudMutation};
use storesync_engine::EngineError;
use storesync_harness::{entity, key_word, position, predict_position, tx_hash, TestNode, POSITION};

// ============================================================================
// Read Precedence (4 tests)
// ============================================================================

#[test]
fn prediction_overrides_confirmed_row() -> Result<(), Box<dyn std::error::Error>> {
    let mut node = TestNode::with_position_table()?;
    let record = node.logs.set_record(POSITION, &[key_word(1)], &[1i64.into(), 1i64.into()])?;
    node.ingest(vec![record])?;

    node.engine
        .submit_prediction(tx_hash("move"), vec![predict_position(1, 3, 4)]);

    assert_eq!(node.read("Position", &entity(1)), r#"{"x":3,"y":4}"#);
    assert_eq!(node.confirmed("Position", &entity(1)), r#"{"x":1,"y":1}"#);
    Ok(())
}

#[test]
fn latest_submission_wins() -> Result<(), Box<dyn std::error::Error>> {
    let node = TestNode::with_position_table()?;
    node.engine
        .submit_prediction(tx_hash("p1"), vec![predict_position(1, 1, 1)]);
    node.engine
        .submit_prediction(tx_hash("p2"), vec![predict_position(1, 2, 2)]);

    assert_eq!(node.read("Position", &entity(1)), r#"{"x":2,"y":2}"#);
    assert_eq!(node.engine.pending_len(), 2);
    Ok(())
}

#[test]
fn unpredicted_rows_fall_through() -> Result<(), Box<dyn std::error::Error>> {
    let mut node = TestNode::with_position_table()?;
    let record = node.logs.set_record(POSITION, &[key_word(2)], &[5i64.into(), 6i64.into()])?;
    node.ingest(vec![record])?;
    node.engine
        .submit_prediction(tx_hash("move"), vec![predict_position(1, 3, 4)]);

    assert_eq!(node.read("Position", &entity(2)), r#"{"x":5,"y":6}"#);
    assert_eq!(node.read("Position", &entity(3)), "");
    Ok(())
}

#[test]
fn predicted_delete_hides_confirmed_row() -> Result<(), Box<dyn std::error::Error>> {
    let mut node = TestNode::with_position_table()?;
    let record = node.logs.set_record(POSITION, &[key_word(1)], &[1i64.into(), 1i64.into()])?;
    node.ingest(vec![record])?;
    node.engine.submit_prediction(
        tx_hash("remove"),
        vec![MudMutation::delete("Position", entity(1))],
    );

    assert_eq!(node.engine.read_row("Position", &entity(1)), None);
    assert!(node.engine.get_row("Position", &entity(1)).is_some());
    Ok(())
}

// ============================================================================
// Table Scans (2 tests)
// ============================================================================

#[test]
fn read_all_rows_unions_pending() -> Result<(), Box<dyn std::error::Error>> {
    let mut node = TestNode::with_position_table()?;
    let a = node.logs.set_record(POSITION, &[key_word(1)], &[1i64.into(), 1i64.into()])?;
    let b = node.logs.set_record(POSITION, &[key_word(2)], &[2i64.into(), 2i64.into()])?;
    node.ingest(vec![a, b])?;
    node.engine.submit_prediction(
        tx_hash("turn"),
        vec![predict_position(2, 9, 9), predict_position(3, 0, 5)],
    );

    let rows = node.engine.read_all_rows("Position");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[&entity(1)], position(1, 1));
    assert_eq!(rows[&entity(2)], position(9, 9));
    assert_eq!(rows[&entity(3)], position(0, 5));
    assert_eq!(node.engine.get_rows("Position").len(), 2);
    Ok(())
}

#[test]
fn scan_of_unknown_table_shows_predictions_only() -> Result<(), Box<dyn std::error::Error>> {
    let node = TestNode::new();
    node.engine.submit_prediction(
        tx_hash("t"),
        vec![MudMutation::value("Turn", "0x01", Field::new("value", 3u64))],
    );
    let rows = node.engine.read_all_rows("Turn");
    assert_eq!(rows.len(), 1);
    assert!(node.engine.get_rows("Turn").is_empty());
    Ok(())
}

// ============================================================================
// Lookups (3 tests)
// ============================================================================

#[test]
fn lookup_errors_distinguish_table_and_row() -> Result<(), Box<dyn std::error::Error>> {
    let node = TestNode::with_position_table()?;
    match node.engine.read_row_by_name("Nope", "0x01") {
        Err(EngineError::TableNotFound(name)) => assert_eq!(name, "Nope"),
        other => panic!("expected TableNotFound, got {other:?}"),
    }
    match node.engine.read_row_by_name("Position", &entity(1)) {
        Err(EngineError::RowNotFound { table, key }) => {
            assert_eq!(table, "Position");
            assert_eq!(key, entity(1));
        }
        other => panic!("expected RowNotFound, got {other:?}"),
    }
    Ok(())
}

#[test]
fn read_field_and_value() -> Result<(), Box<dyn std::error::Error>> {
    let node = TestNode::with_position_table()?;
    node.engine
        .submit_prediction(tx_hash("move"), vec![predict_position(1, 3, 4)]);

    assert_eq!(node.engine.read_field("Position", &entity(1), "y")?.as_i64(), Some(4));
    assert_eq!(node.engine.read_value("Position", &entity(1))?, FieldValue::from(3i64));
    assert!(matches!(
        node.engine.read_field("Position", &entity(1), "z"),
        Err(EngineError::FieldNotFound { .. })
    ));
    Ok(())
}

#[test]
fn submission_bumps_last_update() -> Result<(), Box<dyn std::error::Error>> {
    let node = TestNode::new();
    let revision = node.engine.revision();
    node.engine.submit_prediction(tx_hash("x"), vec![]);
    assert_eq!(node.engine.revision(), revision + 1);
    assert!(node.engine.is_pending(tx_hash("x")));
    assert!(node.engine.changes_since(0).is_empty());
    Ok(())
}

// ============================================================================
// Concurrency (1 test)
// ============================================================================

#[test]
fn concurrent_submissions_and_reads() -> Result<(), Box<dyn std::error::Error>> {
    let node = TestNode::with_position_table()?;
    let engine = Arc::clone(&node.engine);

    let writers: Vec<_> = (0..4u64)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..50u64 {
                    let n = t * 100 + i;
                    engine.submit_prediction(
                        tx_hash(&format!("tx-{n}")),
                        vec![predict_position(n, n as i64, 0)],
                    );
                    assert!(engine.read_row("Position", &entity(n)).is_some());
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().map_err(|_| "writer panicked")?;
    }

    assert_eq!(engine.pending_len(), 200);
    assert_eq!(engine.read_all_rows("Position").len(), 200);
    Ok(())
}
