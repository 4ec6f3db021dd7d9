use std::sync::Arc;

use storesync_core::{Address, SchemaType, TableId};
use storesync_engine::Engine;
use storesync_harness::{entity, key_word, LogBuilder, TestNode, POSITION};
use storesync_storage::MemoryStore;

// ============================================================================
// Reorgs (2 tests)
// ============================================================================

#[test]
fn removed_records_never_apply() -> Result<(), Box<dyn std::error::Error>> {
    let mut node = TestNode::with_position_table()?;
    let mut record = node.logs.set_record(POSITION, &[key_word(1)], &[1i64.into(), 2i64.into()])?;
    record.removed = true;
    let report = node.ingest(vec![record])?;

    assert_eq!(report.received, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(report.applied, 0);
    assert_eq!(node.confirmed("Position", &entity(1)), "");
    Ok(())
}

#[test]
fn removed_record_leaves_existing_row_unchanged() -> Result<(), Box<dyn std::error::Error>> {
    let mut node = TestNode::with_position_table()?;
    let key = [key_word(1)];
    let kept = node.logs.set_record(POSITION, &key, &[1i64.into(), 2i64.into()])?;
    node.ingest(vec![kept])?;

    node.logs.next_block();
    let mut retracted = node.logs.delete_record(POSITION, &key);
    retracted.removed = true;
    node.ingest(vec![retracted])?;

    assert_eq!(node.confirmed("Position", &entity(1)), r#"{"x":1,"y":2}"#);
    Ok(())
}

// ============================================================================
// Ordering (3 tests)
// ============================================================================

#[test]
fn records_apply_in_log_order() -> Result<(), Box<dyn std::error::Error>> {
    let mut node = TestNode::with_position_table()?;
    let key = [key_word(1)];
    node.logs.at_block(10);
    let mut first = node.logs.set_record(POSITION, &key, &[1i64.into(), 1i64.into()])?;
    let mut second = node.logs.set_record(POSITION, &key, &[2i64.into(), 2i64.into()])?;
    first.log_index = 1;
    second.log_index = 2;

    // delivered out of order
    node.ingest(vec![second, first])?;
    assert_eq!(node.confirmed("Position", &entity(1)), r#"{"x":2,"y":2}"#);
    Ok(())
}

#[test]
fn block_height_orders_before_index() -> Result<(), Box<dyn std::error::Error>> {
    let mut node = TestNode::with_position_table()?;
    let key = [key_word(1)];
    node.logs.at_block(20);
    let later = node.logs.set_record(POSITION, &key, &[9i64.into(), 9i64.into()])?;
    node.logs.at_block(19);
    let mut earlier = node.logs.set_record(POSITION, &key, &[5i64.into(), 5i64.into()])?;
    earlier.log_index = 40;

    node.ingest(vec![later, earlier])?;
    assert_eq!(node.confirmed("Position", &entity(1)), r#"{"x":9,"y":9}"#);
    Ok(())
}

#[test]
fn registration_and_rows_in_one_batch() -> Result<(), Box<dyn std::error::Error>> {
    let mut logs = LogBuilder::new(Address::from_bytes([1; 20]));
    let counter = TableId::from_parts("game", "Counter");
    let mut records = logs.register_table(counter, &[SchemaType::UINT32], &["value"], &[])?;
    records.push(logs.set_record(counter, &[], &[7u64.into()])?);
    records.reverse();
    // the reversal is undone by the log positions
    let node = TestNode::new();
    let report = node.ingest(records)?;

    assert_eq!(report.registered, 2);
    assert_eq!(report.applied, 1);
    assert_eq!(node.engine.read_value("Counter", "0x")?.as_u64(), Some(7));
    Ok(())
}

// ============================================================================
// Worlds (2 tests)
// ============================================================================

#[test]
fn world_filter_drops_foreign_records() -> Result<(), Box<dyn std::error::Error>> {
    let ours = Address::from_bytes([1; 20]);
    let theirs = Address::from_bytes([2; 20]);
    let engine = Engine::new(Arc::new(MemoryStore::default())).with_world(Some(ours));

    let mut foreign = LogBuilder::new(theirs);
    let records = foreign.register_table(POSITION, &[SchemaType::INT32; 2], &["x", "y"], &[])?;
    let report = engine.process_logs(records)?;

    assert_eq!(report.foreign, 2);
    assert!(engine.store().worlds().is_empty());
    Ok(())
}

#[test]
fn worlds_keep_separate_tables() -> Result<(), Box<dyn std::error::Error>> {
    let node = TestNode::new();
    for (n, world) in [(1u8, Address::from_bytes([1; 20])), (2, Address::from_bytes([2; 20]))] {
        let mut logs = LogBuilder::new(world);
        let mut records = logs.register_table(POSITION, &[SchemaType::INT32; 2], &["x", "y"], &[])?;
        records.push(logs.set_record(POSITION, &[key_word(1)], &[i64::from(n).into(), 0i64.into()])?);
        node.ingest(records)?;
    }

    let store = node.engine.store();
    assert_eq!(store.worlds().len(), 2);
    for world in store.worlds() {
        let table = world.table(POSITION).ok_or("table missing")?;
        assert_eq!(table.row_count(), 1);
    }
    // name lookups resolve to the lowest world address
    assert_eq!(node.confirmed("Position", &entity(1)), r#"{"x":1,"y":0}"#);
    Ok(())
}
