use std::sync::Arc;
use std::time::Duration;

use storesync_core::SchemaType;
use storesync_core::field_value::render_row;
use storesync_engine::{
    ConsistencyViolation, Engine, Indexer, IndexerConfig, IngestError, PollOutcome,
};
use storesync_harness::{
    entity, key_word, predict_position, tx_hash, FakeChain, LogBuilder, POSITION, WORLD,
};
use storesync_storage::MemoryStore;
use tokio::sync::watch;

fn config(span: u64) -> IndexerConfig {
    IndexerConfig {
        starting_height: 1,
        max_block_span: span,
        poll_interval: Duration::from_millis(5),
        fetch_timeout: Duration::from_millis(200),
        ..IndexerConfig::default()
    }
}

fn engine() -> Arc<Engine> {
    Arc::new(Engine::new(Arc::new(MemoryStore::default())))
}

/// A chain whose block 1 registers `Position` and whose blocks 2..=`blocks`
/// each move entity 1 to `(block, block)`.
fn chain_with_moves(blocks: u64) -> Result<FakeChain, Box<dyn std::error::Error>> {
    let chain = FakeChain::new(31337);
    let mut logs = LogBuilder::new(WORLD);
    chain.push(logs.register_table(POSITION, &[SchemaType::INT32; 2], &["x", "y"], &[])?);
    for block in 2..=blocks {
        logs.at_block(block).in_tx(tx_hash(&format!("move-{block}")));
        let v = block as i64;
        chain.push([logs.set_record(POSITION, &[key_word(1)], &[v.into(), v.into()])?]);
    }
    Ok(chain)
}

// ============================================================================
// Polling (4 tests)
// ============================================================================

#[tokio::test]
async fn ranges_are_bounded_and_contiguous() -> Result<(), Box<dyn std::error::Error>> {
    let chain = chain_with_moves(7)?;
    let mut indexer = Indexer::new(engine(), chain.clone(), config(3));

    let mut outcomes = Vec::new();
    for _ in 0..4 {
        outcomes.push(indexer.poll_once().await?);
    }

    assert_eq!(chain.fetched_ranges(), vec![(1, 3), (4, 6), (7, 7)]);
    assert!(matches!(outcomes[0], PollOutcome::Processed { caught_up: false, .. }));
    assert!(matches!(outcomes[2], PollOutcome::Processed { caught_up: true, .. }));
    assert_eq!(outcomes[3], PollOutcome::Idle);
    assert_eq!(indexer.next_height(), 8);

    let engine = indexer.engine();
    assert_eq!(
        render_row(engine.get_row("Position", &entity(1)).as_deref()),
        r#"{"x":7,"y":7}"#
    );
    Ok(())
}

#[tokio::test]
async fn failed_fetch_does_not_advance() -> Result<(), Box<dyn std::error::Error>> {
    let chain = chain_with_moves(3)?;
    let mut indexer = Indexer::new(engine(), chain.clone(), config(10));

    // chain id, then latest height
    chain.fail_next(2);
    assert_eq!(indexer.poll_once().await?, PollOutcome::FetchFailed);
    assert_eq!(indexer.next_height(), 1);
    assert!(chain.fetched_ranges().is_empty());

    assert!(matches!(indexer.poll_once().await?, PollOutcome::Processed { from: 1, to: 3, .. }));
    assert_eq!(indexer.next_height(), 4);
    Ok(())
}

#[tokio::test]
async fn status_is_published() -> Result<(), Box<dyn std::error::Error>> {
    let chain = chain_with_moves(4)?;
    let mut indexer = Indexer::new(engine(), chain, config(2));
    let status = indexer.status();

    indexer.poll_once().await?;
    let current = status.borrow().clone();
    assert_eq!(current.chain_id, Some(31337));
    assert_eq!(current.chain_height, Some(4));
    assert_eq!(current.processed_height, Some(2));
    Ok(())
}

#[tokio::test]
async fn run_stops_on_shutdown() -> Result<(), Box<dyn std::error::Error>> {
    let chain = chain_with_moves(5)?;
    let engine = engine();
    let indexer = Indexer::new(Arc::clone(&engine), chain.clone(), config(2));
    let mut status = indexer.status();
    let (stop, shutdown) = watch::channel(false);
    let task = tokio::spawn(indexer.run(shutdown));

    tokio::time::timeout(Duration::from_secs(5), async {
        while status.borrow().processed_height != Some(5) {
            if status.changed().await.is_err() {
                break;
            }
        }
    })
    .await?;
    stop.send(true)?;
    task.await??;

    assert_eq!(chain.fetched_ranges(), vec![(1, 2), (3, 4), (5, 5)]);
    assert_eq!(engine.get_rows("Position").len(), 1);
    Ok(())
}

// ============================================================================
// Fatal Violations (1 test)
// ============================================================================

#[tokio::test]
async fn run_stops_on_consistency_violation() -> Result<(), Box<dyn std::error::Error>> {
    let chain = chain_with_moves(3)?;
    let engine = engine();
    // block 2 actually moves entity 1 to (2, 2)
    engine.submit_prediction(tx_hash("move-2"), vec![predict_position(1, 2, 3)]);

    let indexer = Indexer::new(Arc::clone(&engine), chain, config(10));
    let (_stop, shutdown) = watch::channel(false);
    let result = tokio::time::timeout(Duration::from_secs(5), indexer.run(shutdown)).await?;

    match result {
        Err(IngestError::Consistency(ConsistencyViolation::FieldMismatch { tx_hash: tx, .. })) => {
            assert_eq!(tx, tx_hash("move-2"));
        }
        other => panic!("expected a consistency violation, got {other:?}"),
    }
    Ok(())
}
