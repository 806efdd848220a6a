//! Basic usage example: add entries, drain, snapshot and shut down.
//!
//! Run with: cargo run --example basic_usage

use std::sync::Arc;
use std::time::Duration;

use doublebuffer::*;

fn key_create(index: LogIndex, term: Term) -> Entry {
    Entry::new(
        index,
        term,
        OperationResponse::plain(
            format!("create-key-{index}"),
            vec![StagedWrite::put(
                Table::Keys,
                format!("/vol/bucket/key-{index}"),
                format!("info-{index}"),
            )],
        ),
    )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("doublebuffer basic usage\n");

    let store = Arc::new(LmdbMetadataStore::new("./data/basic_usage")?);

    // Indices continue from whatever an earlier run persisted.
    let resume = store.last_committed()?;
    let term: Term = 1;
    let first = resume.map_or(1, |committed| committed.index + 1);
    println!("Store resumes after {resume:?}; first index is {first}\n");

    let config = DoubleBufferConfig::default()
        .with_max_unflushed_transaction_count(64)
        .with_flush_threshold(8)
        .with_max_flush_delay(Duration::from_millis(20))
        .with_ratis(
            |index| println!("   consensus may compact through {index}"),
            move |_| term,
        );
    let buffer = DoubleBuffer::new(Arc::clone(&store), config)?;

    println!("Adding 10 key creations");
    for index in first..first + 10 {
        buffer.add(key_create(index, term))?;
    }
    buffer.drain()?;
    println!("   last committed: {:?}\n", buffer.last_committed());

    // A snapshot creation commits alone and is followed by a store checkpoint.
    let snapshot_index = first + 10;
    let snapshot = SnapshotInfo::new(snapshot_index, "vol", "bucket", "nightly");
    let label = snapshot.checkpoint_label();
    println!("Adding snapshot creation at index {snapshot_index}");
    buffer.add(Entry::new(
        snapshot_index,
        term,
        OperationResponse::snapshot_create("create-snapshot", snapshot),
    ))?;
    buffer.add(key_create(snapshot_index + 1, term))?;

    let report = buffer.flush_current_buffer()?;
    println!(
        "   flushed {} entries in {} runs, through {:?}",
        report.entries, report.runs, report.last_committed
    );
    println!(
        "   checkpoint at {}\n",
        store.checkpoints_dir().join(label).display()
    );

    let metrics = buffer.metrics().snapshot();
    println!("Metrics");
    println!("   iterations: {}", metrics.flush_iterations);
    println!("   entries:    {}", metrics.flushed_transactions);
    println!("   max/iter:   {}", metrics.max_transactions_in_one_iteration);
    println!("   avg/iter:   {:.2}", metrics.avg_transactions_in_one_iteration);
    println!("   health:     {:?}\n", buffer.metrics().health().state);

    buffer.shutdown()?;
    println!("Shut down; state is {}", buffer.daemon_state());
    Ok(())
}
