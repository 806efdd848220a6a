use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use doublebuffer::types::TermIndex;
use doublebuffer::{DaemonState, DoubleBuffer, DoubleBufferConfig, FlushError, ShutdownPolicy};

use super::support::{
    init_tracing, plain_entry, snapshot_entry, wait_until, GatedMetadataStore,
    MemoryMetadataStore,
};

/// Starts a cycle over `[p1, s2, p3]` that is parked inside the first commit,
/// with `p4` waiting in the active buffer.
fn parked_cycle(
    policy: ShutdownPolicy,
) -> (Arc<GatedMetadataStore>, Arc<DoubleBuffer<GatedMetadataStore>>) {
    init_tracing();
    let store = Arc::new(GatedMetadataStore::new());
    let config = DoubleBufferConfig::default()
        .with_max_unflushed_transaction_count(100)
        .with_flush_threshold(3)
        .with_max_flush_delay(Duration::from_secs(60))
        .with_shutdown_policy(policy);
    let buffer = Arc::new(DoubleBuffer::new(Arc::clone(&store), config).unwrap());

    buffer.add(plain_entry(1, 1)).unwrap();
    buffer.add(snapshot_entry(2, 1)).unwrap();
    buffer.add(plain_entry(3, 1)).unwrap();
    wait_until(Duration::from_secs(2), || store.entered() == 1);

    buffer.add(plain_entry(4, 1)).unwrap();
    (store, buffer)
}

#[test]
fn graceful_shutdown_drains_everything_once() {
    let (store, buffer) = parked_cycle(ShutdownPolicy::Graceful);

    let shutdown = {
        let buffer = Arc::clone(&buffer);
        thread::spawn(move || buffer.shutdown())
    };
    thread::sleep(Duration::from_millis(50));
    store.open();
    shutdown.join().unwrap().unwrap();

    assert_eq!(store.inner().committed_key_indices(), vec![1, 3, 4]);
    assert_eq!(store.inner().checkpoints().len(), 1);
    assert_eq!(buffer.last_committed(), Some(TermIndex::new(1, 4)));
    assert_eq!(buffer.metrics().flushed_transactions(), 4);
    assert_eq!(buffer.daemon_state(), DaemonState::Stopped);

    // Nothing is left, so waiting on a stopped buffer succeeds.
    buffer.drain().unwrap();
    assert!(matches!(
        buffer.add(plain_entry(5, 1)),
        Err(FlushError::BufferClosed)
    ));
}

#[test]
fn abrupt_shutdown_stops_after_the_run_in_flight() {
    let (store, buffer) = parked_cycle(ShutdownPolicy::Abrupt);

    let shutdown = {
        let buffer = Arc::clone(&buffer);
        thread::spawn(move || buffer.shutdown())
    };
    thread::sleep(Duration::from_millis(50));
    store.open();
    shutdown.join().unwrap().unwrap();

    // The parked run completes; the snapshot and everything after it do not.
    assert_eq!(store.inner().committed_key_indices(), vec![1]);
    assert!(store.inner().checkpoints().is_empty());
    assert_eq!(buffer.last_committed(), Some(TermIndex::new(1, 1)));
    assert_eq!(buffer.daemon_state(), DaemonState::Stopped);
    assert_eq!(buffer.pending_count(), 1);

    assert!(matches!(buffer.drain(), Err(FlushError::BufferClosed)));
    assert!(matches!(
        buffer.add(plain_entry(5, 1)),
        Err(FlushError::BufferClosed)
    ));
}

#[test]
fn stop_daemon_hands_flushing_to_callers() {
    init_tracing();
    let store = Arc::new(MemoryMetadataStore::new());
    let buffer = DoubleBuffer::new(Arc::clone(&store), DoubleBufferConfig::default()).unwrap();

    buffer.add(plain_entry(1, 1)).unwrap();
    buffer.drain().unwrap();
    assert_eq!(store.committed_key_indices(), vec![1]);

    buffer.stop_daemon().unwrap();
    assert_eq!(buffer.daemon_state(), DaemonState::Halted);
    buffer.stop_daemon().unwrap();

    buffer.add(plain_entry(2, 1)).unwrap();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(buffer.pending_count(), 1);
    assert_eq!(store.committed_key_indices(), vec![1]);

    let report = buffer.flush_current_buffer().unwrap();
    assert_eq!(report.runs, 1);
    assert_eq!(report.last_committed, Some(TermIndex::new(1, 2)));

    buffer.shutdown().unwrap();
    buffer.shutdown().unwrap();
    assert!(matches!(buffer.stop_daemon(), Err(FlushError::BufferClosed)));
}

#[test]
fn drain_racing_stop_daemon_still_commits() {
    init_tracing();
    for round in 0..300u32 {
        let store = Arc::new(MemoryMetadataStore::new());
        let config = DoubleBufferConfig::default()
            .with_flush_threshold(1000)
            .with_max_flush_delay(Duration::from_secs(600));
        let buffer = Arc::new(DoubleBuffer::new(Arc::clone(&store), config).unwrap());
        buffer.add(plain_entry(1, 1)).unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let drainer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let result = buffer.drain();
                let _ = done_tx.send(result.is_ok());
            })
        };

        // Vary the interleaving between the drain ticket and the halt.
        let spin = Instant::now();
        while spin.elapsed() < Duration::from_micros(u64::from(round % 300)) {
            std::hint::spin_loop();
        }
        buffer.stop_daemon().unwrap();

        let drained = done_rx
            .recv_timeout(Duration::from_secs(5))
            .unwrap_or_else(|_| panic!("round {round}: drain did not return after stop_daemon"));
        assert!(drained, "round {round}: drain failed");
        drainer.join().unwrap();

        assert_eq!(buffer.pending_count(), 0, "round {round}");
        assert_eq!(store.committed_key_indices(), vec![1], "round {round}");
        buffer.shutdown().unwrap();
    }
}

#[test]
fn entries_below_threshold_flush_after_max_delay() {
    let store = Arc::new(MemoryMetadataStore::new());
    let config = DoubleBufferConfig::default()
        .with_flush_threshold(100)
        .with_max_flush_delay(Duration::from_millis(20));
    let buffer = DoubleBuffer::new(Arc::clone(&store), config).unwrap();

    buffer.add(plain_entry(1, 1)).unwrap();
    buffer.add(plain_entry(2, 1)).unwrap();
    wait_until(Duration::from_secs(2), || {
        store.committed_key_indices() == vec![1, 2]
    });
    assert!(buffer.metrics().flush_iterations() >= 1);
    assert_eq!(buffer.pending_count(), 0);
}

#[test]
fn checkpoint_can_flush_first() {
    let store = Arc::new(MemoryMetadataStore::new());
    let buffer = DoubleBuffer::new(
        Arc::clone(&store),
        DoubleBufferConfig::default().without_daemon(),
    )
    .unwrap();

    buffer.add(plain_entry(1, 1)).unwrap();
    buffer.add(plain_entry(2, 1)).unwrap();

    let stale = buffer.checkpoint("export-stale", false).unwrap();
    assert_eq!(stale.created_through(), None);
    assert_eq!(buffer.pending_count(), 2);

    let fresh = buffer.checkpoint("export-fresh", true).unwrap();
    assert_eq!(fresh.created_through(), Some(TermIndex::new(1, 2)));
    assert_eq!(buffer.pending_count(), 0);
    assert_eq!(buffer.metrics().snapshot().checkpoints_created, 2);
}

#[test]
fn drop_shuts_down_gracefully() {
    let store = Arc::new(MemoryMetadataStore::new());
    {
        let config = DoubleBufferConfig::default()
            .with_flush_threshold(50)
            .with_max_flush_delay(Duration::from_secs(60));
        let buffer = DoubleBuffer::new(Arc::clone(&store), config).unwrap();
        buffer.add(plain_entry(1, 1)).unwrap();
        buffer.add(plain_entry(2, 1)).unwrap();
    }
    assert_eq!(store.committed_key_indices(), vec![1, 2]);
}
