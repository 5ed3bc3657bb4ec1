//! End-to-end behavior of the cache: optimistic marks, debounced batched
//! flushes, retry under failure, server merges, notification fan-out, and
//! pending-queue persistence across a restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use readsync_domain::ReadStateEvent;

use crate::application::services::{ReadStatusCache, SyncConfig};
use crate::infrastructure::testing::{FlakyRemote, MemoryStorage};

fn fast_config() -> SyncConfig {
    SyncConfig {
        debounce_ms: 10,
        base_delay_ms: 1,
        max_delay_ms: 10,
        jitter_factor: 0.0,
    }
}

/// Config whose debounce window is far longer than any test, so flushes only
/// happen through force_sync or shutdown.
fn held_back_config() -> SyncConfig {
    SyncConfig {
        debounce_ms: 60_000,
        ..fast_config()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("readsync_client=debug")
        .try_init();
}

async fn wait_until(description: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {description}"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[tokio::test]
async fn double_mark_settles_with_a_single_remote_call() {
    let remote = Arc::new(FlakyRemote::reliable());
    let cache = ReadStatusCache::spawn(remote.clone(), fast_config());

    cache.mark_read_optimistic("A");
    cache.mark_read_optimistic("A");

    wait_until("flush to settle", || cache.pending_count() == 0).await;

    assert_eq!(remote.recorded_batches(), vec![vec!["A".to_string()]]);
    assert_eq!(cache.read_status("A"), Some(true));
}

#[tokio::test]
async fn read_state_never_regresses_from_stale_server_reads() {
    let remote = Arc::new(FlakyRemote::reliable());
    let cache = ReadStatusCache::spawn(remote, fast_config());

    cache.mark_read_optimistic("A");
    wait_until("flush to settle", || !cache.has_pending_updates("A")).await;

    for _ in 0..5 {
        cache.merge_server_snapshot("A", false);
    }
    assert_eq!(cache.read_status("A"), Some(true));
}

#[tokio::test]
async fn failed_flushes_retry_without_losing_the_write() {
    init_tracing();
    let remote = Arc::new(FlakyRemote::failing(2));
    let cache = ReadStatusCache::spawn(remote.clone(), fast_config());

    cache.mark_read_optimistic("C");
    wait_until("retries to settle", || !cache.has_pending_updates("C")).await;

    // Two rejected attempts plus the success, each carrying the id
    let batches = remote.recorded_batches();
    assert_eq!(batches.len(), 3);
    for batch in &batches {
        assert!(batch.contains(&"C".to_string()));
    }
    assert_eq!(cache.read_status("C"), Some(true));
}

#[tokio::test]
async fn pending_write_wins_over_stale_fetch() {
    let remote = Arc::new(FlakyRemote::failing(u32::MAX));
    let cache = ReadStatusCache::spawn(remote, fast_config());

    cache.mark_read_optimistic("A");
    cache.merge_server_snapshot("A", false);

    assert_eq!(cache.read_status("A"), Some(true));
    assert!(cache.has_pending_updates("A"));
}

#[tokio::test]
async fn one_mark_notifies_each_subscriber_once_in_order() {
    let remote = Arc::new(FlakyRemote::reliable());
    let cache = ReadStatusCache::spawn(remote, held_back_config());

    let received = Arc::new(Mutex::new(Vec::new()));
    let first = Arc::clone(&received);
    let _sub_a = cache.on_sync(move |event| {
        first.lock().expect("received lock").push(("first", event));
    });
    let second = Arc::clone(&received);
    let _sub_b = cache.on_sync(move |event| {
        second.lock().expect("received lock").push(("second", event));
    });

    cache.mark_read_optimistic("A");

    let received = received.lock().expect("received lock");
    let expected = ReadStateEvent::Marked { id: "A".into() };
    assert_eq!(
        *received,
        vec![("first", expected.clone()), ("second", expected)]
    );
}

#[tokio::test]
async fn mark_then_confirm_then_merge_scenario() {
    let remote = Arc::new(FlakyRemote::reliable());
    let cache = ReadStatusCache::spawn(remote, fast_config());

    cache.mark_read_optimistic("A");
    assert_eq!(cache.read_status("A"), Some(true));
    assert!(cache.has_pending_updates("A"));
    assert_eq!(cache.read_status("B"), None);

    wait_until("A to confirm", || !cache.has_pending_updates("A")).await;

    cache.merge_server_snapshot("B", true);
    assert_eq!(cache.read_status("B"), Some(true));
    assert!(!cache.has_pending_updates("B"));
}

#[tokio::test]
async fn attempts_accumulate_while_remote_is_down() {
    let remote = Arc::new(FlakyRemote::failing(u32::MAX));
    let cache = ReadStatusCache::spawn(remote.clone(), fast_config());

    cache.mark_read_optimistic("C");
    cache.force_sync();

    wait_until("two failed attempts", || cache.attempts("C") >= 2).await;
    assert!(cache.has_pending_updates("C"));
    assert_eq!(cache.read_status("C"), Some(true));

    // Remote recovers; the force cuts the backoff sleep short
    remote.set_failures_remaining(0);
    cache.force_sync();

    wait_until("recovery flush", || !cache.has_pending_updates("C")).await;
    assert_eq!(cache.attempts("C"), 0);
}

#[tokio::test]
async fn pending_queue_survives_a_restart() {
    let storage = Arc::new(MemoryStorage::new());

    // First session: the remote is down the whole time
    let down = Arc::new(FlakyRemote::failing(u32::MAX));
    let cache = ReadStatusCache::spawn_with_storage(down.clone(), storage.clone(), fast_config());
    cache.mark_read_optimistic("A");
    wait_until("a failed attempt", || !down.recorded_batches().is_empty()).await;
    cache.shutdown().await;

    // Second session: restored pending id flushes to the recovered remote
    let up = Arc::new(FlakyRemote::reliable());
    let cache = ReadStatusCache::spawn_with_storage(up.clone(), storage, fast_config());
    assert_eq!(cache.read_status("A"), Some(true));

    wait_until("restored id to flush", || !cache.has_pending_updates("A")).await;
    assert!(up
        .recorded_batches()
        .iter()
        .any(|batch| batch.contains(&"A".to_string())));
}

#[tokio::test]
async fn shutdown_drains_before_the_debounce_window_elapses() {
    let remote = Arc::new(FlakyRemote::reliable());
    let cache = ReadStatusCache::spawn(remote.clone(), held_back_config());

    cache.mark_read_optimistic("A");
    cache.shutdown().await;

    assert!(!cache.has_pending_updates("A"));
    assert_eq!(remote.recorded_batches(), vec![vec!["A".to_string()]]);
}

#[tokio::test]
async fn refresh_merges_fetched_values_but_not_over_pending() {
    let remote = Arc::new(FlakyRemote::failing(u32::MAX));
    remote.set_fetch_values(HashMap::from([
        ("A".to_string(), false),
        ("B".to_string(), true),
    ]));
    let cache = ReadStatusCache::spawn(remote, held_back_config());

    cache.mark_read_optimistic("A");
    cache
        .refresh(&["A".to_string(), "B".to_string()])
        .await
        .expect("refresh");

    // Pending A ignored the stale false; B adopted the server value
    assert_eq!(cache.read_status("A"), Some(true));
    assert_eq!(cache.read_status("B"), Some(true));
}

#[tokio::test]
async fn panicking_subscriber_does_not_starve_the_next_one() {
    let remote = Arc::new(FlakyRemote::reliable());
    let cache = ReadStatusCache::spawn(remote, held_back_config());

    let _bad = cache.on_sync(|_| panic!("subscriber bug"));
    let count = Arc::new(AtomicU32::new(0));
    let count_clone = Arc::clone(&count);
    let _good = cache.on_sync(move |_| {
        count_clone.fetch_add(1, Ordering::SeqCst);
    });

    cache.mark_read_optimistic("A");
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reset_forgets_and_notifies() {
    let remote = Arc::new(FlakyRemote::reliable());
    let cache = ReadStatusCache::spawn(remote, fast_config());

    cache.mark_read_optimistic("A");
    wait_until("A to confirm", || !cache.has_pending_updates("A")).await;

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _sub = cache.on_sync(move |event| {
        sink.lock().expect("events lock").push(event);
    });

    cache.reset("A");
    assert_eq!(cache.read_status("A"), None);
    assert_eq!(
        *events.lock().expect("events lock"),
        vec![ReadStateEvent::Reset { id: "A".into() }]
    );

    // The item can come back unread via a fresh server observation
    cache.merge_server_snapshot("A", false);
    assert_eq!(cache.read_status("A"), Some(false));
}
