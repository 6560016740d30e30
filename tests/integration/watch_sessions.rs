use crate::integration::support::{hids, record, seeded, FlakyStore};
use futures::channel::mpsc;
use futures::StreamExt;
use histcache::store::ContentStore;
use histcache::types::Hid;
use histcache::{
    ContentWindow, HistoryCache, SearchParams, SledContentStore, WatchError, WatchSettings,
    WindowStream,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};

const DEBOUNCE: Duration = Duration::from_millis(100);

fn settings() -> WatchSettings {
    WatchSettings {
        page_size: 5,
        debounce: DEBOUNCE,
    }
}

fn start(
    store: Arc<dyn ContentStore>,
    history: &str,
    params: SearchParams,
    first: Hid,
) -> (mpsc::UnboundedSender<Hid>, WindowStream) {
    let cache = HistoryCache::new(store, settings());
    let (tx, rx) = mpsc::unbounded();
    tx.unbounded_send(first).unwrap();
    let windows = cache.watch(rx, history, params);
    (tx, windows)
}

async fn next_window(windows: &mut WindowStream) -> ContentWindow {
    windows
        .next()
        .await
        .expect("stream ended")
        .expect("window failed")
}

/// No emission within several debounce periods.
async fn assert_quiet(windows: &mut WindowStream) {
    assert!(
        timeout(DEBOUNCE * 5, windows.next()).await.is_err(),
        "unexpected emission"
    );
}

#[tokio::test(start_paused = true)]
async fn first_window_is_immediate_and_straddles_target() {
    let store = seeded("H", 20);
    let (_tx, mut windows) = start(store, "H", SearchParams::new(), 10);

    let started = Instant::now();
    let window = next_window(&mut windows).await;
    assert!(started.elapsed() < DEBOUNCE);
    assert_eq!(window.start_key, 10);
    assert_eq!(hids(&window.contents), (6..=15).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn field_change_inside_window_converges_after_debounce() {
    let store = seeded("H", 20);
    let (_tx, mut windows) = start(store.clone(), "H", SearchParams::new(), 10);
    let first = next_window(&mut windows).await;

    let mut changed = record("H", 12);
    changed
        .extra
        .insert("annotation".to_string(), serde_json::json!("checked"));
    store.upsert_one(changed).unwrap();

    let started = Instant::now();
    let second = next_window(&mut windows).await;
    assert!(started.elapsed() >= DEBOUNCE);
    assert_eq!(second.len(), first.len());
    let hid12 = second.contents.iter().find(|r| r.hid == 12).unwrap();
    assert_eq!(hid12.extra["annotation"], "checked");
    assert_quiet(&mut windows).await;
}

#[tokio::test(start_paused = true)]
async fn burst_of_upserts_yields_one_emission() {
    let store = seeded("H", 20);
    let (_tx, mut windows) = start(store.clone(), "H", SearchParams::new(), 10);
    next_window(&mut windows).await;

    for i in 0..100u64 {
        let mut r = record("H", 6 + i % 10);
        r.state = format!("running-{}", i);
        store.upsert_one(r).unwrap();
    }

    let window = next_window(&mut windows).await;
    let hid15 = window.contents.iter().find(|r| r.hid == 15).unwrap();
    assert_eq!(hid15.state, "running-99");
    assert_quiet(&mut windows).await;
}

#[tokio::test(start_paused = true)]
async fn page_ingest_is_coalesced() {
    let store = seeded("H", 10);
    let cache = HistoryCache::new(store.clone(), settings());
    let (tx, rx) = mpsc::unbounded();
    tx.unbounded_send(10).unwrap();
    let mut windows = cache.watch(rx, "H", SearchParams::new());
    assert_eq!(next_window(&mut windows).await.len(), 5);

    cache
        .ingest_page((11..=14).map(|hid| record("H", hid)).collect(), true)
        .unwrap();

    let window = next_window(&mut windows).await;
    assert_eq!(hids(&window.contents), (6..=14).collect::<Vec<_>>());
    assert_quiet(&mut windows).await;
}

#[tokio::test(start_paused = true)]
async fn position_change_recomputes_without_debounce() {
    let store = seeded("H", 40);
    let (tx, mut windows) = start(store, "H", SearchParams::new(), 10);
    next_window(&mut windows).await;

    tx.unbounded_send(30).unwrap();
    let started = Instant::now();
    let window = next_window(&mut windows).await;
    assert!(started.elapsed() < DEBOUNCE);
    assert_eq!(window.start_key, 30);
    assert_eq!(hids(&window.contents), (26..=35).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn changes_outside_window_or_history_are_ignored() {
    let store = seeded("H", 100);
    let (_tx, mut windows) = start(store.clone(), "H", SearchParams::new(), 10);
    next_window(&mut windows).await;

    let mut far = record("H", 80);
    far.state = "error".to_string();
    store.upsert_one(far).unwrap();
    store.upsert_one(record("other", 10)).unwrap();

    assert_quiet(&mut windows).await;
}

#[tokio::test(start_paused = true)]
async fn sessions_debounce_independently() {
    let store = seeded("H", 100);
    let (_tx_a, mut low) = start(store.clone(), "H", SearchParams::new(), 5);
    let (_tx_b, mut high) = start(store.clone(), "H", SearchParams::new(), 95);
    next_window(&mut low).await;
    next_window(&mut high).await;

    let mut near_low = record("H", 7);
    near_low.state = "queued".to_string();
    store.upsert_one(near_low).unwrap();

    let window = next_window(&mut low).await;
    assert_eq!(
        window.contents.iter().find(|r| r.hid == 7).unwrap().state,
        "queued"
    );
    assert_quiet(&mut high).await;
}

#[tokio::test(start_paused = true)]
async fn deleting_a_record_refills_the_window() {
    let store = seeded("H", 20);
    let (_tx, mut windows) = start(store.clone(), "H", SearchParams::new(), 10);
    next_window(&mut windows).await;

    let mut gone = record("H", 9);
    gone.is_deleted = true;
    store.upsert_one(gone).unwrap();

    let window = next_window(&mut windows).await;
    assert_eq!(hids(&window.contents), vec![5, 6, 7, 8, 10, 11, 12, 13, 14, 15]);
    assert!(window.contents.iter().all(|r| !r.is_deleted && r.visible));
}

#[tokio::test(start_paused = true)]
async fn wipe_empties_open_windows() {
    let store = seeded("H", 20);
    let (_tx, mut windows) = start(store.clone(), "H", SearchParams::new(), 10);
    next_window(&mut windows).await;

    store.wipe().unwrap();
    let window = next_window(&mut windows).await;
    assert!(window.is_empty());
    assert_eq!(window.start_key, 10);

    // An empty window accepts any change in the history.
    store.upsert_one(record("H", 500)).unwrap();
    let window = next_window(&mut windows).await;
    assert_eq!(hids(&window.contents), vec![500]);
}

#[tokio::test(start_paused = true)]
async fn stream_completes_with_positions() {
    let store = seeded("H", 20);
    let (tx, mut windows) = start(store, "H", SearchParams::new(), 10);
    next_window(&mut windows).await;

    drop(tx);
    assert!(windows.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_stream_releases_the_change_feed() {
    let store = seeded("H", 20);
    assert_eq!(store.subscriber_count(), 0);

    let (_tx, mut windows) = start(store.clone(), "H", SearchParams::new(), 10);
    next_window(&mut windows).await;
    assert_eq!(store.subscriber_count(), 1);

    windows.close();
    for _ in 0..10 {
        if store.subscriber_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(store.subscriber_count(), 0);

    // Writers are unaffected by the torn-down session.
    store.upsert_one(record("H", 11)).unwrap();
}

#[tokio::test(start_paused = true)]
async fn read_failure_is_reported_and_recovered() {
    let flaky = Arc::new(FlakyStore::new(SledContentStore::temporary(64).unwrap()));
    flaky
        .upsert_many((1..=20).map(|hid| record("H", hid)).collect(), true)
        .unwrap();
    let (_tx, mut windows) = start(flaky.clone(), "H", SearchParams::new(), 10);
    next_window(&mut windows).await;

    flaky.set_failing(true);
    flaky.upsert_one(record("H", 12)).unwrap();
    match windows.next().await {
        Some(Err(WatchError::Store(histcache::StoreError::Unavailable(_)))) => {}
        other => panic!("expected store error, got {:?}", other.map(|r| r.is_ok())),
    }

    flaky.set_failing(false);
    flaky.upsert_one(record("H", 70)).unwrap();
    let window = next_window(&mut windows).await;
    assert_eq!(hids(&window.contents), (6..=15).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn filtered_session_only_sees_matching_records() {
    let store = seeded("H", 20);
    for hid in [3, 11, 17] {
        let mut r = record("H", hid);
        r.tags = vec!["name:raw".to_string()];
        store.upsert_one(r).unwrap();
    }
    let (_tx, mut windows) = start(store.clone(), "H", SearchParams::parse("#raw"), 10);
    let window = next_window(&mut windows).await;
    assert_eq!(hids(&window.contents), vec![3, 11, 17]);

    let mut tagged = record("H", 5);
    tagged.tags = vec!["name:raw".to_string()];
    store.upsert_one(tagged).unwrap();
    let window = next_window(&mut windows).await;
    assert_eq!(hids(&window.contents), vec![3, 5, 11, 17]);
}

#[tokio::test(start_paused = true)]
async fn sparse_filter_picks_up_far_matches() {
    let store = seeded("H", 60);
    for hid in [3, 11, 17] {
        let mut r = record("H", hid);
        r.tags = vec!["name:raw".to_string()];
        store.upsert_one(r).unwrap();
    }
    let cache = HistoryCache::new(store.clone(), settings());
    let (tx, rx) = mpsc::unbounded();
    tx.unbounded_send(10).unwrap();
    let mut windows = cache.watch(rx, "H", SearchParams::parse("#raw"));
    assert_eq!(hids(&next_window(&mut windows).await.contents), vec![3, 11, 17]);

    let mut far = record("H", 40);
    far.tags = vec!["name:raw".to_string()];
    store.upsert_one(far).unwrap();

    let window = timeout(DEBOUNCE * 5, next_window(&mut windows))
        .await
        .expect("far match never reached the window");
    assert_eq!(hids(&window.contents), vec![3, 11, 17, 40]);
    let fresh = cache
        .window("H", 10, &SearchParams::parse("#raw"))
        .unwrap();
    assert_eq!(window.contents, fresh.contents);
}
