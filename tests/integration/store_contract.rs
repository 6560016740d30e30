use crate::integration::support::{hids, record, seeded};
use histcache::store::{ChangeEvent, ChangeKind, ContentStore, ScanOrder};
use histcache::types::Hid;
use histcache::{build_window, derive_key, ContentRecord, ContentType, SearchParams, StoreError};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

fn any(_: &ContentRecord) -> bool {
    true
}

#[test]
fn bad_page_leaves_other_histories_untouched() {
    let store = seeded("A", 10);
    let mut page: Vec<_> = (1..=5).map(|hid| record("B", hid)).collect();
    page[3].id = String::new();

    let err = store.upsert_many(page, true).unwrap_err();
    assert!(matches!(err, StoreError::InvalidRecord(_)));
    assert_eq!(store.count("A", &any).unwrap(), 10);
    assert_eq!(store.count("B", &any).unwrap(), 0);
}

#[test]
fn reads_are_independent_copies() {
    let store = seeded("H", 3);
    let mut copy = store.get(&derive_key("H", ContentType::Dataset, "d2")).unwrap().unwrap();
    copy.state = "tampered".to_string();
    let fresh = store.get(&copy.content_id()).unwrap().unwrap();
    assert_eq!(fresh.state, "ok");
}

#[test]
fn concurrent_writers_and_readers() {
    let store = seeded("H", 0);
    let mut handles = Vec::new();
    for writer in 0..4u64 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for i in 0..50u64 {
                store.upsert_one(record("H", writer * 50 + i + 1)).unwrap();
            }
        }));
    }
    let reader = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for _ in 0..50 {
                let scan = store
                    .range_by_hid("H", &any, ScanOrder::Ascending, 1, 1000)
                    .unwrap();
                assert!(hids(&scan).windows(2).all(|w| w[0] < w[1]));
            }
        })
    };
    for handle in handles {
        handle.join().unwrap();
    }
    reader.join().unwrap();

    let all = store
        .range_by_hid("H", &any, ScanOrder::Ascending, 1, 1000)
        .unwrap();
    assert_eq!(hids(&all), (1..=200).collect::<Vec<_>>());
}

#[test]
fn events_for_a_key_follow_write_order() {
    let store = seeded("H", 0);
    let mut rx = store.changes();
    for n in 0..20 {
        let mut r = record("H", 1);
        r.state = format!("s{}", n);
        store.upsert_one(r).unwrap();
    }

    let mut kinds = Vec::new();
    while let Ok(ChangeEvent::Record(change)) = rx.try_recv() {
        kinds.push(change.kind);
    }
    assert_eq!(kinds.len(), 20);
    assert_eq!(kinds[0], ChangeKind::Insert);
    assert!(kinds[1..].iter().all(|k| *k == ChangeKind::Update));
    assert_eq!(
        store.get("H-dataset-d1").unwrap().unwrap().state,
        "s19"
    );
}

#[test]
fn showing_deleted_only_adds_records() {
    let store = seeded("H", 0);
    let page = (1..=40)
        .map(|hid| {
            let mut r = record("H", hid);
            r.is_deleted = hid % 3 == 0;
            r.visible = hid % 5 != 0;
            r
        })
        .collect();
    store.upsert_many(page, true).unwrap();

    let base = SearchParams::new();
    let narrow = build_window(store.as_ref(), "H", 20, &base, 50).unwrap();
    assert!(narrow.contents.iter().all(|r| !r.is_deleted && r.visible));

    let wide = build_window(
        store.as_ref(),
        "H",
        20,
        &base.clone().with_show_deleted(true),
        50,
    )
    .unwrap();
    let wide_hids = hids(&wide.contents);
    assert!(hids(&narrow.contents).iter().all(|h| wide_hids.contains(h)));
    assert!(wide.len() > narrow.len());
}

#[test]
fn window_of_twenty_at_ten() {
    let store = seeded("H", 20);
    let window = build_window(store.as_ref(), "H", 10, &SearchParams::new(), 5).unwrap();
    assert_eq!(window.start_key, 10);
    assert_eq!(window.len(), 10);
    assert_eq!(hids(&window.contents), (6..=15).collect::<Vec<_>>());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn last_write_per_key_wins(writes in prop::collection::vec((1u64..8, "[a-z]{1,6}"), 1..40)) {
        let store = seeded("H", 0);
        let mut expected: HashMap<Hid, String> = HashMap::new();
        for (hid, state) in &writes {
            let mut r = record("H", *hid);
            r.state = state.clone();
            store.upsert_one(r).unwrap();
            expected.insert(*hid, state.clone());
        }

        prop_assert_eq!(store.count("H", &any).unwrap(), expected.len());
        for (hid, state) in expected {
            let stored = store
                .get(&derive_key("H", ContentType::Dataset, &format!("d{}", hid)))
                .unwrap()
                .unwrap();
            prop_assert_eq!(stored.state, state);
        }
    }
}
