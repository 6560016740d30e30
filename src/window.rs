//! Window Builder
//!
//! Computes a bounded, ascending, gap-free slice of matching records around a
//! target hid. Deterministic: the same store contents and arguments always
//! produce an equal window.

use crate::error::StoreError;
use crate::filter::SearchParams;
use crate::record::ContentRecord;
use crate::store::{ContentStore, ScanOrder};
use crate::types::Hid;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Window of records surrounding an anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentWindow {
    /// Anchor hid for the virtualized list
    pub start_key: Hid,
    /// Ascending by hid, at most one record per hid
    pub contents: Vec<ContentRecord>,
}

impl ContentWindow {
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// `(min hid, max hid)` of the window contents
    pub fn hid_span(&self) -> Option<(Hid, Hid)> {
        Some((self.contents.first()?.hid, self.contents.last()?.hid))
    }

    /// Inclusive hid range in which a store change can alter this window.
    ///
    /// A side holding a full page reaches one page past its outermost record.
    /// A short side ran out of matches, so any later match on that side
    /// belongs in the window and the range is open in that direction.
    pub fn reach(&self, page_size: usize) -> (Hid, Hid) {
        let margin = page_size as Hid;
        let below = self
            .contents
            .iter()
            .take_while(|r| r.hid <= self.start_key)
            .count();
        let above = self.contents.len() - below;

        let low = match self.contents.first() {
            Some(first) if below >= page_size && below > 0 => first.hid.saturating_sub(margin),
            _ => 0,
        };
        let high = match self.contents.last() {
            Some(last) if above >= page_size && above > 0 => last.hid.saturating_add(margin),
            _ => Hid::MAX,
        };
        (low, high)
    }
}

/// Build the window around `target_hid`.
///
/// Up to `page_size` matches at or below the target, then up to `page_size`
/// matches above it. Either side comes back short near the ends of the history.
pub fn build_window(
    store: &dyn ContentStore,
    history_id: &str,
    target_hid: Hid,
    params: &SearchParams,
    page_size: usize,
) -> Result<ContentWindow, StoreError> {
    let predicate = |r: &ContentRecord| params.predicate(r);

    let mut lower = scan_unique(
        store,
        history_id,
        &predicate,
        ScanOrder::Descending,
        target_hid,
        page_size,
    )?;
    lower.reverse();

    let upper = match target_hid.checked_add(1) {
        Some(from) => scan_unique(
            store,
            history_id,
            &predicate,
            ScanOrder::Ascending,
            from,
            page_size,
        )?,
        None => Vec::new(),
    };

    // The halves cover disjoint hid ranges.
    let contents: Vec<ContentRecord> = lower.into_iter().chain(upper).collect();

    let start_key = contents
        .iter()
        .find(|r| r.hid == target_hid)
        .map_or(target_hid, |r| r.hid);

    Ok(ContentWindow {
        start_key,
        contents,
    })
}

/// Up to `page_size` matches with distinct hids, in scan order.
///
/// Records sharing a hid count once; the scan is widened by however many
/// were collapsed until the page fills or the history runs out.
fn scan_unique(
    store: &dyn ContentStore,
    history_id: &str,
    predicate: &dyn Fn(&ContentRecord) -> bool,
    order: ScanOrder,
    from: Hid,
    page_size: usize,
) -> Result<Vec<ContentRecord>, StoreError> {
    let mut limit = page_size;
    loop {
        let found = store.range_by_hid(history_id, predicate, order, from, limit)?;
        let exhausted = found.len() < limit;
        let mut seen = HashSet::with_capacity(found.len());
        let mut unique: Vec<ContentRecord> =
            found.into_iter().filter(|r| seen.insert(r.hid)).collect();
        if exhausted || unique.len() >= page_size {
            unique.truncate(page_size);
            return Ok(unique);
        }
        limit += page_size - unique.len();
    }
}
