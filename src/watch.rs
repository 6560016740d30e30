//! Live history contents query
//!
//! Combines a stream of target hids with the store's change feed and emits a
//! fresh window whenever either moves. Position changes recompute at once;
//! store changes near the current window are debounced so that a page ingest
//! produces a single emission.

use crate::error::WatchError;
use crate::filter::SearchParams;
use crate::store::{ChangeEvent, ContentStore};
use crate::types::{Hid, HistoryId};
use crate::window::{build_window, ContentWindow};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Windows buffered between a session and its consumer
const OUTPUT_BUFFER: usize = 16;

/// Per-session watch configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Matches fetched on each side of the anchor
    pub page_size: usize,
    /// Quiet period after the last qualifying store change
    #[serde(with = "duration_ms", rename = "debounce_ms")]
    pub debounce: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            page_size: 50,
            debounce: Duration::from_millis(100),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Stream of windows for one watch session
///
/// Dropping it (or calling `close`) stops the session and releases its
/// change feed subscription; nothing is delivered afterwards.
pub struct WindowStream {
    rx: mpsc::Receiver<Result<ContentWindow, WatchError>>,
    task: JoinHandle<()>,
}

impl WindowStream {
    /// Cancel the session, discarding anything not yet received.
    pub fn close(self) {
        drop(self);
    }
}

impl Stream for WindowStream {
    type Item = Result<ContentWindow, WatchError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for WindowStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start a watch session.
///
/// The first position yields a window immediately. The stream ends when
/// `positions` ends. Store read failures arrive as `Err` items and the session
/// keeps going. Must be called from within a tokio runtime.
pub fn watch_history_contents<S>(
    store: Arc<dyn ContentStore>,
    positions: S,
    history_id: impl Into<HistoryId>,
    params: SearchParams,
    settings: WatchSettings,
) -> WindowStream
where
    S: Stream<Item = Hid> + Send + Unpin + 'static,
{
    // Subscribe before spawning so no write between here and the first
    // window goes unseen.
    let changes = store.changes();
    let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);
    let session = Session {
        store,
        history_id: history_id.into(),
        params,
        settings,
        anchor: None,
        current: None,
        tx,
    };
    let task = tokio::spawn(session.run(positions, changes));
    WindowStream { rx, task }
}

struct Session {
    store: Arc<dyn ContentStore>,
    history_id: HistoryId,
    params: SearchParams,
    settings: WatchSettings,
    anchor: Option<Hid>,
    /// Last window delivered; `None` before the first one or after a failure
    current: Option<ContentWindow>,
    tx: mpsc::Sender<Result<ContentWindow, WatchError>>,
}

impl Session {
    async fn run<S>(mut self, mut positions: S, mut changes: broadcast::Receiver<ChangeEvent>)
    where
        S: Stream<Item = Hid> + Send + Unpin,
    {
        debug!(history_id = %self.history_id, "Watch session started");

        let debounce = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(debounce);
        let mut pending = false;
        let mut feed_open = true;

        loop {
            tokio::select! {
                biased;

                position = positions.next() => {
                    let Some(hid) = position else {
                        break;
                    };
                    self.anchor = Some(hid);
                    // The fresh window already reflects anything queued.
                    pending = false;
                    if !self.recompute().await {
                        break;
                    }
                }

                event = changes.recv(), if feed_open => {
                    let qualifies = match event {
                        Ok(event) => self.is_relevant(&event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(
                                history_id = %self.history_id,
                                skipped,
                                "Change feed lagged, scheduling recompute"
                            );
                            self.anchor.is_some()
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            feed_open = false;
                            false
                        }
                    };
                    if qualifies {
                        debounce.as_mut().reset(Instant::now() + self.settings.debounce);
                        pending = true;
                    }
                }

                () = &mut debounce, if pending => {
                    pending = false;
                    if !self.recompute().await {
                        break;
                    }
                }
            }
        }

        debug!(history_id = %self.history_id, "Watch session finished");
    }

    /// Whether a change can affect what this session shows.
    fn is_relevant(&self, event: &ChangeEvent) -> bool {
        if self.anchor.is_none() {
            return false;
        }
        let change = match event {
            ChangeEvent::Reset => return true,
            ChangeEvent::Record(change) => change,
        };
        if change.history_id != self.history_id {
            return false;
        }
        let Some(window) = self.current.as_ref() else {
            return true;
        };
        let (low, high) = window.reach(self.settings.page_size);
        let relevant = change.hid >= low && change.hid <= high;
        trace!(
            history_id = %self.history_id,
            hid = change.hid,
            relevant,
            "Change event"
        );
        relevant
    }

    /// Rebuild the window at the current anchor and deliver it.
    /// Returns false once the consumer is gone.
    async fn recompute(&mut self) -> bool {
        let Some(anchor) = self.anchor else {
            return true;
        };
        let started = Instant::now();
        let item = match build_window(
            self.store.as_ref(),
            &self.history_id,
            anchor,
            &self.params,
            self.settings.page_size,
        ) {
            Ok(window) => {
                debug!(
                    history_id = %self.history_id,
                    anchor,
                    len = window.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Window recomputed"
                );
                self.current = Some(window.clone());
                Ok(window)
            }
            Err(e) => {
                warn!(
                    history_id = %self.history_id,
                    anchor,
                    error = %e,
                    "Window recompute failed"
                );
                self.current = None;
                Err(WatchError::Store(e))
            }
        };
        self.tx.send(item).await.is_ok()
    }
}
