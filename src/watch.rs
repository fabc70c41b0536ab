//! Realtime/polling dual-channel controller.
//!
//! Each watched entity (roster, round) gets one task that prefers the
//! store's push feed and degrades to interval polling: immediately when the
//! subscription fails or closes, or after a watchdog period during which a
//! "subscribed" feed delivered nothing. Both sources reduce to the same
//! [`Refresh`] event on a single queue; one sequential consumer performs
//! the actual fetch-and-render, so partial renders cannot interleave
//! regardless of which source fired.

use crate::store::SessionStore;
use crate::types::SessionCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// What a watcher asks the consumer to re-fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    Roster,
    Round,
}

/// Timing knobs for one watcher.
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub poll_interval: Duration,
    pub watchdog: Duration,
}

/// Handle for one spawned dual-channel watcher. Dropping it tears the task
/// (and any feed/timer it owns) down.
pub struct DualChannel {
    task: JoinHandle<()>,
}

impl DualChannel {
    /// Spawn the watcher. `visibility` pauses polling while the page is
    /// hidden; the push feed stays open so nothing is missed, and polling
    /// resumes on the next tick after the page becomes visible again.
    pub fn spawn(
        store: Arc<SessionStore>,
        code: SessionCode,
        kind: Refresh,
        refresh_tx: mpsc::Sender<Refresh>,
        visibility: watch::Receiver<bool>,
        options: WatchOptions,
    ) -> DualChannel {
        let task = tokio::spawn(run(store, code, kind, refresh_tx, visibility, options));
        DualChannel { task }
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for DualChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    store: Arc<SessionStore>,
    code: SessionCode,
    kind: Refresh,
    refresh_tx: mpsc::Sender<Refresh>,
    visibility: watch::Receiver<bool>,
    options: WatchOptions,
) {
    let mut feed = match store.subscribe(code).await {
        Ok(feed) => {
            tracing::debug!(code, ?kind, "subscribed to change feed");
            Some(feed)
        }
        Err(error) => {
            tracing::warn!(code, ?kind, %error, "subscription unavailable, polling instead");
            None
        }
    };

    let mut have_feed = feed.is_some();
    let mut polling = !have_feed;
    let mut saw_event = false;

    let watchdog = tokio::time::sleep(options.watchdog);
    tokio::pin!(watchdog);

    let mut ticker = tokio::time::interval(options.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = next_event(&mut feed), if have_feed => {
                match event {
                    Some(_) => {
                        saw_event = true;
                        if refresh_tx.send(kind).await.is_err() {
                            return;
                        }
                    }
                    None => {
                        tracing::warn!(code, ?kind, "change feed closed, polling instead");
                        feed = None;
                        have_feed = false;
                        polling = true;
                    }
                }
            }
            // Push is nominally up but silent: arm polling as a redundant
            // source of truth. Events keep flowing from both; the consumer
            // de-duplicates by comparing fetched state.
            _ = &mut watchdog, if have_feed && !saw_event && !polling => {
                tracing::debug!(code, ?kind, "no push events before watchdog, arming polling");
                polling = true;
            }
            _ = ticker.tick(), if polling => {
                if !*visibility.borrow() {
                    continue;
                }
                if refresh_tx.send(kind).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn next_event(
    feed: &mut Option<crate::store::RowFeed>,
) -> Option<crate::types::ChangeEvent> {
    match feed {
        Some(feed) => feed.next().await,
        // Unreachable: the select arm is guarded by `feed.is_some()`.
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::{MemoryStore, SessionStore};
    use crate::types::{Role, DEFAULT_ICON};
    use tokio::time::timeout;

    const CODE: SessionCode = 2025121234;

    fn options() -> WatchOptions {
        WatchOptions {
            poll_interval: Duration::from_millis(30),
            watchdog: Duration::from_millis(100),
        }
    }

    fn session_store(backend: MemoryStore) -> Arc<SessionStore> {
        Arc::new(SessionStore::new(Arc::new(backend), &Config::default()))
    }

    #[tokio::test]
    async fn push_events_become_refreshes() {
        let store = session_store(MemoryStore::new());
        let (tx, mut rx) = mpsc::channel(16);
        let (_vis_tx, vis_rx) = watch::channel(true);
        let _watcher = DualChannel::spawn(store.clone(), CODE, Refresh::Roster, tx, vis_rx, options());

        // Give the subscription a moment to open before writing.
        tokio::time::sleep(Duration::from_millis(20)).await;
        store
            .insert_participant(CODE, "Ana", Role::Admin, DEFAULT_ICON)
            .await
            .unwrap();

        let refresh = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(refresh, Some(Refresh::Roster));
    }

    #[tokio::test]
    async fn unsupported_subscription_polls_immediately() {
        let store = session_store(MemoryStore::without_realtime());
        let (tx, mut rx) = mpsc::channel(16);
        let (_vis_tx, vis_rx) = watch::channel(true);
        let _watcher = DualChannel::spawn(store, CODE, Refresh::Round, tx, vis_rx, options());

        let refresh = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(refresh, Some(Refresh::Round));
    }

    #[tokio::test]
    async fn silent_feed_arms_polling_after_watchdog() {
        // Realtime subscribes fine but nothing ever changes; the watchdog
        // must arm polling anyway.
        let store = session_store(MemoryStore::new());
        let (tx, mut rx) = mpsc::channel(16);
        let (_vis_tx, vis_rx) = watch::channel(true);
        let _watcher = DualChannel::spawn(store, CODE, Refresh::Round, tx, vis_rx, options());

        let refresh = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(refresh, Some(Refresh::Round));
    }

    #[tokio::test]
    async fn hidden_page_pauses_polling_and_resumes() {
        let store = session_store(MemoryStore::without_realtime());
        let (tx, mut rx) = mpsc::channel(16);
        let (vis_tx, vis_rx) = watch::channel(false);
        let _watcher = DualChannel::spawn(store, CODE, Refresh::Roster, tx, vis_rx, options());

        // Hidden: no poll refreshes arrive.
        assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());

        // Visible again: the next tick delivers.
        vis_tx.send(true).unwrap();
        let refresh = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(refresh, Some(Refresh::Roster));
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_the_watcher() {
        let store = session_store(MemoryStore::without_realtime());
        let (tx, mut rx) = mpsc::channel(16);
        let (_vis_tx, vis_rx) = watch::channel(true);
        let watcher = DualChannel::spawn(store, CODE, Refresh::Roster, tx, vis_rx, options());

        timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        drop(watcher);
        // The task holds the only sender, so aborting it closes the queue.
        loop {
            match timeout(Duration::from_secs(1), rx.recv()).await.unwrap() {
                Some(_) => continue,
                None => break,
            }
        }
    }
}
