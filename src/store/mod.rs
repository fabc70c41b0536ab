//! Store adapter: the remote row store behind a backend trait, plus the
//! typed operations the rest of the engine uses.
//!
//! The backend is a black box offering filtered queries, inserts,
//! update-by-id and (optionally) a push change feed. Timeouts, bounded
//! retries, app-tag partitioning and payload normalization all live in
//! [`SessionStore`] so no backend quirk leaks past this module.

mod memory;
mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::types::{
    ChangeEvent, NewRow, Participant, Role, RoundPayload, RowId, SessionCode, StoredRow, APP_TAG,
    DEFAULT_ICON, GAME_VERSION, ROUND_ROLE,
};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Row ordering for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    CreatedAsc,
    CreatedDesc,
}

/// A filtered row query. Every query carries the app tag; the shared table
/// may hold unrelated data.
#[derive(Debug, Clone)]
pub struct RowQuery {
    pub app: String,
    pub code: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub game_version: Option<String>,
    /// Only rows with a non-null payload column.
    pub require_payload: bool,
    /// Only rows with a non-null display name.
    pub require_display_name: bool,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl RowQuery {
    pub fn new() -> RowQuery {
        RowQuery {
            app: APP_TAG.to_string(),
            code: None,
            display_name: None,
            role: None,
            game_version: None,
            require_payload: false,
            require_display_name: false,
            order: None,
            limit: None,
        }
    }

    pub fn code(mut self, code: SessionCode) -> Self {
        self.code = Some(code.to_string());
        self
    }

    pub fn display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    pub fn role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    pub fn game_version(mut self, version: &str) -> Self {
        self.game_version = Some(version.to_string());
        self
    }

    pub fn require_payload(mut self) -> Self {
        self.require_payload = true;
        self
    }

    pub fn require_display_name(mut self) -> Self {
        self.require_display_name = true;
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a row matches this query's filters (used by backends that
    /// filter in-process).
    pub fn matches(&self, row: &StoredRow) -> bool {
        if row.app != self.app {
            return false;
        }
        if let Some(code) = &self.code {
            if &row.code != code {
                return false;
            }
        }
        if let Some(name) = &self.display_name {
            if row.display_name.as_deref() != Some(name.as_str()) {
                return false;
            }
        }
        if let Some(role) = &self.role {
            if &row.role != role {
                return false;
            }
        }
        if let Some(version) = &self.game_version {
            if row.game_version.as_deref() != Some(version.as_str()) {
                return false;
            }
        }
        if self.require_payload && row.payload.is_none() {
            return false;
        }
        if self.require_display_name && row.display_name.is_none() {
            return false;
        }
        true
    }
}

impl Default for RowQuery {
    fn default() -> Self {
        Self::new()
    }
}

/// Push change feed for one session code. Dropping the feed tears down the
/// forwarding task. A `None` from [`RowFeed::next`] means the channel
/// closed; the watcher treats that as a signal to poll.
pub struct RowFeed {
    rx: mpsc::Receiver<ChangeEvent>,
    guard: Option<JoinHandle<()>>,
}

impl RowFeed {
    pub fn new(rx: mpsc::Receiver<ChangeEvent>, guard: Option<JoinHandle<()>>) -> RowFeed {
        RowFeed { rx, guard }
    }

    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }
}

impl Drop for RowFeed {
    fn drop(&mut self) {
        if let Some(handle) = self.guard.take() {
            handle.abort();
        }
    }
}

/// Backend interface of the remote row store.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn insert(&self, row: NewRow) -> StoreResult<StoredRow>;

    async fn select(&self, query: RowQuery) -> StoreResult<Vec<StoredRow>>;

    /// Replace the payload column of one row, addressed by id.
    async fn update_payload(
        &self,
        id: RowId,
        payload: serde_json::Value,
    ) -> StoreResult<StoredRow>;

    /// Open a change feed filtered to one session code, or
    /// [`StoreError::Unsupported`] if the backend has none.
    async fn subscribe(&self, code: SessionCode) -> StoreResult<RowFeed>;
}

/// A round row paired with the id needed for the reveal update.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundRow {
    pub row_id: RowId,
    pub payload: RoundPayload,
}

/// Typed store operations with the crate's retry/timeout policy.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn RowStore>,
    request_timeout: Duration,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn RowStore>, config: &Config) -> SessionStore {
        SessionStore {
            backend,
            request_timeout: config.request_timeout,
            retry_attempts: config.retry_attempts,
            retry_backoff: config.retry_backoff,
        }
    }

    /// Run one store call with a bounded timeout and a small bounded retry
    /// with backoff on transient failures.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut call: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let outcome = tokio::time::timeout(self.request_timeout, call()).await;
            let error = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => StoreError::Timeout(self.request_timeout),
            };
            if !error.is_transient() || attempt >= self.retry_attempts {
                return Err(error);
            }
            attempt += 1;
            let backoff = self.retry_backoff * attempt;
            tracing::warn!(%error, what, attempt, "transient store failure, retrying");
            tokio::time::sleep(backoff).await;
        }
    }

    /// Whether any row exists for this session code.
    pub async fn code_exists(&self, code: SessionCode) -> StoreResult<bool> {
        let backend = self.backend.clone();
        let rows = self
            .with_retry("code existence check", move || {
                let backend = backend.clone();
                let query = RowQuery::new().code(code).limit(1);
                async move { backend.select(query).await }
            })
            .await?;
        Ok(!rows.is_empty())
    }

    /// Whether a participant with this display name already joined.
    pub async fn participant_exists(&self, code: SessionCode, name: &str) -> StoreResult<bool> {
        let backend = self.backend.clone();
        let name = name.to_string();
        let rows = self
            .with_retry("participant existence check", move || {
                let backend = backend.clone();
                let query = RowQuery::new().code(code).display_name(&name).limit(1);
                async move { backend.select(query).await }
            })
            .await?;
        Ok(!rows.is_empty())
    }

    pub async fn insert_participant(
        &self,
        code: SessionCode,
        name: &str,
        role: Role,
        icon: &str,
    ) -> StoreResult<StoredRow> {
        let backend = self.backend.clone();
        let row = NewRow::participant(code, name, role, icon);
        self.with_retry("participant insert", move || {
            let backend = backend.clone();
            let row = row.clone();
            async move { backend.insert(row).await }
        })
        .await
    }

    /// Participant rows of a session in join order. Rows with a blank name
    /// are dropped here; the store should never produce them, but the
    /// contract tolerates it.
    pub async fn roster(&self, code: SessionCode) -> StoreResult<Vec<Participant>> {
        let backend = self.backend.clone();
        let rows = self
            .with_retry("roster load", move || {
                let backend = backend.clone();
                let query = RowQuery::new()
                    .code(code)
                    .require_display_name()
                    .order(Order::CreatedAsc);
                async move { backend.select(query).await }
            })
            .await?;

        let mut roster = Vec::new();
        for row in rows {
            let Some(name) = row.display_name.as_deref() else {
                continue;
            };
            if name.trim().is_empty() {
                continue;
            }
            // Round rows carry no display name and were filtered already;
            // anything with an unknown role string is skipped, not fatal.
            let Some(role) = Role::parse(&row.role) else {
                continue;
            };
            roster.push(Participant {
                display_name: name.to_string(),
                role,
                icon: row.icon.clone().unwrap_or_else(|| DEFAULT_ICON.to_string()),
                joined_at: row.created_at,
            });
        }
        Ok(roster)
    }

    /// Append a new round row. Rounds are append-only: a session accumulates
    /// its round history and "current" means most recently created.
    pub async fn insert_round(
        &self,
        code: SessionCode,
        payload: &RoundPayload,
    ) -> StoreResult<RoundRow> {
        let backend = self.backend.clone();
        let row = NewRow::round(code, payload.to_column());
        let stored = self
            .with_retry("round insert", move || {
                let backend = backend.clone();
                let row = row.clone();
                async move { backend.insert(row).await }
            })
            .await?;
        Ok(RoundRow {
            row_id: stored.id,
            payload: payload.clone(),
        })
    }

    /// The most recently created round row for this session, if any.
    pub async fn latest_round(&self, code: SessionCode) -> StoreResult<Option<RoundRow>> {
        let backend = self.backend.clone();
        let rows = self
            .with_retry("latest round load", move || {
                let backend = backend.clone();
                let query = RowQuery::new()
                    .code(code)
                    .role(ROUND_ROLE)
                    .game_version(GAME_VERSION)
                    .require_payload()
                    .order(Order::CreatedDesc)
                    .limit(1);
                async move { backend.select(query).await }
            })
            .await?;

        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let column = row
            .payload
            .as_ref()
            .ok_or_else(|| StoreError::Schema("round row without payload".to_string()))?;
        let payload = RoundPayload::from_column(column)
            .map_err(|e| StoreError::Schema(format!("unparseable round payload: {e}")))?;
        Ok(Some(RoundRow {
            row_id: row.id,
            payload,
        }))
    }

    /// Overwrite one round row's payload. Callers must have read the current
    /// payload first and merged into it (read-merge-write, never
    /// write-last-known-copy).
    pub async fn update_round(&self, id: RowId, payload: &RoundPayload) -> StoreResult<()> {
        let backend = self.backend.clone();
        let column = payload.to_column();
        self.with_retry("round update", move || {
            let backend = backend.clone();
            let column = column.clone();
            async move { backend.update_payload(id, column).await }
        })
        .await?;
        Ok(())
    }

    /// All distinct session codes stored for this app, for the short-code
    /// fallback scan.
    pub async fn all_codes(&self) -> StoreResult<Vec<SessionCode>> {
        let backend = self.backend.clone();
        let rows = self
            .with_retry("code scan", move || {
                let backend = backend.clone();
                let query = RowQuery::new();
                async move { backend.select(query).await }
            })
            .await?;

        let mut codes: Vec<SessionCode> = rows
            .iter()
            .filter_map(|row| row.code.parse().ok())
            .collect();
        codes.sort_unstable();
        codes.dedup();
        Ok(codes)
    }

    /// Open the push change feed for one session code.
    pub async fn subscribe(&self, code: SessionCode) -> StoreResult<RowFeed> {
        self.backend.subscribe(code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoundIdentity;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryStore::new()), &Config::default())
    }

    #[tokio::test]
    async fn code_existence_roundtrip() {
        let store = store();
        assert!(!store.code_exists(2025123456).await.unwrap());
        store
            .insert_participant(2025123456, "Ana", Role::Admin, DEFAULT_ICON)
            .await
            .unwrap();
        assert!(store.code_exists(2025123456).await.unwrap());
        assert!(!store.code_exists(2025129999).await.unwrap());
    }

    #[tokio::test]
    async fn roster_is_join_ordered_and_filters_blanks() {
        let store = store();
        let code = 2025121111;
        store
            .insert_participant(code, "Ana", Role::Admin, DEFAULT_ICON)
            .await
            .unwrap();
        store
            .insert_participant(code, "Luis", Role::Guest, "🎭")
            .await
            .unwrap();
        store
            .insert_participant(code, "   ", Role::Guest, DEFAULT_ICON)
            .await
            .unwrap();

        let roster = store.roster(code).await.unwrap();
        let names: Vec<_> = roster.iter().map(|p| p.display_name.as_str()).collect();
        assert_eq!(names, ["Ana", "Luis"]);
        assert_eq!(roster[0].role, Role::Admin);
        assert_eq!(roster[1].icon, "🎭");
    }

    #[tokio::test]
    async fn latest_round_wins_over_history() {
        let store = store();
        let code = 2025122222;
        let mut payload = RoundPayload {
            active: true,
            started_at: 1,
            category: "Animales".into(),
            element: "Felinos".into(),
            impostor: "Ana".into(),
            revealed_identities: Default::default(),
        };
        store.insert_round(code, &payload).await.unwrap();
        payload.started_at = 2;
        payload.element = "Pájaros".into();
        let second = store.insert_round(code, &payload).await.unwrap();

        let latest = store.latest_round(code).await.unwrap().unwrap();
        assert_eq!(latest.row_id, second.row_id);
        assert_eq!(latest.payload.element, "Pájaros");
        assert_eq!(
            RoundIdentity::of(&latest.payload),
            RoundIdentity::of(&payload)
        );
    }

    #[tokio::test]
    async fn update_round_touches_only_that_row() {
        let store = store();
        let code = 2025123333;
        let payload = RoundPayload {
            active: true,
            started_at: 10,
            category: "Animales".into(),
            element: "Felinos".into(),
            impostor: "Ana".into(),
            revealed_identities: Default::default(),
        };
        let row = store.insert_round(code, &payload).await.unwrap();

        let mut merged = payload.clone();
        merged.revealed_identities.insert("Luis".into(), true);
        store.update_round(row.row_id, &merged).await.unwrap();

        let latest = store.latest_round(code).await.unwrap().unwrap();
        assert_eq!(latest.row_id, row.row_id);
        assert!(latest.payload.has_revealed("Luis"));
    }

    #[tokio::test]
    async fn all_codes_deduplicates() {
        let store = store();
        store
            .insert_participant(2025124444, "Ana", Role::Admin, DEFAULT_ICON)
            .await
            .unwrap();
        store
            .insert_participant(2025124444, "Luis", Role::Guest, DEFAULT_ICON)
            .await
            .unwrap();
        store
            .insert_participant(2024115555, "Eva", Role::Admin, DEFAULT_ICON)
            .await
            .unwrap();

        let codes = store.all_codes().await.unwrap();
        assert_eq!(codes, vec![2024115555, 2025124444]);
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        struct Flaky {
            inner: MemoryStore,
            failures: std::sync::atomic::AtomicU32,
        }

        #[async_trait]
        impl RowStore for Flaky {
            async fn insert(&self, row: NewRow) -> StoreResult<StoredRow> {
                self.inner.insert(row).await
            }
            async fn select(&self, query: RowQuery) -> StoreResult<Vec<StoredRow>> {
                use std::sync::atomic::Ordering;
                if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    n.checked_sub(1)
                }).is_ok()
                {
                    return Err(StoreError::Transport("connection reset".into()));
                }
                self.inner.select(query).await
            }
            async fn update_payload(
                &self,
                id: RowId,
                payload: serde_json::Value,
            ) -> StoreResult<StoredRow> {
                self.inner.update_payload(id, payload).await
            }
            async fn subscribe(&self, code: SessionCode) -> StoreResult<RowFeed> {
                self.inner.subscribe(code).await
            }
        }

        let backend = Arc::new(Flaky {
            inner: MemoryStore::new(),
            failures: std::sync::atomic::AtomicU32::new(2),
        });
        let mut config = Config::default();
        config.retry_backoff = Duration::from_millis(1);
        let store = SessionStore::new(backend, &config);

        store
            .insert_participant(2025126666, "Ana", Role::Admin, DEFAULT_ICON)
            .await
            .unwrap();
        // Two transient failures, then success within the retry budget.
        assert!(store.code_exists(2025126666).await.unwrap());
    }

    #[tokio::test]
    async fn retry_gives_up_on_schema_errors() {
        struct Broken;

        #[async_trait]
        impl RowStore for Broken {
            async fn insert(&self, _row: NewRow) -> StoreResult<StoredRow> {
                Err(StoreError::Schema("missing column payload".into()))
            }
            async fn select(&self, _query: RowQuery) -> StoreResult<Vec<StoredRow>> {
                Err(StoreError::Schema("missing column payload".into()))
            }
            async fn update_payload(
                &self,
                _id: RowId,
                _payload: serde_json::Value,
            ) -> StoreResult<StoredRow> {
                Err(StoreError::Schema("missing column payload".into()))
            }
            async fn subscribe(&self, _code: SessionCode) -> StoreResult<RowFeed> {
                Err(StoreError::Unsupported)
            }
        }

        let store = SessionStore::new(Arc::new(Broken), &Config::default());
        let err = store.code_exists(2025127777).await.unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));
    }
}
