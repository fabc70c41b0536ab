//! In-memory backend: backs the tests and the local-only degraded mode.
//!
//! Change notifications are fanned out over a broadcast channel, which also
//! makes this the only backend with a working push feed; the REST backend
//! relies on the polling fallback.

use super::{Order, RowFeed, RowQuery, RowStore};
use crate::error::{StoreError, StoreResult};
use crate::types::{ChangeEvent, NewRow, RowId, SessionCode, StoredRow};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};

pub struct MemoryStore {
    inner: Mutex<Inner>,
    changes: broadcast::Sender<ChangeEvent>,
    realtime: bool,
}

struct Inner {
    rows: Vec<StoredRow>,
    next_id: RowId,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        let (changes, _) = broadcast::channel(256);
        MemoryStore {
            inner: Mutex::new(Inner {
                rows: Vec::new(),
                next_id: 1,
            }),
            changes,
            realtime: true,
        }
    }

    /// A store whose `subscribe` always fails, forcing clients onto the
    /// polling fallback. Used to exercise the degraded path.
    pub fn without_realtime() -> MemoryStore {
        MemoryStore {
            realtime: false,
            ..MemoryStore::new()
        }
    }

    fn publish(&self, event: ChangeEvent) {
        // No subscribers is fine.
        let _ = self.changes.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn insert(&self, row: NewRow) -> StoreResult<StoredRow> {
        let stored = {
            let mut inner = self.inner.lock().expect("memory store poisoned");
            let stored = StoredRow {
                id: inner.next_id,
                code: row.code,
                display_name: row.display_name,
                role: row.role,
                game_version: row.game_version,
                icon: row.icon,
                payload: row.payload,
                app: row.app,
                created_at: Utc::now(),
            };
            inner.next_id += 1;
            inner.rows.push(stored.clone());
            stored
        };
        self.publish(ChangeEvent::Insert {
            new: stored.clone(),
        });
        Ok(stored)
    }

    async fn select(&self, query: RowQuery) -> StoreResult<Vec<StoredRow>> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut rows: Vec<StoredRow> = inner
            .rows
            .iter()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        drop(inner);

        match query.order {
            // Insertion order doubles as creation order; ids break timestamp
            // ties from rapid inserts.
            Some(Order::CreatedAsc) => rows.sort_by_key(|r| (r.created_at, r.id)),
            Some(Order::CreatedDesc) => {
                rows.sort_by_key(|r| (r.created_at, r.id));
                rows.reverse();
            }
            None => {}
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn update_payload(
        &self,
        id: RowId,
        payload: serde_json::Value,
    ) -> StoreResult<StoredRow> {
        let (old, new) = {
            let mut inner = self.inner.lock().expect("memory store poisoned");
            let row = inner
                .rows
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| StoreError::Schema(format!("no row with id {id}")))?;
            let old = row.clone();
            row.payload = Some(payload);
            (old, row.clone())
        };
        self.publish(ChangeEvent::Update {
            old: Some(old),
            new: new.clone(),
        });
        Ok(new)
    }

    async fn subscribe(&self, code: SessionCode) -> StoreResult<RowFeed> {
        if !self.realtime {
            return Err(StoreError::Unsupported);
        }
        let mut source = self.changes.subscribe();
        let (tx, rx) = mpsc::channel(64);
        let code = code.to_string();
        let guard = tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(event) => {
                        if event.row().code != code {
                            continue;
                        }
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    // Dropped notifications are tolerated: the consumer
                    // re-fetches on every event anyway.
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "change feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(RowFeed::new(rx, Some(guard)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[tokio::test]
    async fn subscribe_filters_by_session_code() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe(2025121234).await.unwrap();

        store
            .insert(NewRow::participant(2025129999, "Otro", Role::Guest, "👤"))
            .await
            .unwrap();
        store
            .insert(NewRow::participant(2025121234, "Ana", Role::Admin, "👤"))
            .await
            .unwrap();

        let event = feed.next().await.unwrap();
        assert_eq!(event.row().code, "2025121234");
        assert_eq!(event.row().display_name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn update_emits_old_and_new() {
        let store = MemoryStore::new();
        let row = store
            .insert(NewRow::round(2025121234, serde_json::json!({"v": 1})))
            .await
            .unwrap();
        let mut feed = store.subscribe(2025121234).await.unwrap();

        store
            .update_payload(row.id, serde_json::json!({"v": 2}))
            .await
            .unwrap();

        match feed.next().await.unwrap() {
            ChangeEvent::Update { old, new } => {
                assert_eq!(old.unwrap().payload, Some(serde_json::json!({"v": 1})));
                assert_eq!(new.payload, Some(serde_json::json!({"v": 2})));
            }
            other => panic!("expected update event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn without_realtime_reports_unsupported() {
        let store = MemoryStore::without_realtime();
        assert!(matches!(
            store.subscribe(2025121234).await,
            Err(StoreError::Unsupported)
        ));
    }
}
