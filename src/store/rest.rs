//! REST backend for a PostgREST-style row store (filtered selects, inserts
//! with representation, update-by-id).
//!
//! This backend has no push feed; `subscribe` reports
//! [`StoreError::Unsupported`] and the dual-channel controller activates
//! its polling fallback immediately.

use super::{Order, RowFeed, RowQuery, RowStore};
use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::types::{NewRow, RowId, SessionCode, StoredRow};
use async_trait::async_trait;
use reqwest::StatusCode;

pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    access_key: String,
    table: String,
}

impl RestStore {
    /// Build a REST backend from a fully remote-configured [`Config`].
    pub fn new(config: &Config) -> StoreResult<RestStore> {
        let (Some(url), Some(key)) = (&config.store_url, &config.store_key) else {
            return Err(StoreError::Permission(
                "remote store endpoint or access key not configured".to_string(),
            ));
        };
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| StoreError::Transport(format!("http client: {e}")))?;
        Ok(RestStore {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            access_key: key.clone(),
            table: config.store_table.clone(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn query_params(query: &RowQuery) -> Vec<(String, String)> {
        let mut params = vec![("app".to_string(), format!("eq.{}", query.app))];
        if let Some(code) = &query.code {
            params.push(("code".to_string(), format!("eq.{code}")));
        }
        if let Some(name) = &query.display_name {
            params.push(("display_name".to_string(), format!("eq.{name}")));
        }
        if let Some(role) = &query.role {
            params.push(("role".to_string(), format!("eq.{role}")));
        }
        if let Some(version) = &query.game_version {
            params.push(("game_version".to_string(), format!("eq.{version}")));
        }
        if query.require_payload {
            params.push(("payload".to_string(), "not.is.null".to_string()));
        }
        if query.require_display_name {
            params.push(("display_name".to_string(), "not.is.null".to_string()));
        }
        match query.order {
            Some(Order::CreatedAsc) => {
                params.push(("order".to_string(), "created_at.asc,id.asc".to_string()));
            }
            Some(Order::CreatedDesc) => {
                params.push(("order".to_string(), "created_at.desc,id.desc".to_string()));
            }
            None => {}
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.access_key)
            .bearer_auth(&self.access_key)
    }

    /// Map an HTTP-level failure to the error taxonomy: auth problems are
    /// permission errors, client errors are schema/misconfiguration, the
    /// rest is transient transport trouble.
    async fn check(response: reqwest::Response) -> StoreResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StoreError::Permission(
                format!("{status}: {detail}"),
            )),
            s if s.is_client_error() => Err(StoreError::Schema(format!("{status}: {detail}"))),
            s => Err(StoreError::Transport(format!("{s}: {detail}"))),
        }
    }

    async fn read_rows(response: reqwest::Response) -> StoreResult<Vec<StoredRow>> {
        response
            .json::<Vec<StoredRow>>()
            .await
            .map_err(|e| StoreError::Schema(format!("unexpected row shape: {e}")))
    }

    fn transport(e: reqwest::Error) -> StoreError {
        StoreError::Transport(e.to_string())
    }
}

#[async_trait]
impl RowStore for RestStore {
    async fn insert(&self, row: NewRow) -> StoreResult<StoredRow> {
        let response = self
            .authorized(self.client.post(self.table_url()))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .map_err(Self::transport)?;
        let rows = Self::read_rows(Self::check(response).await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Schema("insert returned no representation".to_string()))
    }

    async fn select(&self, query: RowQuery) -> StoreResult<Vec<StoredRow>> {
        let response = self
            .authorized(self.client.get(self.table_url()))
            .query(&Self::query_params(&query))
            .send()
            .await
            .map_err(Self::transport)?;
        Self::read_rows(Self::check(response).await?).await
    }

    async fn update_payload(
        &self,
        id: RowId,
        payload: serde_json::Value,
    ) -> StoreResult<StoredRow> {
        let response = self
            .authorized(self.client.patch(self.table_url()))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&serde_json::json!({ "payload": payload }))
            .send()
            .await
            .map_err(Self::transport)?;
        let rows = Self::read_rows(Self::check(response).await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Schema(format!("no row with id {id}")))
    }

    async fn subscribe(&self, _code: SessionCode) -> StoreResult<RowFeed> {
        Err(StoreError::Unsupported)
    }
}
