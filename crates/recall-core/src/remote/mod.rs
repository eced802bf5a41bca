//! Remote API client.
//!
//! Thin network wrapper around the five entity families: create, update,
//! delete, get, and cursor-paginated list per family, plus the dedicated
//! review RPC. Every call can fail due to connectivity loss or a
//! version/state conflict; callers branch on [`RemoteError`] to decide
//! retry vs. conflict handling.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::EntityKind;
use crate::util::{is_http_url, normalize_text_option};

const HTTP_TIMEOUT_SECS: u64 = 30;

/// Errors surfaced by remote calls, classified for the sync engine.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Server signalled a version/state mismatch
    #[error("Remote conflict: {0}")]
    Conflict(String),

    /// Record does not exist remotely
    #[error("Remote record not found: {0}")]
    NotFound(String),

    /// Connectivity-level failure; retry on a later sync pass
    #[error("Network error: {0}")]
    Transient(String),

    /// Any other API failure
    #[error("Remote API error: {0}")]
    Api(String),
}

impl RemoteError {
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() {
            Self::Transient(error.to_string())
        } else {
            Self::Api(error.to_string())
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// A record as the server returns it: identity and freshness split out,
/// the full body kept opaque for per-family decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    pub id: String,
    pub updated_at: i64,
    pub payload: Value,
}

impl RemoteRecord {
    /// Build a record from a server response body.
    pub fn from_payload(payload: Value) -> RemoteResult<Self> {
        let id = payload
            .get("id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| RemoteError::Api("response record missing 'id'".to_string()))?;
        let updated_at = payload
            .get("updated_at")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        Ok(Self {
            id,
            updated_at,
            payload,
        })
    }
}

/// Consumed remote capability, one implementation per transport.
///
/// The trait is the seam the sync engine is tested through.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn create(&self, entity: EntityKind, payload: &Value) -> RemoteResult<RemoteRecord>;

    async fn update(
        &self,
        entity: EntityKind,
        id: &str,
        payload: &Value,
        expected_version: Option<i64>,
    ) -> RemoteResult<RemoteRecord>;

    async fn delete(&self, entity: EntityKind, id: &str) -> RemoteResult<()>;

    async fn get(&self, entity: EntityKind, id: &str) -> RemoteResult<Option<RemoteRecord>>;

    /// Fetch all records for a user, walking server cursors to the end.
    async fn list(
        &self,
        entity: EntityKind,
        user_id: &str,
        updated_since: Option<i64>,
    ) -> RemoteResult<Vec<RemoteRecord>>;

    /// Dedicated RPC for review events; review-state changes travel as
    /// plain record syncs.
    async fn mark_reviewed(&self, payload: &Value) -> RemoteResult<RemoteRecord>;
}

/// Remote endpoint configuration.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub auth_token: String,
}

impl RemoteConfig {
    /// Validate and normalize the endpoint configuration.
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> crate::Result<Self> {
        let base_url = normalize_text_option(Some(base_url.into())).ok_or_else(|| {
            crate::Error::InvalidInput("remote base URL must not be empty".to_string())
        })?;
        if !is_http_url(&base_url) {
            return Err(crate::Error::InvalidInput(
                "remote base URL must include http:// or https://".to_string(),
            ));
        }
        let auth_token = normalize_text_option(Some(auth_token.into())).ok_or_else(|| {
            crate::Error::InvalidInput("remote auth token must not be empty".to_string())
        })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        })
    }
}

/// HTTP implementation of [`RemoteApi`].
#[derive(Clone)]
pub struct HttpRemoteApi {
    config: RemoteConfig,
    client: reqwest::Client,
}

impl HttpRemoteApi {
    pub fn new(config: RemoteConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|error| crate::Error::Remote(RemoteError::Api(error.to_string())))?;
        Ok(Self { config, client })
    }

    const fn entity_path(entity: EntityKind) -> &'static str {
        match entity {
            EntityKind::Entry => "entries",
            EntityKind::Tag => "tags",
            EntityKind::Source => "sources",
            EntityKind::EntryTag => "entry-tags",
            EntityKind::EntrySource => "entry-sources",
            EntityKind::ReviewState => "review-states",
            EntityKind::ReviewEvent => "review-events",
        }
    }

    fn url(&self, entity: EntityKind) -> String {
        format!("{}/v1/{}", self.config.base_url, Self::entity_path(entity))
    }

    async fn record_from_response(response: reqwest::Response) -> RemoteResult<RemoteRecord> {
        let response = Self::check_status(response).await?;
        let payload = response.json::<Value>().await?;
        RemoteRecord::from_payload(payload)
    }

    async fn check_status(response: reqwest::Response) -> RemoteResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = parse_api_error(status, &body);
        Err(match status {
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
                RemoteError::Conflict(message)
            }
            StatusCode::NOT_FOUND => RemoteError::NotFound(message),
            _ => RemoteError::Api(message),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    records: Vec<Value>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn create(&self, entity: EntityKind, payload: &Value) -> RemoteResult<RemoteRecord> {
        let response = self
            .client
            .post(self.url(entity))
            .bearer_auth(&self.config.auth_token)
            .json(payload)
            .send()
            .await?;
        Self::record_from_response(response).await
    }

    async fn update(
        &self,
        entity: EntityKind,
        id: &str,
        payload: &Value,
        expected_version: Option<i64>,
    ) -> RemoteResult<RemoteRecord> {
        let mut request = self
            .client
            .put(format!("{}/{id}", self.url(entity)))
            .bearer_auth(&self.config.auth_token)
            .json(payload);
        if let Some(version) = expected_version {
            request = request.query(&[("expected_version", version.to_string())]);
        }

        let response = request.send().await?;
        Self::record_from_response(response).await
    }

    async fn delete(&self, entity: EntityKind, id: &str) -> RemoteResult<()> {
        let response = self
            .client
            .delete(format!("{}/{id}", self.url(entity)))
            .bearer_auth(&self.config.auth_token)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn get(&self, entity: EntityKind, id: &str) -> RemoteResult<Option<RemoteRecord>> {
        let response = self
            .client
            .get(format!("{}/{id}", self.url(entity)))
            .bearer_auth(&self.config.auth_token)
            .send()
            .await?;

        match Self::record_from_response(response).await {
            Ok(record) => Ok(Some(record)),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn list(
        &self,
        entity: EntityKind,
        user_id: &str,
        updated_since: Option<i64>,
    ) -> RemoteResult<Vec<RemoteRecord>> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(self.url(entity))
                .bearer_auth(&self.config.auth_token)
                .query(&[("user_id", user_id)]);
            if let Some(since) = updated_since {
                request = request.query(&[("updated_since", since.to_string())]);
            }
            if let Some(cursor) = &cursor {
                request = request.query(&[("cursor", cursor.as_str())]);
            }

            let response = Self::check_status(request.send().await?).await?;
            let page = response.json::<ListResponse>().await?;
            for item in page.records {
                records.push(RemoteRecord::from_payload(item)?);
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(records)
    }

    async fn mark_reviewed(&self, payload: &Value) -> RemoteResult<RemoteRecord> {
        let response = self
            .client
            .post(format!("{}/v1/review/events", self.config.base_url))
            .bearer_auth(&self.config.auth_token)
            .json(payload)
            .send()
            .await?;
        Self::record_from_response(response).await
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = crate::util::compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
