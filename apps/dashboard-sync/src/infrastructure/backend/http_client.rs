//! HTTP adapter for the trading backend.

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::error::{BackendError, error_message};
use crate::application::ports::{Fetcher, RemoteActions};
use crate::domain::action::SchedulerAction;
use crate::domain::cache::{CacheKey, CacheValue, FetchError};
use crate::domain::dashboard::action_path;

/// Trading backend client.
///
/// Reads resources with `GET {base}{endpoint}?{params}` and performs
/// scheduler actions with `POST`. No request timeout is set; a hung request
/// keeps its key validating until it settles.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a client for the backend at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &Url) -> Result<Self, BackendError> {
        let client = Client::builder()
            .build()
            .map_err(|e| BackendError::Client(e.to_string()))?;
        Ok(Self::with_client(client, base_url.as_str()))
    }

    /// Create a backend around an existing client.
    #[must_use]
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Base URL without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch and decode the resource for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] if the request cannot be sent,
    /// [`FetchError::Protocol`] on a non-success status, or
    /// [`FetchError::Decode`] if the body does not decode into `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, key.endpoint());
        debug!(%url, params = key.params().len(), "GET");

        let response = self
            .client
            .get(&url)
            .query(key.params())
            .send()
            .await
            .map_err(transport)?;
        decode(&success_body(response).await?)
    }

    /// POST to `path` without a body and decode the response.
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    pub async fn post_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "POST");

        let response = self.client.post(&url).send().await.map_err(transport)?;
        decode(&success_body(response).await?)
    }
}

#[async_trait]
impl<V> Fetcher<V> for HttpBackend
where
    V: DeserializeOwned + CacheValue,
{
    async fn fetch(&self, key: &CacheKey) -> Result<V, FetchError> {
        self.get_json(key).await
    }
}

#[async_trait]
impl RemoteActions for HttpBackend {
    async fn perform(&self, action: SchedulerAction) -> Result<(), FetchError> {
        let _: Value = self.post_json(action_path(action)).await?;
        Ok(())
    }
}

fn transport(error: reqwest::Error) -> FetchError {
    FetchError::Transport(error.to_string())
}

async fn success_body(response: Response) -> Result<String, FetchError> {
    let status = response.status();
    let body = response.text().await.map_err(transport)?;
    if status.is_success() {
        return Ok(body);
    }
    Err(FetchError::Protocol {
        status: status.as_u16(),
        message: error_message(status, &body),
    })
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, FetchError> {
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slash() {
        let backend = HttpBackend::new(&Url::parse("http://localhost:8000/").unwrap()).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:8000");
    }

    #[test]
    fn empty_body_decodes_as_null() {
        let value: Value = decode("").unwrap();
        assert_eq!(value, Value::Null);
        let unit: Option<u32> = decode("  ").unwrap();
        assert_eq!(unit, None);
    }

    #[test]
    fn shape_mismatch_is_decode_error() {
        let err = decode::<Vec<u32>>(r#"{"not": "a list"}"#).unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }
}
