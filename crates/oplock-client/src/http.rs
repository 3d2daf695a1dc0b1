//! [`LockSource`] over the lock service's `GET /locks/check` endpoint.

use async_trait::async_trait;

use crate::error::ClientError;
use crate::lock_watch::{LockQuery, LockSource, RemoteLockStatus};

/// Reads lock status from an oplock server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpLockSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLockSource {
    /// `base_url` is the server root, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Uses a preconfigured client (timeouts, proxies, default headers).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        HttpLockSource { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl LockSource for HttpLockSource {
    async fn check(&self, query: &LockQuery) -> Result<RemoteLockStatus, ClientError> {
        let response = self
            .client
            .get(format!("{}/locks/check", self.base_url))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<RemoteLockStatus>().await?)
    }
}
