//! Authenticated HTTP client for the document-intelligence service.
//!
//! Credentials are resolved once at process start into an [`ApiProfile`]
//! and held by the client for its lifetime; no call path re-reads the
//! environment.

use std::time::Duration;

use serde_json::Value;

use crate::DocIntError;

/// Resolved service credentials.
#[derive(Clone)]
pub struct ApiProfile {
    pub base_url: String,
    pub username: String,
    pub api_key: String,
}

impl ApiProfile {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            username: username.into(),
            api_key: api_key.into(),
        }
    }

    /// Resolve a profile from `DOCINT_HOST`, `DOCINT_USERNAME`, and
    /// `DOCINT_API_KEY`.
    pub fn from_env() -> Result<Self, DocIntError> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| DocIntError::Credentials(format!("{name} is not set")))
        };
        Ok(Self::new(
            var("DOCINT_HOST")?,
            var("DOCINT_USERNAME")?,
            var("DOCINT_API_KEY")?,
        ))
    }
}

impl std::fmt::Debug for ApiProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiProfile")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("api_key", &"***")
            .finish()
    }
}

/// Shared HTTP client for all service endpoints.
#[derive(Debug, Clone)]
pub struct DocIntClient {
    profile: ApiProfile,
    http: reqwest::Client,
}

impl DocIntClient {
    pub fn new(profile: ApiProfile) -> Self {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { profile, http }
    }

    pub fn profile(&self) -> &ApiProfile {
        &self.profile
    }

    /// Absolute URL for a service path.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.profile.base_url, path)
    }

    pub(crate) async fn get_json(&self, path: &str) -> Result<Value, DocIntError> {
        let response = self
            .http
            .get(self.endpoint(path))
            .basic_auth(&self.profile.username, Some(&self.profile.api_key))
            .send()
            .await?;
        Self::json_body(response).await
    }

    pub(crate) async fn post_json(&self, path: &str, body: &Value) -> Result<Value, DocIntError> {
        let response = self
            .http
            .post(self.endpoint(path))
            .basic_auth(&self.profile.username, Some(&self.profile.api_key))
            .json(body)
            .send()
            .await?;
        Self::json_body(response).await
    }

    /// Upload raw bytes to a service path, with optional query parameters.
    pub(crate) async fn post_bytes(
        &self,
        path: &str,
        query: &[(&str, String)],
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Value, DocIntError> {
        let response = self
            .http
            .post(self.endpoint(path))
            .basic_auth(&self.profile.username, Some(&self.profile.api_key))
            .query(query)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        Self::json_body(response).await
    }

    /// Fetch an absolute (typically pre-signed) URL without credentials.
    pub(crate) async fn get_url_json(&self, url: &str) -> Result<Value, DocIntError> {
        let response = self.http.get(url).send().await?;
        Self::json_body(response).await
    }

    /// Fetch an absolute URL as raw bytes without credentials.
    pub(crate) async fn get_url_bytes(&self, url: &str) -> Result<Vec<u8>, DocIntError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DocIntError::Api {
                status: status.as_u16(),
                message: truncate(&response.text().await.unwrap_or_default()),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn json_body(response: reqwest::Response) -> Result<Value, DocIntError> {
        let status = response.status();
        if !status.is_success() {
            return Err(DocIntError::Api {
                status: status.as_u16(),
                message: truncate(&response.text().await.unwrap_or_default()),
            });
        }
        Ok(response.json().await?)
    }
}

fn truncate(message: &str) -> String {
    const LIMIT: usize = 200;
    if message.len() > LIMIT {
        let mut end = LIMIT;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &message[..end])
    } else {
        message.to_string()
    }
}
