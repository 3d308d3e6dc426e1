//! HTTP client for the auth gateway.
//!
//! Every call resolves to an [`ApiResponse`] envelope (HTTP errors,
//! transport failures and undecodable bodies included), so callers branch on
//! `success` instead of handling `Result`s. Successful login/registration
//! persist the returned token and user as a side effect.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::cache::ResponseCache;
use super::storage::{AuthSnapshot, SnapshotStorage};
use crate::auth::{LoginRequest, PublicUser, RegisterRequest, UpdateProfileRequest};
use crate::config::ClientConfig;

/// Uniform result of every API call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    /// HTTP status, `None` when the request never got a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<PublicUser>,
}

impl ApiResponse {
    /// Envelope for a request that produced no HTTP response.
    pub fn network_error(err: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            message: format!("Network error: {err}"),
            ..Self::default()
        }
    }

    /// Normalise a status + raw body into the envelope.
    pub fn from_parts(status: u16, body: &[u8]) -> Self {
        let success = (200..300).contains(&status);
        let json: Option<serde_json::Value> = if body.is_empty() {
            None
        } else {
            serde_json::from_slice(body).ok()
        };

        let Some(json) = json else {
            let message = if body.is_empty() {
                default_message(success, status)
            } else if success {
                "Unexpected response from server".to_string()
            } else {
                String::from_utf8_lossy(body).trim().to_string()
            };
            return Self {
                // A 2xx with a body we cannot read is not a usable success.
                success: success && body.is_empty(),
                message,
                status: Some(status),
                ..Self::default()
            };
        };

        let message = json
            .get("message")
            .or_else(|| json.get("error"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| default_message(success, status));
        let token = json
            .get("token")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let user = json
            .get("user")
            .and_then(|v| serde_json::from_value::<PublicUser>(v.clone()).ok());

        Self {
            success,
            message,
            status: Some(status),
            data: Some(json),
            token,
            user,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }
}

fn default_message(success: bool, status: u16) -> String {
    if success {
        "OK".to_string()
    } else {
        format!("Request failed with status {status}")
    }
}

/// Client for the gateway endpoints.
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    storage: Arc<dyn SnapshotStorage>,
    cache: Option<ResponseCache<ApiResponse>>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, storage: Arc<dyn SnapshotStorage>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        let cache = (config.cache_ttl_secs > 0)
            .then(|| ResponseCache::new(Duration::from_secs(config.cache_ttl_secs)));

        Ok(Self {
            http,
            config,
            storage,
            cache,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn snapshot(&self) -> AuthSnapshot<'_> {
        AuthSnapshot::new(&*self.storage)
    }

    /// Issue a request against `endpoint` (absolute URL or path under
    /// `api_url`), attaching the stored bearer token when present.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> ApiResponse {
        let url = self.config.resolve(endpoint);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(token) = self.snapshot().token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(%method, url = %url, "API request failed: {e}");
                return ApiResponse::network_error(e);
            }
        };

        let status = response.status().as_u16();
        match response.bytes().await {
            Ok(bytes) => {
                let envelope = ApiResponse::from_parts(status, &bytes);
                tracing::debug!(%method, url = %url, status, success = envelope.success, "API response");
                envelope
            }
            Err(e) => {
                tracing::warn!(%method, url = %url, status, "Failed to read API response: {e}");
                ApiResponse {
                    status: Some(status),
                    ..ApiResponse::network_error(e)
                }
            }
        }
    }

    /// GET through the TTL cache. Only successful responses are cached.
    pub async fn get_cached(&self, endpoint: &str) -> ApiResponse {
        let key = self.config.resolve(endpoint);
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            return hit;
        }
        let response = self.request(Method::GET, endpoint, None).await;
        if response.success {
            if let Some(cache) = &self.cache {
                cache.insert(&key, response.clone());
            }
        }
        response
    }

    /// Drop cached responses (after auth changes).
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> ApiResponse {
        let body = to_json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        });
        let endpoint = self.config.login_endpoint.clone();
        let response = self.request(Method::POST, &endpoint, Some(&body)).await;
        self.persist_auth(response)
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> ApiResponse {
        let body = to_json(&RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        });
        let endpoint = self.config.register_endpoint.clone();
        let response = self.request(Method::POST, &endpoint, Some(&body)).await;
        self.persist_auth(response)
    }

    /// Re-validate the stored token against the user endpoint.
    pub async fn current_user(&self) -> ApiResponse {
        let endpoint = self.config.user_endpoint.clone();
        self.request(Method::GET, &endpoint, None).await
    }

    pub async fn update_profile(&self, name: &str) -> ApiResponse {
        let body = to_json(&UpdateProfileRequest {
            name: name.to_string(),
        });
        let endpoint = self.config.user_endpoint.clone();
        let response = self.request(Method::PUT, &endpoint, Some(&body)).await;
        if response.success {
            if let Some(user) = &response.user {
                if let Err(e) = self.snapshot().save_user(user) {
                    tracing::warn!("Failed to persist updated user: {e:#}");
                }
            }
            self.clear_cache();
        }
        response
    }

    /// Store token + user from a successful auth response.
    fn persist_auth(&self, response: ApiResponse) -> ApiResponse {
        if !response.success {
            return response;
        }
        let (Some(token), Some(user)) = (&response.token, &response.user) else {
            return ApiResponse {
                success: false,
                message: "Server response did not include a token".into(),
                ..response
            };
        };

        if let Err(e) = self.snapshot().save(token, user) {
            tracing::warn!("Failed to persist auth snapshot: {e:#}");
            return ApiResponse {
                success: false,
                message: format!("Could not save session: {e}"),
                ..response
            };
        }
        self.clear_cache();
        response
    }
}

fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
