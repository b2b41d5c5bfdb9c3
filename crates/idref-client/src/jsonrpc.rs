//! Minimal JSON-RPC 1.1 caller for KBase-style services.
//!
//! Request: `{"version": "1.1", "method": "Module.func", "params": [...], "id": "..."}`
//! with the raw token in the `Authorization` header. Results arrive as a
//! list, one element per declared return value.
//!
//! A client is either *direct* (the URL is the service) or *dynamic* (the
//! URL is a service wizard that is asked, once, where the requested version
//! of the module is running).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;
use zeroize::Zeroizing;

use crate::error::JsonRpcError;
use crate::runtime;

#[derive(Clone)]
enum Endpoint {
    Direct(Url),
    Dynamic {
        wizard: Url,
        module: String,
        version: String,
        resolved: Arc<Mutex<Option<Url>>>,
    },
}

/// A JSON-RPC 1.1 client bound to at most one token.
#[derive(Clone)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    endpoint: Endpoint,
    token: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for JsonRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let endpoint = match &self.endpoint {
            Endpoint::Direct(u) => u.to_string(),
            Endpoint::Dynamic { wizard, module, version, .. } => {
                format!("{module}:{version} via {wizard}")
            }
        };
        f.debug_struct("JsonRpcClient")
            .field("endpoint", &endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    name: String,
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

impl JsonRpcClient {
    /// A client that calls `url` directly.
    pub fn new(url: Url, token: Option<&str>, timeout_secs: u64) -> Result<Self, JsonRpcError> {
        Ok(Self {
            http: build_http(timeout_secs)?,
            endpoint: Endpoint::Direct(url),
            token: token.map(|t| Zeroizing::new(t.to_string())),
        })
    }

    /// A client that asks the service wizard at `wizard_url` where
    /// `module` at `version` is running.
    pub fn dynamic(
        wizard_url: Url,
        module: impl Into<String>,
        version: impl Into<String>,
        token: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, JsonRpcError> {
        Ok(Self {
            http: build_http(timeout_secs)?,
            endpoint: Endpoint::Dynamic {
                wizard: wizard_url,
                module: module.into(),
                version: version.into(),
                resolved: Arc::new(Mutex::new(None)),
            },
            token: token.map(|t| Zeroizing::new(t.to_string())),
        })
    }

    /// A copy of this client bound to a different token. The connection
    /// pool is shared; this client is unchanged.
    pub fn with_token(&self, token: &str) -> Self {
        Self {
            http: self.http.clone(),
            endpoint: self.endpoint.clone(),
            token: Some(Zeroizing::new(token.to_string())),
        }
    }

    /// Call `method` and return the raw `result` list.
    pub async fn call_async(&self, method: &str, params: Value) -> Result<Vec<Value>, JsonRpcError> {
        let url = self.service_url().await?;
        self.post(&url, method, params).await
    }

    /// Synchronous [`call_async`](Self::call_async) on the ambient runtime.
    pub fn call(&self, method: &str, params: Value) -> Result<Vec<Value>, JsonRpcError> {
        runtime::block_on(self.call_async(method, params))
            .unwrap_or_else(|| Err(JsonRpcError::unexpected(runtime::NO_RUNTIME)))
    }

    /// Call `method` and deserialize the first result element.
    pub fn call_single<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, JsonRpcError> {
        let first = self
            .call(method, params)?
            .into_iter()
            .next()
            .ok_or_else(|| JsonRpcError::unexpected(format!("{method} returned no result")))?;
        serde_json::from_value(first).map_err(|source| JsonRpcError::Deserialization {
            method: method.to_string(),
            source,
        })
    }

    async fn service_url(&self) -> Result<Url, JsonRpcError> {
        match &self.endpoint {
            Endpoint::Direct(u) => Ok(u.clone()),
            Endpoint::Dynamic {
                wizard,
                module,
                version,
                resolved,
            } => {
                if let Some(u) = resolved.lock().clone() {
                    return Ok(u);
                }
                let status = self
                    .post(
                        wizard,
                        "ServiceWizard.get_service_status",
                        json!([{ "module_name": module, "version": version }]),
                    )
                    .await?;
                let raw = status
                    .first()
                    .and_then(|s| s.get("url"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        JsonRpcError::unexpected(format!(
                            "The service wizard returned no URL for {module} version {version}"
                        ))
                    })?;
                let url = Url::parse(raw).map_err(|e| {
                    JsonRpcError::unexpected(format!("The service wizard returned an invalid URL {raw}: {e}"))
                })?;
                debug!(module = %module, version = %version, url = %url, "resolved dynamic service");
                *resolved.lock() = Some(url.clone());
                Ok(url)
            }
        }
    }

    async fn post(&self, url: &Url, method: &str, params: Value) -> Result<Vec<Value>, JsonRpcError> {
        let body = json!({
            "version": "1.1",
            "method": method,
            "params": params,
            "id": uuid::Uuid::new_v4().to_string(),
        });
        let mut req = self.http.post(url.clone()).json(&body);
        if let Some(t) = &self.token {
            req = req.header(reqwest::header::AUTHORIZATION, t.as_str());
        }
        let resp = req.send().await.map_err(|source| JsonRpcError::Transport {
            method: method.to_string(),
            source,
        })?;
        let status = resp.status();
        let text = resp.text().await.map_err(|source| JsonRpcError::Transport {
            method: method.to_string(),
            source,
        })?;

        let parsed: Option<RpcResponse> = serde_json::from_str(&text).ok();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            let message = parsed
                .and_then(|p| p.error)
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("{method}: HTTP 401"));
            return Err(JsonRpcError::Unauthorized { message });
        }
        let parsed = parsed.ok_or_else(|| {
            JsonRpcError::unexpected(format!(
                "{method}: server returned HTTP {} with a non-JSON-RPC body: {}",
                status.as_u16(),
                excerpt(&text)
            ))
        })?;
        if let Some(err) = parsed.error {
            return Err(JsonRpcError::Server {
                name: err.name,
                code: err.code,
                message: err.message,
                data: err.error,
            });
        }
        if !status.is_success() {
            return Err(JsonRpcError::unexpected(format!(
                "{method}: server returned HTTP {}",
                status.as_u16()
            )));
        }
        match parsed.result {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(values)) => Ok(values),
            Some(other) => Err(JsonRpcError::unexpected(format!(
                "{method}: expected a result list, got {other}"
            ))),
        }
    }
}

fn build_http(timeout_secs: u64) -> Result<reqwest::Client, JsonRpcError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| JsonRpcError::unexpected(format!("failed to build HTTP client: {e}")))
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}
