//! # Shock Client
//!
//! Shock stores immutable blobs as nodes addressed by UUID. Every node has an
//! ACL with a single owner plus read, write and delete lists, and a public
//! flag per permission.
//!
//! Endpoints used:
//! - `GET    /node/{id}/acl/?verbosity=full`
//! - `PUT    /node/{id}/acl/{owner|read|write|delete}?users=..&verbosity=full`
//! - `DELETE /node/{id}/acl/{owner|read|write|delete}?users=..&verbosity=full`
//! - `PUT    /node/{id}/acl/public_read?verbosity=full`
//! - `POST   /node` (multipart `copy_data`, `copy_attributes`)
//! - `GET    /` (server info, including the version)
//!
//! Responses are wrapped as `{"status": .., "data": .., "error": [..]}`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use idref_core::AuthToken;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::error::ShockError;
use crate::runtime;

// -- Value types ------------------------------------------------------------

/// A Shock node id: a canonical, lowercase, hyphenated UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShockNodeId(pub(crate) String);

impl ShockNodeId {
    pub fn new(id: &str) -> Result<Self, ShockError> {
        let parsed = uuid::Uuid::parse_str(id).map_err(|_| ShockError::InvalidNodeId(id.to_string()))?;
        let canonical = parsed.hyphenated().to_string();
        if canonical != id {
            return Err(ShockError::InvalidNodeId(id.to_string()));
        }
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShockNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which ACL list an edit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShockAclType {
    Owner,
    Read,
    Write,
    Delete,
}

impl ShockAclType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
        }
    }
}

/// A node's ACL, by user name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShockAcl {
    pub owner: String,
    pub read: Vec<String>,
    pub write: Vec<String>,
    pub delete: Vec<String>,
    pub public_read: bool,
}

#[derive(Deserialize)]
struct RawUser {
    username: String,
}

#[derive(Deserialize, Default)]
struct RawPublic {
    #[serde(default)]
    read: bool,
}

#[derive(Deserialize)]
struct RawAcl {
    owner: RawUser,
    #[serde(default)]
    read: Vec<RawUser>,
    #[serde(default)]
    write: Vec<RawUser>,
    #[serde(default)]
    delete: Vec<RawUser>,
    #[serde(default)]
    public: RawPublic,
}

impl From<RawAcl> for ShockAcl {
    fn from(raw: RawAcl) -> Self {
        let names = |v: Vec<RawUser>| -> Vec<String> { v.into_iter().map(|u| u.username).collect() };
        Self {
            owner: raw.owner.username,
            read: names(raw.read),
            write: names(raw.write),
            delete: names(raw.delete),
            public_read: raw.public.read,
        }
    }
}

#[derive(Deserialize)]
struct RawNode {
    id: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    error: Option<Vec<String>>,
}

// -- Traits -----------------------------------------------------------------

/// A Shock client bound to one user's token.
pub trait ShockClient: Send + Sync {
    /// The user the client's token belongs to.
    fn user(&self) -> &str;

    /// Fetch a node's ACL. Fails with [`ShockError::Authorization`] if the
    /// user cannot read the node.
    fn acl(&self, node: &ShockNodeId) -> Result<ShockAcl, ShockError>;

    /// Copy a node's data and attributes into a new node owned by the
    /// client's user.
    fn copy_node(&self, node: &ShockNodeId) -> Result<ShockNodeId, ShockError>;

    fn add_to_acl(&self, node: &ShockNodeId, users: &[String], acl: ShockAclType) -> Result<ShockAcl, ShockError>;

    fn remove_from_acl(
        &self,
        node: &ShockNodeId,
        users: &[String],
        acl: ShockAclType,
    ) -> Result<ShockAcl, ShockError>;

    fn set_publicly_readable(&self, node: &ShockNodeId) -> Result<ShockAcl, ShockError>;

    /// The Shock server version.
    fn remote_version(&self) -> Result<String, ShockError>;
}

/// Produces fresh clients bound to a caller's token.
pub trait ShockClientFactory: Send + Sync {
    fn with_token(&self, token: &AuthToken) -> Result<Arc<dyn ShockClient>, ShockError>;
}

// -- HTTP client ------------------------------------------------------------

/// Live Shock client.
#[derive(Clone)]
pub struct HttpShockClient {
    http: reqwest::Client,
    base_url: String,
    token: AuthToken,
}

impl fmt::Debug for HttpShockClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpShockClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token)
            .finish()
    }
}

impl HttpShockClient {
    pub fn new(url: &Url, token: AuthToken, timeout_secs: u64) -> Result<Self, ShockError> {
        Ok(Self {
            http: build_http(timeout_secs)?,
            base_url: url.as_str().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn node_url(&self, node: &ShockNodeId, suffix: &str) -> String {
        format!("{}/node/{}/{}", self.base_url, node, suffix)
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder, op: &str) -> Result<T, ShockError> {
        let resp = req
            .header(reqwest::header::AUTHORIZATION, format!("OAuth {}", self.token.token()))
            .send()
            .await
            .map_err(|source| ShockError::Transport { source })?;
        let status = resp.status();
        let text = resp.text().await.map_err(|source| ShockError::Transport { source })?;
        let envelope: Option<Envelope<serde_json::Value>> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let message = envelope
                .and_then(|e| e.error)
                .filter(|e| !e.is_empty())
                .map(|e| e.join(", "))
                .unwrap_or_else(|| format!("{op}: HTTP {}", status.as_u16()));
            return Err(match status.as_u16() {
                401 | 403 => ShockError::Authorization { message },
                404 => ShockError::NoNode { message },
                code => ShockError::Http { status: code, message },
            });
        }
        let data = envelope.and_then(|e| e.data).ok_or_else(|| ShockError::Deserialization {
            message: format!("{op}: Shock returned no data"),
        })?;
        serde_json::from_value(data).map_err(|e| ShockError::Deserialization {
            message: format!("{op}: unexpected response from Shock: {e}"),
        })
    }

    async fn edit_acl(
        &self,
        method: reqwest::Method,
        node: &ShockNodeId,
        users: &[String],
        acl: ShockAclType,
    ) -> Result<ShockAcl, ShockError> {
        let req = self
            .http
            .request(method, self.node_url(node, &format!("acl/{}", acl.as_str())))
            .query(&[("users", users.join(",").as_str()), ("verbosity", "full")]);
        let raw: RawAcl = self.send(req, "edit ACL").await?;
        Ok(raw.into())
    }
}

fn blocking<T>(fut: impl std::future::Future<Output = Result<T, ShockError>>) -> Result<T, ShockError> {
    runtime::block_on(fut).unwrap_or_else(|| {
        Err(ShockError::Client {
            message: runtime::NO_RUNTIME.to_string(),
        })
    })
}

impl ShockClient for HttpShockClient {
    fn user(&self) -> &str {
        self.token.user_name()
    }

    fn acl(&self, node: &ShockNodeId) -> Result<ShockAcl, ShockError> {
        blocking(async {
            let req = self
                .http
                .get(self.node_url(node, "acl/"))
                .query(&[("verbosity", "full")]);
            let raw: RawAcl = self.send(req, "get ACL").await?;
            Ok(raw.into())
        })
    }

    fn copy_node(&self, node: &ShockNodeId) -> Result<ShockNodeId, ShockError> {
        blocking(async {
            let form = reqwest::multipart::Form::new()
                .text("copy_data", node.to_string())
                .text("copy_attributes", "true");
            let req = self.http.post(format!("{}/node", self.base_url)).multipart(form);
            let raw: RawNode = self.send(req, "copy node").await?;
            let copy = ShockNodeId::new(&raw.id)?;
            info!(source = %node, copy = %copy, "copied shock node");
            Ok(copy)
        })
    }

    fn add_to_acl(&self, node: &ShockNodeId, users: &[String], acl: ShockAclType) -> Result<ShockAcl, ShockError> {
        blocking(self.edit_acl(reqwest::Method::PUT, node, users, acl))
    }

    fn remove_from_acl(
        &self,
        node: &ShockNodeId,
        users: &[String],
        acl: ShockAclType,
    ) -> Result<ShockAcl, ShockError> {
        blocking(self.edit_acl(reqwest::Method::DELETE, node, users, acl))
    }

    fn set_publicly_readable(&self, node: &ShockNodeId) -> Result<ShockAcl, ShockError> {
        blocking(async {
            let req = self
                .http
                .put(self.node_url(node, "acl/public_read"))
                .query(&[("verbosity", "full")]);
            let raw: RawAcl = self.send(req, "set public read").await?;
            Ok(raw.into())
        })
    }

    fn remote_version(&self) -> Result<String, ShockError> {
        #[derive(Deserialize)]
        struct ServerInfo {
            version: String,
        }

        blocking(async {
            let resp = self
                .http
                .get(format!("{}/", self.base_url))
                .send()
                .await
                .map_err(|source| ShockError::Transport { source })?;
            if !resp.status().is_success() {
                return Err(ShockError::Http {
                    status: resp.status().as_u16(),
                    message: "could not fetch Shock server info".to_string(),
                });
            }
            let info: ServerInfo = resp.json().await.map_err(|e| ShockError::Deserialization {
                message: format!("{} does not appear to be a Shock server: {e}", self.base_url),
            })?;
            debug!(version = %info.version, "shock server version");
            Ok(info.version)
        })
    }
}

/// Builds [`HttpShockClient`]s sharing one connection pool.
#[derive(Debug, Clone)]
pub struct HttpShockClientFactory {
    http: reqwest::Client,
    base_url: String,
}

impl HttpShockClientFactory {
    pub fn new(url: &Url, timeout_secs: u64) -> Result<Self, ShockError> {
        Ok(Self {
            http: build_http(timeout_secs)?,
            base_url: url.as_str().trim_end_matches('/').to_string(),
        })
    }
}

impl ShockClientFactory for HttpShockClientFactory {
    fn with_token(&self, token: &AuthToken) -> Result<Arc<dyn ShockClient>, ShockError> {
        Ok(Arc::new(HttpShockClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token: token.clone(),
        }))
    }
}

fn build_http(timeout_secs: u64) -> Result<reqwest::Client, ShockError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ShockError::Client {
            message: format!("failed to build HTTP client: {e}"),
        })
}
