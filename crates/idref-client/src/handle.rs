//! Handle Service client.

use std::sync::Arc;

use idref_core::AuthToken;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::error::JsonRpcError;
use crate::jsonrpc::JsonRpcClient;

/// Display name used in dependency statuses.
pub const HANDLE_SERVICE_NAME: &str = "Handle service";

/// Operations the workspace needs from the Handle Service.
pub trait HandleService: Send + Sync {
    /// Whether every handle is readable by the client's user. The service
    /// answers for the whole batch, not per handle.
    fn are_readable(&self, handles: &[String]) -> Result<bool, JsonRpcError>;

    /// Make every handle publicly readable.
    fn set_public_read(&self, handles: &[String]) -> Result<(), JsonRpcError>;

    /// Grant `user` read access to every handle.
    fn add_read_acl(&self, handles: &[String], user: &str) -> Result<(), JsonRpcError>;

    /// The service version.
    fn version(&self) -> Result<String, JsonRpcError>;
}

/// Produces Handle Service clients bound to a caller's token.
pub trait HandleClientFactory: Send + Sync {
    fn for_token(&self, token: &AuthToken) -> Result<Arc<dyn HandleService>, JsonRpcError>;
}

/// Live Handle Service client.
#[derive(Debug, Clone)]
pub struct HttpHandleService {
    rpc: JsonRpcClient,
}

impl HttpHandleService {
    pub fn new(url: Url, token: Option<&str>, timeout_secs: u64) -> Result<Self, JsonRpcError> {
        Ok(Self {
            rpc: JsonRpcClient::new(url, token, timeout_secs)?,
        })
    }
}

impl HandleService for HttpHandleService {
    fn are_readable(&self, handles: &[String]) -> Result<bool, JsonRpcError> {
        debug!(handles = handles.len(), "checking handle readability");
        let readable: i64 = self.rpc.call_single("AbstractHandle.are_readable", json!([handles]))?;
        // 0 = false, anything else = true
        Ok(readable != 0)
    }

    fn set_public_read(&self, handles: &[String]) -> Result<(), JsonRpcError> {
        self.rpc.call("AbstractHandle.set_public_read", json!([handles]))?;
        Ok(())
    }

    fn add_read_acl(&self, handles: &[String], user: &str) -> Result<(), JsonRpcError> {
        self.rpc.call("AbstractHandle.add_read_acl", json!([handles, user]))?;
        Ok(())
    }

    fn version(&self) -> Result<String, JsonRpcError> {
        let status: Value = self.rpc.call_single("AbstractHandle.status", json!([]))?;
        Ok(status
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string())
    }
}

/// Builds [`HttpHandleService`] clients that share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpHandleClientFactory {
    base: HttpHandleService,
}

impl HttpHandleClientFactory {
    pub fn new(url: Url, timeout_secs: u64) -> Result<Self, JsonRpcError> {
        Ok(Self {
            base: HttpHandleService::new(url, None, timeout_secs)?,
        })
    }
}

impl HandleClientFactory for HttpHandleClientFactory {
    fn for_token(&self, token: &AuthToken) -> Result<Arc<dyn HandleService>, JsonRpcError> {
        Ok(Arc::new(HttpHandleService {
            rpc: self.base.rpc.with_token(token.token()),
        }))
    }
}
