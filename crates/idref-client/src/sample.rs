//! Sample Service client.
//!
//! Only the calls the workspace needs: ACL lookup and update (both always
//! issued with `as_admin = 1` under the workspace's admin token) and status.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::error::JsonRpcError;
use crate::jsonrpc::JsonRpcClient;

pub const SAMPLE_SERVICE_NAME: &str = "Sample service";
const MODULE: &str = "SampleService";

/// Parameters of `SampleService.get_sample_acls`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetSampleAclsParams {
    pub id: String,
    pub as_admin: u8,
}

/// A sample's ACLs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct SampleAcls {
    pub owner: String,
    #[serde(default)]
    pub admin: Vec<String>,
    #[serde(default)]
    pub write: Vec<String>,
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub public_read: u8,
}

/// Parameters of `SampleService.update_sample_acls`. Unset lists are left
/// out of the request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UpdateSampleAclsParams {
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub admin: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub write: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub read: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_read: Option<i8>,
    /// Only ever raise a user's permission level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_least: Option<u8>,
    pub as_admin: u8,
}

impl UpdateSampleAclsParams {
    /// Grant `user` at least read access, as an admin.
    pub fn grant_read(id: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            read: vec![user.into()],
            at_least: Some(1),
            as_admin: 1,
            ..Self::default()
        }
    }

    /// Make the sample publicly readable, as an admin.
    pub fn public_read(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            public_read: Some(1),
            as_admin: 1,
            ..Self::default()
        }
    }
}

/// Operations the workspace needs from the Sample Service.
pub trait SampleService: Send + Sync {
    fn get_sample_acls(&self, params: &GetSampleAclsParams) -> Result<SampleAcls, JsonRpcError>;

    fn update_sample_acls(&self, params: &UpdateSampleAclsParams) -> Result<(), JsonRpcError>;

    /// The service version from `SampleService.status`.
    fn version(&self) -> Result<String, JsonRpcError>;
}

/// Live Sample Service client.
#[derive(Debug, Clone)]
pub struct HttpSampleService {
    rpc: JsonRpcClient,
}

impl HttpSampleService {
    /// With `service_version`, `url` is a service wizard and the Sample
    /// Service location is looked up on first use.
    pub fn new(
        url: Url,
        token: &str,
        service_version: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, JsonRpcError> {
        let rpc = match service_version.filter(|v| !v.trim().is_empty()) {
            Some(v) => JsonRpcClient::dynamic(url, MODULE, v, Some(token), timeout_secs)?,
            None => JsonRpcClient::new(url, Some(token), timeout_secs)?,
        };
        Ok(Self { rpc })
    }
}

impl SampleService for HttpSampleService {
    fn get_sample_acls(&self, params: &GetSampleAclsParams) -> Result<SampleAcls, JsonRpcError> {
        self.rpc.call_single("SampleService.get_sample_acls", json!([params]))
    }

    fn update_sample_acls(&self, params: &UpdateSampleAclsParams) -> Result<(), JsonRpcError> {
        self.rpc.call("SampleService.update_sample_acls", json!([params]))?;
        Ok(())
    }

    fn version(&self) -> Result<String, JsonRpcError> {
        let status: Value = self.rpc.call_single("SampleService.status", json!([]))?;
        Ok(status
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_params_serialize_sparsely() {
        let v = serde_json::to_value(UpdateSampleAclsParams::grant_read("s1", "bob")).unwrap();
        assert_eq!(v, json!({"id": "s1", "read": ["bob"], "at_least": 1, "as_admin": 1}));
        let v = serde_json::to_value(UpdateSampleAclsParams::public_read("s1")).unwrap();
        assert_eq!(v, json!({"id": "s1", "public_read": 1, "as_admin": 1}));
    }

    #[test]
    fn acls_default_missing_lists() {
        let acls: SampleAcls = serde_json::from_value(json!({"owner": "amy"})).unwrap();
        assert_eq!(acls.owner, "amy");
        assert!(acls.admin.is_empty());
    }
}
