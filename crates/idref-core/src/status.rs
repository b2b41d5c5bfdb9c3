use serde::{Deserialize, Serialize};

/// Health of a downstream service a handler factory depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub ok: bool,
    /// "OK" when healthy, otherwise the failure message.
    pub message: String,
    /// Human-readable dependency name, e.g. "Handle service".
    pub name: String,
    /// Reported version, or "Unknown" when the service could not be reached.
    pub version: String,
}

impl DependencyStatus {
    pub fn healthy(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: "OK".to_string(),
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            name: name.into(),
            version: "Unknown".to_string(),
        }
    }
}
