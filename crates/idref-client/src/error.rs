//! Client error types.
//!
//! The variants preserve the failure categories the ID handlers report to
//! users: credential rejection, transport (IO) failure, a service-reported
//! error, and anything unexpected.

/// Errors from JSON-RPC 1.1 services (Handle Service, Sample Service).
#[derive(Debug, thiserror::Error)]
pub enum JsonRpcError {
    /// The service rejected the credentials.
    #[error("{message}")]
    Unauthorized { message: String },
    /// The request never produced a response.
    #[error("{source}")]
    Transport {
        method: String,
        #[source]
        source: reqwest::Error,
    },
    /// The service returned a JSON-RPC error object.
    #[error("{message}")]
    Server {
        name: String,
        code: i64,
        message: String,
        /// Server-side trace, when the service sends one.
        data: Option<String>,
    },
    /// Non-JSON response, unexpected status, missing runtime, etc.
    #[error("{message}")]
    Unexpected { message: String },
    /// The response did not have the expected shape.
    #[error("failed to parse {method} response: {source}")]
    Deserialization {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

impl JsonRpcError {
    pub(crate) fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }
}

/// Errors from the Shock REST API.
#[derive(Debug, thiserror::Error)]
pub enum ShockError {
    /// 401 / 403: the token may not perform the operation on the node.
    #[error("{message}")]
    Authorization { message: String },
    /// 404 or Shock's "Node not found".
    #[error("{message}")]
    NoNode { message: String },
    /// Any other error status.
    #[error("Shock responded with status {status}: {message}")]
    Http { status: u16, message: String },
    /// Connection, timeout or body read failure.
    #[error("{source}")]
    Transport {
        #[source]
        source: reqwest::Error,
    },
    /// The response body could not be interpreted.
    #[error("{message}")]
    Deserialization { message: String },
    /// The client could not be built.
    #[error("{message}")]
    Client { message: String },
    /// Not a Shock node id.
    #[error("Illegal shock ID: {0}")]
    InvalidNodeId(String),
}

impl ShockError {
    /// Whether this is an IO-level failure rather than a service response.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}
