//! # idref-client: Clients for External ID Services
//!
//! Typed access to the three services whose identifiers may be embedded in
//! workspace objects:
//! - **Handle Service** (JSON-RPC 1.1): bulk readability checks and ACL grants
//!   for handles.
//! - **Shock** (REST): node ACLs, server-side node copies.
//! - **Sample Service** (JSON-RPC 1.1): sample ACL lookup and update.
//!
//! ## Architecture
//!
//! Each service is reached through an object-safe `Send + Sync` trait
//! ([`HandleService`], [`ShockClient`], [`SampleService`]) so the handlers in
//! `idref-handlers` can be exercised against the in-memory implementations in
//! [`mock`]. The live implementations wrap `reqwest` and drive it on the
//! ambient Tokio runtime; their trait methods are synchronous and must be
//! called from a thread where `Handle::block_on` is permitted (a
//! `spawn_blocking` task, or a plain thread that entered the runtime).
//!
//! Credential-bound clients are produced by factories
//! ([`HandleClientFactory`], [`ShockClientFactory`]); a shared client never
//! has its token swapped in place.
//!
//! Retries are NOT built in. A node copy is not idempotent, so a blind retry
//! could create duplicate copies.

pub mod config;
pub mod error;
pub mod handle;
pub mod jsonrpc;
pub mod mock;
pub(crate) mod runtime;
pub mod sample;
pub mod shock;

pub use config::{
    ConfigError, ExternalServicesConfig, HandleServiceConfig, SampleServiceConfig, ShockConfig,
};
pub use error::{JsonRpcError, ShockError};
pub use handle::{HandleClientFactory, HandleService, HttpHandleClientFactory, HttpHandleService};
pub use jsonrpc::JsonRpcClient;
pub use sample::{GetSampleAclsParams, HttpSampleService, SampleAcls, SampleService, UpdateSampleAclsParams};
pub use shock::{
    HttpShockClient, HttpShockClientFactory, ShockAcl, ShockAclType, ShockClient,
    ShockClientFactory, ShockNodeId,
};
