//! # In-Memory Service Doubles
//!
//! Mock implementations of [`HandleService`], [`ShockClient`] and
//! [`SampleService`] that keep state in memory and record every call, so
//! handler tests can assert exact downstream call counts. Each mock is a
//! cheap `Clone` handle onto shared state: clones observe the same calls.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use idref_core::AuthToken;
use parking_lot::Mutex;

use crate::error::{JsonRpcError, ShockError};
use crate::handle::{HandleClientFactory, HandleService};
use crate::sample::{GetSampleAclsParams, SampleAcls, SampleService, UpdateSampleAclsParams};
use crate::shock::{ShockAcl, ShockAclType, ShockClient, ShockClientFactory, ShockNodeId};

/// A canned JSON-RPC failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRpcFailure {
    Unauthorized(String),
    Server(String),
    Unexpected(String),
}

impl From<&MockRpcFailure> for JsonRpcError {
    fn from(f: &MockRpcFailure) -> Self {
        match f {
            MockRpcFailure::Unauthorized(m) => JsonRpcError::Unauthorized { message: m.clone() },
            MockRpcFailure::Server(m) => JsonRpcError::Server {
                name: "JSONRPCError".to_string(),
                code: -32500,
                message: m.clone(),
                data: None,
            },
            MockRpcFailure::Unexpected(m) => JsonRpcError::Unexpected { message: m.clone() },
        }
    }
}

// -- Handle Service ---------------------------------------------------------

/// A recorded Handle Service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleCall {
    AreReadable { user: Option<String>, handles: Vec<String> },
    SetPublicRead { handles: Vec<String> },
    AddReadAcl { handles: Vec<String>, user: String },
    Version,
}

#[derive(Debug, Default)]
struct HandleState {
    readable: BTreeSet<String>,
    public: BTreeSet<String>,
    read_acls: HashMap<String, BTreeSet<String>>,
    calls: Vec<HandleCall>,
    failure: Option<MockRpcFailure>,
}

/// In-memory Handle Service. Also a [`HandleClientFactory`] whose clients
/// share this state.
#[derive(Debug, Clone, Default)]
pub struct MockHandleService {
    state: Arc<Mutex<HandleState>>,
    user: Option<String>,
}

impl MockHandleService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register handles that every user may read.
    pub fn add_readable(&self, handles: &[&str]) {
        let mut s = self.state.lock();
        s.readable.extend(handles.iter().map(|h| h.to_string()));
    }

    /// Make every subsequent call fail.
    pub fn fail_with(&self, failure: Option<MockRpcFailure>) {
        self.state.lock().failure = failure;
    }

    pub fn calls(&self) -> Vec<HandleCall> {
        self.state.lock().calls.clone()
    }

    pub fn is_public(&self, handle: &str) -> bool {
        self.state.lock().public.contains(handle)
    }

    pub fn readers(&self, handle: &str) -> BTreeSet<String> {
        self.state.lock().read_acls.get(handle).cloned().unwrap_or_default()
    }

    fn record(&self, call: HandleCall) -> Result<(), JsonRpcError> {
        let mut s = self.state.lock();
        s.calls.push(call);
        match &s.failure {
            Some(f) => Err(f.into()),
            None => Ok(()),
        }
    }
}

impl HandleService for MockHandleService {
    fn are_readable(&self, handles: &[String]) -> Result<bool, JsonRpcError> {
        self.record(HandleCall::AreReadable {
            user: self.user.clone(),
            handles: handles.to_vec(),
        })?;
        let s = self.state.lock();
        Ok(handles.iter().all(|h| s.readable.contains(h)))
    }

    fn set_public_read(&self, handles: &[String]) -> Result<(), JsonRpcError> {
        self.record(HandleCall::SetPublicRead {
            handles: handles.to_vec(),
        })?;
        self.state.lock().public.extend(handles.iter().cloned());
        Ok(())
    }

    fn add_read_acl(&self, handles: &[String], user: &str) -> Result<(), JsonRpcError> {
        self.record(HandleCall::AddReadAcl {
            handles: handles.to_vec(),
            user: user.to_string(),
        })?;
        let mut s = self.state.lock();
        for h in handles {
            s.read_acls.entry(h.clone()).or_default().insert(user.to_string());
        }
        Ok(())
    }

    fn version(&self) -> Result<String, JsonRpcError> {
        self.record(HandleCall::Version)?;
        Ok("1.0.0".to_string())
    }
}

impl HandleClientFactory for MockHandleService {
    fn for_token(&self, token: &AuthToken) -> Result<Arc<dyn HandleService>, JsonRpcError> {
        Ok(Arc::new(Self {
            state: self.state.clone(),
            user: Some(token.user_name().to_string()),
        }))
    }
}

// -- Shock ------------------------------------------------------------------

/// A recorded Shock call, tagged with the client's user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShockCall {
    Acl { user: String, node: String },
    Copy { user: String, node: String },
    AddToAcl { user: String, node: String, users: Vec<String>, acl: ShockAclType },
    RemoveFromAcl { user: String, node: String, users: Vec<String>, acl: ShockAclType },
    SetPublic { user: String, node: String },
    Version,
}

#[derive(Debug, Default)]
struct ShockState {
    nodes: HashMap<String, ShockAcl>,
    admins: BTreeSet<String>,
    copied_from: HashMap<String, String>,
    calls: Vec<ShockCall>,
    failure: Option<(u16, String)>,
}

/// In-memory Shock server. Hands out user-bound clients via
/// [`MockShock::client`] or [`ShockClientFactory::with_token`].
#[derive(Debug, Clone, Default)]
pub struct MockShock {
    state: Arc<Mutex<ShockState>>,
}

impl MockShock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node owned by `owner`, who also holds read, write and delete.
    pub fn add_node(&self, owner: &str) -> ShockNodeId {
        let id = uuid::Uuid::new_v4().hyphenated().to_string();
        let o = vec![owner.to_string()];
        self.state.lock().nodes.insert(
            id.clone(),
            ShockAcl {
                owner: owner.to_string(),
                read: o.clone(),
                write: o.clone(),
                delete: o,
                public_read: false,
            },
        );
        ShockNodeId(id)
    }

    /// Make `user` a Shock administrator, who may read, copy and edit the ACL
    /// of any node.
    pub fn add_admin(&self, user: &str) {
        self.state.lock().admins.insert(user.to_string());
    }

    /// Replace a node's ACL, creating the node if needed.
    pub fn set_acl(&self, node: &ShockNodeId, acl: ShockAcl) {
        self.state.lock().nodes.insert(node.to_string(), acl);
    }

    pub fn acl_of(&self, node: &ShockNodeId) -> Option<ShockAcl> {
        self.state.lock().nodes.get(node.as_str()).cloned()
    }

    /// The node `copy` was copied from, if it is a copy.
    pub fn source_of(&self, copy: &str) -> Option<String> {
        self.state.lock().copied_from.get(copy).cloned()
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    /// Make every subsequent call fail with the given HTTP status.
    pub fn fail_with_status(&self, failure: Option<(u16, &str)>) {
        self.state.lock().failure = failure.map(|(s, m)| (s, m.to_string()));
    }

    pub fn calls(&self) -> Vec<ShockCall> {
        self.state.lock().calls.clone()
    }

    /// A client acting as `user`.
    pub fn client(&self, user: &str) -> Arc<dyn ShockClient> {
        Arc::new(MockShockClient {
            user: user.to_string(),
            state: self.state.clone(),
        })
    }
}

impl ShockClientFactory for MockShock {
    fn with_token(&self, token: &AuthToken) -> Result<Arc<dyn ShockClient>, ShockError> {
        Ok(self.client(token.user_name()))
    }
}

struct MockShockClient {
    user: String,
    state: Arc<Mutex<ShockState>>,
}

impl MockShockClient {
    /// Record the call, apply injected failures, and run `f` on the node's
    /// ACL when the client's user passes `check`.
    fn with_node<R>(
        &self,
        call: ShockCall,
        node: &ShockNodeId,
        check: fn(&ShockState, &ShockAcl, &str) -> bool,
        f: impl FnOnce(&mut ShockState, &str) -> R,
    ) -> Result<R, ShockError> {
        let mut s = self.state.lock();
        s.calls.push(call);
        if let Some((status, message)) = s.failure.clone() {
            return Err(ShockError::Http { status, message });
        }
        let acl = s.nodes.get(node.as_str()).ok_or_else(|| ShockError::NoNode {
            message: "Node not found".to_string(),
        })?;
        if !check(&*s, acl, &self.user) {
            return Err(ShockError::Authorization {
                message: "User Unauthorized".to_string(),
            });
        }
        Ok(f(&mut *s, node.as_str()))
    }
}

fn can_read(s: &ShockState, acl: &ShockAcl, user: &str) -> bool {
    s.admins.contains(user) || acl.public_read || acl.owner == user || acl.read.iter().any(|u| u == user)
}

fn can_alter(s: &ShockState, acl: &ShockAcl, user: &str) -> bool {
    s.admins.contains(user) || acl.owner == user
}

impl ShockClient for MockShockClient {
    fn user(&self) -> &str {
        &self.user
    }

    fn acl(&self, node: &ShockNodeId) -> Result<ShockAcl, ShockError> {
        let call = ShockCall::Acl {
            user: self.user.clone(),
            node: node.to_string(),
        };
        self.with_node(call, node, can_read, |s, id| s.nodes[id].clone())
    }

    fn copy_node(&self, node: &ShockNodeId) -> Result<ShockNodeId, ShockError> {
        let call = ShockCall::Copy {
            user: self.user.clone(),
            node: node.to_string(),
        };
        let user = self.user.clone();
        self.with_node(call, node, can_read, move |s, id| {
            let copy = uuid::Uuid::new_v4().hyphenated().to_string();
            let u = vec![user.clone()];
            s.nodes.insert(
                copy.clone(),
                ShockAcl {
                    owner: user,
                    read: u.clone(),
                    write: u.clone(),
                    delete: u,
                    public_read: false,
                },
            );
            s.copied_from.insert(copy.clone(), id.to_string());
            ShockNodeId(copy)
        })
    }

    fn add_to_acl(&self, node: &ShockNodeId, users: &[String], acl: ShockAclType) -> Result<ShockAcl, ShockError> {
        let call = ShockCall::AddToAcl {
            user: self.user.clone(),
            node: node.to_string(),
            users: users.to_vec(),
            acl,
        };
        self.with_node(call, node, can_alter, |s, id| {
            let entry = s.nodes.entry(id.to_string()).or_default();
            match acl {
                ShockAclType::Owner => {
                    if let Some(u) = users.first() {
                        entry.owner = u.clone();
                    }
                }
                ShockAclType::Read => add_all(&mut entry.read, users),
                ShockAclType::Write => add_all(&mut entry.write, users),
                ShockAclType::Delete => add_all(&mut entry.delete, users),
            }
            entry.clone()
        })
    }

    fn remove_from_acl(
        &self,
        node: &ShockNodeId,
        users: &[String],
        acl: ShockAclType,
    ) -> Result<ShockAcl, ShockError> {
        let call = ShockCall::RemoveFromAcl {
            user: self.user.clone(),
            node: node.to_string(),
            users: users.to_vec(),
            acl,
        };
        self.with_node(call, node, can_alter, |s, id| {
            let entry = s.nodes.entry(id.to_string()).or_default();
            let list = match acl {
                ShockAclType::Owner => return entry.clone(),
                ShockAclType::Read => &mut entry.read,
                ShockAclType::Write => &mut entry.write,
                ShockAclType::Delete => &mut entry.delete,
            };
            list.retain(|u| !users.contains(u));
            entry.clone()
        })
    }

    fn set_publicly_readable(&self, node: &ShockNodeId) -> Result<ShockAcl, ShockError> {
        let call = ShockCall::SetPublic {
            user: self.user.clone(),
            node: node.to_string(),
        };
        self.with_node(call, node, can_alter, |s, id| {
            let entry = s.nodes.entry(id.to_string()).or_default();
            entry.public_read = true;
            entry.clone()
        })
    }

    fn remote_version(&self) -> Result<String, ShockError> {
        let mut s = self.state.lock();
        s.calls.push(ShockCall::Version);
        if let Some((status, message)) = s.failure.clone() {
            return Err(ShockError::Http { status, message });
        }
        Ok("0.9.6".to_string())
    }
}

fn add_all(list: &mut Vec<String>, users: &[String]) {
    for u in users {
        if !list.contains(u) {
            list.push(u.clone());
        }
    }
}

// -- Sample Service ---------------------------------------------------------

/// A recorded Sample Service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleCall {
    GetAcls(GetSampleAclsParams),
    UpdateAcls(UpdateSampleAclsParams),
    Version,
}

#[derive(Debug, Default)]
struct SampleState {
    samples: HashMap<String, SampleAcls>,
    calls: Vec<SampleCall>,
    failure: Option<MockRpcFailure>,
}

/// In-memory Sample Service.
#[derive(Debug, Clone, Default)]
pub struct MockSampleService {
    state: Arc<Mutex<SampleState>>,
}

impl MockSampleService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sample(&self, id: &str, acls: SampleAcls) {
        self.state.lock().samples.insert(id.to_string(), acls);
    }

    pub fn acls_of(&self, id: &str) -> Option<SampleAcls> {
        self.state.lock().samples.get(id).cloned()
    }

    pub fn fail_with(&self, failure: Option<MockRpcFailure>) {
        self.state.lock().failure = failure;
    }

    pub fn calls(&self) -> Vec<SampleCall> {
        self.state.lock().calls.clone()
    }

    fn record(&self, call: SampleCall) -> Result<parking_lot::MutexGuard<'_, SampleState>, JsonRpcError> {
        let mut s = self.state.lock();
        s.calls.push(call);
        if let Some(f) = &s.failure {
            return Err(f.into());
        }
        Ok(s)
    }
}

fn no_such_sample(id: &str) -> JsonRpcError {
    (&MockRpcFailure::Server(format!("Sample service error code 50010 No such sample: {id}"))).into()
}

impl SampleService for MockSampleService {
    fn get_sample_acls(&self, params: &GetSampleAclsParams) -> Result<SampleAcls, JsonRpcError> {
        let s = self.record(SampleCall::GetAcls(params.clone()))?;
        s.samples.get(&params.id).cloned().ok_or_else(|| no_such_sample(&params.id))
    }

    fn update_sample_acls(&self, params: &UpdateSampleAclsParams) -> Result<(), JsonRpcError> {
        let mut s = self.record(SampleCall::UpdateAcls(params.clone()))?;
        let acls = s
            .samples
            .get_mut(&params.id)
            .ok_or_else(|| no_such_sample(&params.id))?;
        add_all(&mut acls.read, &params.read);
        if params.public_read == Some(1) {
            acls.public_read = 1;
        }
        Ok(())
    }

    fn version(&self) -> Result<String, JsonRpcError> {
        self.record(SampleCall::Version)?;
        Ok("0.2.5".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shock_mock_enforces_read_access() {
        let shock = MockShock::new();
        let node = shock.add_node("alice");
        assert!(shock.client("alice").acl(&node).is_ok());
        let err = shock.client("bob").acl(&node).unwrap_err();
        assert!(matches!(err, ShockError::Authorization { .. }));
        let missing = ShockNodeId::new("00000000-0000-4000-8000-000000000000").unwrap();
        assert!(matches!(
            shock.client("alice").acl(&missing).unwrap_err(),
            ShockError::NoNode { .. }
        ));
        assert_eq!(shock.calls().len(), 3);
    }

    #[test]
    fn shock_copy_is_owned_by_copier() {
        let shock = MockShock::new();
        let node = shock.add_node("alice");
        shock
            .client("alice")
            .add_to_acl(&node, &["ws".to_string()], ShockAclType::Read)
            .unwrap();
        let copy = shock.client("ws").copy_node(&node).unwrap();
        assert_ne!(copy, node);
        assert_eq!(shock.acl_of(&copy).unwrap().owner, "ws");
        assert_eq!(shock.source_of(copy.as_str()).as_deref(), Some(node.as_str()));
    }

    #[test]
    fn shock_admin_can_take_ownership() {
        let shock = MockShock::new();
        let node = shock.add_node("alice");
        let err = shock
            .client("ws")
            .add_to_acl(&node, &["ws".to_string()], ShockAclType::Owner)
            .unwrap_err();
        assert!(matches!(err, ShockError::Authorization { .. }));

        shock.add_admin("ws");
        let acl = shock
            .client("ws")
            .add_to_acl(&node, &["ws".to_string()], ShockAclType::Owner)
            .unwrap();
        assert_eq!(acl.owner, "ws");
        assert_eq!(acl.write, vec!["alice".to_string()]);
    }

    #[test]
    fn handle_mock_records_user() {
        let hs = MockHandleService::new();
        hs.add_readable(&["KBH_1"]);
        let token = AuthToken::new("t", "amy").unwrap();
        let client = hs.for_token(&token).unwrap();
        assert!(client.are_readable(&["KBH_1".to_string()]).unwrap());
        assert!(!client.are_readable(&["KBH_1".to_string(), "KBH_2".to_string()]).unwrap());
        assert_eq!(
            hs.calls()[0],
            HandleCall::AreReadable {
                user: Some("amy".to_string()),
                handles: vec!["KBH_1".to_string()]
            }
        );
    }

    #[test]
    fn sample_mock_failure_injection() {
        let ss = MockSampleService::new();
        ss.fail_with(Some(MockRpcFailure::Unauthorized("bad token".into())));
        let err = ss
            .get_sample_acls(&GetSampleAclsParams {
                id: "x".into(),
                as_admin: 1,
            })
            .unwrap_err();
        assert!(matches!(err, JsonRpcError::Unauthorized { .. }));
        assert_eq!(ss.calls().len(), 1);
    }
}
