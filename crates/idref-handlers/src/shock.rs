//! Shock node ids (`shock`).
//!
//! The workspace keeps its own copy of every node an object references so a
//! user deleting or re-sharing their node cannot break saved data:
//!
//! 1. Every distinct node is checked for readability with a client bound to
//!    the caller's token. Nothing is changed until all of them pass.
//! 2. Nodes the workspace already owns keep their id; any write or delete
//!    rights other users were given are revoked.
//! 3. Every other node is copied (data and attributes) by the workspace
//!    account and the object is remapped to the copy.

use std::sync::Arc;

use idref_client::{ShockAclType, ShockClient, ShockClientFactory, ShockError, ShockNodeId};
use idref_core::{
    AssociatedObject, AuthToken, DependencyStatus, IdCollector, IdReferenceError, IdReferenceHandler,
    IdReferenceHandlerError, IdReferenceHandlerFactory, IdReferencePermissionHandler,
    IdReferencePermissionHandlerFactory, IdReferenceType, PermissionHandlerError, ReadGrantee, RemapTable,
    RemappedId,
};
use tracing::{debug, info};

use crate::referencing_object;

const DEPENDENCY_NAME: &str = "Linked Shock for IDs";

#[derive(Clone)]
pub(crate) struct ShockServices {
    pub(crate) clients: Arc<dyn ShockClientFactory>,
    /// Acts as the workspace account: owns ingested nodes.
    pub(crate) admin: Arc<dyn ShockClient>,
}

/// Factory for `shock` handlers.
#[derive(Clone)]
pub struct ShockIdHandlerFactory {
    services: Option<ShockServices>,
}

impl ShockIdHandlerFactory {
    /// `admin` must be bound to the workspace's Shock account.
    pub fn new(clients: Arc<dyn ShockClientFactory>, admin: Arc<dyn ShockClient>) -> Self {
        Self {
            services: Some(ShockServices { clients, admin }),
        }
    }

    pub fn unconfigured() -> Self {
        Self { services: None }
    }
}

impl IdReferencePermissionHandlerFactory for ShockIdHandlerFactory {
    fn id_type(&self) -> IdReferenceType {
        IdReferenceType::shock()
    }

    fn create_permission_handler(&self, grantee: &ReadGrantee) -> Box<dyn IdReferencePermissionHandler> {
        Box::new(ShockPermissionHandler {
            admin: self.services.as_ref().map(|s| s.admin.clone()),
            grantee: grantee.clone(),
        })
    }

    fn dependency_status(&self) -> Vec<DependencyStatus> {
        let Some(services) = &self.services else {
            return Vec::new();
        };
        let status = match services.admin.remote_version() {
            Ok(v) => DependencyStatus::healthy(DEPENDENCY_NAME, v),
            Err(e) => DependencyStatus::unhealthy(DEPENDENCY_NAME, e.to_string()),
        };
        vec![status]
    }
}

impl<T: AssociatedObject> IdReferenceHandlerFactory<T> for ShockIdHandlerFactory {
    fn create_handler(&self, token: &AuthToken) -> Box<dyn IdReferenceHandler<T>> {
        Box::new(ShockIdHandler {
            services: self.services.clone(),
            token: token.clone(),
        })
    }
}

struct ShockIdHandler {
    services: Option<ShockServices>,
    token: AuthToken,
}

/// What processing will do to one node once every node is known readable.
enum Ingest {
    /// Owned by the workspace: revoke these users' write and delete rights.
    Reconcile { write: Vec<String>, delete: Vec<String> },
    Copy,
}

fn handler_error(prefix: &str, e: ShockError) -> IdReferenceHandlerError {
    IdReferenceHandlerError::handler_with_source(IdReferenceType::shock(), format!("{prefix}{e}"), e)
}

fn process_error(e: ShockError) -> IdReferenceHandlerError {
    if e.is_transport() {
        handler_error("There was an IO problem while attempting to contact Shock to process IDs: ", e)
    } else {
        handler_error("Shock reported a problem while attempting to process IDs: ", e)
    }
}

fn copy_error(e: ShockError) -> IdReferenceHandlerError {
    if e.is_transport() {
        handler_error("There was an IO problem while attempting to contact Shock to copy nodes: ", e)
    } else {
        handler_error("Shock reported a problem while attempting to copy nodes: ", e)
    }
}

/// Everyone but `owner` on an ACL list.
pub(crate) fn others(list: &[String], owner: &str) -> Vec<String> {
    list.iter().filter(|u| *u != owner).cloned().collect()
}

impl ShockIdHandler {
    fn plan<T: AssociatedObject>(
        &self,
        services: &ShockServices,
        collected: &IdCollector<T>,
    ) -> Result<Vec<(ShockNodeId, Ingest)>, IdReferenceHandlerError> {
        let client = services.clients.with_token(&self.token).map_err(|e| {
            IdReferenceHandlerError::handler_with_source(
                IdReferenceType::shock(),
                format!("Error contacting Shock to validate IDs: {e}"),
                e,
            )
        })?;
        let ws_user = services.admin.user();
        let mut plan = Vec::with_capacity(collected.distinct_ids().len());
        for id in collected.distinct_ids() {
            let per_id = |message: String| -> IdReferenceHandlerError {
                IdReferenceError::new(message, IdReferenceType::shock(), referencing_object(collected, id), id, None)
                    .into()
            };
            let node = ShockNodeId::new(id).map_err(|e| per_id(e.to_string()))?;
            let acl = client.acl(&node).map_err(|e| match e {
                ShockError::Authorization { .. } => {
                    per_id(format!("User {} cannot read Shock node {}", self.token.user_name(), node))
                }
                ShockError::NoNode { .. } => per_id(format!("Shock node {node} does not exist")),
                other => process_error(other),
            })?;
            let ingest = if acl.owner == ws_user {
                Ingest::Reconcile {
                    write: others(&acl.write, ws_user),
                    delete: others(&acl.delete, ws_user),
                }
            } else {
                Ingest::Copy
            };
            plan.push((node, ingest));
        }
        Ok(plan)
    }
}

impl<T: AssociatedObject> IdReferenceHandler<T> for ShockIdHandler {
    fn id_type(&self) -> IdReferenceType {
        IdReferenceType::shock()
    }

    fn validate_id(&self, associated_object: &T, id: &str, _attributes: Option<&[String]>) -> Result<(), IdReferenceError> {
        if self.services.is_none() {
            return Err(IdReferenceError::new(
                format!(
                    "Found shock id {id}. There is no connection configured for the Shock Service \
                     and so objects containing shock IDs cannot be processed."
                ),
                IdReferenceType::shock(),
                associated_object,
                id,
                None,
            ));
        }
        ShockNodeId::new(id).map_err(|e| {
            IdReferenceError::parse(e.to_string(), IdReferenceType::shock(), associated_object, id, None)
        })?;
        Ok(())
    }

    fn process_ids(&mut self, collected: &IdCollector<T>) -> Result<RemapTable, IdReferenceHandlerError> {
        let services = self.services.as_ref().ok_or_else(|| {
            IdReferenceHandlerError::handler(
                IdReferenceType::shock(),
                "There is no connection configured for the Shock Service and Shock IDs cannot be processed.",
            )
        })?;
        let plan = self.plan(services, collected)?;

        let mut table = RemapTable::new();
        for (node, ingest) in plan {
            match ingest {
                Ingest::Reconcile { write, delete } => {
                    for (users, acl) in [(write, ShockAclType::Write), (delete, ShockAclType::Delete)] {
                        if users.is_empty() {
                            continue;
                        }
                        debug!(node = %node, acl = acl.as_str(), users = ?users, "revoking rights on owned node");
                        services.admin.remove_from_acl(&node, &users, acl).map_err(process_error)?;
                    }
                    table.insert_identity(node.as_str());
                }
                Ingest::Copy => {
                    let copy = services.admin.copy_node(&node).map_err(copy_error)?;
                    info!(source = %node, copy = %copy, "ingested shock node");
                    table.insert(node.as_str(), RemappedId::new(copy.as_str()));
                }
            }
        }
        Ok(table)
    }
}

struct ShockPermissionHandler {
    admin: Option<Arc<dyn ShockClient>>,
    grantee: ReadGrantee,
}

impl IdReferencePermissionHandler for ShockPermissionHandler {
    fn id_type(&self) -> IdReferenceType {
        IdReferenceType::shock()
    }

    fn add_read_permission(&mut self, ids: &[String]) -> Result<(), PermissionHandlerError> {
        if ids.is_empty() {
            return Ok(());
        }
        let admin = self.admin.as_ref().ok_or_else(|| {
            PermissionHandlerError::new(
                "There is no connection configured for the Shock Service and Shock IDs cannot be processed.",
            )
        })?;
        for id in ids {
            let node = ShockNodeId::new(id).map_err(|e| PermissionHandlerError::new(e.to_string()))?;
            let result = match &self.grantee {
                ReadGrantee::Public => admin.set_publicly_readable(&node),
                ReadGrantee::User(user) => admin.add_to_acl(&node, std::slice::from_ref(user), ShockAclType::Read),
            };
            result.map_err(|e| {
                let message = if e.is_transport() {
                    format!("There was an IO problem while attempting to set Shock ACLs on node {node}: {e}")
                } else {
                    format!("Shock reported a problem while attempting to set Shock ACLs on node {node}: {e}")
                };
                PermissionHandlerError::with_source(message, e)
            })?;
        }
        Ok(())
    }
}
