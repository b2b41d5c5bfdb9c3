//! Blobstore node ids (`bytestream`).
//!
//! Same storage as `shock`, different ingest: instead of copying, the
//! workspace takes ownership of the caller's node in place.
//!
//! 1. Every distinct node is fetched with the caller's token. A node must be
//!    owned by the caller or already by the workspace; nothing is changed
//!    until all of them pass.
//! 2. The workspace account becomes owner of the caller's nodes.
//! 3. On every node, write and delete rights held by anyone but the
//!    workspace are revoked.
//!
//! Ids are never remapped. Attributes are ignored.

use std::sync::Arc;

use idref_client::{ShockAcl, ShockAclType, ShockClient, ShockClientFactory, ShockError, ShockNodeId};
use idref_core::{
    AssociatedObject, AuthToken, DependencyStatus, IdCollector, IdReferenceError, IdReferenceHandler,
    IdReferenceHandlerError, IdReferenceHandlerFactory, IdReferencePermissionHandler,
    IdReferencePermissionHandlerFactory, IdReferenceType, PermissionHandlerError, ReadGrantee, RemapTable,
};
use tracing::{debug, info};

use crate::referencing_object;
use crate::shock::{others, ShockServices};

const DEPENDENCY_NAME: &str = "Linked bytestream storage for IDs";

const NOT_CONNECTED: &str =
    "There is no connection configured for bytestream storage and bytestream IDs cannot be processed.";

/// Factory for `bytestream` handlers.
#[derive(Clone)]
pub struct BytestreamIdHandlerFactory {
    services: Option<ShockServices>,
}

impl BytestreamIdHandlerFactory {
    /// `admin` must be bound to a Blobstore administrator account; it ends
    /// up owning every node saved through this handler.
    pub fn new(clients: Arc<dyn ShockClientFactory>, admin: Arc<dyn ShockClient>) -> Self {
        Self {
            services: Some(ShockServices { clients, admin }),
        }
    }

    pub fn unconfigured() -> Self {
        Self { services: None }
    }
}

fn node_id(id: &str) -> Result<ShockNodeId, String> {
    ShockNodeId::new(id).map_err(|_| format!("Illegal bytestream ID: {id}"))
}

impl IdReferencePermissionHandlerFactory for BytestreamIdHandlerFactory {
    fn id_type(&self) -> IdReferenceType {
        IdReferenceType::bytestream()
    }

    fn create_permission_handler(&self, grantee: &ReadGrantee) -> Box<dyn IdReferencePermissionHandler> {
        Box::new(BytestreamPermissionHandler {
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

impl<T: AssociatedObject> IdReferenceHandlerFactory<T> for BytestreamIdHandlerFactory {
    fn create_handler(&self, token: &AuthToken) -> Box<dyn IdReferenceHandler<T>> {
        Box::new(BytestreamIdHandler {
            services: self.services.clone(),
            token: token.clone(),
        })
    }
}

struct BytestreamIdHandler {
    services: Option<ShockServices>,
    token: AuthToken,
}

/// Whether a checked node still needs to change hands.
enum Ingest {
    Reconcile(ShockAcl),
    TakeOwnership,
}

fn handler_error(prefix: &str, e: ShockError) -> IdReferenceHandlerError {
    IdReferenceHandlerError::handler_with_source(IdReferenceType::bytestream(), format!("{prefix}{e}"), e)
}

fn process_error(e: ShockError) -> IdReferenceHandlerError {
    if e.is_transport() {
        handler_error(
            "There was an IO problem while attempting to contact bytestream storage to process IDs: ",
            e,
        )
    } else {
        handler_error("Bytestream storage reported a problem while attempting to process IDs: ", e)
    }
}

fn alter_error(e: ShockError) -> IdReferenceHandlerError {
    if e.is_transport() {
        handler_error(
            "There was an IO problem while attempting to contact bytestream storage to alter nodes: ",
            e,
        )
    } else {
        handler_error("Bytestream storage reported a problem while attempting to alter nodes: ", e)
    }
}

/// Revoke write and delete from everyone on `acl` but the workspace.
fn strip_non_owners(admin: &dyn ShockClient, node: &ShockNodeId, acl: &ShockAcl) -> Result<(), IdReferenceHandlerError> {
    let ws_user = admin.user();
    for (list, acl_type) in [(&acl.write, ShockAclType::Write), (&acl.delete, ShockAclType::Delete)] {
        let users = others(list, ws_user);
        if users.is_empty() {
            continue;
        }
        debug!(node = %node, acl = acl_type.as_str(), users = ?users, "revoking rights on bytestream node");
        admin.remove_from_acl(node, &users, acl_type).map_err(process_error)?;
    }
    Ok(())
}

impl BytestreamIdHandler {
    fn plan<T: AssociatedObject>(
        &self,
        services: &ShockServices,
        collected: &IdCollector<T>,
    ) -> Result<Vec<(ShockNodeId, Ingest)>, IdReferenceHandlerError> {
        let client = services.clients.with_token(&self.token).map_err(|e| {
            IdReferenceHandlerError::handler_with_source(
                IdReferenceType::bytestream(),
                format!("Error contacting bytestream storage to validate IDs: {e}"),
                e,
            )
        })?;
        let ws_user = services.admin.user();
        let user = self.token.user_name();
        let mut plan = Vec::with_capacity(collected.distinct_ids().len());
        for id in collected.distinct_ids() {
            let per_id = |message: String| -> IdReferenceHandlerError {
                IdReferenceError::new(
                    message,
                    IdReferenceType::bytestream(),
                    referencing_object(collected, id),
                    id,
                    None,
                )
                .into()
            };
            let node = node_id(id).map_err(per_id)?;
            let acl = client.acl(&node).map_err(|e| match e {
                ShockError::Authorization { .. } => per_id(format!("User {user} cannot read bytestream node {node}")),
                ShockError::NoNode { .. } => per_id(format!("Bytestream node {node} does not exist")),
                other => process_error(other),
            })?;
            let ingest = if acl.owner == ws_user {
                // a user may have handed their node to the workspace directly
                Ingest::Reconcile(acl)
            } else if acl.owner == user {
                Ingest::TakeOwnership
            } else {
                return Err(per_id(format!("User {user} does not own bytestream node {node}")));
            };
            plan.push((node, ingest));
        }
        Ok(plan)
    }
}

impl<T: AssociatedObject> IdReferenceHandler<T> for BytestreamIdHandler {
    fn id_type(&self) -> IdReferenceType {
        IdReferenceType::bytestream()
    }

    fn validate_id(&self, associated_object: &T, id: &str, _attributes: Option<&[String]>) -> Result<(), IdReferenceError> {
        if self.services.is_none() {
            return Err(IdReferenceError::new(
                format!(
                    "Found bytestream id {id}. There is no connection configured for bytestream IDs \
                     and so objects containing bytestream IDs cannot be processed."
                ),
                IdReferenceType::bytestream(),
                associated_object,
                id,
                None,
            ));
        }
        node_id(id).map_err(|m| IdReferenceError::parse(m, IdReferenceType::bytestream(), associated_object, id, None))?;
        Ok(())
    }

    fn process_ids(&mut self, collected: &IdCollector<T>) -> Result<RemapTable, IdReferenceHandlerError> {
        let services = self
            .services
            .as_ref()
            .ok_or_else(|| IdReferenceHandlerError::handler(IdReferenceType::bytestream(), NOT_CONNECTED))?;
        let plan = self.plan(services, collected)?;

        let admin = services.admin.as_ref();
        let mut table = RemapTable::new();
        for (node, ingest) in plan {
            let acl = match ingest {
                Ingest::Reconcile(acl) => acl,
                Ingest::TakeOwnership => {
                    let acl = admin
                        .add_to_acl(&node, &[admin.user().to_string()], ShockAclType::Owner)
                        .map_err(alter_error)?;
                    info!(node = %node, from = self.token.user_name(), "took ownership of bytestream node");
                    acl
                }
            };
            strip_non_owners(admin, &node, &acl)?;
            table.insert_identity(node.as_str());
        }
        Ok(table)
    }
}

struct BytestreamPermissionHandler {
    admin: Option<Arc<dyn ShockClient>>,
    grantee: ReadGrantee,
}

impl IdReferencePermissionHandler for BytestreamPermissionHandler {
    fn id_type(&self) -> IdReferenceType {
        IdReferenceType::bytestream()
    }

    fn add_read_permission(&mut self, ids: &[String]) -> Result<(), PermissionHandlerError> {
        if ids.is_empty() {
            return Ok(());
        }
        let admin = self.admin.as_ref().ok_or_else(|| PermissionHandlerError::new(NOT_CONNECTED))?;
        for id in ids {
            let node = node_id(id).map_err(PermissionHandlerError::new)?;
            let result = match &self.grantee {
                ReadGrantee::Public => admin.set_publicly_readable(&node),
                ReadGrantee::User(user) => admin.add_to_acl(&node, std::slice::from_ref(user), ShockAclType::Read),
            };
            result.map_err(|e| {
                let message = if e.is_transport() {
                    format!("There was an IO problem while attempting to set bytestream ACLs on node {node}: {e}")
                } else {
                    format!("Bytestream storage reported a problem while attempting to set ACLs on node {node}: {e}")
                };
                PermissionHandlerError::with_source(message, e)
            })?;
        }
        Ok(())
    }
}
