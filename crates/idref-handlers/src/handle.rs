//! Handle Service ids (`handle`).
//!
//! The Handle Service only answers "are all of these readable?", so a batch
//! with any inaccessible handle fails as a whole. Handles are never
//! rewritten.

use std::sync::Arc;

use idref_client::handle::HANDLE_SERVICE_NAME;
use idref_client::{HandleClientFactory, HandleService, JsonRpcError};
use idref_core::{
    AssociatedObject, AuthToken, DependencyStatus, IdCollector, IdReferenceError, IdReferenceHandler,
    IdReferenceHandlerError, IdReferenceHandlerFactory, IdReferencePermissionHandler,
    IdReferencePermissionHandlerFactory, IdReferenceType, PermissionHandlerError, ReadGrantee, RemapTable,
};
use tracing::debug;

const NOT_CONNECTED: &str =
    "The workspace is not currently connected to the Handle Service and cannot process Handle ids.";

#[derive(Clone)]
struct HandleServices {
    /// Builds clients bound to the caller's token.
    clients: Arc<dyn HandleClientFactory>,
    /// Bound to the workspace's own token; used for ACL grants.
    admin: Arc<dyn HandleService>,
}

/// Factory for `handle` handlers.
#[derive(Clone)]
pub struct HandleIdHandlerFactory {
    services: Option<HandleServices>,
}

impl HandleIdHandlerFactory {
    pub fn new(clients: Arc<dyn HandleClientFactory>, admin: Arc<dyn HandleService>) -> Self {
        Self {
            services: Some(HandleServices { clients, admin }),
        }
    }

    /// A factory for a deployment without a Handle Service.
    pub fn unconfigured() -> Self {
        Self { services: None }
    }
}

impl IdReferencePermissionHandlerFactory for HandleIdHandlerFactory {
    fn id_type(&self) -> IdReferenceType {
        IdReferenceType::handle()
    }

    fn create_permission_handler(&self, grantee: &ReadGrantee) -> Box<dyn IdReferencePermissionHandler> {
        Box::new(HandlePermissionHandler {
            admin: self.services.as_ref().map(|s| s.admin.clone()),
            grantee: grantee.clone(),
        })
    }

    fn dependency_status(&self) -> Vec<DependencyStatus> {
        let Some(services) = &self.services else {
            return Vec::new();
        };
        let status = match services.admin.version() {
            Ok(v) => DependencyStatus::healthy(HANDLE_SERVICE_NAME, v),
            Err(e) => DependencyStatus::unhealthy(HANDLE_SERVICE_NAME, e.to_string()),
        };
        vec![status]
    }
}

impl<T: AssociatedObject> IdReferenceHandlerFactory<T> for HandleIdHandlerFactory {
    fn create_handler(&self, token: &AuthToken) -> Box<dyn IdReferenceHandler<T>> {
        Box::new(HandleIdHandler {
            services: self.services.clone(),
            token: token.clone(),
        })
    }
}

struct HandleIdHandler {
    services: Option<HandleServices>,
    token: AuthToken,
}

fn processing_error(e: JsonRpcError) -> IdReferenceHandlerError {
    let message = match &e {
        JsonRpcError::Unauthorized { .. } => {
            format!("Authorization for Handle Service failed. The server said: {e}")
        }
        JsonRpcError::Transport { .. } => {
            format!("There was a communication error while trying contact the Handle Service: {e}")
        }
        _ => format!("There was an unexpected error while trying contact the Handle Service: {e}"),
    };
    IdReferenceHandlerError::handler_with_source(IdReferenceType::handle(), message, e)
}

impl<T: AssociatedObject> IdReferenceHandler<T> for HandleIdHandler {
    fn id_type(&self) -> IdReferenceType {
        IdReferenceType::handle()
    }

    fn validate_id(&self, associated_object: &T, id: &str, attributes: Option<&[String]>) -> Result<(), IdReferenceError> {
        if self.services.is_none() {
            return Err(IdReferenceError::new(
                format!(
                    "Found handle id {id}. The workspace service currently does not have a connection \
                     to the handle service and so cannot process objects containing handle IDs."
                ),
                IdReferenceType::handle(),
                associated_object,
                id,
                attributes.map(<[String]>::to_vec),
            ));
        }
        Ok(())
    }

    fn process_ids(&mut self, collected: &IdCollector<T>) -> Result<RemapTable, IdReferenceHandlerError> {
        let services = self
            .services
            .as_ref()
            .ok_or_else(|| IdReferenceHandlerError::handler(IdReferenceType::handle(), NOT_CONNECTED))?;
        let handles = collected.distinct_ids();
        let client = services.clients.for_token(&self.token).map_err(processing_error)?;
        let readable = client.are_readable(handles).map_err(processing_error)?;
        debug!(handles = handles.len(), readable, "checked handle readability");
        if !readable {
            return Err(IdReferenceHandlerError::handler(
                IdReferenceType::handle(),
                "The Handle Service reported that at least one of the handles contained in the \
                 objects in this call was not accessible with your credentials. The call cannot complete.",
            ));
        }
        let mut table = RemapTable::new();
        for h in handles {
            table.insert_identity(h);
        }
        Ok(table)
    }
}

struct HandlePermissionHandler {
    admin: Option<Arc<dyn HandleService>>,
    grantee: ReadGrantee,
}

impl IdReferencePermissionHandler for HandlePermissionHandler {
    fn id_type(&self) -> IdReferenceType {
        IdReferenceType::handle()
    }

    fn add_read_permission(&mut self, ids: &[String]) -> Result<(), PermissionHandlerError> {
        if ids.is_empty() {
            return Ok(());
        }
        let admin = self.admin.as_ref().ok_or_else(|| PermissionHandlerError::new(NOT_CONNECTED))?;
        let result = match &self.grantee {
            ReadGrantee::Public => admin.set_public_read(ids),
            ReadGrantee::User(user) => admin.add_read_acl(ids, user),
        };
        result.map_err(|e| {
            let message = match &e {
                JsonRpcError::Transport { .. } => {
                    format!("There was an IO problem while attempting to set Handle ACLs: {e}")
                }
                JsonRpcError::Unauthorized { .. } => {
                    format!("Unable to contact the Handle Service - the Workspace credentials were rejected: {e}")
                }
                JsonRpcError::Server { .. } => {
                    format!("The Handle Service reported a problem while attempting to set Handle ACLs: {e}")
                }
                _ => format!(
                    "There was an unexpected problem while contacting the Handle Service to set Handle ACLs: {e}"
                ),
            };
            PermissionHandlerError::with_source(message, e)
        })
    }
}
