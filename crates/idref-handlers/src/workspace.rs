//! Workspace object references (`ws`).
//!
//! An object may point at other workspace objects. References are written
//! as `<workspace>/<object>[/<version>]`, where workspace and object are
//! either names or numeric ids, and are persisted in absolute
//! `wsid/objid/ver` form so later renames or new versions cannot change what
//! a saved object points to.
//!
//! Lookups go through an [`ObjectResolver`] supplied by the object store.

use std::fmt;
use std::sync::Arc;

use idref_core::{
    ArgumentError, AssociatedObject, AuthToken, DependencyStatus, IdCollector, IdReferenceError,
    IdReferenceHandler, IdReferenceHandlerError, IdReferenceHandlerFactory, IdReferencePermissionHandler,
    IdReferencePermissionHandlerFactory, IdReferenceType, PermissionHandlerError, ReadGrantee, RemapTable,
    RemappedId,
};
use tracing::debug;

use crate::referencing_object;

// -- References -------------------------------------------------------------

/// A workspace or object named either way.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Id(u64),
    Name(String),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// A parsed `ws/obj[/ver]` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectReference {
    pub workspace: Identifier,
    pub object: Identifier,
    /// `None` means the latest version.
    pub version: Option<u64>,
}

fn identifier(reference: &str, what: &str, part: &str, extra: &[char]) -> Result<Identifier, ArgumentError> {
    if part.is_empty() {
        return Err(ArgumentError::new(format!(
            "{what} name or id cannot be empty in reference {reference}"
        )));
    }
    if part.bytes().all(|b| b.is_ascii_digit()) {
        return match part.parse::<u64>() {
            Ok(id) if id > 0 => Ok(Identifier::Id(id)),
            _ => Err(ArgumentError::new(format!(
                "{what} id must be a positive integer in reference {reference}: {part}"
            ))),
        };
    }
    if let Some(c) = part
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || "_.-|".contains(*c) || extra.contains(c)))
    {
        return Err(ArgumentError::new(format!(
            "Illegal character in {} name {part}: {c}",
            what.to_lowercase()
        )));
    }
    Ok(Identifier::Name(part.to_string()))
}

impl ObjectReference {
    pub fn parse(reference: &str) -> Result<Self, ArgumentError> {
        let parts: Vec<&str> = reference.trim().split('/').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(ArgumentError::new(format!(
                "Illegal number of separators '/' in object reference {reference}"
            )));
        }
        let workspace = identifier(reference, "Workspace", parts[0], &[':'])?;
        let object = identifier(reference, "Object", parts[1], &[])?;
        let version = match parts.get(2) {
            None => None,
            Some(v) => match v.parse::<u64>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    return Err(ArgumentError::new(format!(
                        "Version must be a positive integer in reference {reference}: {v}"
                    )))
                }
            },
        };
        Ok(Self {
            workspace,
            object,
            version,
        })
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workspace, self.object)?;
        if let Some(v) = self.version {
            write!(f, "/{v}")?;
        }
        Ok(())
    }
}

// -- Resolution -------------------------------------------------------------

/// A reference resolved to one concrete object version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedObject {
    pub workspace_id: u64,
    pub object_id: u64,
    pub version: u64,
    /// Full type string, e.g. `KBaseGenomes.Genome-8.2`.
    pub type_name: String,
}

impl ResolvedObject {
    /// The absolute `wsid/objid/ver` reference.
    pub fn absolute_reference(&self) -> String {
        format!("{}/{}/{}", self.workspace_id, self.object_id, self.version)
    }

    /// Whether `allowed` names this object's type, with or without version.
    fn type_matches(&self, allowed: &str) -> bool {
        let unversioned = self.type_name.split('-').next().unwrap_or(&self.type_name);
        allowed == self.type_name || allowed == unversioned
    }
}

/// Why one reference could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveFailure {
    /// The caller may not read the object.
    Inaccessible(String),
    /// The workspace, object or version does not exist.
    NoObject(String),
}

/// The object store itself failed.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ResolverError {
    message: String,
}

impl ResolverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Batch lookup of object references on behalf of a user.
pub trait ObjectResolver: Send + Sync {
    /// Resolve `references` as the owner of `token`. Returns one outcome per
    /// reference, in order.
    fn resolve(
        &self,
        token: &AuthToken,
        references: &[ObjectReference],
    ) -> Result<Vec<Result<ResolvedObject, ResolveFailure>>, ResolverError>;
}

// -- Handler ----------------------------------------------------------------

/// Factory for `ws` handlers.
#[derive(Clone)]
pub struct WorkspaceIdHandlerFactory {
    resolver: Arc<dyn ObjectResolver>,
}

impl WorkspaceIdHandlerFactory {
    pub fn new(resolver: Arc<dyn ObjectResolver>) -> Self {
        Self { resolver }
    }
}

impl IdReferencePermissionHandlerFactory for WorkspaceIdHandlerFactory {
    fn id_type(&self) -> IdReferenceType {
        IdReferenceType::workspace()
    }

    fn create_permission_handler(&self, _grantee: &ReadGrantee) -> Box<dyn IdReferencePermissionHandler> {
        Box::new(WorkspacePermissionHandler)
    }

    fn dependency_status(&self) -> Vec<DependencyStatus> {
        Vec::new()
    }
}

impl<T: AssociatedObject> IdReferenceHandlerFactory<T> for WorkspaceIdHandlerFactory {
    fn create_handler(&self, token: &AuthToken) -> Box<dyn IdReferenceHandler<T>> {
        Box::new(WorkspaceIdHandler {
            resolver: self.resolver.clone(),
            token: token.clone(),
        })
    }
}

struct WorkspaceIdHandler {
    resolver: Arc<dyn ObjectResolver>,
    token: AuthToken,
}

fn communication_error(message: impl fmt::Display) -> IdReferenceHandlerError {
    IdReferenceHandlerError::handler(
        IdReferenceType::workspace(),
        format!("Workspace communication exception: {message}"),
    )
}

impl WorkspaceIdHandler {
    /// Every attribute set registered for a referencing object must allow
    /// the resolved type.
    fn check_types<T: AssociatedObject>(
        collected: &IdCollector<T>,
        id: &str,
        resolved: &ResolvedObject,
    ) -> Result<(), IdReferenceError> {
        for obj in collected.objects_for(id) {
            for allowed in collected.attribute_sets(obj, id) {
                if allowed.is_empty() || allowed.iter().any(|a| resolved.type_matches(a)) {
                    continue;
                }
                return Err(IdReferenceError::new(
                    format!(
                        "The type {} of reference {} in this object is not allowed - allowed types are [{}]",
                        resolved.type_name,
                        id,
                        allowed.join(", ")
                    ),
                    IdReferenceType::workspace(),
                    obj,
                    id,
                    Some(allowed.clone()),
                ));
            }
        }
        Ok(())
    }
}

impl<T: AssociatedObject> IdReferenceHandler<T> for WorkspaceIdHandler {
    fn id_type(&self) -> IdReferenceType {
        IdReferenceType::workspace()
    }

    fn validate_id(&self, _associated_object: &T, _id: &str, _attributes: Option<&[String]>) -> Result<(), IdReferenceError> {
        Ok(())
    }

    fn process_ids(&mut self, collected: &IdCollector<T>) -> Result<RemapTable, IdReferenceHandlerError> {
        let ids = collected.distinct_ids();
        let references = ids
            .iter()
            .map(|id| {
                ObjectReference::parse(id).map_err(|e| {
                    IdReferenceError::parse(
                        e.to_string(),
                        IdReferenceType::workspace(),
                        referencing_object(collected, id),
                        id.as_str(),
                        None,
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let outcomes = self
            .resolver
            .resolve(&self.token, &references)
            .map_err(communication_error)?;
        if outcomes.len() != references.len() {
            return Err(communication_error(format!(
                "expected {} resolved references, got {}",
                references.len(),
                outcomes.len()
            )));
        }
        debug!(references = references.len(), "resolved workspace references");

        let mut table = RemapTable::new();
        for (id, outcome) in ids.iter().zip(outcomes) {
            let per_id = |message: String| {
                IdReferenceError::new(message, IdReferenceType::workspace(), referencing_object(collected, id), id.as_str(), None)
            };
            let resolved = match outcome {
                Ok(r) => r,
                Err(ResolveFailure::Inaccessible(m)) => return Err(per_id(format!("No read access to id {id}: {m}")).into()),
                Err(ResolveFailure::NoObject(m)) => {
                    return Err(per_id(format!("There is no object with id {id}: {m}")).into())
                }
            };
            Self::check_types(collected, id, &resolved)?;
            table.insert(id.as_str(), RemappedId::new(resolved.absolute_reference()));
        }
        Ok(table)
    }
}

/// Workspace data is shared through workspace permissions, not per object.
struct WorkspacePermissionHandler;

impl IdReferencePermissionHandler for WorkspacePermissionHandler {
    fn id_type(&self) -> IdReferenceType {
        IdReferenceType::workspace()
    }

    fn add_read_permission(&mut self, _ids: &[String]) -> Result<(), PermissionHandlerError> {
        Ok(())
    }
}
