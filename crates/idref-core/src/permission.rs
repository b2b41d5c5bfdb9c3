//! # Read-Path Permission Propagation
//!
//! When objects are returned from a read, the user must be able to fetch the
//! external resources they reference directly from the owning services. The
//! [`IdReferencePermissionHandlerSet`] grants that access per id type.
//!
//! Hard failures (misconfiguration, outages) surface as
//! [`PermissionHandlerError`]; [`propagate_read_permissions`] turns them into
//! an [`ExternalIdError`] attached to the object so one bad reference does not
//! fail a bulk read.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{IdRefError, NoSuchHandlerError, PermissionHandlerError};
use crate::id_type::IdReferenceType;

/// Per type, the external ids an object references.
pub type ExtractedIds = BTreeMap<IdReferenceType, Vec<String>>;

/// Who is granted read access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadGrantee {
    /// Anonymous or globally readable access: make the resource public.
    Public,
    /// A named user.
    User(String),
}

impl fmt::Display for ReadGrantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::User(u) => f.write_str(u),
        }
    }
}

/// Grants read access to ids of one type. Implementations must make no
/// downstream call for an empty `ids` slice.
pub trait IdReferencePermissionHandler: Send {
    fn id_type(&self) -> IdReferenceType;

    fn add_read_permission(&mut self, ids: &[String]) -> Result<(), PermissionHandlerError>;
}

/// Permission handlers for every registered type, bound to one grantee.
pub struct IdReferencePermissionHandlerSet {
    grantee: ReadGrantee,
    handlers: BTreeMap<IdReferenceType, Box<dyn IdReferencePermissionHandler>>,
}

impl IdReferencePermissionHandlerSet {
    pub(crate) fn new(
        grantee: ReadGrantee,
        handlers: BTreeMap<IdReferenceType, Box<dyn IdReferencePermissionHandler>>,
    ) -> Self {
        Self { grantee, handlers }
    }

    pub fn grantee(&self) -> &ReadGrantee {
        &self.grantee
    }

    pub fn has_handler(&self, id_type: &IdReferenceType) -> bool {
        self.handlers.contains_key(id_type)
    }

    pub fn id_types(&self) -> BTreeSet<IdReferenceType> {
        self.handlers.keys().cloned().collect()
    }

    /// Grant read access to `ids` of `id_type`.
    ///
    /// An empty slice returns before any handler is touched.
    pub fn add_read_permission(&mut self, id_type: &IdReferenceType, ids: &[String]) -> Result<(), IdRefError> {
        let handler = self
            .handlers
            .get_mut(id_type)
            .ok_or_else(|| NoSuchHandlerError {
                id_type: id_type.clone(),
            })?;
        if ids.iter().any(|id| id.trim().is_empty()) {
            return Err(PermissionHandlerError::new("Null or whitespace only string in collection ids").into());
        }
        if ids.is_empty() {
            return Ok(());
        }
        debug!(id_type = %id_type, ids = ids.len(), grantee = %self.grantee, "granting read permission");
        handler.add_read_permission(ids)?;
        Ok(())
    }
}

impl fmt::Debug for IdReferencePermissionHandlerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdReferencePermissionHandlerSet")
            .field("grantee", &self.grantee)
            .field("id_types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A soft diagnostic attached to an object whose external ids could not be
/// shared with the reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdError {
    /// The failure message.
    pub error: String,
    /// The failure followed by each underlying cause.
    pub trace: Vec<String>,
}

impl ExternalIdError {
    pub fn from_error(e: &(dyn std::error::Error + 'static)) -> Self {
        let mut trace = vec![e.to_string()];
        let mut cur = e.source();
        while let Some(s) = cur {
            trace.push(s.to_string());
            cur = s.source();
        }
        Self {
            error: e.to_string(),
            trace,
        }
    }
}

/// Grant read access to every extracted id of one object.
///
/// Never fails: the first error becomes the returned diagnostic and the
/// remaining types are skipped.
pub fn propagate_read_permissions(
    set: &mut IdReferencePermissionHandlerSet,
    extracted_ids: &ExtractedIds,
) -> Option<ExternalIdError> {
    for (id_type, ids) in extracted_ids {
        if let Err(e) = set.add_read_permission(id_type, ids) {
            warn!(id_type = %id_type, error = %e, "could not propagate read permissions");
            return Some(ExternalIdError::from_error(&e));
        }
    }
    None
}

/// A read result that carries the external ids of the object it wraps and
/// can hold a permission diagnostic.
pub trait CarriesExternalIds {
    fn extracted_ids(&self) -> &ExtractedIds;

    fn set_external_id_error(&mut self, error: ExternalIdError);
}

/// Propagate read permissions for every object in a bulk read. Returns the
/// number of objects that received a diagnostic; all objects are kept.
pub fn propagate_read_permissions_for_objects<O: CarriesExternalIds>(
    set: &mut IdReferencePermissionHandlerSet,
    objects: &mut [O],
) -> usize {
    let mut failed = 0;
    for obj in objects.iter_mut() {
        if let Some(err) = propagate_read_permissions(set, obj.extracted_ids()) {
            obj.set_external_id_error(err);
            failed += 1;
        }
    }
    failed
}
