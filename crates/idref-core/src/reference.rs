//! # Reference Value Types
//!
//! [`IdReference`] is what the object validator hands to the handler set for
//! every id-typed field it finds. [`RemappedId`] is what the handler set hands
//! back after processing.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::error::ArgumentError;
use crate::id_type::IdReferenceType;

/// Key identifying the document (or sub-path of a document) an id came from.
///
/// Blanket-implemented for any owned, hashable, displayable type. `Display`
/// is used when an error needs to name the offending object.
pub trait AssociatedObject: Clone + Eq + Hash + fmt::Display + 'static {}

impl<T> AssociatedObject for T where T: Clone + Eq + Hash + fmt::Display + 'static {}

/// A single embedded id discovered while validating a typed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdReference<T> {
    id_type: IdReferenceType,
    associated_object: T,
    id: String,
    attributes: Option<Vec<String>>,
}

impl<T> IdReference<T> {
    /// Create a reference. `attributes` is passed through to the handler
    /// unchanged; most handlers ignore it.
    pub fn new(
        id_type: IdReferenceType,
        associated_object: T,
        id: impl Into<String>,
        attributes: Option<Vec<String>>,
    ) -> Result<Self, ArgumentError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ArgumentError::new("id cannot be null or whitespace only"));
        }
        Ok(Self {
            id_type,
            associated_object,
            id,
            attributes,
        })
    }

    pub fn id_type(&self) -> &IdReferenceType {
        &self.id_type
    }

    pub fn associated_object(&self) -> &T {
        &self.associated_object
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attributes(&self) -> Option<&[String]> {
        self.attributes.as_deref()
    }
}

/// The canonical, post-resolution form of an id.
///
/// For most types this equals the original id; Shock ids remap to the
/// workspace-owned copy of a node, workspace references to an absolute
/// `wsid/objid/ver` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemappedId(String);

impl RemappedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RemappedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
