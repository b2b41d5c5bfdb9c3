//! # ID Reference Types
//!
//! An [`IdReferenceType`] names the namespace an embedded id belongs to and
//! therefore which handler processes it. The binding from a schema annotation
//! such as `/* @id handle */` to a type string is owned by the type compiler;
//! the well-known strings below are the stable contract with it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ArgumentError;

/// The namespace of an embedded external id.
///
/// Equality and ordering are by the type string.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdReferenceType(String);

impl IdReferenceType {
    /// Create a type, rejecting empty or whitespace-only strings.
    pub fn new(id_type: impl Into<String>) -> Result<Self, ArgumentError> {
        let id_type = id_type.into();
        if id_type.trim().is_empty() {
            return Err(ArgumentError::new("type cannot be null or whitespace only"));
        }
        Ok(Self(id_type))
    }

    /// Handle Service handles (`@id handle`).
    pub fn handle() -> Self {
        Self("handle".to_string())
    }

    /// Shock nodes the workspace copies on ingest (`@id shock`).
    pub fn shock() -> Self {
        Self("shock".to_string())
    }

    /// Blobstore nodes the workspace takes ownership of (`@id bytestream`).
    pub fn bytestream() -> Self {
        Self("bytestream".to_string())
    }

    /// Sample Service samples (`@id sample`).
    pub fn sample() -> Self {
        Self("sample".to_string())
    }

    /// References to other workspace objects (`@id ws`).
    pub fn workspace() -> Self {
        Self("ws".to_string())
    }

    /// The raw type string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for IdReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IDReferenceType [type={}]", self.0)
    }
}

impl TryFrom<String> for IdReferenceType {
    type Error = ArgumentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<IdReferenceType> for String {
    fn from(value: IdReferenceType) -> Self {
        value.0
    }
}
