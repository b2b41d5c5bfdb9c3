//! # Error Types - ID Reference Error Taxonomy
//!
//! All errors use `thiserror`. The `Display` text of each error is the
//! user-facing message returned by the service, so messages are part of the
//! external contract and are asserted verbatim in tests.
//!
//! ## Layers
//!
//! - [`IdReferenceError`]: one specific id is bad (missing, unreadable,
//!   malformed, wrong type). User-actionable.
//! - [`IdReferenceHandlerError`]: a whole id type could not be processed
//!   (backend unreachable, credentials rejected). Wraps the per-id error so a
//!   handler can return either through one `Result`.
//! - [`TooManyIdsError`]: global capacity exceeded. Always fatal.
//! - [`PermissionHandlerError`]: read-path permission propagation failed.
//! - [`IdRefError`]: transparent union for callers that drive a whole set.

use thiserror::Error;

use crate::id_type::IdReferenceType;

/// Boxed error used as the `source` of wrapped downstream failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An illegal argument was supplied to a constructor or method.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ArgumentError(String);

impl ArgumentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Whether a per-id error came from parsing the id or from resolving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdErrorKind {
    /// The id is syntactically invalid for its type.
    Parse,
    /// The id is well formed but does not resolve for this caller.
    Reference,
}

/// A specific id could not be accepted.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct IdReferenceError {
    message: String,
    kind: IdErrorKind,
    id_type: IdReferenceType,
    associated_object: String,
    id: String,
    attributes: Option<Vec<String>>,
    #[source]
    source: Option<BoxError>,
}

impl IdReferenceError {
    /// A per-id resolution failure. `associated_object` is rendered with
    /// `Display` so the error does not need to be generic.
    pub fn new(
        message: impl Into<String>,
        id_type: IdReferenceType,
        associated_object: impl std::fmt::Display,
        id: impl Into<String>,
        attributes: Option<Vec<String>>,
    ) -> Self {
        Self {
            message: message.into(),
            kind: IdErrorKind::Reference,
            id_type,
            associated_object: associated_object.to_string(),
            id: id.into(),
            attributes,
            source: None,
        }
    }

    /// A per-id parse failure.
    pub fn parse(
        message: impl Into<String>,
        id_type: IdReferenceType,
        associated_object: impl std::fmt::Display,
        id: impl Into<String>,
        attributes: Option<Vec<String>>,
    ) -> Self {
        Self {
            kind: IdErrorKind::Parse,
            ..Self::new(message, id_type, associated_object, id, attributes)
        }
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> IdErrorKind {
        self.kind
    }

    pub fn id_type(&self) -> &IdReferenceType {
        &self.id_type
    }

    pub fn associated_object(&self) -> &str {
        &self.associated_object
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attributes(&self) -> Option<&[String]> {
        self.attributes.as_deref()
    }
}

/// Failure of a handler: either one id is bad, or the whole type failed.
#[derive(Error, Debug)]
pub enum IdReferenceHandlerError {
    #[error(transparent)]
    Reference(Box<IdReferenceError>),

    /// Systemic failure reaching the backing service. `message` already
    /// carries the category prefix.
    #[error("{message}")]
    Handler {
        id_type: IdReferenceType,
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl IdReferenceHandlerError {
    pub fn handler(id_type: IdReferenceType, message: impl Into<String>) -> Self {
        Self::Handler {
            id_type,
            message: message.into(),
            source: None,
        }
    }

    pub fn handler_with_source(
        id_type: IdReferenceType,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Handler {
            id_type,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The offending id, for per-id failures.
    pub fn as_reference_error(&self) -> Option<&IdReferenceError> {
        match self {
            Self::Reference(e) => Some(e),
            Self::Handler { .. } => None,
        }
    }

    pub fn id_type(&self) -> &IdReferenceType {
        match self {
            Self::Reference(e) => e.id_type(),
            Self::Handler { id_type, .. } => id_type,
        }
    }
}

impl From<IdReferenceError> for IdReferenceHandlerError {
    fn from(e: IdReferenceError) -> Self {
        Self::Reference(Box::new(e))
    }
}

/// The set-wide count of distinct `(associated object, id)` pairs would
/// exceed its cap.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Maximum ID count of {max} exceeded")]
pub struct TooManyIdsError {
    pub max: usize,
}

/// A remap lookup named an id that was never added, or ran before
/// processing completed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("No such ID contained in this mapper: {id}")]
pub struct NoSuchIdError {
    pub id: String,
}

impl NoSuchIdError {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// No factory is registered for an id type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("There is no handler registered for the ID type {id_type}")]
pub struct NoSuchHandlerError {
    pub id_type: IdReferenceType,
}

/// Misuse of the one-shot handler / handler set lifecycle.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("This handler is locked")]
    HandlerLocked,

    #[error("This ID handler set instance is locked")]
    SetLocked,

    #[error("IDs haven't been processed yet")]
    NotProcessed,

    #[error("A previous attempt to process IDs failed")]
    ProcessingFailed,
}

/// Read-path permission propagation failed.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct PermissionHandlerError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl PermissionHandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Any failure raised while driving a handler set or permission set.
#[derive(Error, Debug)]
pub enum IdRefError {
    #[error(transparent)]
    Argument(#[from] ArgumentError),

    #[error(transparent)]
    Handler(#[from] IdReferenceHandlerError),

    #[error(transparent)]
    TooManyIds(#[from] TooManyIdsError),

    #[error(transparent)]
    NoSuchId(#[from] NoSuchIdError),

    #[error(transparent)]
    NoSuchHandler(#[from] NoSuchHandlerError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Permission(#[from] PermissionHandlerError),
}

impl From<IdReferenceError> for IdRefError {
    fn from(e: IdReferenceError) -> Self {
        Self::Handler(e.into())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn messages_are_verbatim() {
        assert_eq!(
            TooManyIdsError { max: 4 }.to_string(),
            "Maximum ID count of 4 exceeded"
        );
        assert_eq!(
            NoSuchIdError::new("foo").to_string(),
            "No such ID contained in this mapper: foo"
        );
        assert_eq!(
            NoSuchHandlerError {
                id_type: IdReferenceType::new("x").unwrap()
            }
            .to_string(),
            "There is no handler registered for the ID type x"
        );
        assert_eq!(LifecycleError::HandlerLocked.to_string(), "This handler is locked");
    }

    #[test]
    fn reference_error_carries_context() {
        let e = IdReferenceError::parse(
            "Illegal shock ID: nope",
            IdReferenceType::shock(),
            "obj/1",
            "nope",
            Some(vec!["attr".into()]),
        );
        assert_eq!(e.kind(), IdErrorKind::Parse);
        assert_eq!(e.associated_object(), "obj/1");
        assert_eq!(e.id(), "nope");
        assert_eq!(e.attributes().map(|a| a.len()), Some(1));
        assert_eq!(e.to_string(), "Illegal shock ID: nope");
    }

    #[test]
    fn handler_error_is_transparent_over_reference() {
        let inner = IdReferenceError::new("bad", IdReferenceType::handle(), "o", "h", None);
        let e: IdReferenceHandlerError = inner.into();
        assert_eq!(e.to_string(), "bad");
        assert!(e.as_reference_error().is_some());
        assert_eq!(e.id_type(), &IdReferenceType::handle());

        let top: IdRefError = e.into();
        assert_eq!(top.to_string(), "bad");
    }

    #[test]
    fn handler_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
        let e = IdReferenceHandlerError::handler_with_source(
            IdReferenceType::shock(),
            "There was an IO problem: connection reset",
            io,
        );
        assert_eq!(e.source().map(|s| s.to_string()), Some("connection reset".into()));
    }
}
