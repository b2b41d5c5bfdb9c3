//! # idref-core: ID Reference Resolution Core
//!
//! Typed objects saved to the workspace may embed identifiers of resources
//! that live in other services (Handle Service handles, Shock nodes, samples,
//! other workspace objects). This crate owns the machinery that the object
//! validator drives while walking a document:
//!
//! 1. **Collection.** Every `@id`-annotated value is fed to an
//!    [`IdReferenceHandlerSet`] via [`IdReferenceHandlerSet::add_id`]. The set
//!    dispatches to a per-type [`IdReferenceHandler`], deduplicates
//!    `(associated object, id)` pairs and enforces a global capacity.
//!
//! 2. **Resolution.** [`IdReferenceHandlerSet::process_ids`] runs one batched
//!    resolution pass per type. Each distinct id is resolved at most once no
//!    matter how many objects reference it.
//!
//! 3. **Remapping.** After processing, [`IdReferenceHandlerSet::remapped_id`]
//!    yields the canonical id that is persisted in place of the original.
//!
//! 4. **Read-time propagation.** When objects are read back, an
//!    [`IdReferencePermissionHandlerSet`] grants the reader access to the
//!    external resources. Per-object failures degrade to an
//!    [`ExternalIdError`] diagnostic instead of failing the read.
//!
//! ## Crate Policy
//!
//! - No network code. Variant handlers and their clients live in
//!   `idref-handlers` / `idref-client`.
//! - All handler state is call-scoped: a handler set is created per save or
//!   read call, used from one thread, and dropped afterwards.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod auth;
pub mod collector;
pub mod error;
pub mod factory;
pub mod handler;
pub mod handler_set;
pub mod id_type;
pub mod permission;
pub mod reference;
pub mod status;

// Re-export primary types for ergonomic imports.
pub use auth::AuthToken;
pub use collector::{IdCollector, RemapTable};
pub use error::{
    ArgumentError, BoxError, IdErrorKind, IdRefError, IdReferenceError, IdReferenceHandlerError,
    LifecycleError, NoSuchHandlerError, NoSuchIdError, PermissionHandlerError, TooManyIdsError,
};
pub use factory::{
    Builder, IdReferenceHandlerFactory, IdReferenceHandlerSetFactory,
    IdReferenceHandlerSetFactoryBuilder, IdReferencePermissionHandlerFactory,
};
pub use handler::{HandlerState, IdReferenceHandler, ManagedHandler};
pub use handler_set::IdReferenceHandlerSet;
pub use id_type::IdReferenceType;
pub use permission::{
    propagate_read_permissions, propagate_read_permissions_for_objects, CarriesExternalIds,
    ExternalIdError, ExtractedIds, IdReferencePermissionHandler, IdReferencePermissionHandlerSet,
    ReadGrantee,
};
pub use reference::{AssociatedObject, IdReference, RemappedId};
pub use status::DependencyStatus;
