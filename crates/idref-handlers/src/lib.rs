//! # idref-handlers: ID Reference Handler Variants
//!
//! One [`IdReferenceHandlerFactory`](idref_core::IdReferenceHandlerFactory)
//! per external id type:
//!
//! | Type         | Factory                          | Resolution                                   |
//! |--------------|----------------------------------|----------------------------------------------|
//! | `handle`     | [`HandleIdHandlerFactory`]       | one bulk readability check, identity remap   |
//! | `shock`      | [`ShockIdHandlerFactory`]        | ACL check, then reconcile or copy-on-ingest  |
//! | `bytestream` | [`BytestreamIdHandlerFactory`]   | owner check, then take ownership in place    |
//! | `sample`     | [`SampleIdHandlerFactory`]       | per-sample admin check, identity remap       |
//! | `ws`         | [`WorkspaceIdHandlerFactory`]    | batched lookup, remap to absolute reference  |
//!
//! A factory built without its service still registers its type: any id of
//! that type is then rejected when it is added, with a message naming the
//! missing connection.
//!
//! [`registry::factory_builder`] assembles all of them from an
//! [`ExternalServicesConfig`](idref_client::ExternalServicesConfig).

pub mod bytestream;
pub mod handle;
pub mod registry;
pub mod sample;
pub mod shock;
pub mod workspace;

pub use bytestream::BytestreamIdHandlerFactory;
pub use handle::HandleIdHandlerFactory;
pub use registry::{factory_builder, RegistryError};
pub use sample::SampleIdHandlerFactory;
pub use shock::ShockIdHandlerFactory;
pub use workspace::{
    Identifier, ObjectReference, ObjectResolver, ResolveFailure, ResolvedObject, ResolverError,
    WorkspaceIdHandlerFactory,
};

use idref_core::IdCollector;

/// The object named in per-id errors: the first one that referenced `id`.
pub(crate) fn referencing_object<T: idref_core::AssociatedObject>(collected: &IdCollector<T>, id: &str) -> String {
    collected
        .first_object(id)
        .map(ToString::to_string)
        .unwrap_or_default()
}
