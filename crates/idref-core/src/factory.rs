//! # Handler Factories
//!
//! One factory per external system. The factories are registered once per
//! deployment in an [`IdReferenceHandlerSetFactoryBuilder`]; each call then
//! binds the registry to the caller's credentials and creates a fresh
//! [`IdReferenceHandlerSet`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::AuthToken;
use crate::handler::IdReferenceHandler;
use crate::handler_set::IdReferenceHandlerSet;
use crate::id_type::IdReferenceType;
use crate::permission::{IdReferencePermissionHandler, IdReferencePermissionHandlerSet, ReadGrantee};
use crate::reference::AssociatedObject;
use crate::status::DependencyStatus;

/// Creates read-path permission handlers for one id type.
pub trait IdReferencePermissionHandlerFactory: Send + Sync {
    fn id_type(&self) -> IdReferenceType;

    /// A handler that grants `grantee` read access to ids of this type.
    fn create_permission_handler(&self, grantee: &ReadGrantee) -> Box<dyn IdReferencePermissionHandler>;

    /// Health of the services this factory depends on. Empty when it has no
    /// external dependency.
    fn dependency_status(&self) -> Vec<DependencyStatus>;
}

/// Creates save-path handlers for one id type.
pub trait IdReferenceHandlerFactory<T: AssociatedObject>: IdReferencePermissionHandlerFactory {
    /// A fresh handler bound to the caller's credentials.
    fn create_handler(&self, token: &AuthToken) -> Box<dyn IdReferenceHandler<T>>;
}

type FactoryMap<T> = BTreeMap<IdReferenceType, Arc<dyn IdReferenceHandlerFactory<T>>>;

/// Deployment-wide registry of handler factories plus the per-call id cap.
pub struct IdReferenceHandlerSetFactoryBuilder<T: AssociatedObject> {
    max_unique_ids: usize,
    factories: FactoryMap<T>,
}

impl<T: AssociatedObject> IdReferenceHandlerSetFactoryBuilder<T> {
    /// Start a builder with the given cap on distinct
    /// `(associated object, id)` pairs per call.
    pub fn builder(max_unique_ids: usize) -> Builder<T> {
        Builder {
            max_unique_ids,
            factories: BTreeMap::new(),
        }
    }

    pub fn max_unique_ids(&self) -> usize {
        self.max_unique_ids
    }

    pub fn id_types(&self) -> impl Iterator<Item = &IdReferenceType> {
        self.factories.keys()
    }

    /// Bind the registry to one caller.
    pub fn factory(&self, token: AuthToken) -> IdReferenceHandlerSetFactory<T> {
        IdReferenceHandlerSetFactory {
            max_unique_ids: self.max_unique_ids,
            token,
            factories: self.factories.clone(),
        }
    }

    /// A permission handler set granting `grantee` read access.
    pub fn create_permission_handler(&self, grantee: ReadGrantee) -> IdReferencePermissionHandlerSet {
        let handlers = self
            .factories
            .iter()
            .map(|(t, f)| (t.clone(), f.create_permission_handler(&grantee)))
            .collect();
        IdReferencePermissionHandlerSet::new(grantee, handlers)
    }

    /// Statuses of every registered factory's dependencies, in type order.
    pub fn dependency_status(&self) -> Vec<DependencyStatus> {
        self.factories
            .values()
            .flat_map(|f| f.dependency_status())
            .collect()
    }
}

/// Accumulates factories for an [`IdReferenceHandlerSetFactoryBuilder`].
pub struct Builder<T: AssociatedObject> {
    max_unique_ids: usize,
    factories: FactoryMap<T>,
}

impl<T: AssociatedObject> Builder<T> {
    /// Register a factory. A later factory for the same type replaces the
    /// earlier one.
    pub fn with_factory(mut self, factory: impl IdReferenceHandlerFactory<T> + 'static) -> Self {
        self.factories.insert(factory.id_type(), Arc::new(factory));
        self
    }

    pub fn build(self) -> IdReferenceHandlerSetFactoryBuilder<T> {
        IdReferenceHandlerSetFactoryBuilder {
            max_unique_ids: self.max_unique_ids,
            factories: self.factories,
        }
    }
}

/// The registry bound to one caller's credentials.
pub struct IdReferenceHandlerSetFactory<T: AssociatedObject> {
    max_unique_ids: usize,
    token: AuthToken,
    factories: FactoryMap<T>,
}

impl<T: AssociatedObject> IdReferenceHandlerSetFactory<T> {
    /// Register a factory for this caller only, replacing any factory for
    /// the same type.
    pub fn add_factory(&mut self, factory: impl IdReferenceHandlerFactory<T> + 'static) {
        self.factories.insert(factory.id_type(), Arc::new(factory));
    }

    /// A fresh, empty handler set.
    pub fn create_handlers(&self) -> IdReferenceHandlerSet<T> {
        IdReferenceHandlerSet::new(self.max_unique_ids, self.token.clone(), self.factories.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{IdCollector, RemapTable};
    use crate::error::{IdReferenceError, IdReferenceHandlerError, PermissionHandlerError};
    use crate::reference::{IdReference, RemappedId};

    struct Fixed {
        id_type: &'static str,
        remap_to: &'static str,
    }

    struct FixedHandler(&'static str, &'static str);

    impl IdReferenceHandler<u32> for FixedHandler {
        fn id_type(&self) -> IdReferenceType {
            IdReferenceType::new(self.0).unwrap()
        }

        fn validate_id(&self, _: &u32, _: &str, _: Option<&[String]>) -> Result<(), IdReferenceError> {
            Ok(())
        }

        fn process_ids(&mut self, c: &IdCollector<u32>) -> Result<RemapTable, IdReferenceHandlerError> {
            let mut t = RemapTable::new();
            for id in c.distinct_ids() {
                t.insert(id.clone(), RemappedId::new(self.1));
            }
            Ok(t)
        }
    }

    struct Perms(&'static str);

    impl IdReferencePermissionHandler for Perms {
        fn id_type(&self) -> IdReferenceType {
            IdReferenceType::new(self.0).unwrap()
        }

        fn add_read_permission(&mut self, _: &[String]) -> Result<(), PermissionHandlerError> {
            Ok(())
        }
    }

    impl IdReferencePermissionHandlerFactory for Fixed {
        fn id_type(&self) -> IdReferenceType {
            IdReferenceType::new(self.id_type).unwrap()
        }

        fn create_permission_handler(&self, _: &ReadGrantee) -> Box<dyn IdReferencePermissionHandler> {
            Box::new(Perms(self.id_type))
        }

        fn dependency_status(&self) -> Vec<DependencyStatus> {
            vec![DependencyStatus::healthy(self.id_type, self.remap_to)]
        }
    }

    impl IdReferenceHandlerFactory<u32> for Fixed {
        fn create_handler(&self, _: &AuthToken) -> Box<dyn IdReferenceHandler<u32>> {
            Box::new(FixedHandler(self.id_type, self.remap_to))
        }
    }

    fn token() -> AuthToken {
        AuthToken::new("t", "u").unwrap()
    }

    #[test]
    fn later_factory_replaces_earlier() {
        let b = IdReferenceHandlerSetFactoryBuilder::builder(3)
            .with_factory(Fixed { id_type: "a", remap_to: "first" })
            .with_factory(Fixed { id_type: "a", remap_to: "second" })
            .build();
        assert_eq!(b.max_unique_ids(), 3);
        assert_eq!(b.id_types().count(), 1);

        let mut set = b.factory(token()).create_handlers();
        let a = IdReferenceType::new("a").unwrap();
        set.add_id(&IdReference::new(a.clone(), 1, "x", None).unwrap()).unwrap();
        set.process_ids().unwrap();
        assert_eq!(set.remapped_id(&a, "x").unwrap().id(), "second");
    }

    #[test]
    fn per_call_factories_do_not_leak() {
        let b = IdReferenceHandlerSetFactoryBuilder::builder(3)
            .with_factory(Fixed { id_type: "a", remap_to: "x" })
            .build();
        let mut f = b.factory(token());
        f.add_factory(Fixed { id_type: "b", remap_to: "y" });
        let b_type = IdReferenceType::new("b").unwrap();
        assert!(f.create_handlers().has_handler(&b_type));
        assert!(!b.factory(token()).create_handlers().has_handler(&b_type));
    }

    #[test]
    fn status_and_permission_sets_cover_all_types() {
        let b = IdReferenceHandlerSetFactoryBuilder::<u32>::builder(3)
            .with_factory(Fixed { id_type: "b", remap_to: "2" })
            .with_factory(Fixed { id_type: "a", remap_to: "1" })
            .build();
        let names: Vec<_> = b.dependency_status().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);

        let perms = b.create_permission_handler(ReadGrantee::Public);
        assert_eq!(perms.id_types().len(), 2);
        assert_eq!(perms.grantee(), &ReadGrantee::Public);
    }

    #[test]
    fn fresh_set_per_call() {
        let b = IdReferenceHandlerSetFactoryBuilder::builder(3)
            .with_factory(Fixed { id_type: "a", remap_to: "x" })
            .build();
        let f = b.factory(token());
        let a = IdReferenceType::new("a").unwrap();
        let mut s1 = f.create_handlers();
        s1.add_id(&IdReference::new(a, 1, "x", None).unwrap()).unwrap();
        assert_eq!(s1.size(), 1);
        assert_eq!(f.create_handlers().size(), 0);
    }
}
