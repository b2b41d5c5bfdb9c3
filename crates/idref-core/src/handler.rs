//! # ID Reference Handlers
//!
//! A handler collects the ids of one [`IdReferenceType`] found while a call's
//! objects are validated and resolves them in one batched pass.
//!
//! Variants implement [`IdReferenceHandler`]: a type-local syntactic check
//! per id and a resolution pass over the collected ids. The lifecycle and the
//! dedup / remap bookkeeping are enforced once for every variant by
//! [`ManagedHandler`]:
//!
//! ```text
//!   Collecting ──lock()──▶ Locked
//!       │                    │
//!       └──── process_ids() ─┴──▶ Processed
//!                            └──▶ Failed
//! ```

use std::collections::BTreeSet;

use tracing::debug;

use crate::collector::{IdCollector, RemapTable};
use crate::error::{
    IdRefError, IdReferenceError, IdReferenceHandlerError, LifecycleError, NoSuchIdError,
};
use crate::id_type::IdReferenceType;
use crate::reference::{AssociatedObject, RemappedId};

/// One id type's collector and resolver. Created per call, bound to the
/// calling user's credentials by its factory.
pub trait IdReferenceHandler<T: AssociatedObject>: Send {
    /// The type this handler processes.
    fn id_type(&self) -> IdReferenceType;

    /// Type-local check run on every id before it is collected, e.g. that a
    /// Shock id is a UUID. Must not perform network calls.
    fn validate_id(
        &self,
        associated_object: &T,
        id: &str,
        attributes: Option<&[String]>,
    ) -> Result<(), IdReferenceError>;

    /// Resolve every distinct id in `collected`, returning a table holding
    /// an entry for each of them. Called at most once per handler and never
    /// with an empty collector.
    fn process_ids(&mut self, collected: &IdCollector<T>) -> Result<RemapTable, IdReferenceHandlerError>;
}

/// Lifecycle state of a [`ManagedHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Collecting,
    Locked,
    Processed,
    Failed,
}

/// A variant handler plus its bookkeeping and lifecycle.
pub struct ManagedHandler<T: AssociatedObject> {
    inner: Box<dyn IdReferenceHandler<T>>,
    id_type: IdReferenceType,
    collected: IdCollector<T>,
    remapped: RemapTable,
    state: HandlerState,
}

impl<T: AssociatedObject> ManagedHandler<T> {
    pub fn new(inner: Box<dyn IdReferenceHandler<T>>) -> Self {
        let id_type = inner.id_type();
        Self {
            inner,
            id_type,
            collected: IdCollector::new(),
            remapped: RemapTable::new(),
            state: HandlerState::Collecting,
        }
    }

    pub fn id_type(&self) -> &IdReferenceType {
        &self.id_type
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    /// Add an id. Returns `true` if the `(associated_object, id)` pair is new.
    pub fn add_id(
        &mut self,
        associated_object: &T,
        id: &str,
        attributes: Option<&[String]>,
    ) -> Result<bool, IdRefError> {
        if self.state != HandlerState::Collecting {
            return Err(LifecycleError::HandlerLocked.into());
        }
        self.inner.validate_id(associated_object, id, attributes)?;
        Ok(self.collected.add(associated_object, id, attributes))
    }

    pub fn contains(&self, associated_object: &T, id: &str) -> bool {
        self.collected.contains(associated_object, id)
    }

    /// Stop accepting ids without processing them.
    pub fn lock(&mut self) {
        if self.state == HandlerState::Collecting {
            self.state = HandlerState::Locked;
        }
    }

    /// Resolve the collected ids. One-shot: repeating after success is a
    /// no-op, repeating after a failure errors.
    pub fn process_ids(&mut self) -> Result<(), IdRefError> {
        match self.state {
            HandlerState::Processed => return Ok(()),
            HandlerState::Failed => return Err(LifecycleError::ProcessingFailed.into()),
            HandlerState::Collecting | HandlerState::Locked => {}
        }
        if self.collected.is_empty() {
            self.state = HandlerState::Processed;
            return Ok(());
        }
        debug!(
            id_type = %self.id_type,
            distinct_ids = self.collected.distinct_ids().len(),
            references = self.collected.len(),
            "processing ids"
        );
        let table = match self.inner.process_ids(&self.collected) {
            Ok(table) => table,
            Err(e) => {
                self.state = HandlerState::Failed;
                return Err(e.into());
            }
        };
        if let Some(missing) = self
            .collected
            .distinct_ids()
            .iter()
            .find(|id| !table.contains(id))
        {
            self.state = HandlerState::Failed;
            return Err(IdReferenceHandlerError::handler(
                self.id_type.clone(),
                format!("The {} handler did not resolve id {}", self.id_type, missing),
            )
            .into());
        }
        self.remapped = table;
        self.state = HandlerState::Processed;
        Ok(())
    }

    pub fn were_ids_processed(&self) -> bool {
        self.state == HandlerState::Processed
    }

    /// The remapped form of `id`.
    pub fn remapped_id(&self, id: &str) -> Result<RemappedId, NoSuchIdError> {
        if self.state != HandlerState::Processed {
            return Err(NoSuchIdError::new(id));
        }
        self.remapped.get(id).cloned()
    }

    /// Remapped ids of every id `associated_object` referenced. Empty for an
    /// object with no ids of this type.
    pub fn remapped_ids(&self, associated_object: &T) -> Result<BTreeSet<RemappedId>, LifecycleError> {
        if self.state != HandlerState::Processed {
            return Err(LifecycleError::NotProcessed);
        }
        Ok(self.remapped.remap_all(self.collected.ids_for(associated_object)))
    }

    /// Every distinct remapped id across all objects.
    pub fn all_remapped_ids(&self) -> Result<BTreeSet<RemappedId>, LifecycleError> {
        if self.state != HandlerState::Processed {
            return Err(LifecycleError::NotProcessed);
        }
        Ok(self.remapped.values())
    }

    pub fn collected(&self) -> &IdCollector<T> {
        &self.collected
    }
}

impl<T: AssociatedObject> std::fmt::Debug for ManagedHandler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedHandler")
            .field("id_type", &self.id_type)
            .field("state", &self.state)
            .field("pairs", &self.collected.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Uppercases ids; rejects ids containing a space.
    struct Upper {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl IdReferenceHandler<String> for Upper {
        fn id_type(&self) -> IdReferenceType {
            IdReferenceType::new("upper").unwrap()
        }

        fn validate_id(
            &self,
            associated_object: &String,
            id: &str,
            attributes: Option<&[String]>,
        ) -> Result<(), IdReferenceError> {
            if id.contains(' ') {
                return Err(IdReferenceError::parse(
                    format!("Illegal upper ID: {id}"),
                    self.id_type(),
                    associated_object,
                    id,
                    attributes.map(<[String]>::to_vec),
                ));
            }
            Ok(())
        }

        fn process_ids(
            &mut self,
            collected: &IdCollector<String>,
        ) -> Result<RemapTable, IdReferenceHandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(IdReferenceHandlerError::handler(self.id_type(), "backend down"));
            }
            let mut t = RemapTable::new();
            for id in collected.distinct_ids() {
                t.insert(id.clone(), RemappedId::new(id.to_uppercase()));
            }
            Ok(t)
        }
    }

    fn managed(fail: bool) -> (ManagedHandler<String>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let h = ManagedHandler::new(Box::new(Upper {
            calls: calls.clone(),
            fail,
        }));
        (h, calls)
    }

    #[test]
    fn collect_process_lookup() {
        let (mut h, calls) = managed(false);
        let foo = "foo".to_string();
        let bar = "bar".to_string();
        assert!(h.add_id(&foo, "a", None).unwrap());
        assert!(!h.add_id(&foo, "a", None).unwrap());
        assert!(h.add_id(&bar, "a", None).unwrap());
        assert!(h.add_id(&bar, "b", None).unwrap());

        assert_eq!(h.remapped_id("a").unwrap_err().to_string(), "No such ID contained in this mapper: a");
        assert_eq!(h.remapped_ids(&foo).unwrap_err(), LifecycleError::NotProcessed);

        h.process_ids().unwrap();
        h.process_ids().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(h.were_ids_processed());

        assert_eq!(h.remapped_id("a").unwrap().id(), "A");
        let bar_ids: Vec<_> = h.remapped_ids(&bar).unwrap().into_iter().map(RemappedId::into_inner).collect();
        assert_eq!(bar_ids, vec!["A", "B"]);
        assert!(h.remapped_ids(&"baz".to_string()).unwrap().is_empty());
        assert!(h.remapped_id("c").is_err());
    }

    #[test]
    fn add_after_processing_is_locked() {
        let (mut h, _) = managed(false);
        h.add_id(&"o".to_string(), "a", None).unwrap();
        h.process_ids().unwrap();
        let err = h.add_id(&"o".to_string(), "b", None).unwrap_err();
        assert_eq!(err.to_string(), "This handler is locked");
    }

    #[test]
    fn lock_blocks_adds_but_allows_processing() {
        let (mut h, calls) = managed(false);
        h.add_id(&"o".to_string(), "a", None).unwrap();
        h.lock();
        assert_eq!(h.state(), HandlerState::Locked);
        assert!(h.add_id(&"o".to_string(), "b", None).is_err());
        h.process_ids().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_handler_never_calls_variant() {
        let (mut h, calls) = managed(true);
        h.process_ids().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(h.were_ids_processed());
    }

    #[test]
    fn failure_is_sticky() {
        let (mut h, calls) = managed(true);
        h.add_id(&"o".to_string(), "a", None).unwrap();
        assert_eq!(h.process_ids().unwrap_err().to_string(), "backend down");
        assert_eq!(h.state(), HandlerState::Failed);
        assert_eq!(
            h.process_ids().unwrap_err().to_string(),
            LifecycleError::ProcessingFailed.to_string()
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(h.remapped_id("a").is_err());
    }

    #[test]
    fn validation_failure_does_not_collect() {
        let (mut h, _) = managed(false);
        let err = h.add_id(&"o".to_string(), "a b", None).unwrap_err();
        assert_eq!(err.to_string(), "Illegal upper ID: a b");
        assert!(h.collected().is_empty());
    }
}
