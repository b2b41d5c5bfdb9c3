//! # Handler Set
//!
//! The per-call aggregator the object validator drives. It owns one
//! [`ManagedHandler`] per id type in use, created lazily from the registered
//! factories, and enforces the call-wide cap on distinct
//! `(associated object, id)` pairs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::warn;

use crate::auth::AuthToken;
use crate::error::{IdRefError, LifecycleError, NoSuchHandlerError, NoSuchIdError, TooManyIdsError};
use crate::factory::IdReferenceHandlerFactory;
use crate::handler::ManagedHandler;
use crate::id_type::IdReferenceType;
use crate::permission::ExtractedIds;
use crate::reference::{AssociatedObject, IdReference, RemappedId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetState {
    Collecting,
    Locked,
    Processed,
    Failed,
}

/// Collects, caps and resolves the external ids of one save or read call.
///
/// Not shared across calls or threads. Obtain one from
/// [`IdReferenceHandlerSetFactory::create_handlers`](crate::IdReferenceHandlerSetFactory::create_handlers).
pub struct IdReferenceHandlerSet<T: AssociatedObject> {
    max_id_count: usize,
    id_count: usize,
    state: SetState,
    token: AuthToken,
    factories: BTreeMap<IdReferenceType, Arc<dyn IdReferenceHandlerFactory<T>>>,
    handlers: BTreeMap<IdReferenceType, ManagedHandler<T>>,
}

impl<T: AssociatedObject> IdReferenceHandlerSet<T> {
    pub(crate) fn new(
        max_id_count: usize,
        token: AuthToken,
        factories: BTreeMap<IdReferenceType, Arc<dyn IdReferenceHandlerFactory<T>>>,
    ) -> Self {
        Self {
            max_id_count,
            id_count: 0,
            state: SetState::Collecting,
            token,
            factories,
            handlers: BTreeMap::new(),
        }
    }

    /// Whether a factory is registered for `id_type`.
    pub fn has_handler(&self, id_type: &IdReferenceType) -> bool {
        self.factories.contains_key(id_type)
    }

    /// Every id type this set can process.
    pub fn id_types(&self) -> BTreeSet<IdReferenceType> {
        self.factories.keys().cloned().collect()
    }

    /// The number of distinct `(associated object, id)` pairs collected.
    pub fn size(&self) -> usize {
        self.id_count
    }

    pub fn is_empty(&self) -> bool {
        self.id_count == 0
    }

    pub fn max_id_count(&self) -> usize {
        self.max_id_count
    }

    /// Add an id found in an object. Returns `true` if the
    /// `(associated object, id)` pair had not been added before.
    ///
    /// A new pair arriving when the set already holds `max_id_count` pairs
    /// fails with [`TooManyIdsError`]; that pair is not counted and the set
    /// accepts no further ids.
    pub fn add_id(&mut self, reference: &IdReference<T>) -> Result<bool, IdRefError> {
        if self.state != SetState::Collecting {
            return Err(LifecycleError::SetLocked.into());
        }
        let id_type = reference.id_type();
        let factory = self
            .factories
            .get(id_type)
            .ok_or_else(|| NoSuchHandlerError {
                id_type: id_type.clone(),
            })?;
        let token = &self.token;
        let handler = self
            .handlers
            .entry(id_type.clone())
            .or_insert_with(|| ManagedHandler::new(factory.create_handler(token)));

        let obj = reference.associated_object();
        if !handler.contains(obj, reference.id()) && self.id_count >= self.max_id_count {
            warn!(max = self.max_id_count, id_type = %id_type, "id capacity exceeded");
            self.state = SetState::Locked;
            for h in self.handlers.values_mut() {
                h.lock();
            }
            return Err(TooManyIdsError {
                max: self.max_id_count,
            }
            .into());
        }
        let added = handler.add_id(obj, reference.id(), reference.attributes())?;
        if added {
            self.id_count += 1;
        }
        Ok(added)
    }

    /// Stop accepting ids. Processing is still allowed.
    pub fn lock(&mut self) {
        if self.state == SetState::Collecting {
            self.state = SetState::Locked;
            for h in self.handlers.values_mut() {
                h.lock();
            }
        }
    }

    /// Resolve all collected ids, one batched pass per id type.
    ///
    /// Fail-fast: the first handler error aborts processing and no remapped
    /// ids are available afterwards. Repeating a successful call is a no-op.
    pub fn process_ids(&mut self) -> Result<(), IdRefError> {
        match self.state {
            SetState::Processed => return Ok(()),
            SetState::Failed => return Err(LifecycleError::ProcessingFailed.into()),
            SetState::Collecting | SetState::Locked => {}
        }
        for handler in self.handlers.values_mut() {
            if let Err(e) = handler.process_ids() {
                self.state = SetState::Failed;
                return Err(e);
            }
        }
        self.state = SetState::Processed;
        Ok(())
    }

    pub fn were_ids_processed(&self) -> bool {
        self.state == SetState::Processed
    }

    /// The remapped form of an id of the given type.
    pub fn remapped_id(&self, id_type: &IdReferenceType, id: &str) -> Result<RemappedId, IdRefError> {
        if !self.has_handler(id_type) {
            return Err(NoSuchHandlerError {
                id_type: id_type.clone(),
            }
            .into());
        }
        if self.state != SetState::Processed {
            return Err(NoSuchIdError::new(id).into());
        }
        match self.handlers.get(id_type) {
            Some(h) => Ok(h.remapped_id(id)?),
            None => Err(NoSuchIdError::new(id).into()),
        }
    }

    /// The remapped ids of the given type referenced by `associated_object`.
    pub fn remapped_ids(
        &self,
        id_type: &IdReferenceType,
        associated_object: &T,
    ) -> Result<BTreeSet<RemappedId>, IdRefError> {
        if !self.has_handler(id_type) {
            return Err(NoSuchHandlerError {
                id_type: id_type.clone(),
            }
            .into());
        }
        if self.state != SetState::Processed {
            return Err(LifecycleError::NotProcessed.into());
        }
        match self.handlers.get(id_type) {
            Some(h) => Ok(h.remapped_ids(associated_object)?),
            None => Ok(BTreeSet::new()),
        }
    }

    /// Per type, the distinct remapped ids across every object in the call.
    /// Types with no ids are omitted.
    pub fn extracted_ids(&self) -> Result<ExtractedIds, LifecycleError> {
        if self.state != SetState::Processed {
            return Err(LifecycleError::NotProcessed);
        }
        let mut out = ExtractedIds::new();
        for (t, h) in &self.handlers {
            let ids = h.all_remapped_ids()?;
            if !ids.is_empty() {
                out.insert(t.clone(), ids.into_iter().map(RemappedId::into_inner).collect());
            }
        }
        Ok(out)
    }

    /// Per type, the distinct remapped ids referenced by one object. This is
    /// what the save path stores alongside the object for later reads.
    pub fn extracted_ids_for(&self, associated_object: &T) -> Result<ExtractedIds, LifecycleError> {
        if self.state != SetState::Processed {
            return Err(LifecycleError::NotProcessed);
        }
        let mut out = ExtractedIds::new();
        for (t, h) in &self.handlers {
            let ids = h.remapped_ids(associated_object)?;
            if !ids.is_empty() {
                out.insert(t.clone(), ids.into_iter().map(RemappedId::into_inner).collect());
            }
        }
        Ok(out)
    }
}

impl<T: AssociatedObject> std::fmt::Debug for IdReferenceHandlerSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdReferenceHandlerSet")
            .field("max_id_count", &self.max_id_count)
            .field("id_count", &self.id_count)
            .field("state", &self.state)
            .field("user", &self.token.user_name())
            .field("handlers", &self.handlers)
            .finish()
    }
}
