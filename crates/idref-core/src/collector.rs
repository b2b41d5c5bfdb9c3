//! # Per-Handler Bookkeeping
//!
//! Every handler variant needs the same three structures while collecting:
//! a dedup set of `(associated object, id)` pairs for capacity accounting, a
//! multimap from each distinct id to the objects referencing it so one
//! resolution serves them all, and, after processing, the id → remapped id
//! table. They live here so variants only implement resolution.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::NoSuchIdError;
use crate::reference::{AssociatedObject, RemappedId};

/// Collected ids for one id type within one call.
#[derive(Debug, Clone)]
pub struct IdCollector<T: AssociatedObject> {
    pairs: HashSet<(T, String)>,
    /// Distinct ids in first-seen order.
    ids: Vec<String>,
    objects_by_id: HashMap<String, Vec<T>>,
    ids_by_object: HashMap<T, Vec<String>>,
    /// Distinct attribute lists seen for each pair.
    attributes: HashMap<(T, String), Vec<Vec<String>>>,
}

impl<T: AssociatedObject> Default for IdCollector<T> {
    fn default() -> Self {
        Self {
            pairs: HashSet::new(),
            ids: Vec::new(),
            objects_by_id: HashMap::new(),
            ids_by_object: HashMap::new(),
            attributes: HashMap::new(),
        }
    }
}

impl<T: AssociatedObject> IdCollector<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pair. Returns `true` if the pair had not been seen before.
    ///
    /// Attributes are recorded even for repeated pairs; identical attribute
    /// lists are stored once.
    pub fn add(&mut self, associated_object: &T, id: &str, attributes: Option<&[String]>) -> bool {
        let key = (associated_object.clone(), id.to_string());
        if let Some(attrs) = attributes {
            let sets = self.attributes.entry(key.clone()).or_default();
            if !sets.iter().any(|s| s.as_slice() == attrs) {
                sets.push(attrs.to_vec());
            }
        }
        if !self.pairs.insert(key) {
            return false;
        }
        if !self.objects_by_id.contains_key(id) {
            self.ids.push(id.to_string());
        }
        self.objects_by_id
            .entry(id.to_string())
            .or_default()
            .push(associated_object.clone());
        self.ids_by_object
            .entry(associated_object.clone())
            .or_default()
            .push(id.to_string());
        true
    }

    pub fn contains(&self, associated_object: &T, id: &str) -> bool {
        self.pairs.contains(&(associated_object.clone(), id.to_string()))
    }

    /// Number of distinct pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Distinct ids in the order they were first added.
    pub fn distinct_ids(&self) -> &[String] {
        &self.ids
    }

    /// Objects referencing `id`, in the order they were added.
    pub fn objects_for(&self, id: &str) -> &[T] {
        self.objects_by_id.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct ids referenced by `associated_object`.
    pub fn ids_for(&self, associated_object: &T) -> &[String] {
        self.ids_by_object
            .get(associated_object)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every distinct attribute list registered for a pair.
    pub fn attribute_sets(&self, associated_object: &T, id: &str) -> &[Vec<String>] {
        self.attributes
            .get(&(associated_object.clone(), id.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The first object that referenced `id`; used to name an object in
    /// per-id errors.
    pub fn first_object(&self, id: &str) -> Option<&T> {
        self.objects_for(id).first()
    }
}

/// The id → remapped id table produced by processing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapTable {
    map: HashMap<String, RemappedId>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `id` onto itself.
    pub fn insert_identity(&mut self, id: &str) {
        self.map.insert(id.to_string(), RemappedId::new(id));
    }

    pub fn insert(&mut self, id: impl Into<String>, remapped: RemappedId) {
        self.map.insert(id.into(), remapped);
    }

    pub fn get(&self, id: &str) -> Result<&RemappedId, NoSuchIdError> {
        self.map.get(id).ok_or_else(|| NoSuchIdError::new(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.map.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Remapped ids for the given original ids. Ids missing from the table
    /// are skipped.
    pub fn remap_all<'a>(&self, ids: impl IntoIterator<Item = &'a String>) -> BTreeSet<RemappedId> {
        ids.into_iter()
            .filter_map(|id| self.map.get(id).cloned())
            .collect()
    }

    /// Every distinct remapped id in the table.
    pub fn values(&self) -> BTreeSet<RemappedId> {
        self.map.values().cloned().collect()
    }
}
