//! Marker bookkeeping
//!
//! The registry is the declarative list of markers that should be on the
//! map. It performs no I/O: the owning session diffs [`MarkerRegistry::list`]
//! against what the provider has rendered and applies the deltas.

use indexmap::IndexMap;
use thiserror::Error;

use crate::marker::{Marker, MarkerCategory, MarkerId};

/// Invariant violations raised by the registry
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("map session is not active")]
    SessionNotActive,

    #[error("marker {0} already exists")]
    DuplicateId(MarkerId),
}

/// Add/remove deltas between the registry and a rendered set
#[derive(Debug, Default)]
pub struct RenderDiff<'a> {
    /// Registered but not rendered, in insertion order
    pub to_add: Vec<&'a Marker>,

    /// Rendered but no longer registered
    pub to_remove: Vec<MarkerId>,
}

impl RenderDiff<'_> {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Set of markers placed on an active session
#[derive(Debug, Default)]
pub struct MarkerRegistry {
    /// Markers indexed by id, kept in insertion order
    markers: IndexMap<MarkerId, Marker>,

    /// Whether the owning session is active
    accepting: bool,
}

impl MarkerRegistry {
    /// Create a registry that rejects markers until opened
    pub fn new() -> Self {
        Self::default()
    }

    /// Start accepting markers (session became active)
    pub(crate) fn open(&mut self) {
        self.accepting = true;
    }

    /// Stop accepting markers and drop every entry
    pub(crate) fn close(&mut self) -> usize {
        self.accepting = false;
        self.clear()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Store a marker under its id
    pub fn add(&mut self, marker: Marker) -> Result<MarkerId, RegistryError> {
        if !self.accepting {
            return Err(RegistryError::SessionNotActive);
        }
        if self.markers.contains_key(&marker.id) {
            return Err(RegistryError::DuplicateId(marker.id));
        }

        let id = marker.id;
        self.markers.insert(id, marker);
        Ok(id)
    }

    /// Remove a marker, returning it if it was present
    pub fn remove(&mut self, id: &MarkerId) -> Option<Marker> {
        self.markers.shift_remove(id)
    }

    /// Remove every marker regardless of category
    pub fn clear(&mut self) -> usize {
        let count = self.markers.len();
        self.markers.clear();
        count
    }

    /// Iterate over the markers in insertion order
    ///
    /// The iterator can be cloned to restart the walk.
    pub fn list(&self) -> impl Iterator<Item = &Marker> + Clone + ExactSizeIterator + '_ {
        self.markers.values()
    }

    pub fn get(&self, id: &MarkerId) -> Option<&Marker> {
        self.markers.get(id)
    }

    pub fn contains(&self, id: &MarkerId) -> bool {
        self.markers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Ids of all markers of one category
    pub fn ids_in(&self, category: MarkerCategory) -> Vec<MarkerId> {
        self.markers
            .values()
            .filter(|marker| marker.category == category)
            .map(|marker| marker.id)
            .collect()
    }

    /// Compare against the markers a provider currently renders
    pub fn diff<'a, H>(&'a self, rendered: &IndexMap<MarkerId, H>) -> RenderDiff<'a> {
        RenderDiff {
            to_add: self
                .markers
                .values()
                .filter(|marker| !rendered.contains_key(&marker.id))
                .collect(),
            to_remove: rendered
                .keys()
                .filter(|id| !self.markers.contains_key(*id))
                .copied()
                .collect(),
        }
    }
}
