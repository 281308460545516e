//! The in-memory mapper — spec §4.5.
//!
//! Maintains a pointer index over an append-only state array; `add`
//! computes pointers, finds collisions, merges per the identity rules in
//! `ws_types::identity`, and marks the slot dirty. `commit` flushes dirty
//! slots to the store in one pass.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};
use ws_store::{Store, StoreError};
use ws_types::{identity, State};

/// Counters an import run folds into its per-backend `RunReport` totals
/// (spec §4.5/§8 invariant 7).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapperMetrics {
    pub seen: u64,
    pub created: u64,
    pub merged: u64,
    pub conflicts: u64,
    pub dropped_invalid: u64,
}

pub struct Mapper {
    states: Vec<State>,
    index: HashMap<String, usize>,
    dirty: HashSet<usize>,
    metrics: MapperMetrics,
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new()
    }
}

impl Mapper {
    pub fn new() -> Self {
        Mapper {
            states: Vec::new(),
            index: HashMap::new(),
            dirty: HashSet::new(),
            metrics: MapperMetrics::default(),
        }
    }

    /// Seed the mapper's index from states already resident in the store,
    /// so that a long-running import run dedups against prior history
    /// instead of only against what it has seen so far this run.
    pub fn seed(&mut self, existing: Vec<State>) {
        for state in existing {
            self.insert_fresh(state, false);
        }
    }

    /// Ingest one incoming `State`. Invalid states (no identity, or a
    /// malformed episode) are dropped and counted, never stored.
    pub fn add(&mut self, incoming: State) {
        self.metrics.seen += 1;

        if !incoming.episode_identity_valid() {
            warn!(season = ?incoming.season, episode = ?incoming.episode, "dropping invalid episode");
            self.metrics.dropped_invalid += 1;
            return;
        }

        let ptrs = identity::pointers(&incoming);
        if ptrs.is_empty() {
            warn!(via = %incoming.via, "dropping state with no identity");
            self.metrics.dropped_invalid += 1;
            return;
        }

        let existing_slot = ptrs.iter().find_map(|p| self.index.get(p).copied());

        match existing_slot {
            None => {
                self.insert_fresh(incoming, true);
                self.metrics.created += 1;
            }
            Some(slot) => {
                let merged = identity::merge(&self.states[slot], &incoming);
                if merged.guids.len() != self.states[slot].guids.len() {
                    self.metrics.conflicts += 1;
                }
                self.states[slot] = merged;
                self.reindex(slot);
                self.dirty.insert(slot);
                self.metrics.merged += 1;
            }
        }
    }

    /// Flush every dirty slot to `store` in one pass, clearing the dirty set.
    pub fn commit(&mut self, store: &mut Store) -> Result<(), StoreError> {
        let mut slots: Vec<usize> = self.dirty.drain().collect();
        slots.sort_unstable();
        for slot in slots.drain(..) {
            let (id, created) = store.upsert(&self.states[slot])?;
            self.states[slot].id = Some(id);
            debug!(id, created, "mapper committed state");
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &State> {
        self.states.iter()
    }

    pub fn metrics(&self) -> MapperMetrics {
        self.metrics
    }

    fn insert_fresh(&mut self, state: State, mark_dirty: bool) {
        let slot = self.states.len();
        self.states.push(state);
        self.reindex(slot);
        if mark_dirty {
            self.dirty.insert(slot);
        }
    }

    fn reindex(&mut self, slot: usize) {
        for ptr in identity::pointers(&self.states[slot]) {
            self.index.insert(ptr, slot);
        }
    }
}

/// Bypasses the in-memory index and upserts directly via the store — used
/// by webhook ingestion when low latency matters more than dedup across a
/// batch (spec §4.5).
pub struct DirectMapper<'s> {
    store: &'s mut Store,
}

impl<'s> DirectMapper<'s> {
    pub fn new(store: &'s mut Store) -> Self {
        DirectMapper { store }
    }

    pub fn add(&mut self, incoming: State) -> Result<(i64, bool), StoreError> {
        self.store.upsert(&incoming)
    }
}
