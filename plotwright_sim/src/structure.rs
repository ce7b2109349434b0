// Structures, collections, and the part recycler.
//
// A `Structure` is one placed part (a wall segment, a door, a pillar). It
// refers to its owning collection by `CollectionId` and the collection
// refers to its plot by `PlotId`; there are no back-pointers, everything is
// resolved through the maps on `SimState`.
//
// `StructurePool` hands out `StructureId`s and takes them back. Released
// ids go onto a per-kind free list and are reused (lowest first) by the next
// `acquire()` of the same kind, mirroring how a host recycles pooled
// instances of one prefab. Because ids are reused, anything that refers to a
// structure across ticks (timer wakes) must also carry a generation, see
// `sim.rs`.
//
// See also: `construction.rs` for the per-structure state machine,
// `remodel.rs` for sessions over a collection.

use crate::construction::{BuildMode, ConstructionDefinition, ConstructionState};
use crate::types::{CollectionId, PartVariant, PlotId, StructureId, StructureKind, Transform};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub id: StructureId,
    pub kind: StructureKind,
    pub variant: PartVariant,
    pub collection: CollectionId,
    pub transform: Transform,
    pub construction: ConstructionState,
    /// Generation of the live `ConstructionTimer`, if `timer_armed`.
    pub timer_generation: u64,
    pub timer_armed: bool,
}

impl Structure {
    pub fn new(
        id: StructureId,
        kind: StructureKind,
        variant: PartVariant,
        collection: CollectionId,
        transform: Transform,
        def: &ConstructionDefinition,
        mode: BuildMode,
    ) -> Self {
        Self {
            id,
            kind,
            variant,
            collection,
            transform,
            construction: ConstructionState::new(def, mode),
            timer_generation: 0,
            timer_armed: false,
        }
    }
}

/// A composite structure: the parts placed on one plot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructureCollection {
    pub id: CollectionId,
    pub plot: PlotId,
    /// Members in insertion order.
    pub members: Vec<StructureId>,
}

impl StructureCollection {
    pub fn new(id: CollectionId, plot: PlotId) -> Self {
        Self {
            id,
            plot,
            members: Vec::new(),
        }
    }

    pub fn contains(&self, structure: StructureId) -> bool {
        self.members.contains(&structure)
    }

    pub fn remove(&mut self, structure: StructureId) -> bool {
        let before = self.members.len();
        self.members.retain(|&m| m != structure);
        self.members.len() != before
    }
}

/// Id recycler for structures, keyed by kind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StructurePool {
    next_id: u32,
    live: BTreeMap<StructureId, StructureKind>,
    free: BTreeMap<StructureKind, BTreeSet<StructureId>>,
}

impl StructurePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtain an id for a new part of `kind`, reusing a released one if any.
    pub fn acquire(&mut self, kind: &StructureKind) -> StructureId {
        let recycled = self.free.get_mut(kind).and_then(|ids| ids.pop_first());
        let id = recycled.unwrap_or_else(|| {
            let id = StructureId(self.next_id);
            self.next_id += 1;
            id
        });
        self.live.insert(id, kind.clone());
        id
    }

    /// Return an id to the pool. `false` if it was not live.
    pub fn release(&mut self, id: StructureId) -> bool {
        let Some(kind) = self.live.remove(&id) else {
            return false;
        };
        self.free.entry(kind).or_default().insert(id);
        true
    }

    pub fn is_live(&self, id: StructureId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}
