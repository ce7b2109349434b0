// Remodel sessions — reversible rearrangement of a structure collection.
//
// A `RemodelSession` is opened on one collection. It snapshots every
// member's `(transform, stage_index)`, lets the player pick parts up and
// drag them, and ends either with `complete()` (keep the new layout, force
// moved/added parts back to construction stage 0) or `cancel()` (restore
// everything from the snapshot).
//
// ## Drag loop
//
// `select_at()` hit-tests via the `SpatialIndex` and starts a drag on a
// member of this collection, caching its pre-drag transform. The host feeds
// pointer rays with `set_pointer()`; the sim's `DragTick` event calls
// `drag_tick()` every `drag_interval_ticks`, which:
//
//   1. intersects the latest ray with the ground plane at the pre-drag
//      height (yaw is kept),
//   2. runs the `RuleChain` (rules may rewrite the candidate; an enforced
//      rejection restores the pre-drag transform and ends the drag; a plain
//      rejection marks the candidate invalid),
//   3. validates containment (with optional clamping back inside the plot)
//      and footprint collision against siblings; the first overlapping
//      sibling becomes the `collision_target`,
//   4. moves the part to the candidate and emits `PlacementFeedback` when
//      the `(valid, collision_target)` pair changed.
//
// `place()` applies `CollisionResponse` when the placement is invalid.
// `cancel_selection()` puts the part back; if the pre-drag spot is itself
// invalid now, the part stays selected with invalid feedback.
//
// Boundary-hugging parts (walls, doors) sit exactly on the boundary line,
// which plain containment treats as outside, so for them a candidate within
// `transform_epsilon` of the boundary also counts as contained.
//
// ## Generations
//
// Every drag gets a fresh generation from the sim-wide counter. A `DragTick`
// carrying any other generation is stale and ignored, which is how ending a
// drag or a session cancels its pending wake-up.
//
// See also: `rules.rs` for the rule chain, `spatial.rs` for hit-testing and
// bounds, `plot.rs` for containment and clamping, `sim.rs` for scheduling
// and the commands that drive a session.

use crate::config::GameConfig;
use crate::event::{SimEvent, SimEventKind};
use crate::plot::Plot;
use crate::rules::{RuleChain, RuleContext, RuleVerdict};
use crate::spatial::SpatialIndex;
use crate::structure::{Structure, StructureCollection};
use crate::types::{CollectionId, Ray, StructureId, Transform, Vec3};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What `place()` does with an invalid placement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionResponse {
    /// Stay in the drag, still invalid; the caller decides.
    #[default]
    None,
    /// Same as `cancel_selection()`.
    ResetPosition,
    /// Drop this part and start dragging the collision target.
    SwapTarget,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub structure: StructureId,
    pub transform: Transform,
    pub stage_index: usize,
}

/// Pre-session state of every member, in member order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RemodelSnapshot {
    entries: Vec<SnapshotEntry>,
    #[serde(skip)]
    index: FxHashMap<StructureId, usize>,
}

impl RemodelSnapshot {
    pub fn capture(
        collection: &StructureCollection,
        structures: &BTreeMap<StructureId, Structure>,
    ) -> Self {
        let entries = collection
            .members
            .iter()
            .filter_map(|id| structures.get(id))
            .map(|s| SnapshotEntry {
                structure: s.id,
                transform: s.transform,
                stage_index: s.construction.stage_index(),
            })
            .collect();
        let mut snapshot = Self {
            entries,
            index: FxHashMap::default(),
        };
        snapshot.reindex();
        snapshot
    }

    /// Rebuild the lookup index (after deserialization).
    pub fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.structure, i))
            .collect();
    }

    pub fn get(&self, structure: StructureId) -> Option<&SnapshotEntry> {
        self.index.get(&structure).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DragState {
    pub structure: StructureId,
    pub pre_drag: Transform,
    /// Latest pointer ray from the host. `None` until the pointer moves.
    pub pointer: Option<Ray>,
    pub is_valid: bool,
    pub collision_target: Option<StructureId>,
    pub generation: u64,
    /// A `DragTick` for this generation is in the event queue.
    pub scheduled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemodelPhase {
    Selecting,
    Dragging,
}

/// Borrowed view of the sim that a session operates on.
pub struct RemodelWorld<'a> {
    pub config: &'a GameConfig,
    pub plot: &'a Plot,
    pub collection: &'a StructureCollection,
    pub structures: &'a mut BTreeMap<StructureId, Structure>,
    pub rules: &'a RuleChain,
    pub spatial: &'a dyn SpatialIndex,
    pub next_generation: &'a mut u64,
    pub tick: u64,
    pub events: &'a mut Vec<SimEvent>,
}

impl RemodelWorld<'_> {
    fn emit(&mut self, kind: SimEventKind) {
        self.events.push(SimEvent {
            tick: self.tick,
            kind,
        });
    }

    fn fresh_generation(&mut self) -> u64 {
        *self.next_generation += 1;
        *self.next_generation
    }

    /// Containment plus sibling collision for `structure` at `candidate`.
    /// With `clamp`, an out-of-bounds candidate is first pulled back inside.
    /// Returns `(is_valid, collision_target)`.
    fn validate(
        &self,
        structure: StructureId,
        candidate: &mut Transform,
        clamp: bool,
    ) -> (bool, Option<StructureId>) {
        let Some(me) = self.structures.get(&structure) else {
            return (false, None);
        };
        let remodel = &self.config.remodel;
        let contained = |pos: Vec3| {
            self.plot.contains(pos)
                || (me.variant.hugs_boundary()
                    && self
                        .plot
                        .nearest_boundary_point(pos)
                        .is_some_and(|hit| hit.distance <= remodel.transform_epsilon))
        };
        if !contained(candidate.position) {
            if !(clamp && remodel.clamp_to_boundary) {
                return (false, None);
            }
            match self.plot.clamp_inside(candidate.position, remodel.boundary_inset) {
                Some(p) if contained(p) => candidate.position = p,
                _ => return (false, None),
            }
        }

        let Some(mine) = self.spatial.bounds(me, candidate) else {
            return (true, None);
        };
        let target = self
            .collection
            .members
            .iter()
            .filter(|&&id| id != structure)
            .filter_map(|id| self.structures.get(id))
            .find(|other| {
                self.spatial
                    .bounds(other, &other.transform)
                    .is_some_and(|theirs| mine.overlaps(&theirs))
            })
            .map(|other| other.id);
        (target.is_none(), target)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemodelSession {
    collection: CollectionId,
    snapshot: RemodelSnapshot,
    drag: Option<DragState>,
    /// Parts placed at least once during the session.
    modified: BTreeSet<StructureId>,
}

impl RemodelSession {
    /// Open a session: snapshot every member.
    pub fn start(
        collection: &StructureCollection,
        structures: &BTreeMap<StructureId, Structure>,
    ) -> Self {
        tracing::debug!(
            collection = %collection.id,
            members = collection.members.len(),
            "remodel session started"
        );
        Self {
            collection: collection.id,
            snapshot: RemodelSnapshot::capture(collection, structures),
            drag: None,
            modified: BTreeSet::new(),
        }
    }

    pub fn collection(&self) -> CollectionId {
        self.collection
    }

    pub fn snapshot(&self) -> &RemodelSnapshot {
        &self.snapshot
    }

    pub fn drag(&self) -> Option<&DragState> {
        self.drag.as_ref()
    }

    pub fn drag_mut(&mut self) -> Option<&mut DragState> {
        self.drag.as_mut()
    }

    pub fn modified(&self) -> &BTreeSet<StructureId> {
        &self.modified
    }

    pub fn phase(&self) -> RemodelPhase {
        if self.drag.is_some() {
            RemodelPhase::Dragging
        } else {
            RemodelPhase::Selecting
        }
    }

    pub fn rebuild_transient_state(&mut self) {
        self.snapshot.reindex();
    }

    /// Hit-test at `point` and start dragging the part found there.
    pub fn select_at(&mut self, world: &mut RemodelWorld<'_>, point: Vec3) -> bool {
        if self.drag.is_some() {
            tracing::debug!(collection = %self.collection, "select ignored: already dragging");
            return false;
        }
        let Some(hit) = world.spatial.hit_test(world.structures, point) else {
            return false;
        };
        if !world.collection.contains(hit) {
            tracing::debug!(
                collection = %self.collection,
                structure = %hit,
                "select ignored: not in collection"
            );
            return false;
        }
        self.begin_drag(world, hit, true);
        true
    }

    fn begin_drag(&mut self, world: &mut RemodelWorld<'_>, structure: StructureId, validate: bool) {
        let Some(pre_drag) = world.structures.get(&structure).map(|s| s.transform) else {
            return;
        };
        let (is_valid, collision_target) = if validate {
            let mut at = pre_drag;
            world.validate(structure, &mut at, false)
        } else {
            (true, None)
        };
        let generation = world.fresh_generation();
        self.drag = Some(DragState {
            structure,
            pre_drag,
            pointer: None,
            is_valid,
            collision_target,
            generation,
            scheduled: false,
        });
        world.emit(SimEventKind::SelectionChanged {
            collection: self.collection,
            structure: Some(structure),
        });
        world.emit(SimEventKind::PlacementFeedback {
            collection: self.collection,
            structure,
            valid: is_valid,
            collision_target,
        });
    }

    fn end_drag(&mut self, world: &mut RemodelWorld<'_>) {
        if self.drag.take().is_some() {
            world.emit(SimEventKind::SelectionChanged {
                collection: self.collection,
                structure: None,
            });
        }
    }

    pub fn set_pointer(&mut self, ray: Ray) -> bool {
        match self.drag.as_mut() {
            Some(drag) => {
                drag.pointer = Some(ray);
                true
            }
            None => false,
        }
    }

    /// One drag re-evaluation. Returns `true` if the drag is still active.
    pub fn drag_tick(&mut self, world: &mut RemodelWorld<'_>) -> bool {
        let Some(drag) = self.drag.as_ref() else {
            return false;
        };
        let structure = drag.structure;
        let pre_drag = drag.pre_drag;
        let Some(position) = drag
            .pointer
            .and_then(|ray| ray.intersect_ground(pre_drag.position.y))
        else {
            return true;
        };
        let Some(me) = world.structures.get(&structure) else {
            self.drag = None;
            return false;
        };
        let mut candidate = Transform::new(position, me.transform.yaw_deg);

        let verdict = {
            let siblings: Vec<&Structure> = world
                .collection
                .members
                .iter()
                .filter(|&&id| id != structure)
                .filter_map(|id| world.structures.get(id))
                .collect();
            let ctx = RuleContext {
                structure: me,
                siblings: &siblings,
                plot: world.plot,
                pre_drag,
            };
            world.rules.evaluate(&ctx, &mut candidate)
        };

        let (is_valid, collision_target, rejection) = match verdict {
            RuleVerdict::Enforced { rule, reason } => {
                tracing::debug!(
                    structure = %structure,
                    rule = %rule,
                    reason = %reason,
                    "drag force-ended by rule"
                );
                if let Some(s) = world.structures.get_mut(&structure) {
                    s.transform = pre_drag;
                }
                world.emit(SimEventKind::RuleRejected {
                    collection: self.collection,
                    structure,
                    rule,
                    reason,
                    enforced: true,
                });
                self.end_drag(world);
                return false;
            }
            RuleVerdict::Rejected { rule, reason } => (false, None, Some((rule, reason))),
            RuleVerdict::Accepted => {
                let (valid, target) = world.validate(structure, &mut candidate, true);
                (valid, target, None)
            }
        };

        if let Some(s) = world.structures.get_mut(&structure) {
            s.transform = candidate;
        }
        let Some(drag) = self.drag.as_mut() else {
            return false;
        };
        if drag.is_valid == is_valid && drag.collision_target == collision_target {
            return true;
        }
        drag.is_valid = is_valid;
        drag.collision_target = collision_target;
        if let Some((rule, reason)) = rejection {
            world.emit(SimEventKind::RuleRejected {
                collection: self.collection,
                structure,
                rule,
                reason,
                enforced: false,
            });
        }
        world.emit(SimEventKind::PlacementFeedback {
            collection: self.collection,
            structure,
            valid: is_valid,
            collision_target,
        });
        true
    }

    /// Drop the dragged part. Returns `true` only if it was placed validly.
    pub fn place(&mut self, world: &mut RemodelWorld<'_>) -> bool {
        let Some(drag) = self.drag.as_ref() else {
            return false;
        };
        let structure = drag.structure;
        if drag.is_valid {
            self.modified.insert(structure);
            world.emit(SimEventKind::StructureModified {
                collection: self.collection,
                structure,
            });
            self.end_drag(world);
            return true;
        }
        match world.config.remodel.collision_response {
            CollisionResponse::None => false,
            CollisionResponse::ResetPosition => {
                self.cancel_selection(world);
                false
            }
            CollisionResponse::SwapTarget => {
                let Some(target) = drag.collision_target else {
                    return false;
                };
                // The dropped part keeps its (overlapping) spot.
                self.modified.insert(structure);
                world.emit(SimEventKind::StructureModified {
                    collection: self.collection,
                    structure,
                });
                self.drag = None;
                self.begin_drag(world, target, false);
                false
            }
        }
    }

    /// Put the dragged part back where it was picked up.
    pub fn cancel_selection(&mut self, world: &mut RemodelWorld<'_>) -> bool {
        let Some(drag) = self.drag.as_ref() else {
            return false;
        };
        let structure = drag.structure;
        let mut pre_drag = drag.pre_drag;
        if let Some(s) = world.structures.get_mut(&structure) {
            s.transform = pre_drag;
        }
        let (is_valid, collision_target) = world.validate(structure, &mut pre_drag, false);
        if is_valid {
            self.end_drag(world);
            return true;
        }
        tracing::debug!(structure = %structure, "restored position is invalid; keeping selection");
        if let Some(drag) = self.drag.as_mut() {
            drag.pointer = None;
            drag.is_valid = false;
            drag.collision_target = collision_target;
        }
        world.emit(SimEventKind::PlacementFeedback {
            collection: self.collection,
            structure,
            valid: false,
            collision_target,
        });
        true
    }

    /// Keep the new layout. Parts that moved (beyond `transform_epsilon`) or
    /// were added during the session are reset to stage 0. Returns them.
    pub fn complete(mut self, world: &mut RemodelWorld<'_>) -> Vec<StructureId> {
        if let Some(drag) = self.drag.as_ref() {
            if !drag.is_valid {
                if let Some(s) = world.structures.get_mut(&drag.structure) {
                    s.transform = drag.pre_drag;
                }
            }
            self.end_drag(world);
        }
        let epsilon = world.config.remodel.transform_epsilon;
        let mut reset = Vec::new();
        for &id in &world.collection.members {
            let Some(s) = world.structures.get_mut(&id) else {
                continue;
            };
            let changed = match self.snapshot.get(id) {
                Some(entry) => !entry.transform.approx_eq(&s.transform, epsilon),
                None => true,
            };
            if !changed {
                continue;
            }
            if let Some(def) = world.config.structure(&s.kind) {
                s.construction.setup(&def.construction);
            }
            reset.push(id);
        }
        for &id in &reset {
            world.emit(SimEventKind::ConstructionReset { structure: id });
        }
        tracing::debug!(
            collection = %self.collection,
            reset = reset.len(),
            "remodel session completed"
        );
        reset
    }

    /// Restore every snapshotted part. Returns parts added during the
    /// session, which the caller removes.
    pub fn cancel(mut self, world: &mut RemodelWorld<'_>) -> Vec<StructureId> {
        self.end_drag(world);
        for entry in self.snapshot.entries() {
            let Some(s) = world.structures.get_mut(&entry.structure) else {
                continue;
            };
            s.transform = entry.transform;
            if s.construction.stage_index() == entry.stage_index {
                continue;
            }
            if let Some(def) = world.config.structure(&s.kind) {
                s.construction
                    .jump_to_stage(&def.construction, entry.stage_index as i64);
            }
        }
        let added: Vec<StructureId> = world
            .collection
            .members
            .iter()
            .copied()
            .filter(|&id| self.snapshot.get(id).is_none())
            .collect();
        tracing::debug!(
            collection = %self.collection,
            added = added.len(),
            "remodel session cancelled"
        );
        added
    }
}
