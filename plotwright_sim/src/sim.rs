// Core simulation state and tick loop.
//
// `SimState` is the single source of truth: it owns every plot, structure
// collection, structure and open remodel session, the event queue, and the
// game config. The sim is a pure function:
// `(state, commands) -> (new_state, events)`.
//
// ## Registry
//
// Entities refer to each other by id only. A structure names its
// collection, a collection names its plot, and sessions are keyed by the
// collection they edit. Plot and collection ids are plain counters;
// structure ids come from the `StructurePool` and are recycled.
//
// ## Mutation surface
//
// Every operation in `SimAction` has a public method here that applies it
// immediately and reports whether it was accepted (or returns the new id).
// `execute()` dispatches an action to those methods; `step()` interleaves
// tick-stamped commands with scheduled events, exactly like a host frame
// loop would. Invalid input is absorbed: the method returns `false`, logs a
// `tracing` diagnostic, and leaves state untouched. Nothing here panics on
// bad input.
//
// ## Cooperative tasks
//
// Two kinds of work span ticks, both driven through the `EventQueue`:
//
// - `ConstructionTimer`: armed for every `TimeGated`, not-yet-completed
//   structure. Each wake credits `timer_interval_ticks` of elapsed time
//   (which `ConstructionState` ignores unless requirements are met) and
//   reschedules. Switching mode, completing, or removing the structure
//   disarms it; generations from the sim-wide counter make any wake already
//   in the queue stale.
// - `DragTick`: scheduled every `drag_interval_ticks` while a remodel
//   session has an active drag. Re-evaluates placement from the latest
//   pointer ray. Ending the drag or the session strands the tick, and its
//   generation no longer matches.
//
// ## Notifications
//
// Mutations push `SimEvent`s into an outbox. `step()` drains it into its
// `StepResult`; hosts using `execute()` directly call `take_events()`.
//
// ## Save/load
//
// `SimState` derives `Serialize`/`Deserialize`. The outbox, the rule chain
// and the spatial index are `#[serde(skip)]`; derived plot caches and
// snapshot indexes are skipped in their own types. `rebuild_transient_state()`
// restores all of them (the rule chain is rebuilt as the standard chain
// from config; a custom chain must be installed again after loading).
// `to_json()`/`from_json()` wrap the full cycle.
//
// See also: `event.rs` for the event queue, `command.rs` for `SimAction`,
// `config.rs` for `GameConfig`, `plot.rs`, `construction.rs` and
// `remodel.rs` for the three subsystems this file wires together.
//
// **Critical constraint: determinism.** All state mutations flow through
// `SimAction` or internal scheduled events. No external input (system time,
// thread state, etc.) may influence the simulation.

use crate::command::{SimAction, SimCommand};
use crate::config::GameConfig;
use crate::construction::{BuildMode, StageTransition};
use crate::error::ConfigError;
use crate::event::{EventQueue, ScheduledEventKind, SimEvent, SimEventKind};
use crate::perimeter;
use crate::plot::Plot;
use crate::remodel::{RemodelSession, RemodelWorld};
use crate::rules::RuleChain;
use crate::spatial::{FootprintIndex, SharedSpatialIndex, SpatialIndex};
use crate::structure::{Structure, StructureCollection, StructurePool};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level simulation state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimState {
    /// Current simulation tick.
    pub tick: u64,

    /// Game configuration (immutable after initialization).
    pub config: GameConfig,

    /// The event priority queue driving cooperative tasks.
    pub event_queue: EventQueue,

    /// All traced boundaries, keyed by ID. BTreeMap for deterministic iteration.
    pub plots: BTreeMap<PlotId, Plot>,

    /// Structure collections, keyed by ID.
    pub collections: BTreeMap<CollectionId, StructureCollection>,

    /// Every live structure, keyed by ID.
    pub structures: BTreeMap<StructureId, Structure>,

    /// Open remodel sessions, at most one per collection.
    pub sessions: BTreeMap<CollectionId, RemodelSession>,

    /// Structure id recycler.
    pub pool: StructurePool,

    next_plot_id: u32,
    next_collection_id: u32,
    /// Shared counter for timer and drag generations.
    next_generation: u64,

    /// Notifications not yet handed to the host.
    #[serde(skip)]
    outbox: Vec<SimEvent>,

    /// Placement rules consulted during drags. Rebuilt from config on load.
    #[serde(skip)]
    rules: RuleChain,

    /// Hit-testing and bounding volumes. Rebuilt from config on load.
    #[serde(skip)]
    spatial: SharedSpatialIndex,
}

/// The result of processing commands and advancing the simulation.
pub struct StepResult {
    /// Notifications emitted during this step, in order.
    pub events: Vec<SimEvent>,
}

impl Default for SimState {
    fn default() -> Self {
        Self::new()
    }
}

impl SimState {
    /// Create a new simulation with the default config.
    pub fn new() -> Self {
        Self::with_config(GameConfig::default())
    }

    /// Create a new simulation with the given config. The config is trusted;
    /// use `try_with_config()` for configs from outside.
    pub fn with_config(config: GameConfig) -> Self {
        let rules = RuleChain::standard(&config.remodel);
        let spatial = SharedSpatialIndex::new(FootprintIndex::from_config(&config));
        Self {
            tick: 0,
            config,
            event_queue: EventQueue::new(),
            plots: BTreeMap::new(),
            collections: BTreeMap::new(),
            structures: BTreeMap::new(),
            sessions: BTreeMap::new(),
            pool: StructurePool::new(),
            next_plot_id: 0,
            next_collection_id: 0,
            next_generation: 0,
            outbox: Vec::new(),
            rules,
            spatial,
        }
    }

    /// Validate `config`, then create a simulation with it.
    pub fn try_with_config(config: GameConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    // -----------------------------------------------------------------------
    // Tick loop
    // -----------------------------------------------------------------------

    /// Apply a batch of commands and advance the sim to the target tick,
    /// processing all scheduled events up to that point.
    ///
    /// Commands must be sorted by tick. Commands with tick > `target_tick`
    /// are ignored (caller error).
    pub fn step(&mut self, commands: &[SimCommand], target_tick: u64) -> StepResult {
        // Index into the sorted command slice.
        let mut cmd_idx = 0;

        while self.tick < target_tick {
            // Determine the next thing to process: the next scheduled event
            // or the next command, whichever comes first.
            let next_event_tick = self.event_queue.peek_tick();
            let next_cmd_tick = commands
                .get(cmd_idx)
                .filter(|c| c.tick <= target_tick)
                .map(|c| c.tick);

            let next_tick = match (next_event_tick, next_cmd_tick) {
                (Some(et), Some(ct)) => et.min(ct).min(target_tick),
                (Some(et), None) => et.min(target_tick),
                (None, Some(ct)) => ct.min(target_tick),
                (None, None) => target_tick,
            };

            // Events or commands stamped in the past run now.
            self.tick = next_tick.max(self.tick);

            // Apply commands at this tick.
            while cmd_idx < commands.len() && commands[cmd_idx].tick <= self.tick {
                let cmd = &commands[cmd_idx];
                cmd_idx += 1;
                self.execute(&cmd.action);
            }

            // Process scheduled events at this tick.
            while let Some(event) = self.event_queue.pop_if_ready(self.tick) {
                self.process_event(event.kind);
            }
        }

        self.tick = target_tick.max(self.tick);
        StepResult {
            events: self.take_events(),
        }
    }

    /// Drain notifications emitted since the last drain.
    pub fn take_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Apply one action immediately. Returns whether it was accepted.
    pub fn execute(&mut self, action: &SimAction) -> bool {
        match action {
            SimAction::BeginBoundary => {
                self.begin_boundary();
                true
            }
            SimAction::AddLoop { plot } => self.add_loop(*plot).is_some(),
            SimAction::AddVertex {
                plot,
                loop_index,
                point,
            } => self.add_vertex(*plot, *loop_index, *point),
            SimAction::UpdateVertex {
                plot,
                loop_index,
                vertex_index,
                point,
            } => self.update_vertex(*plot, *loop_index, *vertex_index, *point),
            SimAction::RemoveVertex {
                plot,
                loop_index,
                vertex_index,
            } => self.remove_vertex(*plot, *loop_index, *vertex_index),
            SimAction::RemoveLoop { plot, loop_index } => self.remove_loop(*plot, *loop_index),
            SimAction::CompleteBoundary { plot } => self.complete_boundary(*plot),
            SimAction::ReopenBoundary { plot } => self.reopen_boundary(*plot),
            SimAction::DividePlot { plot, count, axis } => {
                !self.divide_plot(*plot, *count, *axis).is_empty()
            }
            SimAction::AttachCollection { plot } => self.attach_collection(*plot).is_some(),
            SimAction::PopulatePerimeter { collection, kind } => {
                !self.populate_perimeter(*collection, kind).is_empty()
            }
            SimAction::AddStructure {
                collection,
                kind,
                transform,
            } => self.add_structure(*collection, kind, *transform).is_some(),
            SimAction::RemoveStructure { structure } => self.remove_structure(*structure),
            SimAction::DiscardCollection { collection } => self.discard_collection(*collection),
            SimAction::AddPendingResource {
                structure,
                kind,
                amount,
            } => self.add_pending_resource(*structure, kind, *amount),
            SimAction::AddLabor { structure, amount } => self.add_labor(*structure, *amount),
            SimAction::AdvanceStage { structure } => self.advance_stage(*structure),
            SimAction::JumpToStage { structure, stage } => self.jump_to_stage(*structure, *stage),
            SimAction::ResetConstruction { structure } => self.reset_construction(*structure),
            SimAction::SetBuildMode { structure, mode } => self.set_build_mode(*structure, *mode),
            SimAction::RemodelStart { collection } => self.remodel_start(*collection),
            SimAction::RemodelSelectAt { collection, point } => {
                self.remodel_select_at(*collection, *point)
            }
            SimAction::RemodelPointer { collection, ray } => {
                self.remodel_pointer(*collection, *ray)
            }
            SimAction::RemodelPlace { collection } => self.remodel_place(*collection),
            SimAction::RemodelCancelSelection { collection } => {
                self.remodel_cancel_selection(*collection)
            }
            SimAction::RemodelComplete { collection } => self.remodel_complete(*collection),
            SimAction::RemodelCancel { collection } => self.remodel_cancel(*collection),
        }
    }

    /// Process a single scheduled event.
    fn process_event(&mut self, kind: ScheduledEventKind) {
        match kind {
            ScheduledEventKind::ConstructionTimer {
                structure,
                generation,
            } => self.handle_construction_timer(structure, generation),
            ScheduledEventKind::DragTick {
                collection,
                generation,
            } => self.handle_drag_tick(collection, generation),
        }
    }

    fn emit(&mut self, kind: SimEventKind) {
        self.outbox.push(SimEvent {
            tick: self.tick,
            kind,
        });
    }

    fn fresh_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    // -----------------------------------------------------------------------
    // Boundary editing
    // -----------------------------------------------------------------------

    /// Start a new, empty boundary.
    pub fn begin_boundary(&mut self) -> PlotId {
        let id = PlotId(self.next_plot_id);
        self.next_plot_id += 1;
        self.plots.insert(id, Plot::new(self.config.plot.limits()));
        self.emit(SimEventKind::BoundaryCreated { plot: id });
        id
    }

    pub fn add_loop(&mut self, plot: PlotId) -> Option<usize> {
        let p = self.editable_plot(plot)?;
        let index = p.add_loop()?;
        let buildable = p.is_buildable();
        self.emit(SimEventKind::BoundaryVertexChanged { plot, buildable });
        Some(index)
    }

    pub fn add_vertex(&mut self, plot: PlotId, loop_index: usize, point: Vec3) -> bool {
        self.edit_plot(plot, |p| p.add_vertex(loop_index, point))
    }

    pub fn update_vertex(
        &mut self,
        plot: PlotId,
        loop_index: usize,
        vertex_index: usize,
        point: Vec3,
    ) -> bool {
        self.edit_plot(plot, |p| p.update_vertex(loop_index, vertex_index, point))
    }

    pub fn remove_vertex(&mut self, plot: PlotId, loop_index: usize, vertex_index: usize) -> bool {
        self.edit_plot(plot, |p| p.remove_vertex(loop_index, vertex_index))
    }

    pub fn remove_loop(&mut self, plot: PlotId, loop_index: usize) -> bool {
        self.edit_plot(plot, |p| p.remove_loop(loop_index))
    }

    /// A plot that may be edited: exists, not frozen, not completed.
    fn editable_plot(&mut self, plot: PlotId) -> Option<&mut Plot> {
        let Some(p) = self.plots.get_mut(&plot) else {
            tracing::debug!(plot = %plot, "edit ignored: unknown plot");
            return None;
        };
        if p.is_frozen() || p.is_completed() {
            tracing::debug!(plot = %plot, "edit ignored: plot is locked");
            return None;
        }
        Some(p)
    }

    fn edit_plot(&mut self, plot: PlotId, edit: impl FnOnce(&mut Plot) -> bool) -> bool {
        let Some(p) = self.editable_plot(plot) else {
            return false;
        };
        if !edit(p) {
            tracing::debug!(plot = %plot, "edit ignored: index out of range");
            return false;
        }
        let buildable = p.is_buildable();
        self.emit(SimEventKind::BoundaryVertexChanged { plot, buildable });
        true
    }

    /// Confirm the boundary. Requires it to be buildable.
    pub fn complete_boundary(&mut self, plot: PlotId) -> bool {
        let Some(p) = self.plots.get_mut(&plot) else {
            return false;
        };
        if p.is_completed() || !p.is_buildable() {
            tracing::debug!(plot = %plot, buildable = p.is_buildable(), "complete ignored");
            return false;
        }
        p.mark_completed();
        self.emit(SimEventKind::BoundaryCompleted { plot });
        true
    }

    /// Unlock a completed or frozen plot for editing.
    pub fn reopen_boundary(&mut self, plot: PlotId) -> bool {
        let in_session = self.sessions.keys().any(|c| {
            self.collections
                .get(c)
                .is_some_and(|coll| coll.plot == plot)
        });
        if in_session {
            tracing::warn!(plot = %plot, "reopen rejected: remodel session open on this plot");
            return false;
        }
        let Some(p) = self.plots.get_mut(&plot) else {
            return false;
        };
        if !p.is_frozen() && !p.is_completed() {
            return false;
        }
        p.reopen();
        self.emit(SimEventKind::BoundaryReopened { plot });
        true
    }

    /// Split a completed plot into `count` strips along `axis`. Each strip
    /// becomes a new completed plot. Returns the new ids (empty if refused).
    pub fn divide_plot(&mut self, plot: PlotId, count: usize, axis: Axis) -> Vec<PlotId> {
        let Some(source) = self.plots.get(&plot) else {
            return Vec::new();
        };
        if !source.is_completed() || count < 2 {
            tracing::debug!(plot = %plot, count, "divide ignored: plot not completed or count < 2");
            return Vec::new();
        }
        let Some(smallest) = self.config.smallest_footprint_area() else {
            return Vec::new();
        };
        // Every part must still fit the smallest footprint.
        if source.area() < count as f32 * smallest {
            tracing::debug!(
                plot = %plot,
                area = source.area(),
                count,
                "divide ignored: parts would be smaller than any footprint"
            );
            return Vec::new();
        }
        let parts = source.divide(count, axis);
        let mut ids = Vec::with_capacity(parts.len());
        for mut part in parts {
            part.mark_completed();
            let id = PlotId(self.next_plot_id);
            self.next_plot_id += 1;
            self.plots.insert(id, part);
            ids.push(id);
        }
        self.emit(SimEventKind::PlotDivided {
            source: plot,
            parts: ids.clone(),
        });
        ids
    }

    // -----------------------------------------------------------------------
    // Structures
    // -----------------------------------------------------------------------

    /// Attach a new structure collection to a buildable plot and freeze it.
    pub fn attach_collection(&mut self, plot: PlotId) -> Option<CollectionId> {
        let Some(p) = self.plots.get_mut(&plot) else {
            tracing::debug!(plot = %plot, "attach ignored: unknown plot");
            return None;
        };
        if !p.is_buildable() {
            tracing::debug!(plot = %plot, "attach ignored: plot is not buildable");
            return None;
        }
        p.freeze();
        let id = CollectionId(self.next_collection_id);
        self.next_collection_id += 1;
        self.collections.insert(id, StructureCollection::new(id, plot));
        self.emit(SimEventKind::CollectionAttached {
            collection: id,
            plot,
        });
        Some(id)
    }

    /// Tile the plot's perimeter with parts of `kind`, one per resample
    /// point, each aligned with the boundary there.
    pub fn populate_perimeter(
        &mut self,
        collection: CollectionId,
        kind: &StructureKind,
    ) -> Vec<StructureId> {
        let Some(loops) = self
            .collections
            .get(&collection)
            .and_then(|c| self.plots.get(&c.plot))
            .map(|p| p.loops().to_vec())
        else {
            return Vec::new();
        };
        if self.config.structure(kind).is_none() {
            tracing::debug!(kind = %kind, "populate ignored: unknown structure kind");
            return Vec::new();
        }
        let unit = self.config.perimeter.unit_length;
        let passes = self.config.perimeter.iterations.saturating_sub(1);
        let smoothed = perimeter::resample_iterated(&loops, unit, passes);
        let transforms: Vec<Transform> = smoothed
            .iter()
            .flat_map(|points| perimeter::sample_loop(points, unit))
            .map(|s| Transform::new(s.position, s.yaw_deg()))
            .collect();
        transforms
            .into_iter()
            .filter_map(|t| self.add_structure(collection, kind, t))
            .collect()
    }

    pub fn add_structure(
        &mut self,
        collection: CollectionId,
        kind: &StructureKind,
        transform: Transform,
    ) -> Option<StructureId> {
        if !self.collections.contains_key(&collection) {
            tracing::debug!(collection = %collection, "add ignored: unknown collection");
            return None;
        }
        let Some(def) = self.config.structure(kind) else {
            tracing::debug!(kind = %kind, "add ignored: unknown structure kind");
            return None;
        };
        let id = self.pool.acquire(kind);
        let structure = Structure::new(
            id,
            kind.clone(),
            def.variant,
            collection,
            transform,
            &def.construction,
            def.default_mode,
        );
        self.structures.insert(id, structure);
        if let Some(c) = self.collections.get_mut(&collection) {
            c.members.push(id);
        }
        self.emit(SimEventKind::StructureAdded {
            collection,
            structure: id,
            kind: kind.clone(),
        });
        self.ensure_timer(id);
        Some(id)
    }

    /// Remove one part. Rejected while its collection is being remodeled.
    pub fn remove_structure(&mut self, structure: StructureId) -> bool {
        let Some(collection) = self.structures.get(&structure).map(|s| s.collection) else {
            tracing::debug!(structure = %structure, "remove ignored: unknown structure");
            return false;
        };
        if self.sessions.contains_key(&collection) {
            tracing::warn!(structure = %structure, "remove rejected: remodel session open");
            return false;
        }
        self.detach_structure(structure);
        true
    }

    fn detach_structure(&mut self, structure: StructureId) {
        let Some(s) = self.structures.remove(&structure) else {
            return;
        };
        if let Some(c) = self.collections.get_mut(&s.collection) {
            c.remove(structure);
        }
        self.pool.release(structure);
        self.emit(SimEventKind::StructureRemoved {
            collection: s.collection,
            structure,
        });
    }

    /// Release every member and drop the collection, and its plot if no
    /// other collection uses it.
    pub fn discard_collection(&mut self, collection: CollectionId) -> bool {
        if self.sessions.contains_key(&collection) {
            tracing::warn!(collection = %collection, "discard rejected: remodel session open");
            return false;
        }
        let Some(members) = self.collections.get(&collection).map(|c| c.members.clone()) else {
            return false;
        };
        for id in members {
            self.detach_structure(id);
        }
        let Some(removed) = self.collections.remove(&collection) else {
            return false;
        };
        let shared = self.collections.values().any(|c| c.plot == removed.plot);
        let plot_dropped = !shared && self.plots.remove(&removed.plot).is_some();
        self.emit(SimEventKind::CollectionDiscarded {
            collection,
            plot_dropped,
        });
        true
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Deliver resources to a structure's pending pool.
    pub fn add_pending_resource(
        &mut self,
        structure: StructureId,
        kind: &ResourceKind,
        amount: i64,
    ) -> bool {
        let Ok(amount) = u32::try_from(amount) else {
            tracing::debug!(
                structure = %structure,
                amount,
                "delivery ignored: amount out of range"
            );
            return false;
        };
        if amount == 0 {
            tracing::debug!(structure = %structure, "delivery ignored: zero amount");
            return false;
        }
        if !self.config.is_known_resource(kind) {
            tracing::debug!(
                structure = %structure,
                kind = %kind,
                "delivery ignored: unknown resource kind"
            );
            return false;
        }
        let Some(s) = self.structures.get_mut(&structure) else {
            tracing::debug!(structure = %structure, "delivery ignored: unknown structure");
            return false;
        };
        let Some(def) = self.config.structures.get(&s.kind) else {
            return false;
        };
        let before = s.construction.collected().total();
        if !s.construction.add_pending(&def.construction, kind, amount) {
            tracing::debug!(
                structure = %structure,
                kind = %kind,
                amount,
                completed = s.construction.is_completed(),
                "delivery ignored: construction completed or total would overflow"
            );
            return false;
        }
        let moved = s.construction.collected().total().saturating_sub(before);
        if moved > 0 {
            self.emit(SimEventKind::ResourcesAllocated {
                structure,
                amount: u32::try_from(moved).unwrap_or(u32::MAX),
            });
        }
        true
    }

    /// Contribute labor. Returns whether at least one stage advanced.
    pub fn add_labor(&mut self, structure: StructureId, amount: i64) -> bool {
        let Ok(amount) = u32::try_from(amount) else {
            tracing::debug!(structure = %structure, amount, "labor ignored: amount out of range");
            return false;
        };
        let Some(s) = self.structures.get_mut(&structure) else {
            tracing::debug!(structure = %structure, "labor ignored: unknown structure");
            return false;
        };
        let Some(def) = self.config.structures.get(&s.kind) else {
            return false;
        };
        let transitions = s.construction.add_labor(&def.construction, amount);
        for &t in &transitions {
            self.emit_transition(structure, t);
        }
        !transitions.is_empty()
    }

    /// Externally triggered advance.
    pub fn advance_stage(&mut self, structure: StructureId) -> bool {
        let Some(s) = self.structures.get_mut(&structure) else {
            return false;
        };
        let Some(def) = self.config.structures.get(&s.kind) else {
            return false;
        };
        let Some(t) = s.construction.advance(&def.construction) else {
            tracing::debug!(structure = %structure, "advance ignored: already completed");
            return false;
        };
        self.emit_transition(structure, t);
        self.ensure_timer(structure);
        true
    }

    /// Jump to a stage (clamped to `[0, stage_count]`).
    pub fn jump_to_stage(&mut self, structure: StructureId, stage: i64) -> bool {
        let Some(s) = self.structures.get_mut(&structure) else {
            return false;
        };
        let Some(def) = self.config.structures.get(&s.kind) else {
            return false;
        };
        let from = s.construction.stage_index();
        let to = s.construction.jump_to_stage(&def.construction, stage);
        let completed = s.construction.is_completed();
        if to != from {
            self.emit(SimEventKind::StageAdvanced { structure, from, to });
            if completed {
                self.emit(SimEventKind::ConstructionCompleted { structure });
            }
        }
        self.ensure_timer(structure);
        true
    }

    /// Force back to stage 0 (pending resources are kept).
    pub fn reset_construction(&mut self, structure: StructureId) -> bool {
        let Some(s) = self.structures.get_mut(&structure) else {
            return false;
        };
        let Some(def) = self.config.structures.get(&s.kind) else {
            return false;
        };
        s.construction.setup(&def.construction);
        self.emit(SimEventKind::ConstructionReset { structure });
        self.ensure_timer(structure);
        true
    }

    pub fn set_build_mode(&mut self, structure: StructureId, mode: BuildMode) -> bool {
        let Some(s) = self.structures.get_mut(&structure) else {
            return false;
        };
        if !s.construction.set_mode(mode) {
            return false;
        }
        self.ensure_timer(structure);
        true
    }

    fn emit_transition(&mut self, structure: StructureId, transition: StageTransition) {
        match transition {
            StageTransition::Advanced { from, to } => {
                tracing::trace!(structure = %structure, from, to, "stage advanced");
                self.emit(SimEventKind::StageAdvanced { structure, from, to });
            }
            StageTransition::Completed { from } => {
                tracing::trace!(structure = %structure, "construction completed");
                self.emit(SimEventKind::StageAdvanced {
                    structure,
                    from,
                    to: from + 1,
                });
                self.emit(SimEventKind::ConstructionCompleted { structure });
            }
        }
    }

    /// Arm or disarm the structure's construction timer to match its mode
    /// and completion.
    fn ensure_timer(&mut self, structure: StructureId) {
        let wants = self.structures.get(&structure).is_some_and(|s| {
            s.construction.mode() == BuildMode::TimeGated && !s.construction.is_completed()
        });
        let armed = self
            .structures
            .get(&structure)
            .is_some_and(|s| s.timer_armed);
        if wants == armed {
            return;
        }
        let generation = self.fresh_generation();
        let interval = self.config.construction.timer_interval_ticks.max(1);
        let Some(s) = self.structures.get_mut(&structure) else {
            return;
        };
        s.timer_armed = wants;
        s.timer_generation = generation;
        if wants {
            self.event_queue.schedule(
                self.tick + interval,
                ScheduledEventKind::ConstructionTimer {
                    structure,
                    generation,
                },
            );
        }
    }

    fn handle_construction_timer(&mut self, structure: StructureId, generation: u64) {
        let interval = self.config.construction.timer_interval_ticks.max(1);
        let Some(s) = self.structures.get_mut(&structure) else {
            return;
        };
        if !s.timer_armed || s.timer_generation != generation {
            return;
        }
        let Some(def) = self.config.structures.get(&s.kind) else {
            return;
        };
        let transition = s.construction.advance_time(&def.construction, interval);
        let keep_running =
            s.construction.mode() == BuildMode::TimeGated && !s.construction.is_completed();
        if keep_running {
            self.event_queue.schedule(
                self.tick + interval,
                ScheduledEventKind::ConstructionTimer {
                    structure,
                    generation,
                },
            );
        } else {
            s.timer_armed = false;
        }
        if let Some(t) = transition {
            self.emit_transition(structure, t);
        }
    }

    // -----------------------------------------------------------------------
    // Remodeling
    // -----------------------------------------------------------------------

    /// Replace the placement rule chain. Rejected while any session is open.
    pub fn set_rule_chain(&mut self, rules: RuleChain) -> bool {
        if !self.sessions.is_empty() {
            tracing::warn!("rule chain change rejected: remodel session open");
            return false;
        }
        self.rules = rules;
        true
    }

    pub fn rule_chain(&self) -> &RuleChain {
        &self.rules
    }

    /// Replace the spatial index. Rejected while any session is open.
    pub fn set_spatial_index(&mut self, index: impl SpatialIndex + 'static) -> bool {
        if !self.sessions.is_empty() {
            tracing::warn!("spatial index change rejected: remodel session open");
            return false;
        }
        self.spatial = SharedSpatialIndex::new(index);
        true
    }

    /// Run `f` against a borrowed view of the sim for `collection`.
    fn with_world<R>(
        &mut self,
        collection: CollectionId,
        f: impl FnOnce(&mut RemodelWorld<'_>) -> R,
    ) -> Option<R> {
        let coll = self.collections.get(&collection)?;
        let plot = self.plots.get(&coll.plot)?;
        let mut world = RemodelWorld {
            config: &self.config,
            plot,
            collection: coll,
            structures: &mut self.structures,
            rules: &self.rules,
            spatial: self.spatial.0.as_ref(),
            next_generation: &mut self.next_generation,
            tick: self.tick,
            events: &mut self.outbox,
        };
        Some(f(&mut world))
    }

    /// Run a session operation, keeping the session open afterwards.
    fn with_session(
        &mut self,
        collection: CollectionId,
        op: impl FnOnce(&mut RemodelSession, &mut RemodelWorld<'_>) -> bool,
    ) -> bool {
        let Some(mut session) = self.sessions.remove(&collection) else {
            tracing::debug!(collection = %collection, "remodel op ignored: no open session");
            return false;
        };
        let accepted = self
            .with_world(collection, |world| op(&mut session, world))
            .unwrap_or(false);
        self.sessions.insert(collection, session);
        self.ensure_drag_tick(collection);
        accepted
    }

    pub fn remodel_start(&mut self, collection: CollectionId) -> bool {
        if self.sessions.contains_key(&collection) {
            tracing::warn!(
                collection = %collection,
                "remodel start rejected: session already open"
            );
            return false;
        }
        let Some(coll) = self.collections.get(&collection) else {
            tracing::debug!(collection = %collection, "remodel start ignored: unknown collection");
            return false;
        };
        if !self.plots.contains_key(&coll.plot) {
            return false;
        }
        let session = RemodelSession::start(coll, &self.structures);
        self.sessions.insert(collection, session);
        self.emit(SimEventKind::SessionStarted { collection });
        true
    }

    pub fn remodel_select_at(&mut self, collection: CollectionId, point: Vec3) -> bool {
        self.with_session(collection, |session, world| session.select_at(world, point))
    }

    pub fn remodel_pointer(&mut self, collection: CollectionId, ray: Ray) -> bool {
        self.with_session(collection, |session, _| session.set_pointer(ray))
    }

    pub fn remodel_place(&mut self, collection: CollectionId) -> bool {
        self.with_session(collection, |session, world| session.place(world))
    }

    pub fn remodel_cancel_selection(&mut self, collection: CollectionId) -> bool {
        self.with_session(collection, |session, world| session.cancel_selection(world))
    }

    /// Commit the session. Moved and added parts restart construction.
    pub fn remodel_complete(&mut self, collection: CollectionId) -> bool {
        let Some(session) = self.sessions.remove(&collection) else {
            tracing::warn!(collection = %collection, "commit rejected: no open session");
            return false;
        };
        let reset = self
            .with_world(collection, |world| session.complete(world))
            .unwrap_or_default();
        for &id in &reset {
            self.ensure_timer(id);
        }
        self.emit(SimEventKind::SessionCompleted { collection, reset });
        true
    }

    /// Roll the session back. Parts added during it are removed.
    pub fn remodel_cancel(&mut self, collection: CollectionId) -> bool {
        let Some(session) = self.sessions.remove(&collection) else {
            tracing::warn!(collection = %collection, "cancel rejected: no open session");
            return false;
        };
        let added = self
            .with_world(collection, |world| session.cancel(world))
            .unwrap_or_default();
        for id in added {
            self.detach_structure(id);
        }
        let members = self
            .collections
            .get(&collection)
            .map(|c| c.members.clone())
            .unwrap_or_default();
        for id in members {
            self.ensure_timer(id);
        }
        self.emit(SimEventKind::SessionCancelled { collection });
        true
    }

    fn ensure_drag_tick(&mut self, collection: CollectionId) {
        let interval = self.config.remodel.drag_interval_ticks.max(1);
        let Some(drag) = self
            .sessions
            .get_mut(&collection)
            .and_then(|s| s.drag_mut())
        else {
            return;
        };
        if drag.scheduled {
            return;
        }
        drag.scheduled = true;
        let generation = drag.generation;
        self.event_queue.schedule(
            self.tick + interval,
            ScheduledEventKind::DragTick {
                collection,
                generation,
            },
        );
    }

    fn handle_drag_tick(&mut self, collection: CollectionId, generation: u64) {
        let Some(drag) = self
            .sessions
            .get_mut(&collection)
            .and_then(|s| s.drag_mut())
        else {
            return;
        };
        if drag.generation != generation {
            return;
        }
        drag.scheduled = false;
        self.with_session(collection, |session, world| session.drag_tick(world));
    }

    // -----------------------------------------------------------------------
    // Save/load
    // -----------------------------------------------------------------------

    /// Rebuild all transient (`#[serde(skip)]`) state after deserialization.
    pub fn rebuild_transient_state(&mut self) {
        for plot in self.plots.values_mut() {
            plot.refresh();
        }
        for session in self.sessions.values_mut() {
            session.rebuild_transient_state();
        }
        self.rules = RuleChain::standard(&self.config.remodel);
        self.spatial = SharedSpatialIndex::new(FootprintIndex::from_config(&self.config));
    }

    /// Serialize the simulation state to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize a simulation state from a JSON string and rebuild
    /// transient state.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut state: SimState = serde_json::from_str(json)?;
        state.rebuild_transient_state();
        Ok(state)
    }

    /// Structures of a collection, in member order.
    pub fn members(&self, collection: CollectionId) -> Vec<&Structure> {
        self.collections
            .get(&collection)
            .map(|c| {
                c.members
                    .iter()
                    .filter_map(|id| self.structures.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }
}
