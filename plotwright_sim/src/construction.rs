// Construction engine — staged progression gated by delivered resources.
//
// A structure type's `ConstructionDefinition` (shared, immutable, from
// `GameConfig::structures`) lists ordered `Stage`s, each with resource
// requirements plus a duration (TimeGated) and a labor amount (LaborGated).
// Each structure instance owns a `ConstructionState` that walks
// `Stage(0) -> Stage(1) -> ... -> Stage(N) = Completed`.
//
// ## Resource flow
//
// Deliveries land in `pending`. `try_allocate()` (run after every setup,
// advance, jump and delivery) pulls `min(still_needed, pending)` of each
// required kind into `collected`. When the stage index changes, `collected`
// moves to `consumed`; nothing is ever dropped, so
// `pending + collected + consumed` equals the sum of all deliveries. A
// delivery that would push a kind's lifetime total past `u32::MAX` is
// refused, which keeps every ledger count representable.
// Allocation is skipped while the stage is "in progress" (requirements met,
// time/labor still outstanding) and after completion.
//
// ## Modes
//
// - `Instant`: progress is always 100%; the host calls `advance()`.
// - `TimeGated`: `advance_time(dt)` accumulates only while requirements are
//   met and advances once the stage duration is reached. The periodic wake
//   that calls it is a `ConstructionTimer` in the sim's event queue. Commands
//   run before events at the same tick, so a wake on the tick the last
//   resource arrives is already credited: with a 1-tick interval, a stage of
//   duration `d` met at tick `t` completes at tick `t + d - 1`.
// - `LaborGated`: `add_labor(amount)` accumulates only while requirements are
//   met; overflow past the requirement carries into the next stage and can
//   chain several advances in one call.
//
// Invalid input (zero amounts, acting on a completed structure, wrong mode)
// is a no-op reported through the return value. `jump_to_stage()` clamps.
//
// See also: `ledger.rs` for the multisets, `config.rs` for the catalog that
// owns definitions, `sim.rs` for timers and notifications, `remodel.rs` for
// the forced reset on commit.

use crate::ledger::ResourceLedger;
use crate::types::ResourceKind;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

// ---------------------------------------------------------------------------
// Static definitions
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAmount {
    pub kind: ResourceKind,
    pub amount: u32,
}

impl ResourceAmount {
    pub fn new(kind: impl Into<String>, amount: u32) -> Self {
        Self {
            kind: ResourceKind::new(kind),
            amount,
        }
    }
}

/// One discrete construction phase.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(default)]
    pub name: String,
    pub requirements: SmallVec<[ResourceAmount; 4]>,
    /// Ticks of satisfied time needed in `TimeGated` mode.
    #[serde(default)]
    pub duration_ticks: u64,
    /// Labor units needed in `LaborGated` mode.
    #[serde(default)]
    pub labor_required: u32,
}

impl Stage {
    pub fn requirement(&self, kind: &ResourceKind) -> u32 {
        self.requirements
            .iter()
            .filter(|r| &r.kind == kind)
            .map(|r| r.amount)
            .sum()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstructionDefinition {
    pub stages: Vec<Stage>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildMode {
    #[default]
    Instant,
    TimeGated,
    LaborGated,
}

/// What happened when a stage ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageTransition {
    Advanced { from: usize, to: usize },
    Completed { from: usize },
}

// ---------------------------------------------------------------------------
// Per-instance state
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstructionState {
    stage_index: usize,
    stage_count: usize,
    pending: ResourceLedger,
    collected: ResourceLedger,
    consumed: ResourceLedger,
    mode: BuildMode,
    elapsed_ticks: u64,
    labor: u32,
}

impl ConstructionState {
    pub fn new(def: &ConstructionDefinition, mode: BuildMode) -> Self {
        Self {
            stage_index: 0,
            stage_count: def.stages.len(),
            pending: ResourceLedger::new(),
            collected: ResourceLedger::new(),
            consumed: ResourceLedger::new(),
            mode,
            elapsed_ticks: 0,
            labor: 0,
        }
    }

    // -- Queries --

    pub fn stage_index(&self) -> usize {
        self.stage_index
    }

    pub fn stage_count(&self) -> usize {
        self.stage_count
    }

    pub fn is_completed(&self) -> bool {
        self.stage_index >= self.stage_count
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    pub fn pending(&self) -> &ResourceLedger {
        &self.pending
    }

    pub fn collected(&self) -> &ResourceLedger {
        &self.collected
    }

    /// Resources credited to stages that have since been left.
    pub fn consumed(&self) -> &ResourceLedger {
        &self.consumed
    }

    pub fn elapsed_ticks(&self) -> u64 {
        self.elapsed_ticks
    }

    pub fn labor(&self) -> u32 {
        self.labor
    }

    pub fn current_stage<'a>(&self, def: &'a ConstructionDefinition) -> Option<&'a Stage> {
        def.stages.get(self.stage_index)
    }

    /// True iff every requirement of the current stage is covered by
    /// `collected`. Trivially true once completed.
    pub fn are_all_resources_collected(&self, def: &ConstructionDefinition) -> bool {
        let Some(stage) = self.current_stage(def) else {
            return true;
        };
        stage
            .requirements
            .iter()
            .all(|r| self.collected.get(&r.kind) >= stage.requirement(&r.kind))
    }

    /// Mode-specific progress through the current stage, in `[0, 1]`.
    pub fn stage_progress(&self, def: &ConstructionDefinition) -> f32 {
        let Some(stage) = self.current_stage(def) else {
            return 1.0;
        };
        let satisfied = self.are_all_resources_collected(def);
        let ratio = |have: f32, need: f32| {
            if need <= 0.0 {
                if satisfied { 1.0 } else { 0.0 }
            } else {
                (have / need).min(1.0)
            }
        };
        match self.mode {
            BuildMode::Instant => 1.0,
            BuildMode::TimeGated => ratio(self.elapsed_ticks as f32, stage.duration_ticks as f32),
            BuildMode::LaborGated => ratio(self.labor as f32, stage.labor_required as f32),
        }
    }

    /// Requirements met but time/labor still outstanding. No allocation
    /// happens in this state.
    pub fn is_in_progress(&self, def: &ConstructionDefinition) -> bool {
        !self.is_completed()
            && self.are_all_resources_collected(def)
            && self.stage_progress(def) < 1.0
    }

    // -- Transitions --

    /// Reset to stage 0. Collected resources are retired to `consumed`;
    /// pending resources survive and are re-allocated to stage 0.
    pub fn setup(&mut self, def: &ConstructionDefinition) {
        self.stage_count = def.stages.len();
        self.enter_stage(0);
        self.labor = 0;
        self.try_allocate(def);
    }

    /// Move to the next stage. `None` if already completed.
    pub fn advance(&mut self, def: &ConstructionDefinition) -> Option<StageTransition> {
        if self.is_completed() {
            return None;
        }
        let from = self.stage_index;
        self.enter_stage(from + 1);
        self.labor = 0;
        self.try_allocate(def);
        Some(if self.is_completed() {
            StageTransition::Completed { from }
        } else {
            StageTransition::Advanced {
                from,
                to: self.stage_index,
            }
        })
    }

    /// Jump to `stage`, clamped to `[0, stage_count]`. Returns the index
    /// actually entered.
    pub fn jump_to_stage(&mut self, def: &ConstructionDefinition, stage: i64) -> usize {
        let target = stage.clamp(0, self.stage_count as i64) as usize;
        self.enter_stage(target);
        self.labor = 0;
        self.try_allocate(def);
        target
    }

    /// Deliver resources. Returns `false` (and changes nothing) for a zero
    /// amount, a completed structure, or a delivery that would overflow the
    /// kind's lifetime total.
    pub fn add_pending(
        &mut self,
        def: &ConstructionDefinition,
        kind: &ResourceKind,
        amount: u32,
    ) -> bool {
        if amount == 0 || self.is_completed() {
            return false;
        }
        if self.delivered(kind) + u64::from(amount) > u64::from(u32::MAX) {
            return false;
        }
        if !self.pending.add(kind, amount) {
            return false;
        }
        self.try_allocate(def);
        true
    }

    /// Everything of `kind` ever delivered to this structure.
    pub fn delivered(&self, kind: &ResourceKind) -> u64 {
        u64::from(self.pending.get(kind))
            + u64::from(self.collected.get(kind))
            + u64::from(self.consumed.get(kind))
    }

    /// One cooperative timer wake worth `dt` ticks. Accumulates only in
    /// `TimeGated` mode with requirements met.
    pub fn advance_time(
        &mut self,
        def: &ConstructionDefinition,
        dt: u64,
    ) -> Option<StageTransition> {
        if self.mode != BuildMode::TimeGated || self.is_completed() {
            return None;
        }
        if !self.are_all_resources_collected(def) {
            return None;
        }
        let duration = self.current_stage(def)?.duration_ticks;
        self.elapsed_ticks = self.elapsed_ticks.saturating_add(dt);
        if self.elapsed_ticks >= duration {
            self.advance(def)
        } else {
            None
        }
    }

    /// Contribute labor in `LaborGated` mode. Returns every transition the
    /// contribution caused, in order; empty if it was not accepted.
    pub fn add_labor(&mut self, def: &ConstructionDefinition, amount: u32) -> Vec<StageTransition> {
        let mut transitions = Vec::new();
        if amount == 0 || self.mode != BuildMode::LaborGated || self.is_completed() {
            return transitions;
        }
        if !self.are_all_resources_collected(def) {
            return transitions;
        }
        self.labor = self.labor.saturating_add(amount);
        loop {
            let Some(required) = self.current_stage(def).map(|s| s.labor_required) else {
                break;
            };
            if !self.are_all_resources_collected(def) || self.labor < required {
                break;
            }
            let carry = self.labor - required;
            let Some(transition) = self.advance(def) else {
                break;
            };
            transitions.push(transition);
            self.labor = carry;
        }
        if self.is_completed() {
            self.labor = 0;
        }
        transitions
    }

    /// Switch mode. Mode counters restart. Returns `false` if unchanged.
    pub fn set_mode(&mut self, mode: BuildMode) -> bool {
        if self.mode == mode {
            return false;
        }
        self.mode = mode;
        self.elapsed_ticks = 0;
        self.labor = 0;
        true
    }

    fn enter_stage(&mut self, index: usize) {
        self.stage_index = index;
        self.consumed.absorb(&mut self.collected);
        self.elapsed_ticks = 0;
    }

    /// Pull pending resources toward the current stage's outstanding needs.
    /// Returns the total amount moved.
    fn try_allocate(&mut self, def: &ConstructionDefinition) -> u32 {
        if self.is_completed() || self.is_in_progress(def) {
            return 0;
        }
        let Some(stage) = self.current_stage(def) else {
            return 0;
        };
        let mut moved: u32 = 0;
        for req in &stage.requirements {
            let need = stage.requirement(&req.kind);
            let still_needed = need.saturating_sub(self.collected.get(&req.kind));
            if still_needed == 0 {
                continue;
            }
            let taken = self.pending.take(&req.kind, still_needed);
            if self.collected.add(&req.kind, taken) {
                moved = moved.saturating_add(taken);
            } else {
                self.pending.add(&req.kind, taken);
            }
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn wood() -> ResourceKind {
        ResourceKind::from("Wood")
    }

    fn stone() -> ResourceKind {
        ResourceKind::from("Stone")
    }

    fn single_wood_stage(amount: u32, duration: u64) -> ConstructionDefinition {
        ConstructionDefinition {
            stages: vec![Stage {
                name: "frame".into(),
                requirements: smallvec![ResourceAmount::new("Wood", amount)],
                duration_ticks: duration,
                labor_required: 0,
            }],
        }
    }

    fn two_stage() -> ConstructionDefinition {
        ConstructionDefinition {
            stages: vec![
                Stage {
                    name: "frame".into(),
                    requirements: smallvec![ResourceAmount::new("Wood", 4)],
                    duration_ticks: 3,
                    labor_required: 5,
                },
                Stage {
                    name: "masonry".into(),
                    requirements: smallvec![ResourceAmount::new("Stone", 2)],
                    duration_ticks: 2,
                    labor_required: 3,
                },
            ],
        }
    }

    fn total_delivered(state: &ConstructionState) -> u64 {
        state.pending().total() + state.collected().total() + state.consumed().total()
    }

    #[test]
    fn deliveries_fill_requirement_then_wait_in_pending() {
        let def = single_wood_stage(10, 5);
        let mut state = ConstructionState::new(&def, BuildMode::TimeGated);
        assert!(state.add_pending(&def, &wood(), 4));
        assert!(state.add_pending(&def, &wood(), 6));
        assert_eq!(state.collected().get(&wood()), 10);
        assert!(state.pending().is_empty());
        assert!(state.are_all_resources_collected(&def));
        assert!(state.is_in_progress(&def));

        // Surplus stays pending while the stage is in progress.
        assert!(state.add_pending(&def, &wood(), 3));
        assert_eq!(state.collected().get(&wood()), 10);
        assert_eq!(state.pending().get(&wood()), 3);
    }

    #[test]
    fn time_gated_completes_after_duration() {
        let def = single_wood_stage(10, 5);
        let mut state = ConstructionState::new(&def, BuildMode::TimeGated);
        state.add_pending(&def, &wood(), 4);
        state.add_pending(&def, &wood(), 6);
        for _ in 0..4 {
            assert_eq!(state.advance_time(&def, 1), None);
        }
        assert_eq!(state.elapsed_ticks(), 4);
        assert_eq!(
            state.advance_time(&def, 1),
            Some(StageTransition::Completed { from: 0 })
        );
        assert_eq!(state.stage_index(), 1);
        assert!(state.is_completed());
        assert_eq!(state.elapsed_ticks(), 0);
    }

    #[test]
    fn time_does_not_count_without_resources() {
        let def = single_wood_stage(10, 5);
        let mut state = ConstructionState::new(&def, BuildMode::TimeGated);
        state.add_pending(&def, &wood(), 9);
        for _ in 0..20 {
            assert_eq!(state.advance_time(&def, 1), None);
        }
        assert_eq!(state.elapsed_ticks(), 0);
        assert_eq!(state.stage_index(), 0);
    }

    #[test]
    fn zero_duration_stage_completes_on_first_wake() {
        let def = single_wood_stage(1, 0);
        let mut state = ConstructionState::new(&def, BuildMode::TimeGated);
        state.add_pending(&def, &wood(), 1);
        assert!(!state.is_in_progress(&def));
        assert_eq!(
            state.advance_time(&def, 1),
            Some(StageTransition::Completed { from: 0 })
        );
    }

    #[test]
    fn advance_moves_collected_to_consumed_and_reallocates() {
        let def = two_stage();
        let mut state = ConstructionState::new(&def, BuildMode::Instant);
        state.add_pending(&def, &wood(), 4);
        state.add_pending(&def, &stone(), 5);
        assert_eq!(state.collected().get(&wood()), 4);
        assert_eq!(state.pending().get(&stone()), 5);

        assert_eq!(
            state.advance(&def),
            Some(StageTransition::Advanced { from: 0, to: 1 })
        );
        assert_eq!(state.collected().get(&wood()), 0);
        assert_eq!(state.consumed().get(&wood()), 4);
        assert_eq!(state.collected().get(&stone()), 2);
        assert_eq!(state.pending().get(&stone()), 3);
        assert_eq!(total_delivered(&state), 9);

        assert_eq!(
            state.advance(&def),
            Some(StageTransition::Completed { from: 1 })
        );
        assert_eq!(state.advance(&def), None);
        assert_eq!(state.stage_index(), 2);
    }

    #[test]
    fn completed_rejects_deliveries() {
        let def = single_wood_stage(1, 0);
        let mut state = ConstructionState::new(&def, BuildMode::Instant);
        state.advance(&def);
        assert!(state.is_completed());
        assert!(!state.add_pending(&def, &wood(), 5));
        assert!(state.pending().is_empty());
    }

    #[test]
    fn zero_amount_is_rejected() {
        let def = single_wood_stage(1, 0);
        let mut state = ConstructionState::new(&def, BuildMode::Instant);
        assert!(!state.add_pending(&def, &wood(), 0));
        assert_eq!(total_delivered(&state), 0);
    }

    #[test]
    fn setup_keeps_pending_and_returns_to_stage_zero() {
        let def = two_stage();
        let mut state = ConstructionState::new(&def, BuildMode::Instant);
        state.add_pending(&def, &wood(), 6);
        state.advance(&def);
        state.add_pending(&def, &stone(), 2);
        assert_eq!(state.stage_index(), 1);

        state.setup(&def);
        assert_eq!(state.stage_index(), 0);
        // The 2 surplus wood from before are re-credited to stage 0.
        assert_eq!(state.collected().get(&wood()), 2);
        assert_eq!(state.collected().get(&stone()), 0);
        assert_eq!(state.consumed().get(&stone()), 2);
        assert_eq!(total_delivered(&state), 8);
    }

    #[test]
    fn labor_gated_carries_overflow() {
        let def = two_stage();
        let mut state = ConstructionState::new(&def, BuildMode::LaborGated);
        // No resources yet: labor is refused.
        assert!(state.add_labor(&def, 10).is_empty());
        assert_eq!(state.labor(), 0);

        state.add_pending(&def, &wood(), 4);
        state.add_pending(&def, &stone(), 2);
        assert!(state.add_labor(&def, 3).is_empty());
        assert_eq!(state.labor(), 3);

        // 3 + 7 = 10: stage 0 needs 5, carry 5 covers stage 1's 3, carry 2
        // is dropped at completion.
        let transitions = state.add_labor(&def, 7);
        assert_eq!(
            transitions,
            vec![
                StageTransition::Advanced { from: 0, to: 1 },
                StageTransition::Completed { from: 1 },
            ]
        );
        assert!(state.is_completed());
        assert_eq!(state.labor(), 0);
    }

    #[test]
    fn labor_carry_waits_for_next_stage_resources() {
        let def = two_stage();
        let mut state = ConstructionState::new(&def, BuildMode::LaborGated);
        state.add_pending(&def, &wood(), 4);
        let transitions = state.add_labor(&def, 7);
        assert_eq!(transitions, vec![StageTransition::Advanced { from: 0, to: 1 }]);
        assert_eq!(state.labor(), 2);
        assert_eq!(state.stage_index(), 1);
    }

    #[test]
    fn labor_ignored_in_other_modes() {
        let def = two_stage();
        let mut state = ConstructionState::new(&def, BuildMode::TimeGated);
        state.add_pending(&def, &wood(), 4);
        assert!(state.add_labor(&def, 100).is_empty());
        assert_eq!(state.stage_index(), 0);
    }

    #[test]
    fn jump_is_clamped() {
        let def = two_stage();
        let mut state = ConstructionState::new(&def, BuildMode::Instant);
        assert_eq!(state.jump_to_stage(&def, 99), 2);
        assert!(state.is_completed());
        assert_eq!(state.jump_to_stage(&def, -4), 0);
        assert_eq!(state.jump_to_stage(&def, 1), 1);
    }

    #[test]
    fn set_mode_restarts_counters() {
        let def = single_wood_stage(1, 10);
        let mut state = ConstructionState::new(&def, BuildMode::TimeGated);
        state.add_pending(&def, &wood(), 1);
        state.advance_time(&def, 3);
        assert_eq!(state.elapsed_ticks(), 3);
        assert!(!state.set_mode(BuildMode::TimeGated));
        assert!(state.set_mode(BuildMode::LaborGated));
        assert_eq!(state.elapsed_ticks(), 0);
    }

    #[test]
    fn progress_by_mode() {
        let def = two_stage();
        let mut state = ConstructionState::new(&def, BuildMode::Instant);
        assert_eq!(state.stage_progress(&def), 1.0);
        state.set_mode(BuildMode::TimeGated);
        state.add_pending(&def, &wood(), 4);
        state.advance_time(&def, 1);
        assert!((state.stage_progress(&def) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn conservation_over_mixed_sequence() {
        let def = two_stage();
        let mut state = ConstructionState::new(&def, BuildMode::Instant);
        let mut delivered = 0u64;
        let deliveries = [(wood(), 3), (stone(), 1), (wood(), 5), (stone(), 4), (wood(), 2)];
        for (i, (kind, amount)) in deliveries.iter().enumerate() {
            if state.add_pending(&def, kind, *amount) {
                delivered += u64::from(*amount);
            }
            if i % 2 == 1 {
                state.advance(&def);
            }
            assert_eq!(total_delivered(&state), delivered);
        }
        state.setup(&def);
        assert_eq!(total_delivered(&state), delivered);
    }

    #[test]
    fn overflowing_delivery_is_refused_and_conserved() {
        let def = two_stage();
        let mut state = ConstructionState::new(&def, BuildMode::Instant);
        assert!(state.add_pending(&def, &wood(), 4_000_000_000));
        assert!(!state.add_pending(&def, &wood(), 4_000_000_000));
        assert_eq!(total_delivered(&state), 4_000_000_000);
        assert_eq!(state.delivered(&wood()), 4_000_000_000);

        // Moving collected into consumed does not lift the cap.
        state.advance(&def);
        assert!(!state.add_pending(&def, &wood(), 300_000_000));
        assert!(state.add_pending(&def, &wood(), 294_967_295));
        assert_eq!(state.delivered(&wood()), u64::from(u32::MAX));
        assert_eq!(total_delivered(&state), u64::from(u32::MAX));
        // Other kinds are unaffected.
        assert!(state.add_pending(&def, &stone(), 1));
    }

    #[test]
    fn stage_requirement_sums_duplicate_kinds() {
        let stage = Stage {
            requirements: smallvec![ResourceAmount::new("Wood", 2), ResourceAmount::new("Wood", 3)],
            ..Stage::default()
        };
        assert_eq!(stage.requirement(&wood()), 5);
    }

    #[test]
    fn state_serde_roundtrip() {
        let def = two_stage();
        let mut state = ConstructionState::new(&def, BuildMode::LaborGated);
        state.add_pending(&def, &wood(), 6);
        state.add_labor(&def, 2);
        let json = serde_json::to_string(&state).unwrap();
        let restored: ConstructionState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
