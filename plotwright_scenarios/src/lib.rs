// Test-only host for end-to-end scenario tests.
//
// Wraps a real `SimState` and plays the role of the game host: it queues
// `SimAction`s for the next turn, stamps them with the turn's first tick,
// and advances the sim by `ticks_per_turn` through `SimState::step()`,
// exactly as an engine frame loop would. Every emitted `SimEvent` is kept in
// an event log and every submitted action in a command log, so tests can
// assert on notifications and replay a session into a second host.
//
// The only test-specific code here is the bookkeeping around logs and a few
// helpers that look up ids from the event stream. All sim logic runs through
// the same code paths as a real host.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use plotwright_sim::command::{SimAction, SimCommand};
use plotwright_sim::config::GameConfig;
use plotwright_sim::event::{SimEvent, SimEventKind};
use plotwright_sim::sim::SimState;
use plotwright_sim::types::{CollectionId, PlotId, StructureId, Vec3};

/// Default number of ticks a single `run_turn()` advances.
pub const DEFAULT_TICKS_PER_TURN: u64 = 1;

/// A scenario host driving a real `SimState`.
pub struct ScenarioHost {
    pub sim: SimState,
    pub ticks_per_turn: u64,
    queued: Vec<SimAction>,
    command_log: Vec<SimCommand>,
    event_log: Vec<SimEvent>,
}

impl ScenarioHost {
    pub fn new() -> Self {
        Self::with_config(GameConfig::default())
    }

    pub fn with_config(config: GameConfig) -> Self {
        Self {
            sim: SimState::with_config(config),
            ticks_per_turn: DEFAULT_TICKS_PER_TURN,
            queued: Vec::new(),
            command_log: Vec::new(),
            event_log: Vec::new(),
        }
    }

    /// Resume from a saved sim. The command log starts empty.
    pub fn from_save(json: &str) -> Self {
        let sim = SimState::from_json(json).expect("ScenarioHost::from_save: bad save");
        Self {
            sim,
            ticks_per_turn: DEFAULT_TICKS_PER_TURN,
            queued: Vec::new(),
            command_log: Vec::new(),
            event_log: Vec::new(),
        }
    }

    /// Queue an action for the next turn.
    pub fn send(&mut self, action: SimAction) {
        self.queued.push(action);
    }

    /// Apply queued actions at the start of the turn and advance the sim by
    /// `ticks_per_turn`. Returns the events emitted during the turn.
    pub fn run_turn(&mut self) -> Vec<SimEvent> {
        let tick = self.sim.tick + 1;
        let commands: Vec<SimCommand> = self
            .queued
            .drain(..)
            .map(|action| SimCommand { tick, action })
            .collect();
        let target = self.sim.tick + self.ticks_per_turn.max(1);
        let result = self.sim.step(&commands, target);
        tracing::debug!(
            tick = self.sim.tick,
            commands = commands.len(),
            events = result.events.len(),
            "turn complete"
        );
        self.command_log.extend(commands);
        self.event_log.extend(result.events.iter().cloned());
        result.events
    }

    /// Run `turns` turns with no new input.
    pub fn idle(&mut self, turns: u32) -> Vec<SimEvent> {
        (0..turns).flat_map(|_| self.run_turn()).collect()
    }

    /// Queue one action and run the turn.
    pub fn act(&mut self, action: SimAction) -> Vec<SimEvent> {
        self.send(action);
        self.run_turn()
    }

    pub fn command_log(&self) -> &[SimCommand] {
        &self.command_log
    }

    pub fn event_log(&self) -> &[SimEvent] {
        &self.event_log
    }

    /// Save the sim to JSON.
    pub fn save(&self) -> String {
        self.sim.to_json().expect("ScenarioHost::save failed")
    }

    /// The command log as JSON, the form a host would persist or send.
    pub fn export_commands(&self) -> String {
        serde_json::to_string(&self.command_log).expect("export_commands failed")
    }

    /// Replay this host's command log (through its JSON form) into a fresh
    /// host with `config`, up to the same tick.
    pub fn replay(&self, config: GameConfig) -> ScenarioHost {
        let commands: Vec<SimCommand> =
            serde_json::from_str(&self.export_commands()).expect("replay: bad command log");
        let mut other = ScenarioHost::with_config(config);
        other.ticks_per_turn = self.ticks_per_turn;
        let result = other.sim.step(&commands, self.sim.tick);
        other.command_log = commands;
        other.event_log = result.events;
        other
    }

    // -----------------------------------------------------------------------
    // Convenience flows
    // -----------------------------------------------------------------------

    /// Trace a single-loop boundary through the command path and complete
    /// it. Returns the new plot id.
    pub fn trace_plot(&mut self, points: &[Vec3]) -> PlotId {
        let events = self.act(SimAction::BeginBoundary);
        let plot = events
            .iter()
            .find_map(|e| match e.kind {
                SimEventKind::BoundaryCreated { plot } => Some(plot),
                _ => None,
            })
            .expect("trace_plot: no BoundaryCreated");
        self.send(SimAction::AddLoop { plot });
        for &point in points {
            self.send(SimAction::AddVertex {
                plot,
                loop_index: 0,
                point,
            });
        }
        self.send(SimAction::CompleteBoundary { plot });
        self.run_turn();
        plot
    }

    /// Attach a collection to `plot`. Panics if the plot is not buildable.
    pub fn attach(&mut self, plot: PlotId) -> CollectionId {
        self.act(SimAction::AttachCollection { plot })
            .iter()
            .find_map(|e| match e.kind {
                SimEventKind::CollectionAttached { collection, .. } => Some(collection),
                _ => None,
            })
            .expect("attach: no CollectionAttached")
    }

    /// Structures added by `events`, in order.
    pub fn added_structures(events: &[SimEvent]) -> Vec<StructureId> {
        events
            .iter()
            .filter_map(|e| match e.kind {
                SimEventKind::StructureAdded { structure, .. } => Some(structure),
                _ => None,
            })
            .collect()
    }
}

impl Default for ScenarioHost {
    fn default() -> Self {
        Self::new()
    }
}

/// The corners of an axis-aligned square with one corner at the origin.
pub fn square(size: f32) -> Vec<Vec3> {
    vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(size, 0.0, 0.0),
        Vec3::new(size, 0.0, size),
        Vec3::new(0.0, 0.0, size),
    ]
}
