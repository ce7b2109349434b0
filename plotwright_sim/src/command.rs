// Commands that mutate simulation state.
//
// All external mutations to the simulation go through `SimAction`. This is
// the only way outside code can change sim state; the sim is a pure function
// `(state, commands) -> (new_state, events)`, and commands are the input.
//
// A `SimCommand` carries a `tick` (when to apply) and a `SimAction`. Hosts
// either queue commands into `SimState::step()` or apply one immediately
// with `SimState::execute()`, which reports whether it was accepted.
//
// Action groups:
// - Boundary editing: `BeginBoundary` through `DividePlot`. Edits are
//   rejected once the plot is frozen by an attached collection.
// - Structures: attaching a collection to a buildable plot, populating its
//   perimeter, adding/removing individual parts, discarding the lot.
// - Construction: resource and labor delivery, explicit stage control.
//   Amounts are signed so that non-positive input can be expressed (and
//   rejected) rather than wrapping.
// - Remodeling: session lifecycle and the drag loop inputs.
//
// See also: `sim.rs` for `execute()` which dispatches these, `event.rs` for
// the notifications they produce.
//
// **Critical constraint: determinism.** Commands are the sole external input
// to the sim. Internal state changes come from scheduled events (see
// `event.rs`).

use crate::construction::BuildMode;
use crate::types::{
    Axis, CollectionId, PlotId, Ray, ResourceKind, StructureId, StructureKind, Transform, Vec3,
};
use serde::{Deserialize, Serialize};

/// A host-issued command targeting a specific simulation tick.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimCommand {
    pub tick: u64,
    pub action: SimAction,
}

/// The specific action a command performs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SimAction {
    // -- Boundary --
    /// Start a new, empty boundary.
    BeginBoundary,
    AddLoop { plot: PlotId },
    AddVertex { plot: PlotId, loop_index: usize, point: Vec3 },
    /// Also used for the cursor point while tracing.
    UpdateVertex {
        plot: PlotId,
        loop_index: usize,
        vertex_index: usize,
        point: Vec3,
    },
    RemoveVertex { plot: PlotId, loop_index: usize, vertex_index: usize },
    RemoveLoop { plot: PlotId, loop_index: usize },
    /// Confirm the boundary. Requires it to be buildable.
    CompleteBoundary { plot: PlotId },
    /// Unfreeze for editing. Rejected while a remodel session is open on a
    /// collection attached to the plot.
    ReopenBoundary { plot: PlotId },
    /// Split a completed plot into `count` strips along `axis`.
    DividePlot { plot: PlotId, count: usize, axis: Axis },

    // -- Structures --
    /// Attach a new structure collection. Freezes the plot.
    AttachCollection { plot: PlotId },
    /// Place one part of `kind` at every perimeter sample of the plot.
    PopulatePerimeter { collection: CollectionId, kind: StructureKind },
    AddStructure {
        collection: CollectionId,
        kind: StructureKind,
        transform: Transform,
    },
    RemoveStructure { structure: StructureId },
    DiscardCollection { collection: CollectionId },

    // -- Construction --
    AddPendingResource {
        structure: StructureId,
        kind: ResourceKind,
        amount: i64,
    },
    AddLabor { structure: StructureId, amount: i64 },
    /// Externally triggered advance (the `Instant` mode flow).
    AdvanceStage { structure: StructureId },
    /// Clamped to `[0, stage_count]`.
    JumpToStage { structure: StructureId, stage: i64 },
    ResetConstruction { structure: StructureId },
    SetBuildMode { structure: StructureId, mode: BuildMode },

    // -- Remodeling --
    RemodelStart { collection: CollectionId },
    RemodelSelectAt { collection: CollectionId, point: Vec3 },
    RemodelPointer { collection: CollectionId, ray: Ray },
    RemodelPlace { collection: CollectionId },
    RemodelCancelSelection { collection: CollectionId },
    RemodelComplete { collection: CollectionId },
    RemodelCancel { collection: CollectionId },
}
