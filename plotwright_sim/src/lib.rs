// plotwright_sim — pure Rust simulation library for plot-based building.
//
// This crate contains all simulation logic for Plotwright: tracing a
// polygonal plot boundary, tiling structures along it, staged construction
// gated by resources, time or labor, and transactional remodeling of placed
// parts. It has no engine dependencies and can be tested, benchmarked, and
// run headless. Rendering, input and pooling of visual instances belong to
// the host, which drives the sim with commands and reacts to its events.
//
// Module overview:
// - `sim.rs`:          Top-level SimState, tick loop, command/event processing.
// - `command.rs`:      SimCommand / SimAction — all sim mutations.
// - `event.rs`:        EventQueue (priority queue) + host-visible SimEvents.
// - `config.rs`:       GameConfig — plot limits, perimeter spacing, remodel tuning,
//                       structure catalog.
// - `error.rs`:        ConfigError for config loading and validation.
// - `types.rs`:        Vec3, Transform, Ray, entity IDs, catalog names.
// - `geometry.rs`:     Oriented footprints (SAT overlap) and segment helpers.
// - `plot.rs`:         Plot boundary: loops, buildability, containment, clamping, division.
// - `perimeter.rs`:    Fixed-unit resampling of boundary loops into part placements.
// - `ledger.rs`:       ResourceLedger — per-kind resource counts.
// - `construction.rs`: Stage definitions and the per-structure construction state machine.
// - `structure.rs`:    Structure, StructureCollection, StructurePool (id recycling).
// - `spatial.rs`:      SpatialIndex trait for hit-testing and footprints.
// - `rules.rs`:        PlacementRule trait, RuleChain, built-in rules.
// - `remodel.rs`:      RemodelSession — snapshot, drag loop, commit/cancel.
//
// **Critical constraint: determinism.** The simulation is a pure function:
// `(state, commands) -> (new_state, events)`. No `HashMap` iteration, no
// system time, no OS entropy. Use `BTreeMap` for ordered collections.

pub mod command;
pub mod config;
pub mod construction;
pub mod error;
pub mod event;
pub mod geometry;
pub mod ledger;
pub mod perimeter;
pub mod plot;
pub mod remodel;
pub mod rules;
pub mod sim;
pub mod spatial;
pub mod structure;
pub mod types;
