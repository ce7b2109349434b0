// Error types for the fallible boundaries of the sim: config loading and
// validation. Runtime operations never return errors; they return `bool`
// and emit diagnostics instead (see `sim.rs`).

use crate::types::{ResourceKind, StructureKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("angle range [{min}, {max}] is empty or outside (0, 360)")]
    InvalidAngleRange { min: f32, max: f32 },

    #[error("perimeter unit length must be at least {min}, got {unit}")]
    UnitTooShort { unit: f32, min: f32 },

    #[error("structure kind {kind} has no construction stages")]
    EmptyStages { kind: StructureKind },

    #[error("structure kind {kind} requires unknown resource {resource}")]
    UnknownResource {
        kind: StructureKind,
        resource: ResourceKind,
    },

    #[error("structure kind {kind} has a non-positive footprint")]
    InvalidFootprint { kind: StructureKind },
}
