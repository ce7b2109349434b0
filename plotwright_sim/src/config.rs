// Data-driven game configuration.
//
// All tunable parameters live in `GameConfig`, loaded from JSON at startup.
// The sim never uses magic numbers; it reads from the config. The config is
// immutable once a `SimState` is created and is persisted with it, so a
// loaded save always replays against the rules it was played with.
//
// Parameters are grouped by subsystem: `PlotConfig` (buildability limits),
// `PerimeterConfig` (resampling), `ConstructionConfig` (timer cadence) and
// `RemodelConfig` (drag validation, collision response, built-in rule
// parameters). The structure catalog maps each `StructureKind` to a
// `StructureDef` holding its variant, footprint, default build mode and the
// shared `ConstructionDefinition` all instances of that kind use.
//
// `GameConfig::default()` is a small playable catalog (walls, doors,
// pillars, hearths) over four resource kinds. `from_json()` parses and
// validates; `SimState::try_with_config()` validates configs built in code.
//
// See also: `sim.rs` which owns the `GameConfig` as part of `SimState`,
// `construction.rs` for `ConstructionDefinition`, `error.rs` for
// `ConfigError`.

use crate::construction::{BuildMode, ConstructionDefinition, ResourceAmount, Stage};
use crate::error::ConfigError;
use crate::perimeter::MIN_UNIT_LENGTH;
use crate::plot::PlotLimits;
use crate::remodel::CollisionResponse;
use crate::types::{PartVariant, ResourceKind, StructureKind};
use serde::{Deserialize, Serialize};
use smallvec::smallvec;
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Nested parameter groups
// ---------------------------------------------------------------------------

/// Buildability limits applied to every traced boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Smallest interior angle (degrees) a buildable boundary may have.
    pub min_angle_deg: f32,
    /// Largest interior angle (degrees) a buildable boundary may have.
    pub max_angle_deg: f32,
    /// Fewest vertices (across all loops) a buildable boundary may have.
    pub min_vertex_count: usize,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            min_angle_deg: 45.0,
            max_angle_deg: 135.0,
            min_vertex_count: 4,
        }
    }
}

impl PlotConfig {
    pub fn limits(&self) -> PlotLimits {
        PlotLimits {
            min_angle_deg: self.min_angle_deg,
            max_angle_deg: self.max_angle_deg,
            min_vertex_count: self.min_vertex_count,
        }
    }
}

/// Perimeter resampling used by `PopulatePerimeter`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerimeterConfig {
    /// Target spacing between placed parts.
    pub unit_length: f32,
    /// Resampling passes (at least one; the last pass yields placements).
    pub iterations: u32,
}

impl Default for PerimeterConfig {
    fn default() -> Self {
        Self {
            unit_length: 1.0,
            iterations: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstructionConfig {
    /// Ticks between cooperative timer wakes for `TimeGated` structures.
    /// Each wake credits this many ticks of elapsed time.
    pub timer_interval_ticks: u64,
}

impl Default for ConstructionConfig {
    fn default() -> Self {
        Self {
            timer_interval_ticks: 1,
        }
    }
}

/// Remodel session behavior and built-in rule parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemodelConfig {
    /// Project out-of-bounds candidates back inside the plot.
    pub clamp_to_boundary: bool,
    /// Inward nudge (world units) applied after clamping to the boundary.
    pub boundary_inset: f32,
    /// Position/yaw tolerance when diffing against the snapshot on commit.
    pub transform_epsilon: f32,
    /// What `place()` does when the current placement is invalid.
    pub collision_response: CollisionResponse,
    /// Ticks between drag re-evaluations.
    pub drag_interval_ticks: u64,
    /// `BoundarySnapRule` reach.
    pub snap_distance: f32,
    /// `DoorOnWallRule` reach.
    pub door_wall_distance: f32,
    /// `DragLeashRule` reach. `None` disables the rule.
    pub max_drag_distance: Option<f32>,
}

impl Default for RemodelConfig {
    fn default() -> Self {
        Self {
            clamp_to_boundary: true,
            boundary_inset: 0.25,
            transform_epsilon: 1e-3,
            collision_response: CollisionResponse::None,
            drag_interval_ticks: 1,
            snap_distance: 1.0,
            door_wall_distance: 1.5,
            max_drag_distance: None,
        }
    }
}

/// Static definition of one structure kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructureDef {
    pub variant: PartVariant,
    /// `(width, depth)` of the ground footprint. Width runs along local X.
    pub footprint: (f32, f32),
    pub default_mode: BuildMode,
    pub construction: ConstructionDefinition,
}

impl StructureDef {
    pub fn footprint_area(&self) -> f32 {
        self.footprint.0 * self.footprint.1
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level game configuration. Loaded from JSON, never mutated at runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    pub plot: PlotConfig,
    pub perimeter: PerimeterConfig,
    pub construction: ConstructionConfig,
    pub remodel: RemodelConfig,
    /// Every resource kind deliveries may name.
    pub resource_kinds: BTreeSet<ResourceKind>,
    /// Structure catalog keyed by kind.
    pub structures: BTreeMap<StructureKind, StructureDef>,
}

impl Default for GameConfig {
    fn default() -> Self {
        let resource_kinds = ["Wood", "Stone", "Glass", "Thatch"]
            .into_iter()
            .map(ResourceKind::from)
            .collect();

        let mut structures = BTreeMap::new();
        structures.insert(
            StructureKind::from("wall"),
            StructureDef {
                variant: PartVariant::Wall,
                footprint: (1.0, 0.2),
                default_mode: BuildMode::TimeGated,
                construction: ConstructionDefinition {
                    stages: vec![
                        Stage {
                            name: "frame".into(),
                            requirements: smallvec![ResourceAmount::new("Wood", 4)],
                            duration_ticks: 5,
                            labor_required: 0,
                        },
                        Stage {
                            name: "masonry".into(),
                            requirements: smallvec![ResourceAmount::new("Stone", 2)],
                            duration_ticks: 5,
                            labor_required: 0,
                        },
                    ],
                },
            },
        );
        structures.insert(
            StructureKind::from("door"),
            StructureDef {
                variant: PartVariant::Door,
                footprint: (0.9, 0.2),
                default_mode: BuildMode::Instant,
                construction: ConstructionDefinition {
                    stages: vec![Stage {
                        name: "hang".into(),
                        requirements: smallvec![ResourceAmount::new("Wood", 2)],
                        duration_ticks: 0,
                        labor_required: 0,
                    }],
                },
            },
        );
        structures.insert(
            StructureKind::from("pillar"),
            StructureDef {
                variant: PartVariant::Generic,
                footprint: (0.5, 0.5),
                default_mode: BuildMode::LaborGated,
                construction: ConstructionDefinition {
                    stages: vec![Stage {
                        name: "raise".into(),
                        requirements: smallvec![ResourceAmount::new("Stone", 3)],
                        duration_ticks: 0,
                        labor_required: 4,
                    }],
                },
            },
        );
        structures.insert(
            StructureKind::from("hearth"),
            StructureDef {
                variant: PartVariant::Generic,
                footprint: (1.5, 1.5),
                default_mode: BuildMode::TimeGated,
                construction: ConstructionDefinition {
                    stages: vec![
                        Stage {
                            name: "base".into(),
                            requirements: smallvec![ResourceAmount::new("Stone", 6)],
                            duration_ticks: 10,
                            labor_required: 0,
                        },
                        Stage {
                            name: "chimney".into(),
                            requirements: smallvec![ResourceAmount::new("Wood", 2)],
                            duration_ticks: 4,
                            labor_required: 0,
                        },
                    ],
                },
            },
        );

        Self {
            plot: PlotConfig::default(),
            perimeter: PerimeterConfig::default(),
            construction: ConstructionConfig::default(),
            remodel: RemodelConfig::default(),
            resource_kinds,
            structures,
        }
    }
}

impl GameConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (min, max) = (self.plot.min_angle_deg, self.plot.max_angle_deg);
        if !(min > 0.0 && max < 360.0 && min <= max) {
            return Err(ConfigError::InvalidAngleRange { min, max });
        }
        let unit = self.perimeter.unit_length;
        if !(unit >= MIN_UNIT_LENGTH && unit.is_finite()) {
            return Err(ConfigError::UnitTooShort {
                unit,
                min: MIN_UNIT_LENGTH,
            });
        }
        for (kind, def) in &self.structures {
            if def.construction.stages.is_empty() {
                return Err(ConfigError::EmptyStages { kind: kind.clone() });
            }
            if !(def.footprint.0 > 0.0 && def.footprint.1 > 0.0) {
                return Err(ConfigError::InvalidFootprint { kind: kind.clone() });
            }
            for stage in &def.construction.stages {
                if let Some(req) = stage
                    .requirements
                    .iter()
                    .find(|r| !self.resource_kinds.contains(&r.kind))
                {
                    return Err(ConfigError::UnknownResource {
                        kind: kind.clone(),
                        resource: req.kind.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn structure(&self, kind: &StructureKind) -> Option<&StructureDef> {
        self.structures.get(kind)
    }

    pub fn is_known_resource(&self, kind: &ResourceKind) -> bool {
        self.resource_kinds.contains(kind)
    }

    /// Footprint area of the smallest catalog entry. Gates plot division.
    pub fn smallest_footprint_area(&self) -> Option<f32> {
        self.structures
            .values()
            .map(StructureDef::footprint_area)
            .min_by(f32::total_cmp)
    }
}
