// Placement rules evaluated once per drag update.
//
// A `PlacementRule` sees the dragged structure, its siblings in the same
// collection, the plot, and the structure's pre-drag transform. It may
// rewrite the candidate transform in place (snapping) and returns a
// `RuleOutcome`: accepted, or rejected with a reason. A rejection with
// `enforce` set force-ends the drag and restores the pre-drag transform; a
// plain rejection only marks the candidate invalid.
//
// `RuleChain` runs rules in registration order and stops at the first
// rejection, so later rules see the rewrites of earlier ones. Hosts install
// their own chain with `SimState::set_rule_chain()` while no session is open.
//
// Built-in rules:
// - `BoundarySnapRule`: wall-like and door-like parts near the boundary snap
//   onto it and align with the edge.
// - `DoorOnWallRule`: doors need a wall sibling nearby.
// - `DragLeashRule`: dragging too far from the pre-drag spot is refused
//   outright (enforced).
//
// See also: `remodel.rs` for where the chain runs relative to containment
// and collision checks, `config.rs` (`RemodelConfig`) for rule parameters.

use crate::config::RemodelConfig;
use crate::plot::Plot;
use crate::structure::Structure;
use crate::types::{PartVariant, Transform, Vec3};
use std::fmt;
use std::sync::Arc;

/// Result of one rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleOutcome {
    pub accepted: bool,
    pub reason: String,
    /// Rejection ends the drag instead of just marking it invalid.
    pub enforce: bool,
}

impl RuleOutcome {
    pub fn accept() -> Self {
        Self {
            accepted: true,
            reason: String::new(),
            enforce: false,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: reason.into(),
            enforce: false,
        }
    }

    pub fn enforce(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: reason.into(),
            enforce: true,
        }
    }
}

/// Everything a rule may look at. Read-only except for the candidate.
pub struct RuleContext<'a> {
    pub structure: &'a Structure,
    pub siblings: &'a [&'a Structure],
    pub plot: &'a Plot,
    pub pre_drag: Transform,
}

pub trait PlacementRule: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, ctx: &RuleContext<'_>, candidate: &mut Transform) -> RuleOutcome;
}

/// Chain-level result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleVerdict {
    Accepted,
    Rejected { rule: String, reason: String },
    Enforced { rule: String, reason: String },
}

/// Ordered rule list. Order is significant.
#[derive(Clone, Default)]
pub struct RuleChain {
    rules: Vec<Arc<dyn PlacementRule>>,
}

impl RuleChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in chain: snap, door-on-wall, then the leash if configured.
    pub fn standard(config: &RemodelConfig) -> Self {
        let mut chain = Self::new()
            .with(BoundarySnapRule {
                snap_distance: config.snap_distance,
            })
            .with(DoorOnWallRule {
                max_distance: config.door_wall_distance,
            });
        if let Some(max_distance) = config.max_drag_distance {
            chain.push(DragLeashRule { max_distance });
        }
        chain
    }

    pub fn with(mut self, rule: impl PlacementRule + 'static) -> Self {
        self.push(rule);
        self
    }

    pub fn push(&mut self, rule: impl PlacementRule + 'static) {
        self.rules.push(Arc::new(rule));
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn evaluate(&self, ctx: &RuleContext<'_>, candidate: &mut Transform) -> RuleVerdict {
        for rule in &self.rules {
            let outcome = rule.evaluate(ctx, candidate);
            if outcome.accepted {
                continue;
            }
            let (rule, reason) = (rule.name().to_string(), outcome.reason);
            return if outcome.enforce {
                RuleVerdict::Enforced { rule, reason }
            } else {
                RuleVerdict::Rejected { rule, reason }
            };
        }
        RuleVerdict::Accepted
    }
}

impl fmt::Debug for RuleChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

// ---------------------------------------------------------------------------
// Built-in rules
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct BoundarySnapRule {
    pub snap_distance: f32,
}

impl PlacementRule for BoundarySnapRule {
    fn name(&self) -> &str {
        "boundary_snap"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>, candidate: &mut Transform) -> RuleOutcome {
        if !ctx.structure.variant.hugs_boundary() {
            return RuleOutcome::accept();
        }
        let Some(hit) = ctx.plot.nearest_boundary_point(candidate.position) else {
            return RuleOutcome::accept();
        };
        if hit.distance <= self.snap_distance {
            candidate.position = Vec3::new(hit.point.x, candidate.position.y, hit.point.z);
            candidate.yaw_deg = hit.tangent.ground_yaw_deg();
        }
        RuleOutcome::accept()
    }
}

#[derive(Clone, Debug)]
pub struct DoorOnWallRule {
    pub max_distance: f32,
}

impl PlacementRule for DoorOnWallRule {
    fn name(&self) -> &str {
        "door_on_wall"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>, candidate: &mut Transform) -> RuleOutcome {
        if ctx.structure.variant != PartVariant::Door {
            return RuleOutcome::accept();
        }
        let near_wall = ctx.siblings.iter().any(|s| {
            s.variant == PartVariant::Wall
                && s.transform.position.ground_distance(candidate.position) <= self.max_distance
        });
        if near_wall {
            RuleOutcome::accept()
        } else {
            RuleOutcome::reject("door must sit next to a wall")
        }
    }
}

#[derive(Clone, Debug)]
pub struct DragLeashRule {
    pub max_distance: f32,
}

impl PlacementRule for DragLeashRule {
    fn name(&self) -> &str {
        "drag_leash"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>, candidate: &mut Transform) -> RuleOutcome {
        if ctx.pre_drag.position.ground_distance(candidate.position) > self.max_distance {
            RuleOutcome::enforce("dragged too far")
        } else {
            RuleOutcome::accept()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construction::{BuildMode, ConstructionDefinition};
    use crate::plot::PlotLimits;
    use crate::types::{CollectionId, StructureId, StructureKind};

    fn part(id: u32, variant: PartVariant, x: f32, z: f32) -> Structure {
        Structure::new(
            StructureId(id),
            StructureKind::from("test"),
            variant,
            CollectionId(0),
            Transform::at(Vec3::new(x, 0.0, z)),
            &ConstructionDefinition::default(),
            BuildMode::Instant,
        )
    }

    fn square_plot() -> Plot {
        Plot::from_loops(
            vec![vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(10.0, 0.0, 0.0),
                Vec3::new(10.0, 0.0, 10.0),
                Vec3::new(0.0, 0.0, 10.0),
            ]],
            PlotLimits::default(),
        )
    }

    struct Nudge;

    impl PlacementRule for Nudge {
        fn name(&self) -> &str {
            "nudge"
        }

        fn evaluate(&self, _ctx: &RuleContext<'_>, candidate: &mut Transform) -> RuleOutcome {
            candidate.position.x += 1.0;
            RuleOutcome::accept()
        }
    }

    struct Veto;

    impl PlacementRule for Veto {
        fn name(&self) -> &str {
            "veto"
        }

        fn evaluate(&self, _ctx: &RuleContext<'_>, _candidate: &mut Transform) -> RuleOutcome {
            RuleOutcome::reject("no")
        }
    }

    #[test]
    fn chain_runs_in_order_and_stops_at_first_rejection() {
        let plot = square_plot();
        let me = part(0, PartVariant::Generic, 5.0, 5.0);
        let ctx = RuleContext {
            structure: &me,
            siblings: &[],
            plot: &plot,
            pre_drag: me.transform,
        };
        let chain = RuleChain::new().with(Nudge).with(Veto).with(Nudge);
        let mut candidate = Transform::at(Vec3::new(1.0, 0.0, 1.0));
        let verdict = chain.evaluate(&ctx, &mut candidate);
        assert_eq!(
            verdict,
            RuleVerdict::Rejected {
                rule: "veto".into(),
                reason: "no".into()
            }
        );
        // Only the first nudge ran.
        assert_eq!(candidate.position.x, 2.0);
        assert_eq!(format!("{chain:?}"), r#"["nudge", "veto", "nudge"]"#);
    }

    #[test]
    fn empty_chain_accepts() {
        let plot = square_plot();
        let me = part(0, PartVariant::Generic, 5.0, 5.0);
        let ctx = RuleContext {
            structure: &me,
            siblings: &[],
            plot: &plot,
            pre_drag: me.transform,
        };
        let mut candidate = me.transform;
        assert_eq!(RuleChain::new().evaluate(&ctx, &mut candidate), RuleVerdict::Accepted);
    }

    #[test]
    fn wall_snaps_to_nearby_boundary() {
        let plot = square_plot();
        let wall = part(0, PartVariant::Wall, 5.0, 5.0);
        let ctx = RuleContext {
            structure: &wall,
            siblings: &[],
            plot: &plot,
            pre_drag: wall.transform,
        };
        let rule = BoundarySnapRule { snap_distance: 1.0 };
        let mut candidate = Transform::at(Vec3::new(9.4, 0.0, 3.0));
        assert!(rule.evaluate(&ctx, &mut candidate).accepted);
        assert!((candidate.position.x - 10.0).abs() < 1e-5);
        assert!((candidate.position.z - 3.0).abs() < 1e-5);
        assert!((candidate.yaw_deg.abs() - 90.0).abs() < 1e-3);

        // Too far away: untouched.
        let mut far = Transform::at(Vec3::new(5.0, 0.0, 5.0));
        rule.evaluate(&ctx, &mut far);
        assert_eq!(far.position, Vec3::new(5.0, 0.0, 5.0));
    }

    #[test]
    fn generic_parts_do_not_snap() {
        let plot = square_plot();
        let pillar = part(0, PartVariant::Generic, 5.0, 5.0);
        let ctx = RuleContext {
            structure: &pillar,
            siblings: &[],
            plot: &plot,
            pre_drag: pillar.transform,
        };
        let mut candidate = Transform::at(Vec3::new(9.8, 0.0, 3.0));
        BoundarySnapRule { snap_distance: 1.0 }.evaluate(&ctx, &mut candidate);
        assert_eq!(candidate.position.x, 9.8);
    }

    #[test]
    fn door_needs_a_wall_nearby() {
        let plot = square_plot();
        let door = part(0, PartVariant::Door, 5.0, 0.0);
        let wall = part(1, PartVariant::Wall, 6.0, 0.0);
        let pillar = part(2, PartVariant::Generic, 5.0, 1.0);
        let rule = DoorOnWallRule { max_distance: 1.5 };

        let with_wall = [&wall, &pillar];
        let ctx = RuleContext {
            structure: &door,
            siblings: &with_wall,
            plot: &plot,
            pre_drag: door.transform,
        };
        let mut candidate = Transform::at(Vec3::new(5.0, 0.0, 0.0));
        assert!(rule.evaluate(&ctx, &mut candidate).accepted);
        let mut far = Transform::at(Vec3::new(2.0, 0.0, 0.0));
        let outcome = rule.evaluate(&ctx, &mut far);
        assert!(!outcome.accepted);
        assert!(!outcome.enforce);

        let no_wall = [&pillar];
        let ctx = RuleContext {
            siblings: &no_wall,
            ..ctx
        };
        assert!(!rule.evaluate(&ctx, &mut candidate).accepted);
    }

    #[test]
    fn leash_enforces() {
        let plot = square_plot();
        let me = part(0, PartVariant::Generic, 5.0, 5.0);
        let ctx = RuleContext {
            structure: &me,
            siblings: &[],
            plot: &plot,
            pre_drag: me.transform,
        };
        let rule = DragLeashRule { max_distance: 2.0 };
        let mut near = Transform::at(Vec3::new(6.0, 0.0, 5.0));
        assert!(rule.evaluate(&ctx, &mut near).accepted);
        let mut far = Transform::at(Vec3::new(9.0, 0.0, 5.0));
        let outcome = rule.evaluate(&ctx, &mut far);
        assert!(!outcome.accepted && outcome.enforce);
    }

    #[test]
    fn standard_chain_contents() {
        let mut config = RemodelConfig::default();
        assert_eq!(
            RuleChain::standard(&config).names(),
            vec!["boundary_snap", "door_on_wall"]
        );
        config.max_drag_distance = Some(5.0);
        assert_eq!(RuleChain::standard(&config).len(), 3);
    }
}
