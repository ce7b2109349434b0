// Core types shared across the simulation.
//
// Defines ground-plane math primitives (`Vec3`, `Transform`, `Ray`, `Axis`),
// compact entity identifiers, and the newtypes that name catalog entries
// (`ResourceKind`, `StructureKind`) plus the `PartVariant` enum that placement
// rules dispatch on. All types derive `Serialize` and `Deserialize` for
// save/load.
//
// Coordinate conventions: world units, Y up. Boundaries and footprints live
// on the X/Z ground plane; Y is carried along but is expected to be mostly
// flat. Yaw is measured in degrees from +X toward +Z, so a part with yaw
// `atan2(dz, dx)` has its local +X axis pointing along `(dx, dz)`.
//
// **Critical constraint: determinism.** Entity IDs are allocated from
// monotonic counters owned by `SimState` (see `sim.rs`) and the part pool
// (see `structure.rs`). Never derive IDs from hashes, time, or OS entropy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A point or direction in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    /// Distance on the ground plane, ignoring Y.
    pub fn ground_distance(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    /// Linear interpolation: `t = 0` yields `self`, `t = 1` yields `other`.
    pub fn lerp(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }

    /// The X/Z components as a unit vector with `y = 0`, or `None` if the
    /// ground projection is (near) zero length.
    pub fn ground_normalized(self) -> Option<Self> {
        let len = (self.x * self.x + self.z * self.z).sqrt();
        if len <= f32::EPSILON {
            return None;
        }
        Some(Self::new(self.x / len, 0.0, self.z / len))
    }

    /// Yaw in degrees of this direction on the ground plane.
    pub fn ground_yaw_deg(self) -> f32 {
        self.z.atan2(self.x).to_degrees()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// Placement of a structure: position on the ground plus a yaw rotation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub yaw_deg: f32,
}

impl Transform {
    pub const fn new(position: Vec3, yaw_deg: f32) -> Self {
        Self { position, yaw_deg }
    }

    pub const fn at(position: Vec3) -> Self {
        Self::new(position, 0.0)
    }

    /// True if position and yaw both differ by no more than `epsilon`.
    pub fn approx_eq(&self, other: &Transform, epsilon: f32) -> bool {
        self.position.distance(other.position) <= epsilon
            && (self.yaw_deg - other.yaw_deg).abs() <= epsilon
    }
}

/// A pointer ray supplied by the host (camera origin + direction).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub const fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// A ray pointing straight down onto `point` from above. Handy for hosts
    /// that already resolved a ground point, and for tests.
    pub fn straight_down(point: Vec3) -> Self {
        Self::new(
            Vec3::new(point.x, point.y + 100.0, point.z),
            Vec3::new(0.0, -1.0, 0.0),
        )
    }

    /// Intersect with the horizontal plane `y = height`. Returns `None` for
    /// rays parallel to the plane or pointing away from it.
    pub fn intersect_ground(&self, height: f32) -> Option<Vec3> {
        if self.direction.y.abs() <= 1e-6 {
            return None;
        }
        let t = (height - self.origin.y) / self.direction.y;
        if t < 0.0 || !t.is_finite() {
            return None;
        }
        Some(self.origin + self.direction * t)
    }
}

/// Ground-plane axis used when splitting a plot into strips.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Z,
}

// ---------------------------------------------------------------------------
// Entity IDs — compact counters
// ---------------------------------------------------------------------------

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

entity_id!(/// Unique identifier for a traced boundary.
PlotId);
entity_id!(/// Unique identifier for a structure collection attached to a plot.
CollectionId);
entity_id!(/// Unique identifier for a single part. Recycled through the pool.
StructureId);

// ---------------------------------------------------------------------------
// Catalog names
// ---------------------------------------------------------------------------

macro_rules! catalog_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self(name.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

catalog_name!(/// A deliverable material ("Wood", "Stone", ...). Valid kinds are
/// listed in `GameConfig::resource_kinds`.
ResourceKind);
catalog_name!(/// A structure type key into `GameConfig::structures`.
StructureKind);

/// Broad family of a part. Placement rules dispatch on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PartVariant {
    /// Runs along the boundary; snaps onto it.
    Wall,
    /// Sits in a wall; snaps onto the boundary and needs a wall nearby.
    Door,
    /// Free-standing interior part.
    Generic,
}

impl PartVariant {
    /// Wall-like and door-like parts belong on the boundary line.
    pub fn hugs_boundary(self) -> bool {
        matches!(self, PartVariant::Wall | PartVariant::Door)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn ground_distance_ignores_height() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 50.0, 4.0);
        assert!((a.ground_distance(b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn lerp_endpoints_and_midpoint() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(10.0, 2.0, -4.0);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
        assert_eq!(a.lerp(b, 0.5), Vec3::new(5.0, 1.0, -2.0));
    }

    #[test]
    fn ground_normalized_rejects_vertical() {
        assert!(Vec3::new(0.0, 5.0, 0.0).ground_normalized().is_none());
        let n = Vec3::new(3.0, 9.0, 4.0).ground_normalized().unwrap();
        assert!((n.x - 0.6).abs() < 1e-6);
        assert_eq!(n.y, 0.0);
        assert!((n.z - 0.8).abs() < 1e-6);
    }

    #[test]
    fn yaw_follows_direction() {
        assert!((Vec3::new(1.0, 0.0, 0.0).ground_yaw_deg()).abs() < 1e-4);
        assert!((Vec3::new(0.0, 0.0, 1.0).ground_yaw_deg() - 90.0).abs() < 1e-4);
    }

    #[test]
    fn transform_approx_eq_respects_epsilon() {
        let a = Transform::new(Vec3::new(1.0, 0.0, 1.0), 90.0);
        let nudged = Transform::new(Vec3::new(1.0005, 0.0, 1.0), 90.0);
        let rotated = Transform::new(Vec3::new(1.0, 0.0, 1.0), 91.0);
        assert!(a.approx_eq(&nudged, 1e-3));
        assert!(!a.approx_eq(&rotated, 1e-3));
    }

    #[test]
    fn ray_hits_ground_plane() {
        let ray = Ray::new(Vec3::new(0.0, 10.0, 0.0), Vec3::new(1.0, -1.0, 0.0));
        let hit = ray.intersect_ground(0.0).unwrap();
        assert!((hit.x - 10.0).abs() < 1e-5);
        assert!(hit.y.abs() < 1e-5);
    }

    #[test]
    fn ray_parallel_or_away_misses() {
        let flat = Ray::new(Vec3::new(0.0, 10.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(flat.intersect_ground(0.0).is_none());
        let up = Ray::new(Vec3::new(0.0, 10.0, 0.0), Vec3::new(0.0, 1.0, 0.0));
        assert!(up.intersect_ground(0.0).is_none());
    }

    #[test]
    fn straight_down_lands_on_point() {
        let p = Vec3::new(4.0, 0.0, -2.0);
        let hit = Ray::straight_down(p).intersect_ground(0.0).unwrap();
        assert!(hit.distance(p) < 1e-5);
    }

    #[test]
    fn entity_id_display() {
        assert_eq!(StructureId(7).to_string(), "StructureId(7)");
        assert_eq!(PlotId(0).to_string(), "PlotId(0)");
    }

    #[test]
    fn catalog_names_work_as_json_map_keys() {
        let mut map = BTreeMap::new();
        map.insert(ResourceKind::new("Wood"), 10u32);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"Wood":10}"#);
        let restored: BTreeMap<ResourceKind, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored[&ResourceKind::from("Wood")], 10);
    }

    #[test]
    fn id_map_keys_roundtrip() {
        let mut map = BTreeMap::new();
        map.insert(StructureId(3), "a");
        let json = serde_json::to_string(&map).unwrap();
        let restored: BTreeMap<StructureId, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored[&StructureId(3)], "a");
    }

    #[test]
    fn variants_that_hug_the_boundary() {
        assert!(PartVariant::Wall.hugs_boundary());
        assert!(PartVariant::Door.hugs_boundary());
        assert!(!PartVariant::Generic.hugs_boundary());
    }
}
