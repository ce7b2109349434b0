// Ground-plane geometry helpers: oriented footprints and segment projection.
//
// `Footprint` is the oriented bounding box a part occupies on the X/Z plane.
// Overlap uses the Separating Axis Theorem over the two edge normals of each
// rectangle; touching (shared edge or corner) is NOT overlap, so parts laid
// edge-to-edge along a boundary do not collide with each other.
//
// `closest_point_on_segment()` is the projection used by boundary clamping
// and snapping in `plot.rs` / `rules.rs`. Zero-length segments collapse to
// their start point instead of dividing by zero.
//
// See also: `spatial.rs` which builds footprints from the config catalog,
// `remodel.rs` for the collision query during drags.

use crate::types::{Transform, Vec3};
use serde::{Deserialize, Serialize};

/// Four X/Z corners in winding order.
pub type Corners = [(f32, f32); 4];

/// An oriented rectangle on the ground plane.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub center_x: f32,
    pub center_z: f32,
    pub half_width: f32,
    pub half_depth: f32,
    pub yaw_rad: f32,
}

impl Footprint {
    /// Footprint of a `width` × `depth` part placed at `transform`. Width runs
    /// along the part's local X axis.
    pub fn at(transform: &Transform, width: f32, depth: f32) -> Self {
        Self {
            center_x: transform.position.x,
            center_z: transform.position.z,
            half_width: width / 2.0,
            half_depth: depth / 2.0,
            yaw_rad: transform.yaw_deg.to_radians(),
        }
    }

    /// A footprint with no area never collides with anything.
    pub fn is_degenerate(&self) -> bool {
        self.half_width <= 0.0 || self.half_depth <= 0.0
    }

    pub fn corners(&self) -> Corners {
        let cos_r = self.yaw_rad.cos();
        let sin_r = self.yaw_rad.sin();
        const SIGNS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        let mut corners = [(0.0, 0.0); 4];
        for (i, &(sx, sz)) in SIGNS.iter().enumerate() {
            let lx = sx * self.half_width;
            let lz = sz * self.half_depth;
            corners[i] = (
                self.center_x + lx * cos_r - lz * sin_r,
                self.center_z + lx * sin_r + lz * cos_r,
            );
        }
        corners
    }

    /// True if the interiors of two footprints overlap.
    pub fn overlaps(&self, other: &Footprint) -> bool {
        if self.is_degenerate() || other.is_degenerate() {
            return false;
        }
        let a = self.corners();
        let b = other.corners();
        for corners in [&a, &b] {
            // Opposite edges are parallel, so two normals per rectangle suffice.
            for i in 0..2 {
                let j = (i + 1) % 4;
                let ex = corners[j].0 - corners[i].0;
                let ez = corners[j].1 - corners[i].1;
                let (ax, az) = (-ez, ex);
                let (min_a, max_a) = project(&a, ax, az);
                let (min_b, max_b) = project(&b, ax, az);
                if max_a <= min_b || max_b <= min_a {
                    return false;
                }
            }
        }
        true
    }

    /// True if the ground point lies inside (or on the edge of) the footprint.
    pub fn contains_point(&self, x: f32, z: f32) -> bool {
        if self.is_degenerate() {
            return false;
        }
        let dx = x - self.center_x;
        let dz = z - self.center_z;
        let cos_r = self.yaw_rad.cos();
        let sin_r = self.yaw_rad.sin();
        // Rotate into the footprint's local frame.
        let lx = dx * cos_r + dz * sin_r;
        let lz = -dx * sin_r + dz * cos_r;
        lx.abs() <= self.half_width && lz.abs() <= self.half_depth
    }
}

fn project(corners: &Corners, ax: f32, az: f32) -> (f32, f32) {
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for &(cx, cz) in corners {
        let dot = cx * ax + cz * az;
        lo = lo.min(dot);
        hi = hi.max(dot);
    }
    (lo, hi)
}

/// Closest point to `p` on segment `a`–`b`, measured on the ground plane.
/// Y is interpolated along the segment.
pub fn closest_point_on_segment(p: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let ex = b.x - a.x;
    let ez = b.z - a.z;
    let seg_len_sq = ex * ex + ez * ez;
    if seg_len_sq <= f32::EPSILON {
        return a;
    }
    let t = ((p.x - a.x) * ex + (p.z - a.z) * ez) / seg_len_sq;
    a.lerp(b, t.clamp(0.0, 1.0))
}

/// Twice the signed area of a ring on the X/Z plane (shoelace sum).
/// Positive for counter-clockwise winding when viewed with +X right, +Z up.
pub fn shoelace_sum(points: &[Vec3]) -> f32 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        sum += points[i].x * points[j].z - points[j].x * points[i].z;
    }
    sum
}
