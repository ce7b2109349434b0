// Plot — the traced ground boundary.
//
// A `Plot` is an ordered list of loops, each an ordered list of points on the
// ground plane. While the player is tracing, the last point of the active
// loop is a cursor point that the host updates on every pointer move via
// `update_vertex()`. Loops with three or more points are treated as closed
// rings; a two-point loop is an open segment; shorter loops are ignored by
// every derived query.
//
// ## Derived state
//
// `all_vertices` (flattened points) and `buildable` are caches recomputed by
// `refresh()` after every mutation, so no query can observe stale values.
// `buildable` is true iff the total vertex count reaches
// `PlotLimits::min_vertex_count` and every interior angle of every closed
// loop lies within `[min_angle_deg, max_angle_deg]`. Interior angles are
// winding-aware: a reflex corner reports `360 - θ`, not `θ`. Vertices with a
// zero-length neighbor edge (a cursor sitting on the previous point) have no
// defined angle and are skipped.
//
// ## Containment
//
// `contains()` casts a ray toward +X from the test point and counts edge
// crossings per closed loop; an odd count in any loop means inside. Edges
// are half-open in Z (`(a.z > p.z) != (b.z > p.z)`), and any point within
// `ON_EDGE_EPSILON` of a boundary edge is reported as outside regardless of
// parity. A plot with no closed loop contains everything, so an unset
// boundary never blocks placement.
//
// ## Lifecycle
//
// Created empty by `SimState::begin_boundary()`, edited until `completed`,
// frozen when a structure collection is attached (every mutator then
// returns `false`), and dropped with its last collection.
//
// See also: `perimeter.rs` for resampling loops, `remodel.rs` for the
// containment/clamping checks during drags, `sim.rs` for the commands that
// drive editing.

use crate::geometry::{closest_point_on_segment, shoelace_sum};
use crate::types::{Axis, Vec3};
use serde::{Deserialize, Serialize};

/// Points closer than this to a boundary edge count as on the edge.
pub const ON_EDGE_EPSILON: f32 = 1e-5;

/// Edges shorter than this are treated as zero-length.
const DEGENERATE_EDGE: f32 = 1e-6;

/// Buildability thresholds, copied from `PlotConfig` when the plot is created.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlotLimits {
    pub min_angle_deg: f32,
    pub max_angle_deg: f32,
    pub min_vertex_count: usize,
}

impl Default for PlotLimits {
    fn default() -> Self {
        Self {
            min_angle_deg: 45.0,
            max_angle_deg: 135.0,
            min_vertex_count: 4,
        }
    }
}

/// The nearest boundary location to some query point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundaryHit {
    pub point: Vec3,
    /// Unit ground-plane direction of the edge the point lies on.
    pub tangent: Vec3,
    pub loop_index: usize,
    pub distance: f32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Plot {
    loops: Vec<Vec<Vec3>>,
    limits: PlotLimits,
    /// Player confirmed the boundary (requires buildability).
    completed: bool,
    /// A structure collection is attached; geometry is read-only.
    frozen: bool,
    #[serde(skip)]
    all_vertices: Vec<Vec3>,
    #[serde(skip)]
    buildable: bool,
}

impl Plot {
    pub fn new(limits: PlotLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    pub fn from_loops(loops: Vec<Vec<Vec3>>, limits: PlotLimits) -> Self {
        let mut plot = Self {
            loops,
            limits,
            ..Self::default()
        };
        plot.refresh();
        plot
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    /// Start a new empty loop. Returns its index, or `None` if frozen.
    pub fn add_loop(&mut self) -> Option<usize> {
        if self.frozen {
            return None;
        }
        self.loops.push(Vec::new());
        self.refresh();
        Some(self.loops.len() - 1)
    }

    pub fn add_vertex(&mut self, loop_index: usize, point: Vec3) -> bool {
        if self.frozen {
            return false;
        }
        let Some(points) = self.loops.get_mut(loop_index) else {
            return false;
        };
        points.push(point);
        self.refresh();
        true
    }

    pub fn update_vertex(&mut self, loop_index: usize, vertex_index: usize, point: Vec3) -> bool {
        if self.frozen {
            return false;
        }
        let Some(slot) = self
            .loops
            .get_mut(loop_index)
            .and_then(|points| points.get_mut(vertex_index))
        else {
            return false;
        };
        *slot = point;
        self.refresh();
        true
    }

    pub fn remove_loop(&mut self, loop_index: usize) -> bool {
        if self.frozen || loop_index >= self.loops.len() {
            return false;
        }
        self.loops.remove(loop_index);
        self.refresh();
        true
    }

    pub fn remove_vertex(&mut self, loop_index: usize, vertex_index: usize) -> bool {
        if self.frozen {
            return false;
        }
        let Some(points) = self.loops.get_mut(loop_index) else {
            return false;
        };
        if vertex_index >= points.len() {
            return false;
        }
        points.remove(vertex_index);
        self.refresh();
        true
    }

    /// Recompute cached derived state. Called after every mutation and after
    /// deserialization.
    pub fn refresh(&mut self) {
        self.all_vertices = self.loops.iter().flatten().copied().collect();
        self.buildable = self.compute_buildable();
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Unfreeze and un-complete so editing can resume.
    pub fn reopen(&mut self) {
        self.frozen = false;
        self.completed = false;
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn loops(&self) -> &[Vec<Vec3>] {
        &self.loops
    }

    pub fn limits(&self) -> PlotLimits {
        self.limits
    }

    pub fn all_vertices(&self) -> &[Vec3] {
        &self.all_vertices
    }

    pub fn vertex_count(&self) -> usize {
        self.all_vertices.len()
    }

    pub fn is_buildable(&self) -> bool {
        self.buildable
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// True if at least one loop encloses area.
    pub fn has_closed_loop(&self) -> bool {
        self.loops.iter().any(|l| l.len() >= 3)
    }

    /// Sum over loops of the unsigned shoelace area.
    pub fn area(&self) -> f32 {
        self.loops
            .iter()
            .map(|points| shoelace_sum(points).abs() / 2.0)
            .sum()
    }

    /// Mean of every vertex across all loops. `Vec3::ZERO` for an empty plot.
    pub fn center(&self) -> Vec3 {
        if self.all_vertices.is_empty() {
            return Vec3::ZERO;
        }
        let sum = self
            .all_vertices
            .iter()
            .fold(Vec3::ZERO, |acc, &p| acc + p);
        sum * (1.0 / self.all_vertices.len() as f32)
    }

    /// Winding-aware interior angle (degrees) at each vertex of a closed loop.
    /// `None` for vertices adjacent to a zero-length edge. Empty for loops
    /// with fewer than three points.
    pub fn interior_angles(&self, loop_index: usize) -> Vec<Option<f32>> {
        self.loops
            .get(loop_index)
            .map(|points| interior_angles(points))
            .unwrap_or_default()
    }

    fn compute_buildable(&self) -> bool {
        if self.all_vertices.len() < self.limits.min_vertex_count {
            return false;
        }
        let (lo, hi) = (self.limits.min_angle_deg, self.limits.max_angle_deg);
        self.loops
            .iter()
            .flat_map(|points| interior_angles(points))
            .flatten()
            .all(|angle| angle >= lo && angle <= hi)
    }

    // -----------------------------------------------------------------------
    // Containment and boundary projection
    // -----------------------------------------------------------------------

    /// Point-in-boundary test (see module docs for the edge convention).
    pub fn contains(&self, point: Vec3) -> bool {
        if !self.has_closed_loop() {
            return true;
        }
        if self
            .nearest_boundary_point(point)
            .is_some_and(|hit| hit.distance <= ON_EDGE_EPSILON)
        {
            return false;
        }
        self.loops
            .iter()
            .filter(|points| points.len() >= 3)
            .any(|points| crossing_parity(points, point))
    }

    /// Nearest point on any boundary edge (closed rings and two-point
    /// segments). `None` if the plot has no edges.
    pub fn nearest_boundary_point(&self, point: Vec3) -> Option<BoundaryHit> {
        let mut best: Option<BoundaryHit> = None;
        for (loop_index, points) in self.loops.iter().enumerate() {
            for (a, b) in edges(points) {
                let Some(tangent) = (b - a).ground_normalized() else {
                    continue;
                };
                let candidate = closest_point_on_segment(point, a, b);
                let distance = candidate.ground_distance(point);
                if best.is_none_or(|hit| distance < hit.distance) {
                    best = Some(BoundaryHit {
                        point: candidate,
                        tangent,
                        loop_index,
                        distance,
                    });
                }
            }
        }
        best
    }

    /// Project `point` onto the nearest boundary edge, then nudge it `inset`
    /// units toward the plot center. `None` if the plot has no edges.
    pub fn clamp_inside(&self, point: Vec3, inset: f32) -> Option<Vec3> {
        let hit = self.nearest_boundary_point(point)?;
        let inward = (self.center() - hit.point).ground_normalized();
        Some(match inward {
            Some(dir) => Vec3::new(
                hit.point.x + dir.x * inset,
                point.y,
                hit.point.z + dir.z * inset,
            ),
            None => Vec3::new(hit.point.x, point.y, hit.point.z),
        })
    }

    // -----------------------------------------------------------------------
    // Subdivision
    // -----------------------------------------------------------------------

    /// Split the bounding box of each closed loop into `count` equal strips
    /// along `axis`. Each strip becomes a new plot with a single rectangular
    /// loop and the same limits.
    pub fn divide(&self, count: usize, axis: Axis) -> Vec<Plot> {
        if count == 0 {
            return Vec::new();
        }
        let mut parts = Vec::new();
        for points in self.loops.iter().filter(|p| p.len() >= 3) {
            let (min, max) = bounding_box(points);
            let y = points.iter().map(|p| p.y).sum::<f32>() / points.len() as f32;
            for i in 0..count {
                let lo = i as f32 / count as f32;
                let hi = (i + 1) as f32 / count as f32;
                let (x0, x1, z0, z1) = match axis {
                    Axis::X => (
                        min.x + (max.x - min.x) * lo,
                        min.x + (max.x - min.x) * hi,
                        min.z,
                        max.z,
                    ),
                    Axis::Z => (
                        min.x,
                        max.x,
                        min.z + (max.z - min.z) * lo,
                        min.z + (max.z - min.z) * hi,
                    ),
                };
                let strip = vec![
                    Vec3::new(x0, y, z0),
                    Vec3::new(x1, y, z0),
                    Vec3::new(x1, y, z1),
                    Vec3::new(x0, y, z1),
                ];
                parts.push(Plot::from_loops(vec![strip], self.limits));
            }
        }
        parts
    }
}

/// Boundary edges of a loop: a closed ring for 3+ points, a single segment
/// for 2, nothing otherwise.
pub fn edges(points: &[Vec3]) -> Vec<(Vec3, Vec3)> {
    match points.len() {
        0 | 1 => Vec::new(),
        2 => vec![(points[0], points[1])],
        n => (0..n).map(|i| (points[i], points[(i + 1) % n])).collect(),
    }
}

fn interior_angles(points: &[Vec3]) -> Vec<Option<f32>> {
    let n = points.len();
    if n < 3 {
        return Vec::new();
    }
    let winding = shoelace_sum(points);
    (0..n)
        .map(|i| {
            let prev = points[(i + n - 1) % n];
            let cur = points[i];
            let next = points[(i + 1) % n];
            let (ax, az) = (prev.x - cur.x, prev.z - cur.z);
            let (bx, bz) = (next.x - cur.x, next.z - cur.z);
            let len_a = (ax * ax + az * az).sqrt();
            let len_b = (bx * bx + bz * bz).sqrt();
            if len_a <= DEGENERATE_EDGE || len_b <= DEGENERATE_EDGE {
                return None;
            }
            let cos = ((ax * bx + az * bz) / (len_a * len_b)).clamp(-1.0, 1.0);
            let angle = cos.acos().to_degrees();
            // Turn direction at this vertex; opposite sign to the loop's
            // winding means the corner is reflex.
            let turn = (cur.x - prev.x) * (next.z - cur.z) - (cur.z - prev.z) * (next.x - cur.x);
            if turn * winding < 0.0 {
                Some(360.0 - angle)
            } else {
                Some(angle)
            }
        })
        .collect()
}

fn crossing_parity(points: &[Vec3], p: Vec3) -> bool {
    let n = points.len();
    let mut inside = false;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        if (a.z > p.z) != (b.z > p.z) {
            let x_cross = a.x + (p.z - a.z) * (b.x - a.x) / (b.z - a.z);
            if p.x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

fn bounding_box(points: &[Vec3]) -> (Vec3, Vec3) {
    let mut min = points[0];
    let mut max = points[0];
    for p in &points[1..] {
        min.x = min.x.min(p.x);
        min.z = min.z.min(p.z);
        max.x = max.x.max(p.x);
        max.z = max.z.max(p.z);
    }
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f32) -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(size, 0.0, 0.0),
            Vec3::new(size, 0.0, size),
            Vec3::new(0.0, 0.0, size),
        ]
    }

    fn square_plot(size: f32) -> Plot {
        Plot::from_loops(vec![square(size)], PlotLimits::default())
    }

    #[test]
    fn square_area_and_center() {
        let plot = square_plot(10.0);
        assert!((plot.area() - 100.0).abs() < 1e-4);
        let c = plot.center();
        assert!((c.x - 5.0).abs() < 1e-6);
        assert_eq!(c.y, 0.0);
        assert!((c.z - 5.0).abs() < 1e-6);
    }

    #[test]
    fn square_is_buildable() {
        let plot = square_plot(10.0);
        assert!(plot.is_buildable());
        for angle in plot.interior_angles(0) {
            assert!((angle.unwrap() - 90.0).abs() < 1e-3);
        }
    }

    #[test]
    fn area_is_translation_and_winding_invariant() {
        let base = square(7.0);
        let shifted: Vec<Vec3> = base
            .iter()
            .map(|&p| p + Vec3::new(-123.0, 4.0, 56.5))
            .collect();
        let mut reversed = base.clone();
        reversed.reverse();
        let a = Plot::from_loops(vec![base], PlotLimits::default()).area();
        let b = Plot::from_loops(vec![shifted], PlotLimits::default()).area();
        let c = Plot::from_loops(vec![reversed], PlotLimits::default()).area();
        assert!((a - 49.0).abs() < 1e-3);
        assert!((a - b).abs() < 1e-2);
        assert!((a - c).abs() < 1e-6);
    }

    #[test]
    fn area_sums_multiple_loops_and_ignores_short_ones() {
        let mut far = square(2.0);
        for p in &mut far {
            p.x += 50.0;
        }
        let plot = Plot::from_loops(
            vec![square(10.0), far, vec![Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)]],
            PlotLimits::default(),
        );
        assert!((plot.area() - 104.0).abs() < 1e-3);
    }

    #[test]
    fn triangle_with_sharp_corner_is_not_buildable() {
        // Equilateral triangle plus one spare vertex in another loop to
        // reach the vertex minimum.
        let tri = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(5.0, 0.0, 8.660254),
        ];
        let ok = Plot::from_loops(vec![tri, vec![Vec3::ZERO]], PlotLimits::default());
        assert!(ok.is_buildable());

        let sharp = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 3.0),
        ];
        let bad = Plot::from_loops(vec![sharp, vec![Vec3::ZERO]], PlotLimits::default());
        assert!(!bad.is_buildable());
    }

    #[test]
    fn reflex_corner_reports_large_angle() {
        // L-shape: one 270-degree corner.
        let l_shape = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 5.0),
            Vec3::new(5.0, 0.0, 5.0),
            Vec3::new(5.0, 0.0, 10.0),
            Vec3::new(0.0, 0.0, 10.0),
        ];
        let plot = Plot::from_loops(vec![l_shape], PlotLimits::default());
        let angles: Vec<f32> = plot.interior_angles(0).into_iter().flatten().collect();
        assert_eq!(angles.len(), 6);
        assert!(angles.iter().any(|a| (a - 270.0).abs() < 1e-3));
        assert!(!plot.is_buildable());
    }

    #[test]
    fn too_few_vertices_is_not_buildable() {
        let tri = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 10.0),
        ];
        let plot = Plot::from_loops(vec![tri], PlotLimits::default());
        assert!(!plot.is_buildable());
    }

    #[test]
    fn editing_refreshes_caches() {
        let mut plot = Plot::new(PlotLimits::default());
        let l = plot.add_loop().unwrap();
        for p in square(10.0) {
            assert!(plot.add_vertex(l, p));
        }
        assert_eq!(plot.vertex_count(), 4);
        assert!(plot.is_buildable());

        // Drag a corner far out to create a sharp angle.
        assert!(plot.update_vertex(l, 2, Vec3::new(40.0, 0.0, 10.0)));
        assert_eq!(plot.all_vertices()[2], Vec3::new(40.0, 0.0, 10.0));
        assert!(!plot.is_buildable());

        assert!(plot.update_vertex(l, 2, Vec3::new(10.0, 0.0, 10.0)));
        assert!(plot.is_buildable());

        assert!(plot.remove_vertex(l, 3));
        assert_eq!(plot.vertex_count(), 3);
        assert!(!plot.is_buildable());

        assert!(plot.remove_loop(l));
        assert_eq!(plot.vertex_count(), 0);
    }

    #[test]
    fn adding_in_range_vertices_keeps_plot_buildable() {
        let limits = PlotLimits {
            min_angle_deg: 30.0,
            max_angle_deg: 160.0,
            min_vertex_count: 4,
        };
        let on_circle = |deg: f32| {
            let r = deg.to_radians();
            Vec3::new(10.0 * r.cos(), 0.0, 10.0 * r.sin())
        };
        let in_range = |plot: &Plot| {
            plot.interior_angles(0).iter().flatten().all(|&a| {
                (limits.min_angle_deg..=limits.max_angle_deg).contains(&a)
            })
        };

        let mut plot = Plot::new(limits);
        let l = plot.add_loop().unwrap();
        for deg in [0.0, 90.0, 180.0, 270.0] {
            assert!(plot.add_vertex(l, on_circle(deg)));
        }
        assert!(plot.is_buildable());

        // Each added corner keeps every angle inside the limits.
        for deg in [300.0, 330.0] {
            assert!(plot.add_vertex(l, on_circle(deg)));
            assert!(in_range(&plot));
            assert!(plot.is_buildable());
        }

        // A corner that pushes an angle past the maximum is what flips it.
        assert!(plot.add_vertex(l, on_circle(345.0)));
        assert!(!in_range(&plot));
        assert!(!plot.is_buildable());

        let last = plot.loops()[l].len() - 1;
        assert!(plot.remove_vertex(l, last));
        assert!(plot.is_buildable());
    }

    #[test]
    fn cursor_point_on_previous_vertex_is_skipped() {
        let mut plot = Plot::new(PlotLimits::default());
        let l = plot.add_loop().unwrap();
        for p in square(10.0) {
            plot.add_vertex(l, p);
        }
        // Cursor sits exactly on the last placed point.
        plot.add_vertex(l, Vec3::new(0.0, 0.0, 10.0));
        assert!(plot.interior_angles(l).iter().any(Option::is_none));
        assert!(plot.is_buildable());
    }

    #[test]
    fn regular_polygons_are_buildable() {
        // Regular polygons from 4 to 7 sides have interior angles well
        // inside [90, 135).
        for sides in 4..=7 {
            let pts: Vec<Vec3> = (0..sides)
                .map(|i| {
                    let a = i as f32 / sides as f32 * std::f32::consts::TAU;
                    Vec3::new(10.0 * a.cos(), 0.0, 10.0 * a.sin())
                })
                .collect();
            let plot = Plot::from_loops(vec![pts], PlotLimits::default());
            assert!(plot.is_buildable(), "{sides}-gon should be buildable");
        }
    }

    #[test]
    fn invalid_indices_are_rejected() {
        let mut plot = square_plot(10.0);
        assert!(!plot.add_vertex(5, Vec3::ZERO));
        assert!(!plot.update_vertex(0, 9, Vec3::ZERO));
        assert!(!plot.remove_vertex(0, 9));
        assert!(!plot.remove_loop(3));
        assert_eq!(plot.vertex_count(), 4);
    }

    #[test]
    fn frozen_plot_rejects_edits() {
        let mut plot = square_plot(10.0);
        plot.freeze();
        assert!(plot.add_loop().is_none());
        assert!(!plot.add_vertex(0, Vec3::ZERO));
        assert!(!plot.update_vertex(0, 0, Vec3::new(1.0, 0.0, 1.0)));
        assert!(!plot.remove_vertex(0, 0));
        assert!(!plot.remove_loop(0));
        plot.reopen();
        assert!(plot.add_vertex(0, Vec3::new(0.0, 0.0, 5.0)));
    }

    #[test]
    fn containment_inside_outside() {
        let plot = square_plot(10.0);
        assert!(plot.contains(Vec3::new(5.0, 0.0, 5.0)));
        assert!(plot.contains(Vec3::new(0.5, 0.0, 9.5)));
        assert!(!plot.contains(Vec3::new(15.0, 0.0, 5.0)));
        assert!(!plot.contains(Vec3::new(-1.0, 0.0, 5.0)));
        assert!(!plot.contains(Vec3::new(5.0, 0.0, -0.1)));
    }

    #[test]
    fn points_on_edges_and_vertices_are_outside() {
        let plot = square_plot(10.0);
        assert!(!plot.contains(Vec3::new(0.0, 0.0, 5.0)));
        assert!(!plot.contains(Vec3::new(10.0, 0.0, 5.0)));
        assert!(!plot.contains(Vec3::new(5.0, 0.0, 0.0)));
        assert!(!plot.contains(Vec3::new(5.0, 0.0, 10.0)));
        assert!(!plot.contains(Vec3::new(10.0, 0.0, 10.0)));
    }

    #[test]
    fn inside_any_loop_counts() {
        let mut far = square(2.0);
        for p in &mut far {
            p.x += 50.0;
        }
        let plot = Plot::from_loops(vec![square(10.0), far], PlotLimits::default());
        assert!(plot.contains(Vec3::new(51.0, 0.0, 1.0)));
        assert!(!plot.contains(Vec3::new(30.0, 0.0, 1.0)));
    }

    #[test]
    fn empty_plot_contains_everything() {
        let plot = Plot::new(PlotLimits::default());
        assert!(plot.contains(Vec3::new(1e4, 0.0, -1e4)));
        let open = Plot::from_loops(
            vec![vec![Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0)]],
            PlotLimits::default(),
        );
        assert!(open.contains(Vec3::new(3.0, 0.0, 3.0)));
    }

    #[test]
    fn nearest_boundary_point_and_tangent() {
        let plot = square_plot(10.0);
        let hit = plot.nearest_boundary_point(Vec3::new(15.0, 0.0, 4.0)).unwrap();
        assert!((hit.point.x - 10.0).abs() < 1e-5);
        assert!((hit.point.z - 4.0).abs() < 1e-5);
        assert!((hit.distance - 5.0).abs() < 1e-5);
        assert!(hit.tangent.x.abs() < 1e-6);
        assert!((hit.tangent.z.abs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn clamp_inside_insets_toward_center() {
        let plot = square_plot(10.0);
        let clamped = plot.clamp_inside(Vec3::new(15.0, 0.0, 5.0), 0.25).unwrap();
        assert!((clamped.x - 9.75).abs() < 1e-5);
        assert!((clamped.z - 5.0).abs() < 1e-5);
        assert!(plot.contains(clamped));
    }

    #[test]
    fn clamp_inside_without_edges_is_none() {
        let plot = Plot::new(PlotLimits::default());
        assert!(plot.clamp_inside(Vec3::ZERO, 0.25).is_none());
    }

    #[test]
    fn divide_into_strips_along_x() {
        let plot = square_plot(10.0);
        let parts = plot.divide(4, Axis::X);
        assert_eq!(parts.len(), 4);
        for (i, part) in parts.iter().enumerate() {
            assert_eq!(part.loops().len(), 1);
            assert!((part.area() - 25.0).abs() < 1e-3);
            let c = part.center();
            assert!((c.x - (1.25 + 2.5 * i as f32)).abs() < 1e-4);
            assert!((c.z - 5.0).abs() < 1e-4);
            assert_eq!(part.limits(), plot.limits());
        }
    }

    #[test]
    fn divide_along_z_and_zero_count() {
        let plot = square_plot(10.0);
        let parts = plot.divide(2, Axis::Z);
        assert_eq!(parts.len(), 2);
        assert!((parts[1].center().z - 7.5).abs() < 1e-4);
        assert!(plot.divide(0, Axis::Z).is_empty());
    }

    #[test]
    fn serde_roundtrip_rebuilds_caches_on_refresh() {
        let plot = square_plot(10.0);
        let json = serde_json::to_string(&plot).unwrap();
        let mut restored: Plot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.vertex_count(), 0);
        restored.refresh();
        assert_eq!(restored.vertex_count(), 4);
        assert!(restored.is_buildable());
        assert_eq!(restored.loops(), plot.loops());
    }
}
