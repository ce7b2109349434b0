// Perimeter resampling — evenly spaced samples along boundary loops.
//
// Used to lay boundary-hugging parts (walls, doors) edge to edge around a
// plot. `sample_loop()` walks a polyline by arc length and emits `count`
// samples at the midpoints of `count` equal steps, where
// `count = max(1, ceil(total_length / unit))`. Each sample carries the unit
// ground-plane tangent of the segment it falls on, which becomes the part's
// yaw. A loop with three or more points is walked as a closed ring; a
// two-point loop is walked as a single open segment.
//
// `resample_iterated()` feeds the samples back in as a new loop, smoothing
// out short edges and sharp corners. Loops that cannot be sampled (fewer
// than two points, zero total length, non-positive unit, or more than
// `MAX_SAMPLES_PER_LOOP` samples) pass through unchanged so iteration never
// destroys geometry.
//
// See also: `plot.rs` for the loops being walked, `sim.rs`
// (`populate_perimeter`) for turning samples into structures.

use crate::plot::edges;
use crate::types::Vec3;

/// Shortest spacing a config may ask for.
pub const MIN_UNIT_LENGTH: f32 = 0.01;

/// Upper bound on samples from one loop. Longer walks are refused.
pub const MAX_SAMPLES_PER_LOOP: usize = 1 << 16;

/// One position on a resampled loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerimeterSample {
    pub position: Vec3,
    /// Unit direction of travel along the loop at this sample.
    pub tangent: Vec3,
}

impl PerimeterSample {
    /// Yaw a part should take to run along the boundary here.
    pub fn yaw_deg(&self) -> f32 {
        self.tangent.ground_yaw_deg()
    }
}

/// Evenly spaced samples along one loop. Empty if the loop cannot be sampled.
pub fn sample_loop(points: &[Vec3], unit: f32) -> Vec<PerimeterSample> {
    if unit <= 0.0 || !unit.is_finite() {
        return Vec::new();
    }
    // Zero-length segments carry no direction and contribute no length.
    let segments: Vec<(Vec3, Vec3, f32, Vec3)> = edges(points)
        .into_iter()
        .filter_map(|(a, b)| {
            let dir = (b - a).ground_normalized()?;
            Some((a, b, a.ground_distance(b), dir))
        })
        .collect();
    let total: f32 = segments.iter().map(|s| s.2).sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let steps = (total / unit).ceil();
    if !steps.is_finite() || steps > MAX_SAMPLES_PER_LOOP as f32 {
        return Vec::new();
    }
    let count = (steps as usize).max(1);
    let step = total / count as f32;
    let mut samples = Vec::with_capacity(count);
    let mut seg_index = 0;
    let mut seg_start = 0.0;
    for i in 0..count {
        let target = (i as f32 + 0.5) * step;
        // Advance to the segment containing `target`. The last segment
        // absorbs any float drift past the end.
        while seg_index + 1 < segments.len() && seg_start + segments[seg_index].2 < target {
            seg_start += segments[seg_index].2;
            seg_index += 1;
        }
        let (a, b, len, dir) = segments[seg_index];
        let t = ((target - seg_start) / len).clamp(0.0, 1.0);
        samples.push(PerimeterSample {
            position: a.lerp(b, t),
            tangent: dir,
        });
    }
    samples
}

/// Resample every loop once. Unsamplable loops are returned as-is.
pub fn resample(loops: &[Vec<Vec3>], unit: f32) -> Vec<Vec<Vec3>> {
    loops
        .iter()
        .map(|points| {
            let samples = sample_loop(points, unit);
            if samples.is_empty() {
                points.clone()
            } else {
                samples.into_iter().map(|s| s.position).collect()
            }
        })
        .collect()
}

/// Apply `resample` `iterations` times. Zero iterations returns a copy.
pub fn resample_iterated(loops: &[Vec<Vec3>], unit: f32, iterations: u32) -> Vec<Vec<Vec3>> {
    let mut current = loops.to_vec();
    for _ in 0..iterations {
        current = resample(&current, unit);
    }
    current
}
