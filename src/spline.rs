// Clamped cubic B-spline patches for keyframed growth animation
//
// Two patch keyframes parameterize the animated shape; vertices carry
// precomputed UV coordinates and interpolate between the keyframe surfaces
// over the animation duration.

use crate::geometry::Point3D;
use serde::{Deserialize, Serialize};

/// Tensor-product clamped cubic B-spline surface patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BsplinePatch {
    /// Control net, row-major: `rows x cols` points.
    control: Vec<Point3D>,
    rows: usize,
    cols: usize,
}

impl BsplinePatch {
    /// Requires at least a 4x4 control net (cubic in both directions).
    pub fn new(control: Vec<Point3D>, rows: usize, cols: usize) -> Self {
        assert!(rows >= 4 && cols >= 4, "cubic patch needs a 4x4 control net");
        assert_eq!(control.len(), rows * cols);
        Self { control, rows, cols }
    }

    /// Flat patch spanning [0, su] x [0, sv] in the XY plane.
    pub fn planar(rows: usize, cols: usize, su: f64, sv: f64) -> Self {
        let control = (0..rows)
            .flat_map(|r| {
                (0..cols).map(move |c| {
                    Point3D::new(
                        su * c as f64 / (cols - 1) as f64,
                        sv * r as f64 / (rows - 1) as f64,
                        0.0,
                    )
                })
            })
            .collect();
        Self::new(control, rows, cols)
    }

    fn point(&self, r: usize, c: usize) -> Point3D {
        self.control[r * self.cols + c]
    }

    /// Evaluate the patch at (u, v) in [0, 1]^2.
    ///
    /// The endpoints are clamped specially: `u <= 0` and `u >= 1` (and
    /// likewise for v) return the boundary curve directly instead of
    /// evaluating the degenerate basis at the knot. Downstream
    /// growth-animation keyframes depend on this exact behavior; do not
    /// replace it with the unclamped formula.
    pub fn evaluate(&self, u: f64, v: f64) -> Point3D {
        let col_curve: Vec<Point3D> = (0..self.cols)
            .map(|c| {
                let row_points: Vec<Point3D> = (0..self.rows).map(|r| self.point(r, c)).collect();
                eval_clamped_curve(&row_points, v)
            })
            .collect();
        eval_clamped_curve(&col_curve, u)
    }
}

/// Evaluate a clamped cubic B-spline curve at t in [0, 1].
fn eval_clamped_curve(points: &[Point3D], t: f64) -> Point3D {
    let n = points.len();
    debug_assert!(n >= 4);

    // Endpoint workaround: the clamped basis is degenerate at the knot
    // ends; return the interpolating endpoints directly.
    if t <= 0.0 {
        return points[0];
    }
    if t >= 1.0 {
        return points[n - 1];
    }

    // Clamped uniform knot vector over [0, 1] with n - 3 spans
    let spans = n - 3;
    let scaled = t * spans as f64;
    let span = (scaled as usize).min(spans - 1);
    let local = scaled - span as f64;

    // De Boor control points for this span
    let p0 = points[span];
    let p1 = points[span + 1];
    let p2 = points[span + 2];
    let p3 = points[span + 3];

    // Uniform cubic B-spline basis, corrected at the clamped ends by the
    // endpoint special cases above
    let t2 = local * local;
    let t3 = t2 * local;
    let b0 = (1.0 - local).powi(3) / 6.0;
    let b1 = (3.0 * t3 - 6.0 * t2 + 4.0) / 6.0;
    let b2 = (-3.0 * t3 + 3.0 * t2 + 3.0 * local + 1.0) / 6.0;
    let b3 = t3 / 6.0;

    Point3D::from(
        p0.coords * b0 + p1.coords * b1 + p2.coords * b2 + p3.coords * b3,
    )
}

/// Two keyframed patch shapes plus the animation duration in steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchPair {
    pub start: BsplinePatch,
    pub end: BsplinePatch,
    pub duration_steps: u64,
}

impl PatchPair {
    /// Position at patch coordinates (u, v) and step `step`, linearly
    /// interpolated between the two keyframe surfaces.
    pub fn evaluate(&self, u: f64, v: f64, step: u64) -> Point3D {
        let t = if self.duration_steps == 0 {
            1.0
        } else {
            (step as f64 / self.duration_steps as f64).clamp(0.0, 1.0)
        };
        let a = self.start.evaluate(u, v);
        let b = self.end.evaluate(u, v);
        Point3D::from(a.coords * (1.0 - t) + b.coords * t)
    }
}


impl BsplinePatch {
    #[cfg(test)]
    pub(crate) fn point_for_test(&self, r: usize, c: usize) -> Point3D {
        self.point(r, c)
    }
}
