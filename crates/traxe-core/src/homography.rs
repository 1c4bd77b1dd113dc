use nalgebra::{DMatrix, Matrix2, Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

/// Relative singular-value gap below which the DLT null space is not unique.
const RANK_EPS: f64 = 1e-7;
/// Relative eigenvalue ratio below which a point set is treated as collinear.
const COLLINEAR_EPS: f64 = 1e-6;

/// Projective transform `dst ~ H * src` in homogeneous pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    /// Map a point; the caller guarantees it is not on the line at infinity.
    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.h * Vector3::new(p.x as f64, p.y as f64, 1.0);
        let w = v[2];
        Point2::new((v[0] / w) as f32, (v[1] / w) as f32)
    }

    /// Map a point, returning `None` when the projective weight vanishes.
    #[inline]
    pub fn try_apply(&self, p: Point2<f32>) -> Option<Point2<f32>> {
        let v = self.h * Vector3::new(p.x as f64, p.y as f64, 1.0);
        let w = v[2];
        if w.abs() < 1e-12 || !w.is_finite() {
            return None;
        }
        let out = Point2::new((v[0] / w) as f32, (v[1] / w) as f32);
        (out.x.is_finite() && out.y.is_finite()).then_some(out)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

/// Hartley normalization: translate to centroid, scale so mean distance = sqrt(2).
///
/// Returns `None` when every point coincides.
fn normalize_points(pts: &[Point2<f32>]) -> Option<(Vec<Point2<f64>>, Matrix3<f64>)> {
    let n = pts.len() as f64;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for p in pts {
        cx += p.x as f64;
        cy += p.y as f64;
    }
    cx /= n;
    cy /= n;

    let mut mean_dist = 0.0;
    for p in pts {
        let dx = p.x as f64 - cx;
        let dy = p.y as f64 - cy;
        mean_dist += (dx * dx + dy * dy).sqrt();
    }
    mean_dist /= n;
    if mean_dist <= 1e-12 {
        return None;
    }

    let t = hartley_normalization(cx, cy, mean_dist);

    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x as f64, p.y as f64, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    Some((out, t))
}

/// Collinearity test on already-normalized points via the scatter matrix.
fn is_collinear(pts: &[Point2<f64>]) -> bool {
    let n = pts.len() as f64;
    let (mx, my) = pts
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (mx, my) = (mx / n, my / n);

    let mut s = Matrix2::<f64>::zeros();
    for p in pts {
        let dx = p.x - mx;
        let dy = p.y - my;
        s[(0, 0)] += dx * dx;
        s[(0, 1)] += dx * dy;
        s[(1, 1)] += dy * dy;
    }
    s[(1, 0)] = s[(0, 1)];

    let eig = s.symmetric_eigenvalues();
    let (lo, hi) = if eig[0] < eig[1] {
        (eig[0], eig[1])
    } else {
        (eig[1], eig[0])
    };
    hi <= 1e-12 || lo / hi < COLLINEAR_EPS
}

fn normalize_homography(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    if s.abs() < 1e-12 {
        return None;
    }
    Some(h / s)
}

fn denormalize_homography(
    hn: Matrix3<f64>,
    t_src: Matrix3<f64>,
    t_dst: Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    let t_dst_inv = t_dst.try_inverse()?;
    Some(t_dst_inv * hn * t_src)
}

/// Least-squares estimate of H such that `dst ~ H * src` (normalized DLT).
///
/// Needs at least four correspondences. Returns `None` for degenerate input:
/// mismatched lengths, coincident or collinear points on either side, a
/// rank-deficient system (non-unique solution) or a singular result.
pub fn estimate_homography(src: &[Point2<f32>], dst: &[Point2<f32>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }

    let (s, ts) = normalize_points(src)?;
    let (d, td) = normalize_points(dst)?;
    if is_collinear(&s) || is_collinear(&d) {
        return None;
    }

    // Build A (2N x 9); the minimal 4-point case gets a zero row so the SVD
    // still yields a full 9x9 V^T.
    let n = src.len();
    let mut a = DMatrix::<f64>::zeros((2 * n).max(9), 9);

    for k in 0..n {
        let x = s[k].x;
        let y = s[k].y;
        let u = d[k].x;
        let v = d[k].y;

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    // Solve Ah = 0 -> h is right singular vector with smallest singular value.
    let svd = a.svd(true, true);
    let sv = &svd.singular_values;
    // Singular values come sorted in decreasing order; the second smallest
    // must be clearly non-zero or the null space is not one-dimensional.
    let largest = sv[0];
    if largest <= 0.0 || sv[7] / largest < RANK_EPS {
        return None;
    }

    let vt = svd.v_t?;
    let last = vt.nrows().checked_sub(1)?;
    let h = vt.row(last); // last row of V^T = last column of V

    let hn =
        Matrix3::<f64>::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    // Denormalize: H = Td^{-1} * Hn * Ts
    let h_den = denormalize_homography(hn, ts, td)?;
    let h_den = normalize_homography(h_den)?;

    if h_den.iter().any(|v| !v.is_finite()) || h_den.determinant().abs() < 1e-12 {
        return None;
    }

    Some(Homography::new(h_den))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point2<f32>, b: Point2<f32>, tol: f32) {
        let dx = (a.x - b.x).abs();
        let dy = (a.y - b.y).abs();
        assert!(
            dx < tol && dy < tol,
            "expected ({:.6},{:.6}) ~ ({:.6},{:.6}) within {}",
            a.x,
            a.y,
            b.x,
            b.y,
            tol
        );
    }

    fn ground_truth() -> Homography {
        Homography::new(Matrix3::new(
            2.1, 0.15, 300.0, //
            -0.08, 1.9, 120.0, //
            0.0004, 0.0002, 1.0,
        ))
    }

    #[test]
    fn inverse_round_trips_points() {
        let h = Homography::new(Matrix3::new(
            1.2, 0.1, 5.0, //
            -0.05, 0.9, 3.0, //
            0.001, 0.0005, 1.0,
        ));
        let inv = h.inverse().expect("invertible");

        for p in [
            Point2::new(0.0_f32, 0.0),
            Point2::new(50.0_f32, -20.0),
            Point2::new(320.0_f32, 200.0),
        ] {
            let q = h.apply(p);
            let back = inv.apply(q);
            assert_close(back, p, 1e-3);
        }
    }

    #[test]
    fn five_point_fit_recovers_exact_transform() {
        let gt = ground_truth();
        let src = [
            Point2::new(180.0_f32, 100.0),
            Point2::new(175.0, 380.0),
            Point2::new(470.0, 390.0),
            Point2::new(460.0, 95.0),
            Point2::new(320.0, 240.0),
        ];
        let dst: Vec<Point2<f32>> = src.iter().map(|&p| gt.apply(p)).collect();

        let est = estimate_homography(&src, &dst).expect("estimate");
        for &p in &src {
            assert_close(est.apply(p), gt.apply(p), 1e-2);
        }
    }

    #[test]
    fn overdetermined_fit_handles_grid() {
        let gt = ground_truth();
        let src: Vec<Point2<f32>> = (0..3)
            .flat_map(|y| (0..3).map(move |x| Point2::new(x as f32 * 40.0, y as f32 * 50.0)))
            .collect();
        let dst: Vec<Point2<f32>> = src.iter().map(|&p| gt.apply(p)).collect();

        let est = estimate_homography(&src, &dst).expect("estimate");
        for p in [Point2::new(10.0_f32, 10.0), Point2::new(70.0, 90.0)] {
            assert_close(est.apply(p), gt.apply(p), 1e-2);
        }
    }

    #[test]
    fn collinear_points_are_rejected() {
        let src: Vec<Point2<f32>> = (0..5)
            .map(|i| Point2::new(100.0 + 20.0 * i as f32, 50.0 + 10.0 * i as f32))
            .collect();
        let dst = [
            Point2::new(0.0_f32, 0.0),
            Point2::new(0.0, 800.0),
            Point2::new(800.0, 800.0),
            Point2::new(800.0, 0.0),
            Point2::new(400.0, 400.0),
        ];
        assert!(estimate_homography(&src, &dst).is_none());
    }

    #[test]
    fn coincident_points_are_rejected() {
        let src = [Point2::new(10.0_f32, 10.0); 5];
        let dst = [
            Point2::new(0.0_f32, 0.0),
            Point2::new(0.0, 800.0),
            Point2::new(800.0, 800.0),
            Point2::new(800.0, 0.0),
            Point2::new(400.0, 400.0),
        ];
        assert!(estimate_homography(&src, &dst).is_none());
    }

    #[test]
    fn mismatched_input_lengths_fail() {
        let src = [Point2::new(0.0_f32, 0.0); 5];
        let dst = [Point2::new(1.0_f32, 1.0); 4];
        assert!(estimate_homography(&src, &dst).is_none());
    }

    #[test]
    fn try_apply_rejects_points_at_infinity() {
        let h = Homography::new(Matrix3::new(
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            1.0, 0.0, 0.0,
        ));
        assert!(h.try_apply(Point2::new(0.0, 5.0)).is_none());
        assert!(h.try_apply(Point2::new(2.0, 5.0)).is_some());
    }

    #[test]
    fn serde_round_trip_preserves_matrix() {
        let h = ground_truth();
        let json = serde_json::to_string(&h).expect("encode");
        let back: Homography = serde_json::from_str(&json).expect("decode");
        approx::assert_relative_eq!(back.h, h.h, max_relative = 1e-12);
    }
}
