//! Head pose estimation from 2D/3D landmark correspondences.
//!
//! The solve is a classic Perspective-n-Point fit: find the rotation and
//! translation that best project the object points onto the observed image
//! points through an approximate pinhole camera, minimising reprojection
//! error with Levenberg-Marquardt. The rotation is then split into Euler-like
//! angles with a Givens-rotation RQ decomposition.
//!
//! # Angle scale
//!
//! The decomposed angles (degrees) are multiplied by [`ANGLE_SCALE`] before
//! classification. The direction thresholds were calibrated against that
//! scaled value, so both must change together.

use nalgebra::{DMatrix, DVector, Matrix3, Point2, Point3, Rotation3, Vector3, Vector6};
use serde::Serialize;
use thiserror::Error;

/// Multiplier applied to decomposed angles before thresholding.
pub const ANGLE_SCALE: f64 = 360.0;

/// Yaw beyond which the head counts as turned (scaled units).
const YAW_LIMIT: f64 = 8.0;
/// Pitch below which the head counts as tilted down (scaled units).
const PITCH_DOWN_LIMIT: f64 = -4.0;
/// Pitch above which the head counts as tilted up (scaled units).
const PITCH_UP_LIMIT: f64 = 14.0;

/// Minimum number of correspondences accepted by [`solve_pnp`].
pub const MIN_CORRESPONDENCES: usize = 4;

const MAX_ITERATIONS: usize = 50;
/// Sum of squared reprojection residuals (px²) treated as an exact fit.
const COST_EPS: f64 = 1e-18;
/// Relative parameter step below which the fit is considered converged.
const STEP_EPS: f64 = 1e-12;
const JACOBIAN_STEP: f64 = 1e-7;
const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e12;
const DIAG_FLOOR: f64 = 1e-9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error("pose solve needs at least {MIN_CORRESPONDENCES} correspondences, got {0}")]
    TooFewPoints(usize),
    #[error("object/image point count mismatch: {object} object vs {image} image points")]
    CountMismatch { object: usize, image: usize },
    #[error("degenerate correspondences: {0}")]
    Degenerate(&'static str),
    #[error("pose solve did not converge")]
    NotConverged,
}

/// Coarse head direction derived from [`PoseAngles`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
    Forward,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Left => "Left",
            Direction::Right => "Right",
            Direction::Up => "Up",
            Direction::Down => "Down",
            Direction::Forward => "Forward",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scaled head rotation angles.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoseAngles {
    /// Rotation about the camera x axis, scaled by [`ANGLE_SCALE`].
    pub pitch: f64,
    /// Rotation about the camera y axis, scaled by [`ANGLE_SCALE`].
    pub yaw: f64,
}

impl PoseAngles {
    /// Classify the pose. Yaw is tested before pitch and all comparisons
    /// are strict.
    pub fn direction(&self) -> Direction {
        if self.yaw < -YAW_LIMIT {
            Direction::Left
        } else if self.yaw > YAW_LIMIT {
            Direction::Right
        } else if self.pitch < PITCH_DOWN_LIMIT {
            Direction::Down
        } else if self.pitch > PITCH_UP_LIMIT {
            Direction::Up
        } else {
            Direction::Forward
        }
    }
}

/// Pinhole camera without lens distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub focal_length: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Uncalibrated webcam approximation: focal length equal to the frame
    /// width and principal point at `(height / 2, width / 2)`.
    ///
    /// The principal point axes are swapped relative to the usual
    /// `(width / 2, height / 2)`; the direction thresholds depend on it.
    pub fn approximate(width: u32, height: u32) -> Self {
        Self {
            focal_length: f64::from(width),
            cx: f64::from(height) / 2.0,
            cy: f64::from(width) / 2.0,
        }
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        #[rustfmt::skip]
        let k = Matrix3::new(
            self.focal_length, 0.0, self.cx,
            0.0, self.focal_length, self.cy,
            0.0, 0.0, 1.0,
        );
        k
    }

    /// Project a camera-frame point. `None` if it lies on the camera plane.
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z.abs() < f64::EPSILON {
            return None;
        }
        Some(Point2::new(
            self.focal_length * p.x / p.z + self.cx,
            self.focal_length * p.y / p.z + self.cy,
        ))
    }
}

/// Result of a PnP solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PnpSolution {
    /// Axis-angle rotation vector (radians).
    pub rotation: Vector3<f64>,
    pub translation: Vector3<f64>,
    /// Root mean square reprojection error in pixels.
    pub rms_error: f64,
}

impl PnpSolution {
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        rodrigues(&self.rotation)
    }
}

/// Rotation vector to rotation matrix.
pub fn rodrigues(rotation: &Vector3<f64>) -> Matrix3<f64> {
    Rotation3::from_scaled_axis(*rotation).into_inner()
}

/// Projection model over the packed parameter vector `[rx, ry, rz, tx, ty, tz]`.
struct Reprojection<'a> {
    object: &'a [Point3<f64>],
    image: &'a [Point2<f64>],
    camera: &'a CameraIntrinsics,
}

impl Reprojection<'_> {
    fn residuals(&self, params: &Vector6<f64>) -> Option<DVector<f64>> {
        let rotation = Rotation3::from_scaled_axis(Vector3::new(params[0], params[1], params[2]));
        let translation = Vector3::new(params[3], params[4], params[5]);

        let mut out = DVector::zeros(self.object.len() * 2);
        for (i, (obj, img)) in self.object.iter().zip(self.image).enumerate() {
            let projected = self.camera.project(&(rotation * obj + translation))?;
            out[2 * i] = projected.x - img.x;
            out[2 * i + 1] = projected.y - img.y;
        }

        if out.iter().all(|v| v.is_finite()) {
            Some(out)
        } else {
            None
        }
    }

    /// Central-difference Jacobian of the residual vector.
    fn jacobian(&self, params: &Vector6<f64>) -> Option<DMatrix<f64>> {
        let mut jac = DMatrix::zeros(self.object.len() * 2, 6);
        for k in 0..6 {
            let h = JACOBIAN_STEP * params[k].abs().max(1.0);
            let mut forward = *params;
            let mut backward = *params;
            forward[k] += h;
            backward[k] -= h;
            let column = (self.residuals(&forward)? - self.residuals(&backward)?) / (2.0 * h);
            jac.set_column(k, &column);
        }
        Some(jac)
    }

    /// Identity rotation with a translation that matches the centroid and
    /// spread of the image points.
    fn initial_guess(&self) -> Result<Vector6<f64>, PoseError> {
        let n = self.object.len() as f64;
        let obj_mean = self.object.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n;
        let img_mean = self.image.iter().fold(nalgebra::Vector2::zeros(), |acc, p| acc + p.coords) / n;

        let obj_spread = self
            .object
            .iter()
            .map(|p| (p.x - obj_mean.x).hypot(p.y - obj_mean.y))
            .sum::<f64>()
            / n;
        let img_spread = self
            .image
            .iter()
            .map(|p| (p.x - img_mean.x).hypot(p.y - img_mean.y))
            .sum::<f64>()
            / n;

        if obj_spread < f64::EPSILON || img_spread < f64::EPSILON {
            return Err(PoseError::Degenerate("points collapse to a single location"));
        }

        let f = self.camera.focal_length;
        let depth = f * obj_spread / img_spread;

        Ok(Vector6::new(
            0.0,
            0.0,
            0.0,
            (img_mean.x - self.camera.cx) * depth / f - obj_mean.x,
            (img_mean.y - self.camera.cy) * depth / f - obj_mean.y,
            depth - obj_mean.z,
        ))
    }
}

/// Estimate the object pose relative to the camera.
pub fn solve_pnp(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &CameraIntrinsics,
) -> Result<PnpSolution, PoseError> {
    if object.len() != image.len() {
        return Err(PoseError::CountMismatch {
            object: object.len(),
            image: image.len(),
        });
    }
    if object.len() < MIN_CORRESPONDENCES {
        return Err(PoseError::TooFewPoints(object.len()));
    }
    if camera.focal_length <= 0.0 {
        return Err(PoseError::Degenerate("non-positive focal length"));
    }

    let model = Reprojection {
        object,
        image,
        camera,
    };

    let mut params = model.initial_guess()?;
    let mut residual = model
        .residuals(&params)
        .ok_or(PoseError::Degenerate("initial pose places points on the camera plane"))?;
    let mut cost = residual.norm_squared();
    let mut lambda = LAMBDA_INIT;

    for _ in 0..MAX_ITERATIONS {
        if cost < COST_EPS {
            break;
        }

        let jac = model.jacobian(&params).ok_or(PoseError::NotConverged)?;
        let jtj = jac.transpose() * &jac;
        let gradient = jac.transpose() * &residual;

        let mut accepted = None;
        while lambda < LAMBDA_MAX {
            let mut damped = jtj.clone();
            for i in 0..6 {
                damped[(i, i)] += lambda * damped[(i, i)].max(DIAG_FLOOR);
            }
            let Some(chol) = damped.cholesky() else {
                lambda *= 10.0;
                continue;
            };
            let step = chol.solve(&(-&gradient));
            let candidate = params + Vector6::from_iterator(step.iter().copied());
            match model.residuals(&candidate) {
                Some(r) if r.norm_squared() < cost => {
                    accepted = Some((candidate, r, step.norm()));
                    lambda = (lambda / 10.0).max(LAMBDA_MIN);
                    break;
                }
                _ => lambda *= 10.0,
            }
        }

        // No damping produced a descent step: local minimum.
        let Some((candidate, r, step_norm)) = accepted else {
            break;
        };
        params = candidate;
        cost = r.norm_squared();
        residual = r;

        if step_norm < STEP_EPS * (params.norm() + STEP_EPS) {
            break;
        }
    }

    if !params.iter().all(|v| v.is_finite()) {
        return Err(PoseError::NotConverged);
    }

    let solution = PnpSolution {
        rotation: Vector3::new(params[0], params[1], params[2]),
        translation: Vector3::new(params[3], params[4], params[5]),
        rms_error: (cost / object.len() as f64).sqrt(),
    };
    tracing::trace!(
        rms_error = solution.rms_error,
        rotation = ?solution.rotation,
        "pnp solved"
    );
    Ok(solution)
}

/// RQ-decompose a 3x3 matrix with Givens rotations about x, then y, then z,
/// returning the three rotation angles in degrees.
pub fn rq_euler_angles(m: &Matrix3<f64>) -> Vector3<f64> {
    fn givens(c: f64, s: f64) -> (f64, f64) {
        let z = 1.0 / (c * c + s * s + f64::EPSILON).sqrt();
        (c * z, s * z)
    }
    fn angle(cos: f64, sign_source: f64) -> f64 {
        let sign = if sign_source >= 0.0 { 1.0 } else { -1.0 };
        cos.clamp(-1.0, 1.0).acos() * sign * (180.0 / std::f64::consts::PI)
    }

    let (cx, sx) = givens(m[(2, 2)], m[(2, 1)]);
    #[rustfmt::skip]
    let qx = Matrix3::new(
        1.0, 0.0, 0.0,
        0.0, cx, sx,
        0.0, -sx, cx,
    );
    let r = m * qx;

    let (cy, sy) = givens(r[(2, 2)], -r[(2, 0)]);
    #[rustfmt::skip]
    let qy = Matrix3::new(
        cy, 0.0, -sy,
        0.0, 1.0, 0.0,
        sy, 0.0, cy,
    );
    let m2 = r * qy;

    let (cz, sz) = givens(m2[(1, 1)], m2[(1, 0)]);
    #[rustfmt::skip]
    let qz = Matrix3::new(
        cz, sz, 0.0,
        -sz, cz, 0.0,
        0.0, 0.0, 1.0,
    );
    let upper = m2 * qz;

    // Keep the upper-triangular diagonal positive; both 180° fixes that touch
    // Qz flip its first row.
    let (qz00, qz01) = if upper[(0, 0)] < 0.0 { (-cz, -sz) } else { (cz, sz) };

    Vector3::new(angle(cx, sx), angle(cy, sy), angle(qz00, qz01))
}

/// Head pose from the fixed face landmark correspondences.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoseEstimator;

impl PoseEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Solve for the head rotation and return scaled pitch and yaw.
    pub fn estimate(
        &self,
        image_points: &[Point2<f64>],
        object_points: &[Point3<f64>],
        width: u32,
        height: u32,
    ) -> Result<PoseAngles, PoseError> {
        let camera = CameraIntrinsics::approximate(width, height);
        let solution = solve_pnp(object_points, image_points, &camera)?;
        let angles = rq_euler_angles(&solution.rotation_matrix());

        Ok(PoseAngles {
            pitch: angles.x * ANGLE_SCALE,
            yaw: angles.y * ANGLE_SCALE,
        })
    }

    pub fn direction(
        &self,
        image_points: &[Point2<f64>],
        object_points: &[Point3<f64>],
        width: u32,
        height: u32,
    ) -> Result<Direction, PoseError> {
        Ok(self
            .estimate(image_points, object_points, width, height)?
            .direction())
    }
}
