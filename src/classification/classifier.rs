//! # Target-stimulus classifier
//!
//! Decides whether a closed trajectory is the moving target stimulus ("FlySim") rather than a
//! marker carried by the animal, a reflection or a static object.
//!
//! Tests
//! -----------------
//! | flag            | rule                                                        |
//! |-----------------|-------------------------------------------------------------|
//! | `dist_ok`       | bounding-box diagonal `> min_displacement`                  |
//! | `len_ok`        | point count `> min_length`                                  |
//! | `dir_ok`        | plane fit `r2 > min_r2` and direction score `< tolerance`   |
//! | anchor distance | mean distance to the frame's rigid bodies `> min_anchor`    |
//! | point spread    | per-frame residual spread `< max_point_std`                 |
//! | height          | lowest point `>= min_height`                                |
//!
//! The composite label combines every test except `dir_ok`, which is reported for review
//! only.
//!
//! Degenerate inputs never fail: a plane that cannot be fitted gives `r2 = -1`,
//! `direction_score = NaN` and `dir_ok = false`.
use std::fmt;

use itertools::Itertools;

use crate::{
    classification::params::ClassifierParams,
    constants::{FrameIndex, Millimeter, Position, TrajectoryId},
    geometry::{min_distance_to, nan_mean, nan_std, sample_std, BoundingBox},
    regression::fit_plane,
    tracking::Trajectory,
};

/// Outcome of [`TrajectoryClassifier::classify`] for one trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub trajectory_id: TrajectoryId,
    pub frame_start: FrameIndex,
    pub frame_end: FrameIndex,
    pub point_count: usize,
    /// Diagonal of the axis-aligned bounding box.
    pub span: Millimeter,
    /// Distance of the plane slope `[a, b]` to the reference direction.
    pub direction_score: f64,
    pub r2: f64,
    pub mean_anchor_distance: Millimeter,
    pub anchor_distance_std: Millimeter,
    pub dist_ok: bool,
    pub len_ok: bool,
    pub dir_ok: bool,
    pub pt_std: f64,
    pub std_x: f64,
    pub std_y: f64,
    pub std_z: f64,
    pub min_z: Millimeter,
    /// Composite label: the trajectory is the target stimulus.
    pub is_target: bool,
}

impl Verdict {
    /// Whether the verdict and the trajectory's points are worth persisting.
    ///
    /// Short or small trajectories are overwhelmingly noise; only trajectories passing both
    /// the length and the displacement test are written out.
    pub fn should_persist(&self) -> bool {
        self.len_ok && self.dist_ok
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trajectory #{} [{}..={}] target={} (span={:.1}mm len={} r2={:.3} dir={:.3} anchor={:.1}mm pt_std={:.3} min_z={:.1}mm)",
            self.trajectory_id,
            self.frame_start,
            self.frame_end,
            self.is_target,
            self.span,
            self.point_count,
            self.r2,
            self.direction_score,
            self.mean_anchor_distance,
            self.pt_std,
            self.min_z
        )
    }
}

/// Pure classifier: the same trajectory always yields the same [`Verdict`].
#[derive(Debug, Clone, Default)]
pub struct TrajectoryClassifier {
    params: ClassifierParams,
}

impl TrajectoryClassifier {
    pub fn new(params: ClassifierParams) -> Self {
        TrajectoryClassifier { params }
    }

    pub fn params(&self) -> &ClassifierParams {
        &self.params
    }

    /// Classify a trajectory.
    ///
    /// Arguments
    /// -----------------
    /// * `trajectory`: a closed trajectory; the anchors carried by its observations are used
    ///   for the anchor-distance test.
    ///
    /// Return
    /// ----------
    /// * The [`Verdict`], never an error.
    pub fn classify(&self, trajectory: &Trajectory) -> Verdict {
        let p = &self.params;
        let points = trajectory.points();

        let span = BoundingBox::from_points(trajectory.positions()).span();
        let dist_ok = span > p.min_displacement;
        let len_ok = trajectory.len() > p.min_length;

        let (r2, direction_score) = self.direction_fit(trajectory);
        let dir_ok = r2 > p.min_r2 && direction_score < p.direction_tolerance;

        let anchor_distances: Vec<f64> = points
            .iter()
            .map(|o| min_distance_to(&o.position, &o.anchors).unwrap_or(f64::NAN))
            .collect();
        let mut mean_anchor_distance = nan_mean(&anchor_distances);
        if mean_anchor_distance.is_nan() {
            mean_anchor_distance = f64::INFINITY;
        }
        let mut anchor_distance_std = nan_std(&anchor_distances);
        if anchor_distance_std.is_nan() {
            anchor_distance_std = 0.0;
        }

        let [std_x, std_y, std_z] = per_frame_spread(trajectory);
        let pt_std: f64 = [std_x, std_y, std_z].iter().filter(|v| !v.is_nan()).sum();

        let min_z = trajectory
            .positions()
            .map(|p| p.z)
            .fold(f64::INFINITY, f64::min);

        let is_target = dist_ok
            && len_ok
            && pt_std < p.max_point_std
            && mean_anchor_distance > p.min_anchor_distance
            && min_z >= p.min_height;

        Verdict {
            trajectory_id: trajectory.id(),
            frame_start: trajectory.first_frame(),
            frame_end: trajectory.last_frame(),
            point_count: trajectory.len(),
            span,
            direction_score,
            r2,
            mean_anchor_distance,
            anchor_distance_std,
            dist_ok,
            len_ok,
            dir_ok,
            pt_std,
            std_x,
            std_y,
            std_z,
            min_z,
            is_target,
        }
    }

    /// Plane fit `z ≈ a·x + b·y + c`, returning `(r2, ||[a, b] − reference||)`.
    fn direction_fit(&self, trajectory: &Trajectory) -> (f64, f64) {
        let (x, (y, z)): (Vec<f64>, (Vec<f64>, Vec<f64>)) =
            trajectory.positions().map(|p| (p.x, (p.y, p.z))).unzip();

        match fit_plane(&x, &y, &z) {
            Some(fit) => {
                let [ra, rb] = self.params.reference_direction;
                let score = ((fit.params[0] - ra).powi(2) + (fit.params[1] - rb).powi(2)).sqrt();
                (fit.r2, score)
            }
            None => (-1.0, f64::NAN),
        }
    }
}

/// Sample standard deviation of the per-frame centered residuals, for each axis.
///
/// Points sharing a frame are centered on their frame mean; the residuals of every frame are
/// pooled before taking the `n − 1` standard deviation.
fn per_frame_spread(trajectory: &Trajectory) -> [f64; 3] {
    let mut residuals: [Vec<f64>; 3] = Default::default();
    for (_, group) in &trajectory.points().iter().chunk_by(|o| o.frame) {
        let group: Vec<_> = group.map(|o| o.position).collect();
        let mean = group.iter().sum::<Position>() / group.len() as f64;
        for p in &group {
            for (r, (v, m)) in residuals.iter_mut().zip(p.iter().zip(mean.iter())) {
                r.push(v - m);
            }
        }
    }
    [
        sample_std(&residuals[0]),
        sample_std(&residuals[1]),
        sample_std(&residuals[2]),
    ]
}
