//! # Tracker parameters
//!
//! [`TrackerParams`] gathers every threshold of the
//! [`TrajectoryTracker`](crate::tracking::TrajectoryTracker). Values are domain constants
//! (distances in millimetres, durations in frames at 200 Hz), never behavior switches.
//!
//! Construct them with [`TrackerParams::default`] (target-stimulus tracking),
//! [`TrackerParams::perching`] (rigid-body tracking for perch extraction) or the validating
//! builder:
//!
//! ```rust
//! use perchtrack::tracking::TrackerParams;
//!
//! let params = TrackerParams::builder()
//!     .max_association_distance(90.0)
//!     .timeout_frames(150)
//!     .build()
//!     .unwrap();
//! assert_eq!(params.timeout_frames, 150);
//! ```
use std::cmp::Ordering::{Equal, Greater, Less};
use std::fmt;

use serde::Deserialize;

use crate::{
    constants::{
        FrameIndex, Millimeter, DEFAULT_MAX_ASSOCIATION_DISTANCE, DEFAULT_MAX_DURATION_FRAMES,
        DEFAULT_PERCH_ASSOCIATION_DISTANCE, DEFAULT_STATIONARY_MAX_SPAN,
        DEFAULT_STATIONARY_MIN_POINTS, DEFAULT_STATIONARY_WINDOW, DEFAULT_TIMEOUT_FRAMES,
    },
    PerchTrackError,
};

/// Thresholds of the nearest-neighbour tracker.
///
/// Fields
/// -----------------
/// * `max_association_distance` – a point joins a trajectory only if it lies strictly closer
///   than this to the trajectory's last point (mm).
/// * `timeout_frames` – a trajectory not extended for more than this many frames is closed.
/// * `max_duration_frames` – a trajectory reaching this many points is closed at once.
/// * `stationary_min_points` – trajectories holding more points than this are checked for
///   stationarity after each append.
/// * `stationary_window` – number of trailing points inspected by the stationarity check.
/// * `stationary_max_span` – the trajectory is closed when the bounding-box span of its
///   trailing window is below this value (mm). `0` never triggers.
///
/// Defaults
/// -----------------
/// * `max_association_distance`: 75 mm
/// * `timeout_frames`: 100 (0.5 s)
/// * `max_duration_frames`: 3000 (15 s)
/// * `stationary_min_points`: 600
/// * `stationary_window`: 200
/// * `stationary_max_span`: 10 mm
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackerParams {
    pub max_association_distance: Millimeter,
    pub timeout_frames: FrameIndex,
    pub max_duration_frames: usize,
    pub stationary_min_points: usize,
    pub stationary_window: usize,
    pub stationary_max_span: Millimeter,
}

impl Default for TrackerParams {
    fn default() -> Self {
        TrackerParams {
            max_association_distance: DEFAULT_MAX_ASSOCIATION_DISTANCE,
            timeout_frames: DEFAULT_TIMEOUT_FRAMES,
            max_duration_frames: DEFAULT_MAX_DURATION_FRAMES,
            stationary_min_points: DEFAULT_STATIONARY_MIN_POINTS,
            stationary_window: DEFAULT_STATIONARY_WINDOW,
            stationary_max_span: DEFAULT_STATIONARY_MAX_SPAN,
        }
    }
}

impl TrackerParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters for tracking the animal's rigid body.
    ///
    /// The association bound is wider (100 mm), a trajectory may last one hour, and the
    /// stationarity split is disabled: a perched animal is stationary on purpose.
    pub fn perching() -> Self {
        TrackerParams {
            max_association_distance: DEFAULT_PERCH_ASSOCIATION_DISTANCE,
            max_duration_frames: 720_000,
            stationary_max_span: 0.0,
            ..Self::default()
        }
    }

    pub fn builder() -> TrackerParamsBuilder {
        TrackerParamsBuilder::new()
    }

    /// Check the consistency of the parameters.
    ///
    /// Rules
    /// -----------------
    /// * `max_association_distance > 0`
    /// * `timeout_frames >= 0`
    /// * `max_duration_frames >= 1`
    /// * `2 <= stationary_window <= stationary_min_points`
    /// * `stationary_max_span >= 0`
    pub fn validate(&self) -> Result<(), PerchTrackError> {
        let invalid = |msg: &str| Err(PerchTrackError::InvalidTrackerParameter(msg.into()));

        if !gt0(self.max_association_distance) {
            return invalid("max_association_distance must be > 0");
        }
        if self.timeout_frames < 0 {
            return invalid("timeout_frames must be >= 0");
        }
        if self.max_duration_frames == 0 {
            return invalid("max_duration_frames must be >= 1");
        }
        if self.stationary_window < 2 || self.stationary_window > self.stationary_min_points {
            return invalid("require 2 <= stationary_window <= stationary_min_points");
        }
        if !ge0(self.stationary_max_span) {
            return invalid("stationary_max_span must be >= 0");
        }
        Ok(())
    }
}

/// Return true iff x > 0.0 and comparable (i.e., not NaN).
#[inline]
pub(crate) fn gt0(x: f64) -> bool {
    x.partial_cmp(&0.0) == Some(Greater)
}

/// Return true iff x >= 0.0 and comparable (i.e., not NaN).
#[inline]
pub(crate) fn ge0(x: f64) -> bool {
    matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
}

/// Return true iff a <= b and comparable (i.e., not NaN).
#[inline]
pub(crate) fn le(a: f64, b: f64) -> bool {
    matches!(a.partial_cmp(&b), Some(Less) | Some(Equal))
}

/// Builder for [`TrackerParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct TrackerParamsBuilder {
    params: TrackerParams,
}

impl TrackerParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: TrackerParams::default(),
        }
    }

    /// Start from an existing parameter set.
    pub fn from_params(params: TrackerParams) -> Self {
        Self { params }
    }

    pub fn max_association_distance(mut self, v: Millimeter) -> Self {
        self.params.max_association_distance = v;
        self
    }
    pub fn timeout_frames(mut self, v: FrameIndex) -> Self {
        self.params.timeout_frames = v;
        self
    }
    pub fn max_duration_frames(mut self, v: usize) -> Self {
        self.params.max_duration_frames = v;
        self
    }
    pub fn stationary_min_points(mut self, v: usize) -> Self {
        self.params.stationary_min_points = v;
        self
    }
    pub fn stationary_window(mut self, v: usize) -> Self {
        self.params.stationary_window = v;
        self
    }
    pub fn stationary_max_span(mut self, v: Millimeter) -> Self {
        self.params.stationary_max_span = v;
        self
    }

    /// Validate and return the parameters, see [`TrackerParams::validate`].
    pub fn build(self) -> Result<TrackerParams, PerchTrackError> {
        self.params.validate()?;
        Ok(self.params)
    }
}

impl fmt::Display for TrackerParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "[Tracker]")?;
            writeln!(
                f,
                "  max_association_distance = {:.1} mm",
                self.max_association_distance
            )?;
            writeln!(f, "  timeout_frames           = {}", self.timeout_frames)?;
            writeln!(f, "  max_duration_frames      = {}", self.max_duration_frames)?;
            writeln!(f, "  stationary_min_points    = {}", self.stationary_min_points)?;
            writeln!(f, "  stationary_window        = {}", self.stationary_window)?;
            write!(
                f,
                "  stationary_max_span      = {:.1} mm",
                self.stationary_max_span
            )
        } else {
            write!(
                f,
                "TrackerParams(dist<{:.1}mm, timeout={}f, max_duration={}f, stationary<{:.1}mm over {}f)",
                self.max_association_distance,
                self.timeout_frames,
                self.max_duration_frames,
                self.stationary_max_span,
                self.stationary_window,
            )
        }
    }
}
