//! Thresholds of the perch / takeoff segment extractor.
use std::fmt;

use serde::Deserialize;

use crate::{
    constants::{
        FrameIndex, Millimeter, CAPTURE_FPS, DEFAULT_BODY_LABEL, DEFAULT_LOOKAHEAD_SECONDS,
        DEFAULT_MAX_STATIONARY_MOVEMENT, DEFAULT_MIN_PERCH_FRAMES, DEFAULT_MIN_RANGE_FRAMES,
        DEFAULT_MIN_TAKEOFF_POINTS, DEFAULT_MIN_TRAJECTORY_POINTS, DEFAULT_TAKEOFF_LOOKBACK,
        DEFAULT_TAKEOFF_WINDOW,
    },
    tracking::params::gt0,
    PerchTrackError,
};

/// Configuration of [`SegmentExtractor`](crate::segments::SegmentExtractor).
///
/// Fields
/// -----------------
/// * `body_label` – substring of the rigid-body label followed for perch extraction
///   (default `"Yframe"`).
/// * `min_trajectory_points` – shorter trajectories yield no segment (default 100).
/// * `max_stationary_movement` – largest per-axis extent of a stationary box (mm, default 30).
/// * `min_range_frames` – a stationary range must span strictly more frames (default 10).
/// * `min_perch_frames` – a stationary range spanning strictly more frames is a perch
///   (default 400, i.e. 2 s).
/// * `takeoff_lookback` / `takeoff_window` – the takeoff window is
///   `[end − lookback, end + window)` around the end of a stationary range (200 / 600).
/// * `min_takeoff_points` – the window must hold at least `lookback + min_takeoff_points`
///   points (default 50).
/// * `lookahead_seconds` – horizon of the upward-speed estimate (default 0.2 s).
/// * `capture_fps` – sampling rate used to convert `lookahead_seconds` to frames (200 Hz).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SegmentParams {
    pub body_label: String,
    pub min_trajectory_points: usize,
    pub max_stationary_movement: Millimeter,
    pub min_range_frames: FrameIndex,
    pub min_perch_frames: FrameIndex,
    pub takeoff_lookback: FrameIndex,
    pub takeoff_window: FrameIndex,
    pub min_takeoff_points: usize,
    pub lookahead_seconds: f64,
    pub capture_fps: f64,
}

impl Default for SegmentParams {
    fn default() -> Self {
        SegmentParams {
            body_label: DEFAULT_BODY_LABEL.to_string(),
            min_trajectory_points: DEFAULT_MIN_TRAJECTORY_POINTS,
            max_stationary_movement: DEFAULT_MAX_STATIONARY_MOVEMENT,
            min_range_frames: DEFAULT_MIN_RANGE_FRAMES,
            min_perch_frames: DEFAULT_MIN_PERCH_FRAMES,
            takeoff_lookback: DEFAULT_TAKEOFF_LOOKBACK,
            takeoff_window: DEFAULT_TAKEOFF_WINDOW,
            min_takeoff_points: DEFAULT_MIN_TAKEOFF_POINTS,
            lookahead_seconds: DEFAULT_LOOKAHEAD_SECONDS,
            capture_fps: CAPTURE_FPS,
        }
    }
}

impl SegmentParams {
    pub fn builder() -> SegmentParamsBuilder {
        SegmentParamsBuilder::new()
    }

    /// Lookahead of the upward-speed estimate, in points.
    pub fn lookahead_points(&self) -> usize {
        (self.lookahead_seconds * self.capture_fps).round() as usize
    }

    pub fn validate(&self) -> Result<(), PerchTrackError> {
        let invalid = |msg: &str| Err(PerchTrackError::InvalidSegmentParameter(msg.into()));

        if self.body_label.trim().is_empty() {
            return invalid("body_label must not be empty");
        }
        if !gt0(self.max_stationary_movement) {
            return invalid("max_stationary_movement must be > 0");
        }
        if self.min_range_frames < 0 || self.min_perch_frames < 0 {
            return invalid("min_range_frames and min_perch_frames must be >= 0");
        }
        if self.takeoff_lookback < 0 || self.takeoff_window <= 0 {
            return invalid("require takeoff_lookback >= 0 and takeoff_window > 0");
        }
        if !gt0(self.lookahead_seconds) || !gt0(self.capture_fps) {
            return invalid("lookahead_seconds and capture_fps must be > 0");
        }
        if self.lookahead_points() == 0 {
            return invalid("lookahead must cover at least one frame");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SegmentParamsBuilder {
    params: SegmentParams,
}

impl SegmentParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body_label(mut self, v: impl Into<String>) -> Self {
        self.params.body_label = v.into();
        self
    }
    pub fn min_trajectory_points(mut self, v: usize) -> Self {
        self.params.min_trajectory_points = v;
        self
    }
    pub fn max_stationary_movement(mut self, v: Millimeter) -> Self {
        self.params.max_stationary_movement = v;
        self
    }
    pub fn min_range_frames(mut self, v: FrameIndex) -> Self {
        self.params.min_range_frames = v;
        self
    }
    pub fn min_perch_frames(mut self, v: FrameIndex) -> Self {
        self.params.min_perch_frames = v;
        self
    }
    pub fn takeoff_lookback(mut self, v: FrameIndex) -> Self {
        self.params.takeoff_lookback = v;
        self
    }
    pub fn takeoff_window(mut self, v: FrameIndex) -> Self {
        self.params.takeoff_window = v;
        self
    }
    pub fn min_takeoff_points(mut self, v: usize) -> Self {
        self.params.min_takeoff_points = v;
        self
    }
    pub fn lookahead_seconds(mut self, v: f64) -> Self {
        self.params.lookahead_seconds = v;
        self
    }
    pub fn capture_fps(mut self, v: f64) -> Self {
        self.params.capture_fps = v;
        self
    }

    pub fn build(self) -> Result<SegmentParams, PerchTrackError> {
        self.params.validate()?;
        Ok(self.params)
    }
}

impl fmt::Display for SegmentParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "[Segments]")?;
            writeln!(f, "  body_label              = {}", self.body_label)?;
            writeln!(f, "  min_trajectory_points   = {}", self.min_trajectory_points)?;
            writeln!(
                f,
                "  max_stationary_movement = {:.1} mm",
                self.max_stationary_movement
            )?;
            writeln!(f, "  min_range_frames        = {}", self.min_range_frames)?;
            writeln!(f, "  min_perch_frames        = {}", self.min_perch_frames)?;
            writeln!(
                f,
                "  takeoff window          = [end - {}, end + {})",
                self.takeoff_lookback, self.takeoff_window
            )?;
            writeln!(f, "  min_takeoff_points      = {}", self.min_takeoff_points)?;
            write!(
                f,
                "  lookahead               = {:.3} s ({} points)",
                self.lookahead_seconds,
                self.lookahead_points()
            )
        } else {
            write!(
                f,
                "SegmentParams(body={}, box<{:.0}mm, perch>{}f, takeoff=[-{}, +{}))",
                self.body_label,
                self.max_stationary_movement,
                self.min_perch_frames,
                self.takeoff_lookback,
                self.takeoff_window
            )
        }
    }
}
