//! # Constants and type definitions for perchtrack
//!
//! This module centralizes the **capture-system constants**, the **default thresholds** of the
//! tracking / classification / segmentation stages, and the **type aliases** shared by the
//! whole crate.
//!
//! ## Overview
//!
//! - Motion-capture acquisition constants (frame rate, NaN sentinel)
//! - Default tuning values (every one of them can be overridden through the parameter
//!   builders, see [`TrackerParams`](crate::tracking::TrackerParams),
//!   [`ClassifierParams`](crate::classification::ClassifierParams) and
//!   [`SegmentParams`](crate::segments::SegmentParams))
//! - Core type aliases for frames, timestamps, distances and identifiers
//!
//! Distances are expressed in **millimetres**, as delivered by the capture system.

use nalgebra::Vector3;

// -------------------------------------------------------------------------------------------------
// Acquisition constants
// -------------------------------------------------------------------------------------------------

/// Sampling rate of the motion-capture system (frames per second)
pub const CAPTURE_FPS: f64 = 200.0;

/// Value written by the capture system for a coordinate it could not reconstruct
pub const CAPTURE_NAN_SENTINEL: f64 = 9_999_999.0;

/// Offset separating the trajectory ids of two shards.
///
/// Shard `k` emits ids in `k * TRAJECTORY_ID_BIAS + 1 ..`.
pub const TRAJECTORY_ID_BIAS: u64 = 1_000_000;

/// Offset separating the takeoff ids of two shards.
pub const TAKEOFF_ID_BIAS: u64 = 1_000_000;

// -------------------------------------------------------------------------------------------------
// Tracker defaults
// -------------------------------------------------------------------------------------------------

/// Maximum distance between a trajectory's last point and a new point (mm)
pub const DEFAULT_MAX_ASSOCIATION_DISTANCE: Millimeter = 75.0;

/// Frames without a new point after which a trajectory is closed
pub const DEFAULT_TIMEOUT_FRAMES: i64 = 100;

/// Maximum number of points held by one trajectory
pub const DEFAULT_MAX_DURATION_FRAMES: usize = 3000;

/// Trajectories longer than this are checked for stationarity
pub const DEFAULT_STATIONARY_MIN_POINTS: usize = 600;

/// Number of trailing points inspected by the stationarity check
pub const DEFAULT_STATIONARY_WINDOW: usize = 200;

/// Bounding-box span under which the trailing window counts as stationary (mm)
pub const DEFAULT_STATIONARY_MAX_SPAN: Millimeter = 10.0;

// -------------------------------------------------------------------------------------------------
// Classifier defaults
// -------------------------------------------------------------------------------------------------

/// Minimum bounding-box span of a target-stimulus trajectory (mm)
pub const DEFAULT_MIN_DISPLACEMENT: Millimeter = 500.0;

/// A target-stimulus trajectory must hold strictly more points than this
pub const DEFAULT_MIN_LENGTH: usize = 200;

/// Minimum coefficient of determination of the plane fit
pub const DEFAULT_MIN_R2: f64 = 0.5;

/// Expected `[a, b]` slope of the stimulus plane `z = a·x + b·y + c`
pub const DEFAULT_REFERENCE_DIRECTION: [f64; 2] = [0.0, 0.5];

/// Maximum distance between the fitted slope and the reference direction
pub const DEFAULT_DIRECTION_TOLERANCE: f64 = 2.0;

/// Minimum mean distance between a stimulus point and the animal's rigid bodies (mm)
pub const DEFAULT_MIN_ANCHOR_DISTANCE: Millimeter = 80.0;

/// Maximum summed per-frame spread of the points of one trajectory
pub const DEFAULT_MAX_POINT_STD: f64 = 5.5;

/// The stimulus never goes below this height (mm)
pub const DEFAULT_MIN_HEIGHT: Millimeter = 200.0;

// -------------------------------------------------------------------------------------------------
// Segment extraction defaults
// -------------------------------------------------------------------------------------------------

/// Association distance used when tracking the animal's rigid body (mm)
pub const DEFAULT_PERCH_ASSOCIATION_DISTANCE: Millimeter = 100.0;

/// Per-axis extent above which the animal is considered to be moving (mm)
pub const DEFAULT_MAX_STATIONARY_MOVEMENT: Millimeter = 30.0;

/// Trajectories shorter than this produce no segment
pub const DEFAULT_MIN_TRAJECTORY_POINTS: usize = 100;

/// Stationary ranges must span more frames than this to be kept
pub const DEFAULT_MIN_RANGE_FRAMES: i64 = 10;

/// Stationary ranges spanning more frames than this are reported as perches
pub const DEFAULT_MIN_PERCH_FRAMES: i64 = 400;

/// Frames before the end of a stationary range included in the takeoff window
pub const DEFAULT_TAKEOFF_LOOKBACK: i64 = 200;

/// Frames after the end of a stationary range included in the takeoff window
pub const DEFAULT_TAKEOFF_WINDOW: i64 = 600;

/// Minimum number of post-perch points of a takeoff window
pub const DEFAULT_MIN_TAKEOFF_POINTS: usize = 50;

/// Lookahead used to estimate the peak vertical speed (seconds)
pub const DEFAULT_LOOKAHEAD_SECONDS: f64 = 0.2;

/// Substring identifying the animal's rigid body in the capture labels
pub const DEFAULT_BODY_LABEL: &str = "Yframe";

// -------------------------------------------------------------------------------------------------
// Pipeline defaults
// -------------------------------------------------------------------------------------------------

/// Number of frames requested from a frame source per batch
pub const DEFAULT_BATCH_SIZE: usize = 2000;

/// Capacity of the bounded output queue shared by the shard workers
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Seconds between two progress reports
pub const DEFAULT_PROGRESS_INTERVAL_SECS: f64 = 5.0;

/// Upper bound of the default warm-up (one minute at 200 Hz)
pub const DEFAULT_MAX_WARMUP_FRAMES: FrameIndex = 12_000;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Index of a capture frame
pub type FrameIndex = i64;
/// Capture timestamp in milliseconds since the Unix epoch
pub type TimestampMillis = i64;
/// Distance in millimetres
pub type Millimeter = f64;
/// Identifier of a tracked trajectory
pub type TrajectoryId = u64;
/// Identifier of a takeoff candidate
pub type TakeoffId = u64;
/// 3D position in millimetres
pub type Position = Vector3<f64>;
