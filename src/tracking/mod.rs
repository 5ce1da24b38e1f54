//! # Tracking: frame-to-frame trajectory linking
//!
//! This module turns a stream of per-frame points into trajectories.
//!
//! Modules
//! -----------------
//! * [`params`] – [`TrackerParams`] and its validating builder.
//! * [`trajectory`] – [`Trajectory`], [`ClosedTrajectory`] and [`CloseReason`].
//! * [`tracker`] – [`TrajectoryTracker`], the online nearest-neighbour linker, and the
//!   [`TrackerState`] it hands over between shards.
//!
//! Example
//! -----------------
//! ```rust
//! use perchtrack::constants::Position;
//! use perchtrack::frames::Observation;
//! use perchtrack::tracking::{TrackerParams, TrajectoryTracker};
//!
//! let mut tracker = TrajectoryTracker::new(TrackerParams::default());
//! for frame in 0..10 {
//!     let p = Position::new(frame as f64 * 5.0, 0.0, 300.0);
//!     let closed = tracker.process_observations(frame, [Observation::bare(frame, 0, p)]);
//!     assert!(closed.is_empty());
//! }
//! let closed = tracker.flush();
//! assert_eq!(closed.len(), 1);
//! assert_eq!(closed[0].trajectory.len(), 10);
//! ```
pub mod params;
pub mod tracker;
pub mod trajectory;

pub use params::{TrackerParams, TrackerParamsBuilder};
pub use tracker::{TrackerState, TrajectoryTracker};
pub use trajectory::{CloseReason, ClosedTrajectory, Trajectory};
