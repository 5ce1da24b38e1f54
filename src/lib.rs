//! Trajectory tracking and behavioural segmentation for motion-capture streams.
//!
//! * [`tracking`] links per-frame points into trajectories.
//! * [`classification`] recognizes the moving target stimulus among closed trajectories.
//! * [`segments`] extracts perches and takeoffs from the animal's trajectory.
//! * [`pipeline`] runs either analysis over a sharded frame stream.
pub mod classification;
pub mod constants;
pub mod frames;
pub mod geometry;
pub mod output;
pub mod perchtrack_errors;
pub mod pipeline;
pub mod regression;
pub mod segments;
pub mod time;
pub mod tracking;

pub use perchtrack_errors::PerchTrackError;
