//! # Perch and takeoff segments
//!
//! * [`params`] – [`SegmentParams`] and its builder.
//! * [`target`] – [`TargetTrack`], the stimulus position per frame.
//! * [`extractor`] – [`SegmentExtractor`] producing a [`SegmentSet`] per trajectory.
pub mod extractor;
pub mod params;
pub mod target;

pub use extractor::{
    PerchSegment, SegmentExtractor, SegmentSet, TakeoffCandidate, TrackingAssignment,
};
pub use params::{SegmentParams, SegmentParamsBuilder};
pub use target::TargetTrack;
