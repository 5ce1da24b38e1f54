//! # Frames: capture records and frame sources
//!
//! The engine consumes one ordered stream of [`FrameRecord`]s. Each record holds the points
//! the capture system reconstructed at one sampling instant (200 Hz):
//!
//! * **identified bodies** – labeled rigid bodies (e.g. the animal's `Yframe`), each a small
//!   set of markers;
//! * **unidentified points** – loose markers the capture system could not attribute.
//!
//! Records are validated **once**, here: non-finite coordinates and the capture system's NaN
//! sentinel ([`CAPTURE_NAN_SENTINEL`]) are dropped, and a body with no valid marker left is
//! dropped too. Downstream stages never see a non-finite coordinate.
//!
//! Modules
//! -----------------
//! * [`memory_source`] – [`MemoryFrameSource`], a shareable, seekable in-memory stream.
//! * [`csv_reader`] – long-form CSV ingestion (`frame,timestamp,body,x,y,z`).
//!
//! Frame sources
//! -----------------
//! The [`FrameSource`] trait is the only interface the pipeline needs from the outside
//! world: batched reads, seeking (for shard partitioning and resuming) and the frame range
//! (for shard planning).
use std::sync::Arc;

use smallvec::SmallVec;

use crate::{
    constants::{FrameIndex, Position, TimestampMillis, CAPTURE_NAN_SENTINEL},
    PerchTrackError,
};

pub mod csv_reader;
pub mod memory_source;

pub use memory_source::MemoryFrameSource;

/// Return true if a coordinate triple is usable (finite, not the capture sentinel).
#[inline]
pub fn is_valid_point(p: &Position) -> bool {
    p.iter().all(|c| c.is_finite() && *c != CAPTURE_NAN_SENTINEL)
}

/// A labeled rigid body reconstructed by the capture system.
///
/// Only [`IdentifiedBody::new`] builds one, so a body always holds at least one valid
/// marker and its centroid is finite.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifiedBody {
    label: String,
    points: Vec<Position>,
}

impl IdentifiedBody {
    /// Build a body, keeping only valid markers. Returns `None` if no marker is valid.
    pub fn new(
        label: impl Into<String>,
        points: impl IntoIterator<Item = Position>,
    ) -> Option<Self> {
        let points: Vec<Position> = points.into_iter().filter(is_valid_point).collect();
        if points.is_empty() {
            return None;
        }
        Some(IdentifiedBody {
            label: label.into(),
            points,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Valid markers, in capture order.
    pub fn points(&self) -> &[Position] {
        &self.points
    }

    /// Mean position of the body's markers.
    pub fn centroid(&self) -> Position {
        self.points.iter().sum::<Position>() / self.points.len() as f64
    }
}

/// One capture frame.
///
/// Built through [`FrameRecord::new`], which enforces the validity invariant on every point.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    frame_index: FrameIndex,
    timestamp_millis: TimestampMillis,
    identified_bodies: Vec<IdentifiedBody>,
    unidentified_points: Vec<Position>,
}

impl FrameRecord {
    pub fn new(
        frame_index: FrameIndex,
        timestamp_millis: TimestampMillis,
        identified_bodies: Vec<IdentifiedBody>,
        unidentified_points: impl IntoIterator<Item = Position>,
    ) -> Self {
        FrameRecord {
            frame_index,
            timestamp_millis,
            identified_bodies,
            unidentified_points: unidentified_points
                .into_iter()
                .filter(is_valid_point)
                .collect(),
        }
    }

    #[inline]
    pub fn frame_index(&self) -> FrameIndex {
        self.frame_index
    }

    #[inline]
    pub fn timestamp_millis(&self) -> TimestampMillis {
        self.timestamp_millis
    }

    pub fn identified_bodies(&self) -> &[IdentifiedBody] {
        &self.identified_bodies
    }

    pub fn unidentified_points(&self) -> &[Position] {
        &self.unidentified_points
    }

    /// Centroids of every identified body of the frame.
    ///
    /// These are the reference anchors used to tell the stimulus apart from markers that
    /// move with the animal.
    pub fn anchor_positions(&self) -> Arc<[Position]> {
        self.identified_bodies.iter().map(|b| b.centroid()).collect()
    }

    /// Bodies whose label contains `pattern`.
    pub fn bodies_matching<'a>(
        &'a self,
        pattern: &'a str,
    ) -> impl Iterator<Item = &'a IdentifiedBody> + 'a {
        self.identified_bodies
            .iter()
            .filter(move |b| b.label.contains(pattern))
    }

    /// One observation per unidentified point, sharing the frame's anchors.
    pub fn unidentified_observations(&self) -> SmallVec<[Observation; 8]> {
        let anchors = self.anchor_positions();
        self.unidentified_points
            .iter()
            .map(|p| {
                Observation::new(self.frame_index, self.timestamp_millis, *p, anchors.clone())
            })
            .collect()
    }

    /// One observation per body matching `pattern`, located at the body centroid and
    /// carrying the body's own markers as auxiliary context.
    pub fn body_observations(&self, pattern: &str) -> SmallVec<[Observation; 8]> {
        self.bodies_matching(pattern)
            .map(|b| {
                Observation::new(
                    self.frame_index,
                    self.timestamp_millis,
                    b.centroid(),
                    b.points.iter().copied().collect(),
                )
            })
            .collect()
    }
}

/// One point fed to the tracker, with the context of the frame it was seen in.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub frame: FrameIndex,
    pub timestamp: TimestampMillis,
    pub position: Position,
    /// Reference positions seen in the same frame (rigid-body centroids or markers).
    pub anchors: Arc<[Position]>,
}

impl Observation {
    pub fn new(
        frame: FrameIndex,
        timestamp: TimestampMillis,
        position: Position,
        anchors: Arc<[Position]>,
    ) -> Self {
        Observation {
            frame,
            timestamp,
            position,
            anchors,
        }
    }

    /// An observation without auxiliary context.
    pub fn bare(frame: FrameIndex, timestamp: TimestampMillis, position: Position) -> Self {
        Self::new(frame, timestamp, position, Vec::<Position>::new().into())
    }
}

/// An ordered, resumable stream of [`FrameRecord`]s.
///
/// Implementations must return frames in strictly increasing frame order. A frame source
/// is owned by a single shard worker; it does not need to be shareable, only sendable.
pub trait FrameSource: Send {
    /// Read up to `max_count` frames. An empty batch signals the end of the stream.
    fn next_batch(&mut self, max_count: usize) -> Result<Vec<FrameRecord>, PerchTrackError>;

    /// Position the stream on the first frame whose index is `>= frame_index`.
    fn seek_to_frame(&mut self, frame_index: FrameIndex) -> Result<(), PerchTrackError>;

    /// First and last frame index of the whole stream, `None` if it is empty.
    fn frame_range(&mut self) -> Result<Option<(FrameIndex, FrameIndex)>, PerchTrackError>;
}
