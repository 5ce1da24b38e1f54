//! Trajectories built by the tracker.
//!
//! A [`Trajectory`] is an ordered, non-empty sequence of [`Observation`]s with a stable
//! identifier. The tracker never appends two observations of the same frame to one
//! trajectory, so the frames of a tracker-built trajectory are strictly increasing.
//! Trajectories assembled by hand through [`Trajectory::from_observations`] only need
//! non-decreasing frames, which lets callers merge several reconstructions of one object.
use std::fmt;

use crate::{
    constants::{FrameIndex, Position, TimestampMillis, TrajectoryId},
    frames::Observation,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    id: TrajectoryId,
    points: Vec<Observation>,
}

impl Trajectory {
    /// Open a trajectory on its first observation.
    pub(crate) fn start(id: TrajectoryId, first: Observation) -> Self {
        Trajectory {
            id,
            points: vec![first],
        }
    }

    pub(crate) fn push(&mut self, obs: Observation) {
        debug_assert!(obs.frame > self.last_frame());
        self.points.push(obs);
    }

    /// Build a trajectory from observations sorted by non-decreasing frame.
    ///
    /// Return
    /// ----------
    /// * `None` if `points` is empty or not sorted by frame.
    pub fn from_observations(id: TrajectoryId, points: Vec<Observation>) -> Option<Self> {
        if points.is_empty() || points.windows(2).any(|w| w[1].frame < w[0].frame) {
            return None;
        }
        Some(Trajectory { id, points })
    }

    #[inline]
    pub fn id(&self) -> TrajectoryId {
        self.id
    }

    /// Replace the identifier, e.g. to move a shard-local id into the global id space.
    pub fn with_id(mut self, id: TrajectoryId) -> Self {
        self.id = id;
        self
    }

    pub fn points(&self) -> &[Observation] {
        &self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false: a trajectory holds at least one observation.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    fn first(&self) -> &Observation {
        &self.points[0]
    }

    #[inline]
    fn last(&self) -> &Observation {
        &self.points[self.points.len() - 1]
    }

    pub fn first_frame(&self) -> FrameIndex {
        self.first().frame
    }

    pub fn last_frame(&self) -> FrameIndex {
        self.last().frame
    }

    pub fn first_timestamp(&self) -> TimestampMillis {
        self.first().timestamp
    }

    pub fn last_timestamp(&self) -> TimestampMillis {
        self.last().timestamp
    }

    pub fn last_position(&self) -> Position {
        self.last().position
    }

    pub fn positions(&self) -> impl ExactSizeIterator<Item = &Position> + '_ {
        self.points.iter().map(|o| &o.position)
    }

    /// Positions of the trailing `n` observations (all of them if the trajectory is shorter).
    pub fn tail(&self, n: usize) -> &[Observation] {
        &self.points[self.points.len().saturating_sub(n)..]
    }
}

impl fmt::Display for Trajectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trajectory #{} ({} points, frames {}..={})",
            self.id,
            self.len(),
            self.first_frame(),
            self.last_frame()
        )
    }
}

/// Why a trajectory left the open set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Not extended for more than `timeout_frames`.
    Timeout,
    /// Reached `max_duration_frames` points.
    DurationCap,
    /// Its trailing window stayed inside a tiny bounding box.
    Stationary,
    /// Still open when the stream ended.
    EndOfStream,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::Timeout => "timeout",
            CloseReason::DurationCap => "duration cap",
            CloseReason::Stationary => "stationary",
            CloseReason::EndOfStream => "end of stream",
        };
        f.write_str(s)
    }
}

/// A trajectory handed over by the tracker, with the reason it was closed.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrajectory {
    pub trajectory: Trajectory,
    pub reason: CloseReason,
}
