//! Position of the target stimulus, frame by frame.
//!
//! A [`TargetTrack`] is built from the trajectories labeled as target stimulus by the
//! classifier (in memory, or read back from the classification and target-tracking CSVs, see
//! [`crate::output::targets`]). The segment extractor queries it to relate takeoffs to the
//! stimulus.
use std::collections::hash_map::Entry;

use ahash::AHashMap;

use crate::{
    constants::{FrameIndex, Position, TrajectoryId},
    tracking::Trajectory,
};

#[derive(Debug, Clone, Default)]
pub struct TargetTrack {
    by_frame: AHashMap<FrameIndex, (TrajectoryId, Position)>,
}

impl TargetTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the target position of one frame.
    ///
    /// The first position recorded for a frame is kept; returns `false` if the frame was
    /// already known.
    pub fn insert(&mut self, frame: FrameIndex, id: TrajectoryId, position: Position) -> bool {
        match self.by_frame.entry(frame) {
            Entry::Occupied(_) => false,
            Entry::Vacant(e) => {
                e.insert((id, position));
                true
            }
        }
    }

    /// Record every point of a target trajectory.
    pub fn extend_from_trajectory(&mut self, trajectory: &Trajectory) {
        for o in trajectory.points() {
            self.insert(o.frame, trajectory.id(), o.position);
        }
    }

    pub fn from_trajectories<'a>(trajectories: impl IntoIterator<Item = &'a Trajectory>) -> Self {
        let mut track = Self::new();
        for t in trajectories {
            track.extend_from_trajectory(t);
        }
        track
    }

    pub fn get(&self, frame: FrameIndex) -> Option<&(TrajectoryId, Position)> {
        self.by_frame.get(&frame)
    }

    pub fn len(&self) -> usize {
        self.by_frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_frame.is_empty()
    }
}
