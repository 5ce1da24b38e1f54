//! Shard planning.
//!
//! The frame range `[first, last]` is cut into contiguous, non-overlapping, covering ranges,
//! one per worker. Each shard owns the trajectories that *start* inside its range and
//! publishes them under globally unique ids (`shard_id * TRAJECTORY_ID_BIAS + local_id`).
use std::fmt;

use crate::{
    constants::{FrameIndex, TakeoffId, TrajectoryId, TAKEOFF_ID_BIAS, TRAJECTORY_ID_BIAS},
    PerchTrackError,
};

/// The frame range assigned to one worker. Handed to the worker by value at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShardContext {
    pub id: usize,
    /// First frame of the range (inclusive).
    pub frame_range_start: FrameIndex,
    /// Last frame of the range (inclusive).
    pub frame_range_end: FrameIndex,
}

impl ShardContext {
    #[inline]
    pub fn contains(&self, frame: FrameIndex) -> bool {
        (self.frame_range_start..=self.frame_range_end).contains(&frame)
    }

    /// Number of frame indices in the range.
    pub fn frame_count(&self) -> u64 {
        (self.frame_range_end - self.frame_range_start + 1) as u64
    }

    /// Globally unique id of a shard-local trajectory id.
    pub fn global_trajectory_id(&self, local: TrajectoryId) -> TrajectoryId {
        self.id as u64 * TRAJECTORY_ID_BIAS + local
    }

    /// First takeoff id issued by this shard.
    pub fn first_takeoff_id(&self) -> TakeoffId {
        self.id as u64 * TAKEOFF_ID_BIAS + 1
    }
}

impl fmt::Display for ShardContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shard {} [{}..={}]",
            self.id, self.frame_range_start, self.frame_range_end
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardPlan {
    shards: Vec<ShardContext>,
}

impl ShardPlan {
    /// Partition `[first, last]` into at most `workers` contiguous ranges.
    ///
    /// Ranges differ in length by at most one frame; the longer ones come first. When the
    /// range holds fewer frames than `workers`, fewer shards are planned.
    ///
    /// Return
    /// ----------
    /// * An error if `workers == 0` or `first > last`.
    pub fn partition(
        first: FrameIndex,
        last: FrameIndex,
        workers: usize,
    ) -> Result<Self, PerchTrackError> {
        if workers == 0 {
            return Err(PerchTrackError::InvalidPipelineParameter(
                "workers must be >= 1".into(),
            ));
        }
        if first > last {
            return Err(PerchTrackError::InvalidPipelineParameter(format!(
                "empty frame range [{first}, {last}]"
            )));
        }

        let total = (last - first) as u64 + 1;
        let n = (workers as u64).min(total);
        let base = total / n;
        let rem = total % n;

        let mut shards = Vec::with_capacity(n as usize);
        let mut start = first;
        for id in 0..n {
            let len = base + u64::from(id < rem);
            let end = start + len as FrameIndex - 1;
            shards.push(ShardContext {
                id: id as usize,
                frame_range_start: start,
                frame_range_end: end,
            });
            start = end + 1;
        }
        Ok(ShardPlan { shards })
    }

    pub fn shards(&self) -> &[ShardContext] {
        &self.shards
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Total number of frame indices covered.
    pub fn frame_count(&self) -> u64 {
        self.shards.iter().map(|s| s.frame_count()).sum()
    }
}

#[cfg(test)]
mod shard_test {
    use super::*;

    #[test]
    fn test_partition_covers_range() {
        let plan = ShardPlan::partition(100, 1099, 3).unwrap();
        let ranges: Vec<_> = plan
            .shards()
            .iter()
            .map(|s| (s.frame_range_start, s.frame_range_end))
            .collect();
        assert_eq!(ranges, vec![(100, 433), (434, 766), (767, 1099)]);
        assert_eq!(plan.frame_count(), 1000);
    }

    #[test]
    fn test_fewer_frames_than_workers() {
        let plan = ShardPlan::partition(5, 6, 8).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.shards()[1].frame_range_start, 6);
        assert_eq!(plan.shards()[1].frame_range_end, 6);
    }

    #[test]
    fn test_invalid_partition() {
        assert!(ShardPlan::partition(0, 10, 0).is_err());
        assert!(ShardPlan::partition(10, 0, 2).is_err());
    }

    #[test]
    fn test_ids() {
        let shard = ShardContext {
            id: 2,
            frame_range_start: 0,
            frame_range_end: 9,
        };
        assert_eq!(shard.global_trajectory_id(5), 2_000_005);
        assert_eq!(shard.first_takeoff_id(), 2_000_001);
        assert!(shard.contains(9));
        assert!(!shard.contains(10));
        assert_eq!(shard.to_string(), "shard 2 [0..=9]");
    }
}
