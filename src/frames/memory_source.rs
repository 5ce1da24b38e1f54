//! In-memory [`FrameSource`].
//!
//! [`MemoryFrameSource`] holds its frames behind an `Arc`, so one decoded capture can feed
//! every shard worker: each worker clones the source (cheap, the frames are shared) and keeps
//! its own cursor.
use std::sync::Arc;

use crate::{
    constants::FrameIndex,
    frames::{FrameRecord, FrameSource},
    PerchTrackError,
};

#[derive(Debug, Clone)]
pub struct MemoryFrameSource {
    frames: Arc<[FrameRecord]>,
    cursor: usize,
}

impl MemoryFrameSource {
    /// Build a source from frames in any order; they are sorted by frame index and duplicated
    /// frame indices keep only their first occurrence.
    pub fn new(mut frames: Vec<FrameRecord>) -> Self {
        frames.sort_by_key(|f| f.frame_index());
        frames.dedup_by_key(|f| f.frame_index());
        MemoryFrameSource {
            frames: frames.into(),
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }
}

impl FrameSource for MemoryFrameSource {
    fn next_batch(&mut self, max_count: usize) -> Result<Vec<FrameRecord>, PerchTrackError> {
        let end = (self.cursor + max_count).min(self.frames.len());
        let batch = self.frames[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(batch)
    }

    fn seek_to_frame(&mut self, frame_index: FrameIndex) -> Result<(), PerchTrackError> {
        self.cursor = self
            .frames
            .partition_point(|f| f.frame_index() < frame_index);
        Ok(())
    }

    fn frame_range(&mut self) -> Result<Option<(FrameIndex, FrameIndex)>, PerchTrackError> {
        Ok(self
            .frames
            .first()
            .zip(self.frames.last())
            .map(|(first, last)| (first.frame_index(), last.frame_index())))
    }
}
