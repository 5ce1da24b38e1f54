//! # Analyses run on closed trajectories
//!
//! A [`TrajectoryAnalysis`] tells a shard worker which observations to track and what to do
//! with every trajectory the tracker closes. Two analyses exist:
//!
//! * [`StimulusAnalysis`] – tracks the unidentified points, classifies every closed
//!   trajectory and emits classification and target-tracking rows.
//! * [`PerchAnalysis`] – tracks the centroid of the animal's rigid body and emits perch,
//!   takeoff and perch-tracking rows.
//!
//! The analysis object is shared by all workers (`Sync`); mutable per-shard state lives in
//! [`TrajectoryAnalysis::State`].
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use crate::{
    classification::TrajectoryClassifier,
    frames::{FrameRecord, Observation},
    output::records::{
        ClassificationRow, OutputRecord, PerchRow, PerchTrackingRow, RecordKind, TakeoffRow,
        TargetTrackingRow,
    },
    pipeline::{
        config::{PerchConfig, StimulusConfig},
        shard::ShardContext,
    },
    segments::{SegmentExtractor, TargetTrack},
    tracking::{CloseReason, ClosedTrajectory, TrackerParams},
};

pub trait TrajectoryAnalysis: Sync {
    /// Per-shard mutable state, created inside the worker.
    type State;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Streams produced by this analysis.
    fn record_kinds(&self) -> &'static [RecordKind];

    fn tracker_params(&self) -> &TrackerParams;

    /// Observations of one frame fed to the tracker.
    fn observations(&self, frame: &FrameRecord) -> SmallVec<[Observation; 8]>;

    fn shard_state(&self, shard: &ShardContext) -> Self::State;

    /// Turn one closed trajectory (already carrying its global id) into output rows.
    fn analyze(&self, state: &mut Self::State, closed: ClosedTrajectory) -> Vec<OutputRecord>;
}

/// Target-stimulus extraction.
#[derive(Debug, Clone, Default)]
pub struct StimulusAnalysis {
    tracker: TrackerParams,
    classifier: TrajectoryClassifier,
}

impl StimulusAnalysis {
    pub fn new(config: &StimulusConfig) -> Self {
        StimulusAnalysis {
            tracker: config.tracker.clone(),
            classifier: TrajectoryClassifier::new(config.classifier.clone()),
        }
    }
}

impl TrajectoryAnalysis for StimulusAnalysis {
    type State = ();

    fn name(&self) -> &'static str {
        "stimulus"
    }

    fn record_kinds(&self) -> &'static [RecordKind] {
        &[RecordKind::Classification, RecordKind::TargetTracking]
    }

    fn tracker_params(&self) -> &TrackerParams {
        &self.tracker
    }

    fn observations(&self, frame: &FrameRecord) -> SmallVec<[Observation; 8]> {
        frame.unidentified_observations()
    }

    fn shard_state(&self, _shard: &ShardContext) -> Self::State {}

    fn analyze(&self, _state: &mut (), closed: ClosedTrajectory) -> Vec<OutputRecord> {
        let trajectory = closed.trajectory;
        if closed.reason == CloseReason::DurationCap {
            // long-lived markers are static objects, never the stimulus
            debug!(id = trajectory.id(), len = trajectory.len(), "discarding capped trajectory");
            return Vec::new();
        }

        let verdict = self.classifier.classify(&trajectory);
        if !verdict.should_persist() {
            return Vec::new();
        }
        debug!(%verdict, "classified");

        let mut records = Vec::with_capacity(trajectory.len() + 1);
        records.push(OutputRecord::Classification(ClassificationRow::from(&verdict)));
        records.extend(trajectory.points().iter().map(|o| {
            OutputRecord::TargetTracking(TargetTrackingRow::new(trajectory.id(), o))
        }));
        records
    }
}

/// Perch and takeoff extraction from the animal's rigid body.
#[derive(Debug, Clone, Default)]
pub struct PerchAnalysis {
    config: PerchConfig,
    target: Option<Arc<TargetTrack>>,
}

impl PerchAnalysis {
    pub fn new(config: &PerchConfig) -> Self {
        PerchAnalysis {
            config: config.clone(),
            target: None,
        }
    }

    /// Relate takeoffs to a known target stimulus track.
    pub fn with_target(mut self, target: TargetTrack) -> Self {
        self.target = Some(Arc::new(target));
        self
    }
}

impl TrajectoryAnalysis for PerchAnalysis {
    type State = SegmentExtractor;

    fn name(&self) -> &'static str {
        "perches"
    }

    fn record_kinds(&self) -> &'static [RecordKind] {
        &[
            RecordKind::Perch,
            RecordKind::Takeoff,
            RecordKind::PerchTracking,
        ]
    }

    fn tracker_params(&self) -> &TrackerParams {
        &self.config.tracker
    }

    fn observations(&self, frame: &FrameRecord) -> SmallVec<[Observation; 8]> {
        frame.body_observations(&self.config.segments.body_label)
    }

    fn shard_state(&self, shard: &ShardContext) -> Self::State {
        SegmentExtractor::with_first_takeoff_id(
            self.config.segments.clone(),
            shard.first_takeoff_id(),
        )
    }

    fn analyze(
        &self,
        extractor: &mut SegmentExtractor,
        closed: ClosedTrajectory,
    ) -> Vec<OutputRecord> {
        let set = extractor.extract(&closed.trajectory, self.target.as_deref());
        if !set.is_empty() {
            debug!(
                id = closed.trajectory.id(),
                perches = set.perches.len(),
                takeoffs = set.takeoffs.len(),
                "segmented"
            );
        }

        let perches = set.perches.iter().map(|p| OutputRecord::Perch(PerchRow::from(p)));
        let takeoffs = set
            .takeoffs
            .iter()
            .map(|t| OutputRecord::Takeoff(TakeoffRow::from(t)));
        let tracking = set
            .assignments
            .iter()
            .map(|a| OutputRecord::PerchTracking(PerchTrackingRow::from(a)));
        perches.chain(takeoffs).chain(tracking).collect()
    }
}

#[cfg(test)]
mod analysis_test {
    use super::*;
    use crate::{constants::Position, tracking::Trajectory};

    fn closed(reason: CloseReason, n: i64) -> ClosedTrajectory {
        let obs = (0..n)
            .map(|f| Observation::bare(f, 0, Position::new(0.0, 5.0 * f as f64, 400.0)))
            .collect();
        ClosedTrajectory {
            trajectory: Trajectory::from_observations(1_000_007, obs).unwrap(),
            reason,
        }
    }

    #[test]
    fn test_stimulus_rows() {
        let analysis = StimulusAnalysis::default();
        let records = analysis.analyze(&mut (), closed(CloseReason::Timeout, 250));
        assert_eq!(records.len(), 251);
        match &records[0] {
            OutputRecord::Classification(row) => {
                assert_eq!(row.trajectory_id, 1_000_007);
                assert!(row.label);
            }
            other => panic!("unexpected record {other:?}"),
        }
        assert!(records[1..]
            .iter()
            .all(|r| r.kind() == RecordKind::TargetTracking));
    }

    #[test]
    fn test_capped_and_short_trajectories_are_dropped() {
        let analysis = StimulusAnalysis::default();
        assert!(analysis
            .analyze(&mut (), closed(CloseReason::DurationCap, 250))
            .is_empty());
        assert!(analysis
            .analyze(&mut (), closed(CloseReason::Timeout, 50))
            .is_empty());
    }

    #[test]
    fn test_perch_state_uses_shard_takeoff_ids() {
        let analysis = PerchAnalysis::default();
        let shard = ShardContext {
            id: 3,
            frame_range_start: 0,
            frame_range_end: 10,
        };
        let extractor = analysis.shard_state(&shard);
        assert_eq!(extractor.next_takeoff_id(), 3_000_001);
    }
}
