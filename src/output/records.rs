//! Output rows.
//!
//! One serde struct per record stream; field order is the CSV column order and the
//! `serde(rename)` attributes give the column names the downstream reports read.
use serde::{Deserialize, Serialize};

use crate::{
    classification::Verdict,
    constants::{FrameIndex, TakeoffId, TimestampMillis, TrajectoryId},
    frames::Observation,
    segments::{PerchSegment, TakeoffCandidate, TrackingAssignment},
    time::timestamp_to_utc_string,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRow {
    pub trajectory_id: TrajectoryId,
    pub frame_start: FrameIndex,
    pub frame_end: FrameIndex,
    pub label: bool,
    pub direction_score: f64,
    pub r2: f64,
    pub mean_anchor_distance: f64,
    #[serde(rename = "anchorDistanceStdDev")]
    pub anchor_distance_std: f64,
    #[serde(rename = "distOK")]
    pub dist_ok: bool,
    #[serde(rename = "lenOK")]
    pub len_ok: bool,
    #[serde(rename = "dirOK")]
    pub dir_ok: bool,
    pub pt_std: f64,
    pub std_x: f64,
    pub std_y: f64,
    pub std_z: f64,
}

impl From<&Verdict> for ClassificationRow {
    fn from(v: &Verdict) -> Self {
        ClassificationRow {
            trajectory_id: v.trajectory_id,
            frame_start: v.frame_start,
            frame_end: v.frame_end,
            label: v.is_target,
            direction_score: v.direction_score,
            r2: v.r2,
            mean_anchor_distance: v.mean_anchor_distance,
            anchor_distance_std: v.anchor_distance_std,
            dist_ok: v.dist_ok,
            len_ok: v.len_ok,
            dir_ok: v.dir_ok,
            pt_std: v.pt_std,
            std_x: v.std_x,
            std_y: v.std_y,
            std_z: v.std_z,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetTrackingRow {
    pub trajectory_id: TrajectoryId,
    pub frame: FrameIndex,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl TargetTrackingRow {
    pub fn new(trajectory_id: TrajectoryId, obs: &Observation) -> Self {
        TargetTrackingRow {
            trajectory_id,
            frame: obs.frame,
            x: obs.position.x,
            y: obs.position.y,
            z: obs.position.z,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerchRow {
    pub frame_start: FrameIndex,
    pub frame_end: FrameIndex,
    pub frame_count: usize,
    pub trajectory_id: TrajectoryId,
    pub mean_x: f64,
    pub mean_y: f64,
    pub mean_z: f64,
    pub min_x: f64,
    pub min_y: f64,
    pub min_z: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub max_z: f64,
    pub timestamp_start: TimestampMillis,
    pub timestamp_end: TimestampMillis,
    pub time_start: String,
    pub time_end: String,
}

impl From<&PerchSegment> for PerchRow {
    fn from(p: &PerchSegment) -> Self {
        PerchRow {
            frame_start: p.frame_start,
            frame_end: p.frame_end,
            frame_count: p.frame_count,
            trajectory_id: p.trajectory_id,
            mean_x: p.mean.x,
            mean_y: p.mean.y,
            mean_z: p.mean.z,
            min_x: p.min.x,
            min_y: p.min.y,
            min_z: p.min.z,
            max_x: p.max.x,
            max_y: p.max.y,
            max_z: p.max.z,
            timestamp_start: p.timestamp_start,
            timestamp_end: p.timestamp_end,
            time_start: timestamp_to_utc_string(p.timestamp_start),
            time_end: timestamp_to_utc_string(p.timestamp_end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TakeoffRow {
    pub takeoff_id: TakeoffId,
    pub frame: FrameIndex,
    pub perch_frames: FrameIndex,
    pub trajectory_id: TrajectoryId,
    pub timestamp: TimestampMillis,
    pub time: String,
    pub bbox_size: f64,
    pub upward_velocity_max: f64,
    pub frame_peak: FrameIndex,
    pub target_trajectory: Option<TrajectoryId>,
    pub p1: f64,
    pub p2: f64,
    pub p3: f64,
    pub r2: f64,
}

impl From<&TakeoffCandidate> for TakeoffRow {
    fn from(t: &TakeoffCandidate) -> Self {
        TakeoffRow {
            takeoff_id: t.takeoff_id,
            frame: t.frame,
            perch_frames: t.perch_frames,
            trajectory_id: t.trajectory_id,
            timestamp: t.timestamp,
            time: timestamp_to_utc_string(t.timestamp),
            bbox_size: t.bbox_size,
            upward_velocity_max: t.max_upward_speed,
            frame_peak: t.frame_peak,
            target_trajectory: t.target_trajectory,
            p1: t.params[0],
            p2: t.params[1],
            p3: t.params[2],
            r2: t.r2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerchTrackingRow {
    pub frame: FrameIndex,
    pub rel_frame: Option<FrameIndex>,
    pub trajectory_id: TrajectoryId,
    pub timestamp: TimestampMillis,
    pub time: String,
    pub takeoff_id: Option<TakeoffId>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub x1: Option<f64>,
    pub y1: Option<f64>,
    pub z1: Option<f64>,
    pub x2: Option<f64>,
    pub y2: Option<f64>,
    pub z2: Option<f64>,
    pub x3: Option<f64>,
    pub y3: Option<f64>,
    pub z3: Option<f64>,
}

impl From<&TrackingAssignment> for PerchTrackingRow {
    fn from(a: &TrackingAssignment) -> Self {
        let [v1, v2, v3] = a.vertices;
        PerchTrackingRow {
            frame: a.frame,
            rel_frame: a.rel_frame,
            trajectory_id: a.trajectory_id,
            timestamp: a.timestamp,
            time: timestamp_to_utc_string(a.timestamp),
            takeoff_id: a.takeoff_id,
            x: a.position.x,
            y: a.position.y,
            z: a.position.z,
            x1: v1.map(|v| v.x),
            y1: v1.map(|v| v.y),
            z1: v1.map(|v| v.z),
            x2: v2.map(|v| v.x),
            y2: v2.map(|v| v.y),
            z2: v2.map(|v| v.z),
            x3: v3.map(|v| v.x),
            y3: v3.map(|v| v.y),
            z3: v3.map(|v| v.z),
        }
    }
}

/// The five record streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Classification,
    TargetTracking,
    Perch,
    Takeoff,
    PerchTracking,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Classification,
        RecordKind::TargetTracking,
        RecordKind::Perch,
        RecordKind::Takeoff,
        RecordKind::PerchTracking,
    ];

    /// File name suffix of the stream.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            RecordKind::Classification => "classification",
            RecordKind::TargetTracking => "target_tracking",
            RecordKind::Perch => "perches",
            RecordKind::Takeoff => "takeoffs",
            RecordKind::PerchTracking => "perch_tracking",
        }
    }

    /// CSV header, in the field order of the matching row struct.
    pub fn header(&self) -> &'static [&'static str] {
        match self {
            RecordKind::Classification => &[
                "trajectoryId",
                "frameStart",
                "frameEnd",
                "label",
                "directionScore",
                "r2",
                "meanAnchorDistance",
                "anchorDistanceStdDev",
                "distOK",
                "lenOK",
                "dirOK",
                "ptStd",
                "stdX",
                "stdY",
                "stdZ",
            ],
            RecordKind::TargetTracking => &["trajectoryId", "frame", "x", "y", "z"],
            RecordKind::Perch => &[
                "frameStart",
                "frameEnd",
                "frameCount",
                "trajectoryId",
                "meanX",
                "meanY",
                "meanZ",
                "minX",
                "minY",
                "minZ",
                "maxX",
                "maxY",
                "maxZ",
                "timestampStart",
                "timestampEnd",
                "timeStart",
                "timeEnd",
            ],
            RecordKind::Takeoff => &[
                "takeoffId",
                "frame",
                "perchFrames",
                "trajectoryId",
                "timestamp",
                "time",
                "bboxSize",
                "upwardVelocityMax",
                "framePeak",
                "targetTrajectory",
                "p1",
                "p2",
                "p3",
                "r2",
            ],
            RecordKind::PerchTracking => &[
                "frame",
                "relFrame",
                "trajectoryId",
                "timestamp",
                "time",
                "takeoffId",
                "x",
                "y",
                "z",
                "x1",
                "y1",
                "z1",
                "x2",
                "y2",
                "z2",
                "x3",
                "y3",
                "z3",
            ],
        }
    }
}

/// One row of any stream, as produced by the analysis stage.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputRecord {
    Classification(ClassificationRow),
    TargetTracking(TargetTrackingRow),
    Perch(PerchRow),
    Takeoff(TakeoffRow),
    PerchTracking(PerchTrackingRow),
}

impl OutputRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            OutputRecord::Classification(_) => RecordKind::Classification,
            OutputRecord::TargetTracking(_) => RecordKind::TargetTracking,
            OutputRecord::Perch(_) => RecordKind::Perch,
            OutputRecord::Takeoff(_) => RecordKind::Takeoff,
            OutputRecord::PerchTracking(_) => RecordKind::PerchTracking,
        }
    }

    /// Frame the row is ordered by.
    pub fn frame(&self) -> FrameIndex {
        match self {
            OutputRecord::Classification(r) => r.frame_start,
            OutputRecord::TargetTracking(r) => r.frame,
            OutputRecord::Perch(r) => r.frame_start,
            OutputRecord::Takeoff(r) => r.frame,
            OutputRecord::PerchTracking(r) => r.frame,
        }
    }

    /// Order within one stream: frame, then trajectory, then takeoff id.
    pub fn sort_key(&self) -> (FrameIndex, TrajectoryId, TakeoffId) {
        match self {
            OutputRecord::Classification(r) => (r.frame_start, r.trajectory_id, 0),
            OutputRecord::TargetTracking(r) => (r.frame, r.trajectory_id, 0),
            OutputRecord::Perch(r) => (r.frame_start, r.trajectory_id, 0),
            OutputRecord::Takeoff(r) => (r.frame, r.trajectory_id, r.takeoff_id),
            OutputRecord::PerchTracking(r) => (r.frame, r.trajectory_id, 0),
        }
    }

    /// Order in which the collector writes rows: frame first, so rows can be released as
    /// soon as every shard is past their frame.
    pub fn merge_key(&self) -> (FrameIndex, RecordKind, TrajectoryId, TakeoffId) {
        let (frame, trajectory, takeoff) = self.sort_key();
        (frame, self.kind(), trajectory, takeoff)
    }
}
