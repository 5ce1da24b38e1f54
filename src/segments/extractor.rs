//! # Perch and takeoff extraction
//!
//! [`SegmentExtractor`] post-processes one continuous trajectory of the animal's rigid body
//! into:
//!
//! * **stationary ranges** – maximal runs of consecutive points whose running bounding box
//!   stays within `max_stationary_movement` on every axis;
//! * **perches** – stationary ranges lasting more than `min_perch_frames`;
//! * **takeoffs** – the motion following the end of each stationary range, summarized over the
//!   window `[end − takeoff_lookback, end + takeoff_window)`;
//! * **tracking assignments** – every point tagged with the closest preceding takeoff.
//!
//! Takeoff statistics
//! -----------------
//! * `max_upward_speed` – largest climb `z[i + Δ] − z[i]` over the window, `Δ` being the
//!   lookahead in points (40 at 200 Hz).
//! * `frame_peak` – frame of the highest point of the window.
//! * `bbox_size` – diagonal of the window's bounding box.
//! * Target regression – when a [`TargetTrack`] is supplied, the distance `d` to the target is
//!   regressed as `d ≈ p1 + p2·f + p3·f²`, `f` counting frames from the start of the window.
//!   Without any matched frame (or with a degenerate system) `p = [0, 0, 0]` and `r2 = -1`.
use ahash::AHashMap;

use crate::{
    constants::{FrameIndex, Position, TakeoffId, TimestampMillis, TrajectoryId},
    frames::Observation,
    geometry::BoundingBox,
    regression::fit_quadratic,
    segments::{params::SegmentParams, target::TargetTrack},
    tracking::Trajectory,
};

/// A stationary interval long enough to be a perch.
#[derive(Debug, Clone, PartialEq)]
pub struct PerchSegment {
    pub trajectory_id: TrajectoryId,
    pub frame_start: FrameIndex,
    pub frame_end: FrameIndex,
    /// Number of points in the interval.
    pub frame_count: usize,
    pub mean: Position,
    pub min: Position,
    pub max: Position,
    pub timestamp_start: TimestampMillis,
    pub timestamp_end: TimestampMillis,
}

/// Motion summary following the end of a stationary range.
#[derive(Debug, Clone, PartialEq)]
pub struct TakeoffCandidate {
    pub takeoff_id: TakeoffId,
    /// Last frame of the stationary range.
    pub frame: FrameIndex,
    /// Frame span of the stationary range.
    pub perch_frames: FrameIndex,
    pub trajectory_id: TrajectoryId,
    /// Timestamp of the first point of the takeoff window.
    pub timestamp: TimestampMillis,
    pub bbox_size: f64,
    pub max_upward_speed: f64,
    pub frame_peak: FrameIndex,
    /// Modal target trajectory over the window.
    pub target_trajectory: Option<TrajectoryId>,
    pub params: [f64; 3],
    pub r2: f64,
}

/// One trajectory point tagged with its closest preceding takeoff.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingAssignment {
    pub frame: FrameIndex,
    /// Frames elapsed since the takeoff, `None` before the first takeoff.
    pub rel_frame: Option<FrameIndex>,
    pub trajectory_id: TrajectoryId,
    pub timestamp: TimestampMillis,
    pub takeoff_id: Option<TakeoffId>,
    pub position: Position,
    /// First three valid body markers of the frame, in marker order.
    pub vertices: [Option<Position>; 3],
}

/// Everything extracted from one trajectory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentSet {
    pub perches: Vec<PerchSegment>,
    pub takeoffs: Vec<TakeoffCandidate>,
    pub assignments: Vec<TrackingAssignment>,
}

impl SegmentSet {
    pub fn is_empty(&self) -> bool {
        self.perches.is_empty() && self.takeoffs.is_empty() && self.assignments.is_empty()
    }
}

/// Inclusive range of point indices.
#[derive(Debug, Clone, Copy, PartialEq)]
struct StationaryRange {
    start: usize,
    end: usize,
    bbox: BoundingBox,
}

#[derive(Debug, Clone)]
pub struct SegmentExtractor {
    params: SegmentParams,
    next_takeoff_id: TakeoffId,
}

impl SegmentExtractor {
    /// Create an extractor; takeoff identifiers start at 1.
    pub fn new(params: SegmentParams) -> Self {
        Self::with_first_takeoff_id(params, 1)
    }

    /// Create an extractor issuing takeoff identifiers from `first_id`.
    pub fn with_first_takeoff_id(params: SegmentParams, first_id: TakeoffId) -> Self {
        SegmentExtractor {
            params,
            next_takeoff_id: first_id,
        }
    }

    pub fn params(&self) -> &SegmentParams {
        &self.params
    }

    pub fn next_takeoff_id(&self) -> TakeoffId {
        self.next_takeoff_id
    }

    /// Extract perches, takeoffs and tracking assignments from one trajectory.
    ///
    /// Arguments
    /// -----------------
    /// * `trajectory`: a closed trajectory of the animal's rigid body.
    /// * `target`: the target stimulus track, if known.
    ///
    /// Return
    /// ----------
    /// * The extracted [`SegmentSet`]; empty for trajectories shorter than
    ///   `min_trajectory_points`.
    pub fn extract(&mut self, trajectory: &Trajectory, target: Option<&TargetTrack>) -> SegmentSet {
        if trajectory.len() < self.params.min_trajectory_points {
            return SegmentSet::default();
        }
        let points = trajectory.points();
        let ranges = self.stationary_ranges(points);

        let perches = ranges
            .iter()
            .filter(|r| span(points, r) > self.params.min_perch_frames)
            .map(|r| perch(trajectory.id(), points, r))
            .collect();

        let mut takeoffs = Vec::new();
        for r in &ranges {
            if let Some(mut takeoff) = self.takeoff(trajectory.id(), points, r, target) {
                takeoff.takeoff_id = self.next_takeoff_id;
                self.next_takeoff_id += 1;
                takeoffs.push(takeoff);
            }
        }

        let assignments = assign_takeoffs(trajectory.id(), points, &takeoffs);

        SegmentSet {
            perches,
            takeoffs,
            assignments,
        }
    }

    /// Split the points into stationary ranges.
    ///
    /// The running box is extended point by point; when a point pushes one axis extent above
    /// `max_stationary_movement`, the current range ends at the previous point and a new box
    /// starts at that point. Completed ranges are kept when they span more than
    /// `min_range_frames`; the trailing range is always kept.
    fn stationary_ranges(&self, points: &[Observation]) -> Vec<StationaryRange> {
        let mut ranges = Vec::new();
        let mut current = StationaryRange {
            start: 0,
            end: 0,
            bbox: BoundingBox::empty(),
        };

        for (i, o) in points.iter().enumerate() {
            let mut grown = current.bbox;
            grown.extend(&o.position);
            if grown.any_extent_exceeds(self.params.max_stationary_movement) {
                if span(points, &current) > self.params.min_range_frames {
                    ranges.push(current);
                }
                current = StationaryRange {
                    start: i,
                    end: i,
                    bbox: BoundingBox::from_points([&o.position]),
                };
            } else {
                current.end = i;
                current.bbox = grown;
            }
        }
        if !points.is_empty() {
            ranges.push(current);
        }
        ranges
    }

    fn takeoff(
        &self,
        trajectory_id: TrajectoryId,
        points: &[Observation],
        range: &StationaryRange,
        target: Option<&TargetTrack>,
    ) -> Option<TakeoffCandidate> {
        let p = &self.params;
        let frame = points[range.end].frame;
        let lo = points.partition_point(|o| o.frame < frame - p.takeoff_lookback);
        let hi = points.partition_point(|o| o.frame < frame + p.takeoff_window);
        let window = &points[lo..hi];

        if (window.len() as i64) - p.takeoff_lookback < p.min_takeoff_points as i64 {
            return None;
        }

        let delta = p.lookahead_points();
        let max_upward_speed = if window.len() > delta {
            window
                .iter()
                .zip(&window[delta..])
                .map(|(a, b)| b.position.z - a.position.z)
                .fold(f64::NEG_INFINITY, f64::max)
        } else {
            f64::NAN
        };

        let peak = window
            .iter()
            .reduce(|best, o| if o.position.z > best.position.z { o } else { best })?;

        let bbox_size = BoundingBox::from_points(window.iter().map(|o| &o.position)).span();

        let (target_trajectory, params, r2) = match target {
            Some(track) => target_regression(window, track),
            None => (None, [0.0; 3], -1.0),
        };

        Some(TakeoffCandidate {
            takeoff_id: 0,
            frame,
            perch_frames: span(points, range),
            trajectory_id,
            timestamp: window[0].timestamp,
            bbox_size,
            max_upward_speed,
            frame_peak: peak.frame,
            target_trajectory,
            params,
            r2,
        })
    }
}

/// Frame span of a range.
fn span(points: &[Observation], range: &StationaryRange) -> FrameIndex {
    points[range.end].frame - points[range.start].frame
}

fn perch(trajectory_id: TrajectoryId, points: &[Observation], range: &StationaryRange) -> PerchSegment {
    let slice = &points[range.start..=range.end];
    let mean = slice.iter().map(|o| o.position).sum::<Position>() / slice.len() as f64;
    PerchSegment {
        trajectory_id,
        frame_start: slice[0].frame,
        frame_end: slice[slice.len() - 1].frame,
        frame_count: slice.len(),
        mean,
        min: range.bbox.min,
        max: range.bbox.max,
        timestamp_start: slice[0].timestamp,
        timestamp_end: slice[slice.len() - 1].timestamp,
    }
}

/// Regress the distance to the target against time over a takeoff window.
fn target_regression(
    window: &[Observation],
    track: &TargetTrack,
) -> (Option<TrajectoryId>, [f64; 3], f64) {
    let first_frame = window[0].frame;
    let mut f = Vec::new();
    let mut d = Vec::new();
    let mut counts: AHashMap<TrajectoryId, usize> = AHashMap::new();

    for o in window {
        if let Some((id, target)) = track.get(o.frame) {
            f.push((o.frame - first_frame) as f64);
            d.push((target - o.position).norm());
            *counts.entry(*id).or_default() += 1;
        }
    }

    // most frequent id, smallest id on ties
    let modal = counts
        .into_iter()
        .max_by(|(ia, ca), (ib, cb)| ca.cmp(cb).then(ib.cmp(ia)))
        .map(|(id, _)| id);

    match fit_quadratic(&f, &d) {
        Some(fit) => (modal, [fit.params[0], fit.params[1], fit.params[2]], fit.r2),
        None => (modal, [0.0; 3], -1.0),
    }
}

/// Tag each point with the takeoff of maximum frame not after it.
///
/// `takeoffs` are sorted by frame, as produced by the range scan.
fn assign_takeoffs(
    trajectory_id: TrajectoryId,
    points: &[Observation],
    takeoffs: &[TakeoffCandidate],
) -> Vec<TrackingAssignment> {
    points
        .iter()
        .map(|o| {
            let idx = takeoffs.partition_point(|t| t.frame <= o.frame);
            let preceding = idx.checked_sub(1).map(|i| &takeoffs[i]);
            TrackingAssignment {
                frame: o.frame,
                rel_frame: preceding.map(|t| o.frame - t.frame),
                trajectory_id,
                timestamp: o.timestamp,
                takeoff_id: preceding.map(|t| t.takeoff_id),
                position: o.position,
                vertices: std::array::from_fn(|i| o.anchors.get(i).copied()),
            }
        })
        .collect()
}

#[cfg(test)]
mod extractor_test {
    use approx::assert_relative_eq;

    use super::*;

    fn obs(frame: FrameIndex, p: Position) -> Observation {
        Observation::bare(frame, 1_000 + frame * 5, p)
    }

    /// 500 frames perched at the origin, then a 300-frame climb of 4 mm per frame.
    fn perch_then_climb() -> Trajectory {
        let perched = (0..500).map(|f| obs(f, Position::new((f % 3) as f64, 0.0, 100.0)));
        let climb = (500..800).map(|f| {
            let t = (f - 499) as f64;
            obs(f, Position::new(0.0, 0.0, 100.0 + 4.0 * t))
        });
        Trajectory::from_observations(9, perched.chain(climb).collect()).unwrap()
    }

    #[test]
    fn test_short_trajectory_yields_nothing() {
        let t = Trajectory::from_observations(
            1,
            (0..99).map(|f| obs(f, Position::zeros())).collect(),
        )
        .unwrap();
        let mut ex = SegmentExtractor::new(SegmentParams::default());
        assert!(ex.extract(&t, None).is_empty());
    }

    #[test]
    fn test_perch_and_takeoff() {
        let t = perch_then_climb();
        let mut ex = SegmentExtractor::new(SegmentParams::default());
        let set = ex.extract(&t, None);

        // the climb leaves the box at frame 507 (z = 132 > 100 + 30); the short climbing
        // ranges are dropped and the trailing one has no room for a takeoff window
        assert_eq!(set.perches.len(), 1);
        let perch = &set.perches[0];
        assert_eq!(perch.frame_start, 0);
        assert_eq!(perch.frame_end, 506);
        assert_eq!(perch.frame_count, 507);
        assert_eq!(perch.timestamp_start, 1_000);
        assert_relative_eq!(perch.min.z, 100.0);
        assert_relative_eq!(perch.max.z, 128.0);

        assert_eq!(set.takeoffs.len(), 1);
        let takeoff = &set.takeoffs[0];
        assert_eq!(takeoff.takeoff_id, 1);
        assert_eq!(takeoff.frame, 506);
        assert_eq!(takeoff.perch_frames, 506);
        assert_eq!(takeoff.trajectory_id, 9);
        assert_eq!(takeoff.timestamp, 1_000 + 306 * 5);
        assert_eq!(takeoff.frame_peak, 799);
        assert_relative_eq!(takeoff.max_upward_speed, 160.0);
        assert_eq!(takeoff.target_trajectory, None);
        assert_eq!(takeoff.r2, -1.0);
        assert_eq!(takeoff.params, [0.0; 3]);
        assert_eq!(ex.next_takeoff_id(), 2);
    }

    #[test]
    fn test_closest_preceding_takeoff() {
        let t = perch_then_climb();
        let mut ex = SegmentExtractor::new(SegmentParams::default());
        let set = ex.extract(&t, None);

        assert_eq!(set.assignments.len(), t.len());
        let before = &set.assignments[100];
        assert_eq!(before.takeoff_id, None);
        assert_eq!(before.rel_frame, None);

        let at = &set.assignments[506];
        assert_eq!(at.takeoff_id, Some(1));
        assert_eq!(at.rel_frame, Some(0));

        let after = &set.assignments[600];
        assert_eq!(after.takeoff_id, Some(1));
        assert_eq!(after.rel_frame, Some(94));
        assert_eq!(after.trajectory_id, 9);
        assert_eq!(after.vertices, [None; 3]);
    }

    #[test]
    fn test_assignments_carry_body_markers() {
        let markers: Vec<Position> = (0..4)
            .map(|i| Position::new(i as f64, 10.0, 100.0))
            .collect();
        let points: Vec<_> = perch_then_climb()
            .points()
            .iter()
            .map(|o| {
                let anchors = if o.frame == 42 { &markers[..2] } else { &markers[..] };
                Observation::new(o.frame, o.timestamp, o.position, anchors.into())
            })
            .collect();
        let t = Trajectory::from_observations(9, points).unwrap();

        let set = SegmentExtractor::new(SegmentParams::default()).extract(&t, None);
        assert_eq!(
            set.assignments[0].vertices,
            [Some(markers[0]), Some(markers[1]), Some(markers[2])]
        );
        assert_eq!(
            set.assignments[42].vertices,
            [Some(markers[0]), Some(markers[1]), None]
        );
    }

    #[test]
    fn test_target_regression() {
        let t = perch_then_climb();
        let mut track = TargetTrack::new();
        for f in 300..800 {
            let id = if f < 320 { 7 } else { 5 };
            track.insert(f, id, Position::new(0.0, 0.0, 2000.0));
        }

        let mut ex = SegmentExtractor::new(SegmentParams::default());
        let set = ex.extract(&t, Some(&track));
        let takeoff = &set.takeoffs[0];
        assert_eq!(takeoff.target_trajectory, Some(5));
        // flat then linearly closing distance, well described by a parabola
        assert!(takeoff.r2 > 0.95);
        assert!(takeoff.params[0] > 1800.0);
        assert!(takeoff.params[2] < 0.0);
    }

    #[test]
    fn test_takeoff_ids_continue_across_trajectories() {
        let mut ex = SegmentExtractor::with_first_takeoff_id(SegmentParams::default(), 3_000_001);
        let first = ex.extract(&perch_then_climb(), None);
        let second = ex.extract(&perch_then_climb(), None);
        assert_eq!(first.takeoffs[0].takeoff_id, 3_000_001);
        assert_eq!(second.takeoffs[0].takeoff_id, 3_000_002);
    }
}
