//! # Online nearest-neighbour tracker
//!
//! [`TrajectoryTracker`] links the points of successive frames into [`Trajectory`]s, one
//! frame at a time, keeping only the currently open trajectories in memory.
//!
//! Per frame
//! -----------------
//! 1. **Sweep** – every open trajectory whose last frame is more than `timeout_frames`
//!    behind the new frame is closed ([`CloseReason::Timeout`]). The sweep runs even when the
//!    frame carries no observation.
//! 2. **Association** – each observation extends the open trajectory whose last point is
//!    nearest, provided the distance is strictly below `max_association_distance` and the
//!    trajectory was not already extended in this frame. Unmatched observations open new
//!    trajectories.
//! 3. **Limits** – a trajectory reaching `max_duration_frames` points is closed at once
//!    ([`CloseReason::DurationCap`]); a long trajectory whose trailing window stays inside a
//!    tiny box is closed as [`CloseReason::Stationary`].
//!
//! Determinism
//! -----------------
//! Open trajectories are kept in creation order. Equal distances go to the trajectory
//! created first. When several observations of one frame compete, pairs are assigned
//! greedily by ascending distance, ties broken by observation order then creation order.
//! Closed trajectories are returned in creation order within one call.
//!
//! Handover
//! -----------------
//! The open set is all the tracker remembers, so [`TrajectoryTracker::snapshot`] taken
//! before frame `f` and [`TrajectoryTracker::resume`] reproduce, from `f` on, exactly what
//! the original tracker would have done. Only identifiers differ.
use smallvec::SmallVec;
use tracing::trace;

use crate::{
    constants::{FrameIndex, TrajectoryId},
    frames::{FrameRecord, Observation},
    geometry::BoundingBox,
    tracking::{
        params::TrackerParams,
        trajectory::{CloseReason, ClosedTrajectory, Trajectory},
    },
};

/// Open trajectories of a tracker, captured between two frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerState {
    open: Vec<Trajectory>,
}

impl TrackerState {
    /// Open trajectories, in creation order.
    pub fn open_trajectories(&self) -> &[Trajectory] {
        &self.open
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// True when both states hold the same point sequences in the same creation order.
    /// Identifiers are ignored: two trackers started at different frames number their
    /// trajectories differently.
    pub fn same_tracks(&self, other: &TrackerState) -> bool {
        self.open.len() == other.open.len()
            && self
                .open
                .iter()
                .zip(&other.open)
                .all(|(a, b)| a.points() == b.points())
    }
}

#[derive(Debug, Clone)]
pub struct TrajectoryTracker {
    params: TrackerParams,
    open: Vec<Trajectory>,
    next_id: TrajectoryId,
    current_frame: Option<FrameIndex>,
}

impl TrajectoryTracker {
    /// Create an empty tracker. Identifiers start at 1.
    pub fn new(params: TrackerParams) -> Self {
        TrajectoryTracker {
            params,
            open: Vec::new(),
            next_id: 1,
            current_frame: None,
        }
    }

    /// Continue from a state captured by another tracker.
    ///
    /// The handed-over trajectories are renumbered `1..=n` in creation order; new ones
    /// follow from `n + 1`.
    pub fn resume(params: TrackerParams, state: TrackerState) -> Self {
        let open: Vec<Trajectory> = state
            .open
            .into_iter()
            .zip(1..)
            .map(|(t, id)| t.with_id(id))
            .collect();
        TrajectoryTracker {
            params,
            next_id: open.len() as TrajectoryId + 1,
            current_frame: open.iter().map(Trajectory::last_frame).max(),
            open,
        }
    }

    /// Copy of the open trajectories.
    pub fn snapshot(&self) -> TrackerState {
        TrackerState {
            open: self.open.clone(),
        }
    }

    pub fn params(&self) -> &TrackerParams {
        &self.params
    }

    /// Number of trajectories currently open.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Open trajectories, in creation order.
    pub fn open_trajectories(&self) -> &[Trajectory] {
        &self.open
    }

    /// Identifier the next trajectory will receive.
    pub fn next_id(&self) -> TrajectoryId {
        self.next_id
    }

    /// Last frame seen by [`sweep`](Self::sweep), if any.
    pub fn current_frame(&self) -> Option<FrameIndex> {
        self.current_frame
    }

    /// Close every trajectory not extended for more than `timeout_frames` before `frame`.
    ///
    /// The expiring trajectories are selected first, then removed in one pass, so the open
    /// set keeps its creation order.
    pub fn sweep(&mut self, frame: FrameIndex) -> Vec<ClosedTrajectory> {
        self.current_frame = Some(frame);
        let timeout = self.params.timeout_frames;

        let expired = |t: &Trajectory| frame - t.last_frame() > timeout;
        if !self.open.iter().any(expired) {
            return Vec::new();
        }

        let (closed, open): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.open).into_iter().partition(expired);
        self.open = open;

        trace!(frame, closed = closed.len(), "timeout sweep");
        closed
            .into_iter()
            .map(|trajectory| ClosedTrajectory {
                trajectory,
                reason: CloseReason::Timeout,
            })
            .collect()
    }

    /// Associate a single observation.
    ///
    /// The caller is responsible for calling [`sweep`](Self::sweep) when a new frame
    /// starts; [`process_observations`](Self::process_observations) does both.
    ///
    /// Return
    /// ----------
    /// * The trajectory closed by this append (duration cap or stationarity), if any.
    pub fn observe(&mut self, obs: Observation) -> Option<ClosedTrajectory> {
        let idx = match self.nearest_eligible(&obs) {
            Some(idx) => {
                self.open[idx].push(obs);
                idx
            }
            None => self.open_new(obs),
        };
        self.close_if_exhausted(idx)
    }

    /// Sweep, then associate all observations of one frame.
    ///
    /// Arguments
    /// -----------------
    /// * `frame`: the frame index shared by every observation.
    /// * `observations`: the frame's points, in source order.
    ///
    /// Return
    /// ----------
    /// * Every trajectory closed while processing the frame: timeouts first, then forced
    ///   closes, each group in creation order.
    pub fn process_observations(
        &mut self,
        frame: FrameIndex,
        observations: impl IntoIterator<Item = Observation>,
    ) -> Vec<ClosedTrajectory> {
        let mut closed = self.sweep(frame);
        let observations: SmallVec<[Observation; 8]> = observations.into_iter().collect();

        if observations.len() == 1 {
            if let Some(c) = observations.into_iter().next().and_then(|o| self.observe(o)) {
                closed.push(c);
            }
            return closed;
        }
        if observations.is_empty() {
            return closed;
        }

        let assignment = self.assign(&observations);

        let mut touched: SmallVec<[usize; 8]> = SmallVec::new();
        let mut unmatched: SmallVec<[Observation; 8]> = SmallVec::new();
        for (obs, target) in observations.into_iter().zip(assignment) {
            match target {
                Some(idx) => {
                    self.open[idx].push(obs);
                    touched.push(idx);
                }
                None => unmatched.push(obs),
            }
        }
        for obs in unmatched {
            let idx = self.open_new(obs);
            touched.push(idx);
        }

        // Remove from the back so earlier indices stay valid, then restore creation order
        touched.sort_unstable();
        let mut forced: Vec<ClosedTrajectory> = touched
            .iter()
            .rev()
            .filter_map(|&idx| self.close_if_exhausted(idx))
            .collect();
        forced.reverse();
        closed.extend(forced);
        closed
    }

    /// Process every unidentified point of a frame.
    pub fn process_frame(&mut self, frame: &FrameRecord) -> Vec<ClosedTrajectory> {
        self.process_observations(frame.frame_index(), frame.unidentified_observations())
    }

    /// Close every open trajectory ([`CloseReason::EndOfStream`]), in creation order.
    pub fn flush(&mut self) -> Vec<ClosedTrajectory> {
        std::mem::take(&mut self.open)
            .into_iter()
            .map(|trajectory| ClosedTrajectory {
                trajectory,
                reason: CloseReason::EndOfStream,
            })
            .collect()
    }

    fn is_eligible(&self, t: &Trajectory, frame: FrameIndex) -> bool {
        t.last_frame() < frame && frame - t.last_frame() <= self.params.timeout_frames
    }

    /// Index of the nearest eligible trajectory strictly inside the association bound.
    fn nearest_eligible(&self, obs: &Observation) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, t) in self.open.iter().enumerate() {
            if !self.is_eligible(t, obs.frame) {
                continue;
            }
            let d = (t.last_position() - obs.position).norm();
            match best {
                Some((_, bd)) if d >= bd => {}
                _ => best = Some((idx, d)),
            }
        }
        best.filter(|(_, d)| *d < self.params.max_association_distance)
            .map(|(idx, _)| idx)
    }

    /// Greedy one-to-one matching of a frame's observations to open trajectories.
    fn assign(&self, observations: &[Observation]) -> SmallVec<[Option<usize>; 8]> {
        let max_dist = self.params.max_association_distance;
        let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
        for (oi, obs) in observations.iter().enumerate() {
            for (ti, t) in self.open.iter().enumerate() {
                if !self.is_eligible(t, obs.frame) {
                    continue;
                }
                let d = (t.last_position() - obs.position).norm();
                if d < max_dist {
                    pairs.push((d, oi, ti));
                }
            }
        }
        pairs.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        let mut assignment: SmallVec<[Option<usize>; 8]> =
            SmallVec::from_elem(None, observations.len());
        let mut taken = vec![false; self.open.len()];
        for (_, oi, ti) in pairs {
            if assignment[oi].is_none() && !taken[ti] {
                assignment[oi] = Some(ti);
                taken[ti] = true;
            }
        }
        assignment
    }

    fn open_new(&mut self, obs: Observation) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.open.push(Trajectory::start(id, obs));
        self.open.len() - 1
    }

    fn close_if_exhausted(&mut self, idx: usize) -> Option<ClosedTrajectory> {
        let reason = self.exhausted(&self.open[idx])?;
        let trajectory = self.open.remove(idx);
        trace!(id = trajectory.id(), %reason, len = trajectory.len(), "forced close");
        Some(ClosedTrajectory { trajectory, reason })
    }

    fn exhausted(&self, t: &Trajectory) -> Option<CloseReason> {
        let p = &self.params;
        if t.len() >= p.max_duration_frames {
            return Some(CloseReason::DurationCap);
        }
        if t.len() > p.stationary_min_points {
            let window = BoundingBox::from_points(
                t.tail(p.stationary_window).iter().map(|o| &o.position),
            );
            if window.span() < p.stationary_max_span {
                return Some(CloseReason::Stationary);
            }
        }
        None
    }
}

#[cfg(test)]
mod tracker_test {
    use super::*;
    use crate::constants::Position;

    fn obs(frame: FrameIndex, x: f64, y: f64) -> Observation {
        Observation::bare(frame, frame * 5, Position::new(x, y, 300.0))
    }

    fn tracker() -> TrajectoryTracker {
        TrajectoryTracker::new(TrackerParams::default())
    }

    #[test]
    fn test_association_and_new_trajectory() {
        let mut t = tracker();
        assert!(t.process_observations(0, [obs(0, 0.0, 0.0)]).is_empty());
        assert!(t.process_observations(1, [obs(1, 10.0, 0.0)]).is_empty());
        assert_eq!(t.open_count(), 1);

        // exactly at the bound: not associated
        assert!(t.process_observations(2, [obs(2, 85.0, 0.0)]).is_empty());
        assert_eq!(t.open_count(), 2);
        assert_eq!(t.open_trajectories()[0].len(), 2);
        assert_eq!(t.open_trajectories()[1].id(), 2);
        assert_eq!(t.next_id(), 3);
    }

    #[test]
    fn test_timeout_boundary() {
        let mut t = tracker();
        t.process_observations(0, [obs(0, 0.0, 0.0)]);

        // 100 frames later the trajectory is still open and can be extended
        assert!(t.process_observations(100, []).is_empty());
        assert_eq!(t.open_count(), 1);

        let closed = t.process_observations(101, []);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].reason, CloseReason::Timeout);
        assert_eq!(t.open_count(), 0);
    }

    #[test]
    fn test_tie_goes_to_oldest_trajectory() {
        let mut t = tracker();
        t.process_observations(0, [obs(0, -20.0, 0.0), obs(0, 20.0, 0.0)]);
        assert_eq!(t.open_count(), 2);

        t.process_observations(1, [obs(1, 0.0, 0.0)]);
        let open = t.open_trajectories();
        assert_eq!(open[0].len(), 2);
        assert_eq!(open[1].len(), 1);
    }

    #[test]
    fn test_one_point_per_frame_per_trajectory() {
        let mut t = tracker();
        t.process_observations(0, [obs(0, 0.0, 0.0)]);

        // both within bound; the closer one wins, the other starts a trajectory
        t.process_observations(1, [obs(1, 30.0, 0.0), obs(1, 5.0, 0.0)]);
        let open = t.open_trajectories();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].last_position(), Position::new(5.0, 0.0, 300.0));
        assert_eq!(open[1].last_position(), Position::new(30.0, 0.0, 300.0));
    }

    #[test]
    fn test_duration_cap() {
        let params = TrackerParams::builder()
            .max_duration_frames(10)
            .build()
            .unwrap();
        let mut t = TrajectoryTracker::new(params);

        let mut closed = Vec::new();
        for f in 0..15 {
            closed.extend(t.process_observations(f, [obs(f, f as f64, 0.0)]));
        }
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].reason, CloseReason::DurationCap);
        assert_eq!(closed[0].trajectory.len(), 10);
        assert_eq!(t.open_count(), 1);
        assert_eq!(t.open_trajectories()[0].first_frame(), 10);
    }

    #[test]
    fn test_stationary_split() {
        let params = TrackerParams::builder()
            .stationary_min_points(20)
            .stationary_window(10)
            .build()
            .unwrap();
        let mut t = TrajectoryTracker::new(params);

        let mut closed = Vec::new();
        for f in 0..40 {
            closed.extend(t.process_observations(f, [obs(f, 0.1 * (f % 2) as f64, 0.0)]));
        }
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].reason, CloseReason::Stationary);
        assert_eq!(closed[0].trajectory.len(), 21);
    }

    #[test]
    fn test_resume_continues_like_the_original() {
        let params = TrackerParams::builder()
            .max_duration_frames(50)
            .build()
            .unwrap();
        let feed = |t: &mut TrajectoryTracker, frames: std::ops::Range<FrameIndex>| {
            let mut closed = Vec::new();
            for f in frames {
                let x = f as f64;
                closed.extend(t.process_observations(f, [obs(f, x, 0.0), obs(f, x, 900.0)]));
            }
            closed
        };

        let mut single = TrajectoryTracker::new(params.clone());
        feed(&mut single, 0..30);
        let state = single.snapshot();
        let expected = feed(&mut single, 30..80);

        let mut resumed = TrajectoryTracker::resume(params, state.clone());
        assert_eq!(resumed.open_count(), 2);
        assert_eq!(resumed.next_id(), 3);
        let got = feed(&mut resumed, 30..80);

        assert_eq!(got.len(), expected.len());
        for (a, b) in got.iter().zip(&expected) {
            assert_eq!(a.reason, b.reason);
            assert_eq!(a.trajectory.points(), b.trajectory.points());
        }
        assert!(resumed.snapshot().same_tracks(&single.snapshot()));
        assert!(!state.same_tracks(&single.snapshot()));
    }

    #[test]
    fn test_same_tracks_ignores_ids() {
        let mut a = tracker();
        a.process_observations(0, [obs(0, 0.0, 0.0)]);
        a.process_observations(1, [obs(1, 500.0, 0.0)]);
        a.process_observations(2, [obs(2, 0.0, 500.0)]);

        // same points, different numbering
        let mut b = TrajectoryTracker::resume(TrackerParams::default(), TrackerState::default());
        b.process_observations(0, [obs(0, 300.0, 300.0), obs(0, 900.0, 900.0)]);
        let _ = b.flush();
        b.process_observations(1, [obs(1, 500.0, 0.0)]);
        b.process_observations(2, [obs(2, 0.0, 500.0)]);

        let (sa, sb) = (a.snapshot(), b.snapshot());
        assert_ne!(sa.open_trajectories()[1].id(), sb.open_trajectories()[0].id());
        assert!(!sa.same_tracks(&sb));
        assert_eq!(sa.len(), 3);

        let trimmed = TrackerState {
            open: sa.open[1..].to_vec(),
        };
        assert!(trimmed.same_tracks(&sb));
        assert!(TrackerState::default().is_empty());
    }

    #[test]
    fn test_flush_in_creation_order() {
        let mut t = tracker();
        t.process_observations(0, [obs(0, 0.0, 0.0), obs(0, 500.0, 0.0), obs(0, 1000.0, 0.0)]);
        let flushed = t.flush();
        let ids: Vec<_> = flushed.iter().map(|c| c.trajectory.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(flushed.iter().all(|c| c.reason == CloseReason::EndOfStream));
        assert_eq!(t.open_count(), 0);
    }
}
