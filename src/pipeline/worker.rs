//! # Shard worker
//!
//! One worker runs one tracker and one analysis over its shard's frames:
//!
//! 1. read batches, track, and analyze every closed trajectory the shard **owns** (first
//!    frame inside the range), under its global id; the others are dropped, their owner
//!    reports them;
//! 2. past the range end, keep reading only while an owned trajectory is still open, up to
//!    the optional read-ahead limit;
//! 3. flush the tracker.
//!
//! Seams
//! -----------------
//! What the tracker does inside a range depends on the trajectories still open when the
//! range starts. The first shard starts from the beginning of the stream and is exact. Every
//! other shard starts **speculatively** `warmup` frames early with an empty tracker, keeps
//! the open set it holds on reaching its range (the entry state) and holds its rows back.
//! The previous shard, once exact, sends the open set it holds at the same seam (its exit
//! state) through a [`Handover`]:
//!
//! * same point sequences: the held rows are released ([`SeamCheck::Matched`]);
//! * different: they are discarded and the range is replayed from the handed-over state
//!   ([`SeamCheck::Replayed`]);
//! * the previous shard ended without handing over (it failed): the held rows are released
//!   as they are ([`SeamCheck::Unverified`]).
//!
//! An exact shard streams its rows over the shared bounded channel as trajectories close,
//! each progress message carrying a watermark: no later row of the shard has a smaller
//! frame. A frame-source error stops the shard with [`PerchTrackError::ShardFailed`],
//! carrying the first frame whose output was not produced.
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, Receiver, Sender, TryRecvError};
use tracing::{debug, info, info_span, warn};

use crate::{
    constants::FrameIndex,
    frames::FrameSource,
    output::records::OutputRecord,
    pipeline::{analysis::TrajectoryAnalysis, config::ShardingParams, shard::ShardContext},
    tracking::{ClosedTrajectory, TrackerState, TrajectoryTracker},
    PerchTrackError,
};

/// Message sent by a worker to the collector.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Final rows of trajectories the shard owns.
    Records {
        shard: usize,
        records: Vec<OutputRecord>,
    },
    Progress {
        shard: usize,
        /// Frames of the shard's own range processed since the previous message.
        frames: u64,
        open_trajectories: usize,
        /// No row sent later by this shard has a smaller frame.
        watermark: FrameIndex,
    },
    /// The shard's worker returned; nothing else follows from it.
    Finished { shard: usize },
}

/// How the tracker state at a shard's first frame was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeamCheck {
    /// Nothing precedes the shard.
    Origin,
    /// The warm-up reproduced the previous shard's exit state.
    Matched,
    /// The range was replayed from the previous shard's exit state.
    Replayed,
    /// The previous shard ended without handing over its state.
    Unverified,
}

/// Tracker-state link between two neighbouring shards.
#[derive(Debug, Default)]
pub struct Handover {
    /// Exit state of the previous shard.
    pub previous: Option<Receiver<TrackerState>>,
    /// Where this shard's exit state goes.
    pub next: Option<Sender<TrackerState>>,
}

impl Handover {
    /// Links for `shards` consecutive shards: shard `k` hands over to shard `k + 1`.
    pub fn chain(shards: usize) -> Vec<Handover> {
        let mut links: Vec<Handover> = (0..shards).map(|_| Handover::default()).collect();
        for k in 1..shards {
            let (tx, rx) = bounded(1);
            links[k - 1].next = Some(tx);
            links[k].previous = Some(rx);
        }
        links
    }
}

/// Summary of a completed shard.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardReport {
    pub shard: ShardContext,
    pub seam: SeamCheck,
    /// Every frame fed to the tracker, warm-up, replay and read-ahead included.
    pub frames_read: u64,
    pub frames_in_range: u64,
    pub trajectories_closed: u64,
    pub trajectories_owned: u64,
    pub records_emitted: u64,
    pub elapsed: Duration,
}

enum SeamOutcome {
    Exact(SeamCheck),
    Diverged(TrackerState),
}

fn compare(exit: TrackerState, entry: Option<&TrackerState>) -> SeamOutcome {
    match entry {
        Some(entry) if entry.same_tracks(&exit) => SeamOutcome::Exact(SeamCheck::Matched),
        _ => SeamOutcome::Diverged(exit),
    }
}

enum PassEnd {
    Completed,
    Diverged(TrackerState),
}

enum Exit {
    Pending,
    Held(TrackerState),
    Sent,
}

/// One pass over the shard's frames, from a given tracker state.
struct ShardPass<'a, A: TrajectoryAnalysis> {
    shard: ShardContext,
    analysis: &'a A,
    state: A::State,
    tracker: TrajectoryTracker,
    tx: &'a Sender<WorkerMessage>,
    /// Set while the pass is speculative.
    seam_in: Option<&'a Receiver<TrackerState>>,
    seam_out: Option<&'a Sender<TrackerState>>,
    seam: SeamCheck,
    held: Vec<OutputRecord>,
    entry: Option<TrackerState>,
    exit: Exit,
    last_processed: Option<FrameIndex>,
    complete: bool,
    /// In-range frames already counted by the progress of earlier passes.
    reported: u64,
    frames_read: u64,
    frames_in_range: u64,
    trajectories_closed: u64,
    trajectories_owned: u64,
    records_emitted: u64,
}

impl<'a, A: TrajectoryAnalysis> ShardPass<'a, A> {
    /// `seam` is `None` for a speculative pass.
    fn new(
        shard: ShardContext,
        analysis: &'a A,
        tracker: TrajectoryTracker,
        tx: &'a Sender<WorkerMessage>,
        handover: &'a Handover,
        seam: Option<SeamCheck>,
    ) -> Self {
        ShardPass {
            shard,
            analysis,
            state: analysis.shard_state(&shard),
            tracker,
            tx,
            seam_in: seam.is_none().then_some(handover.previous.as_ref()).flatten(),
            seam_out: handover.next.as_ref(),
            seam: seam.unwrap_or(SeamCheck::Unverified),
            held: Vec::new(),
            entry: None,
            exit: Exit::Pending,
            last_processed: None,
            complete: false,
            reported: 0,
            frames_read: 0,
            frames_in_range: 0,
            trajectories_closed: 0,
            trajectories_owned: 0,
            records_emitted: 0,
        }
    }

    fn is_exact(&self) -> bool {
        self.seam_in.is_none()
    }

    fn owns(&self, first_frame: FrameIndex) -> bool {
        self.shard.contains(first_frame)
    }

    fn owned_open_start(&self) -> Option<FrameIndex> {
        self.tracker
            .open_trajectories()
            .iter()
            .map(|t| t.first_frame())
            .filter(|&f| self.owns(f))
            .min()
    }

    fn analyze(&mut self, closed: Vec<ClosedTrajectory>, out: &mut Vec<OutputRecord>) {
        for c in closed {
            self.trajectories_closed += 1;
            if !self.owns(c.trajectory.first_frame()) {
                continue;
            }
            self.trajectories_owned += 1;

            let id = self.shard.global_trajectory_id(c.trajectory.id());
            let closed = ClosedTrajectory {
                trajectory: c.trajectory.with_id(id),
                reason: c.reason,
            };
            out.extend(self.analysis.analyze(&mut self.state, closed));
        }
    }

    fn send(&self, message: WorkerMessage) -> Result<(), PerchTrackError> {
        self.tx
            .send(message)
            .map_err(|_| PerchTrackError::OutputQueueClosed(self.shard.id))
    }

    /// Send rows, or hold them back while the pass is speculative.
    fn emit(&mut self, records: Vec<OutputRecord>) -> Result<(), PerchTrackError> {
        if !self.is_exact() {
            self.held.extend(records);
            return Ok(());
        }
        if records.is_empty() {
            return Ok(());
        }
        self.records_emitted += records.len() as u64;
        self.send(WorkerMessage::Records {
            shard: self.shard.id,
            records,
        })
    }

    fn progress(&mut self) -> Result<(), PerchTrackError> {
        let frames = self.frames_in_range.saturating_sub(self.reported);
        self.reported += frames;
        self.send(WorkerMessage::Progress {
            shard: self.shard.id,
            frames,
            open_trajectories: self.tracker.open_count(),
            watermark: self.watermark(),
        })
    }

    /// Smallest frame a row sent later by this pass can carry.
    fn watermark(&self) -> FrameIndex {
        if !self.is_exact() {
            return self.shard.frame_range_start;
        }
        if self.complete {
            return FrameIndex::MAX;
        }
        let next = self
            .last_processed
            .map_or(self.shard.frame_range_start, |f| f + 1);
        let fresh = (next <= self.shard.frame_range_end).then_some(next);
        let low = match (self.owned_open_start(), fresh) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => FrameIndex::MAX,
        };
        low.max(self.shard.frame_range_start)
    }

    /// Snapshot the entry (speculative passes only) and exit states before `frame` is
    /// processed.
    fn capture(&mut self, frame: FrameIndex) {
        if !self.is_exact() && self.entry.is_none() && frame >= self.shard.frame_range_start {
            self.entry = Some(self.tracker.snapshot());
        }
        if matches!(self.exit, Exit::Pending) && frame > self.shard.frame_range_end {
            self.exit = Exit::Held(self.tracker.snapshot());
            self.hand_over();
        }
    }

    /// End of stream: whatever was not captured yet is the final open set.
    fn capture_end(&mut self) {
        if !self.is_exact() && self.entry.is_none() {
            self.entry = Some(self.tracker.snapshot());
        }
        if matches!(self.exit, Exit::Pending) {
            self.exit = Exit::Held(self.tracker.snapshot());
            self.hand_over();
        }
    }

    fn hand_over(&mut self) {
        if !self.is_exact() {
            return;
        }
        match std::mem::replace(&mut self.exit, Exit::Sent) {
            Exit::Held(state) => {
                if let Some(next) = self.seam_out {
                    debug!(open = state.len(), "handing over to the next shard");
                    if next.send(state).is_err() {
                        debug!("next shard stopped before the handover");
                    }
                }
            }
            other => self.exit = other,
        }
    }

    /// The entry state is settled: release the held rows and the exit state.
    fn commit(&mut self, seam: SeamCheck) -> Result<(), PerchTrackError> {
        self.seam_in = None;
        self.seam = seam;
        match seam {
            SeamCheck::Unverified => warn!(
                shard = %self.shard,
                "previous shard ended without handing over; rows near the seam are unverified"
            ),
            _ => debug!(?seam, "entry state confirmed"),
        }
        let held = std::mem::take(&mut self.held);
        self.emit(held)?;
        self.hand_over();
        Ok(())
    }

    /// Compare with the previous shard's exit state if it already arrived.
    fn try_settle(&self) -> Option<SeamOutcome> {
        let previous = self.seam_in?;
        let entry = self.entry.as_ref()?;
        match previous.try_recv() {
            Ok(exit) => Some(compare(exit, Some(entry))),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(SeamOutcome::Exact(SeamCheck::Unverified)),
        }
    }

    /// Wait for the previous shard's exit state.
    fn settle(&self) -> Option<SeamOutcome> {
        let previous = self.seam_in?;
        Some(match previous.recv() {
            Ok(exit) => compare(exit, self.entry.as_ref()),
            Err(_) => SeamOutcome::Exact(SeamCheck::Unverified),
        })
    }

    fn run<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        from: FrameIndex,
        sharding: &ShardingParams,
    ) -> Result<PassEnd, PerchTrackError> {
        let end = self.shard.frame_range_end;
        let hard_end = sharding.read_ahead_frames.map(|r| end.saturating_add(r));
        source.seek_to_frame(from)?;

        loop {
            let batch = source.next_batch(sharding.batch_size)?;
            if batch.is_empty() {
                break;
            }

            let mut records = Vec::new();
            let mut done = false;
            for frame in &batch {
                let idx = frame.frame_index();
                self.capture(idx);
                if idx > end
                    && (hard_end.is_some_and(|h| idx > h) || self.owned_open_start().is_none())
                {
                    done = true;
                    break;
                }

                let closed = self
                    .tracker
                    .process_observations(idx, self.analysis.observations(frame));
                self.analyze(closed, &mut records);

                self.last_processed = Some(idx);
                self.frames_read += 1;
                if self.shard.contains(idx) {
                    self.frames_in_range += 1;
                }
            }
            self.emit(records)?;

            match self.try_settle() {
                Some(SeamOutcome::Exact(seam)) => self.commit(seam)?,
                Some(SeamOutcome::Diverged(exit)) => return Ok(PassEnd::Diverged(exit)),
                None => {}
            }
            self.progress()?;
            if done {
                break;
            }
        }

        self.capture_end();
        let remaining = self.tracker.flush();
        debug!(open = remaining.len(), "flushing");
        let mut records = Vec::new();
        self.analyze(remaining, &mut records);
        self.emit(records)?;

        match self.settle() {
            Some(SeamOutcome::Exact(seam)) => self.commit(seam)?,
            Some(SeamOutcome::Diverged(exit)) => return Ok(PassEnd::Diverged(exit)),
            None => {}
        }
        self.complete = true;
        self.progress()?;
        Ok(PassEnd::Completed)
    }

    /// First frame whose output is missing if the shard stops now.
    fn resume_from(&self) -> FrameIndex {
        if !self.is_exact() {
            return self.shard.frame_range_start;
        }
        let after_last = self
            .last_processed
            .map_or(self.shard.frame_range_start, |f| f + 1);
        let resume = match self.owned_open_start() {
            Some(f) => f.min(after_last),
            None => after_last,
        };
        resume.max(self.shard.frame_range_start)
    }

    fn failed(&self, source: PerchTrackError) -> PerchTrackError {
        PerchTrackError::ShardFailed {
            shard: self.shard.id,
            resume_from: self.resume_from(),
            range_end: self.shard.frame_range_end,
            source: Box::new(source),
        }
    }

    fn report(&self, frames_read: u64, elapsed: Duration) -> ShardReport {
        ShardReport {
            shard: self.shard,
            seam: self.seam,
            frames_read,
            frames_in_range: self.frames_in_range,
            trajectories_closed: self.trajectories_closed,
            trajectories_owned: self.trajectories_owned,
            records_emitted: self.records_emitted,
            elapsed,
        }
    }
}

/// Run one shard to completion.
///
/// Arguments
/// -----------------
/// * `shard`: the frame range owned by this worker.
/// * `analysis`: the analysis shared by every worker.
/// * `sharding`: batch size, warm-up and read-ahead settings.
/// * `source`: this worker's own frame source.
/// * `handover`: links to the neighbouring shards; without a previous link the shard
///   starts exact from its warm-up.
/// * `tx`: the shared output channel.
///
/// Return
/// ----------
/// * The [`ShardReport`], or [`PerchTrackError::ShardFailed`] if the source failed, or
///   [`PerchTrackError::OutputQueueClosed`] if the collector went away.
pub fn run_shard<A, S>(
    shard: ShardContext,
    analysis: &A,
    sharding: &ShardingParams,
    source: &mut S,
    handover: &Handover,
    tx: &Sender<WorkerMessage>,
) -> Result<ShardReport, PerchTrackError>
where
    A: TrajectoryAnalysis,
    S: FrameSource + ?Sized,
{
    let _span = info_span!("shard", id = shard.id, analysis = analysis.name()).entered();
    let started = Instant::now();

    let params = analysis.tracker_params();
    let first_seam = handover.previous.is_none().then_some(SeamCheck::Origin);
    let mut from = shard
        .frame_range_start
        .saturating_sub(sharding.warmup_for(params));
    info!(%shard, from, speculative = first_seam.is_none(), "starting");

    let mut pass = ShardPass::new(
        shard,
        analysis,
        TrajectoryTracker::new(params.clone()),
        tx,
        handover,
        first_seam,
    );
    let mut frames_read = 0;
    loop {
        let outcome = pass.run(source, from, sharding);
        frames_read += pass.frames_read;
        let exit = match outcome {
            Ok(PassEnd::Completed) => break,
            Ok(PassEnd::Diverged(exit)) => exit,
            Err(e @ PerchTrackError::OutputQueueClosed(_)) => return Err(e),
            Err(e) => match pass.settle() {
                // what was held so far is exact; release it before failing
                Some(SeamOutcome::Exact(seam)) => {
                    pass.commit(seam)?;
                    return Err(pass.failed(e));
                }
                Some(SeamOutcome::Diverged(exit)) => {
                    debug!(error = %e, "speculative pass failed");
                    exit
                }
                None => return Err(pass.failed(e)),
            },
        };

        info!(
            open = exit.len(),
            "entry state differs from the previous shard, replaying the range"
        );
        let reported = pass.reported;
        pass = ShardPass::new(
            shard,
            analysis,
            TrajectoryTracker::resume(params.clone(), exit),
            tx,
            handover,
            Some(SeamCheck::Replayed),
        );
        pass.reported = reported;
        from = shard.frame_range_start;
    }

    let report = pass.report(frames_read, started.elapsed());
    info!(
        frames = report.frames_read,
        owned = report.trajectories_owned,
        records = report.records_emitted,
        seam = ?report.seam,
        "done"
    );
    Ok(report)
}

#[cfg(test)]
mod worker_test {
    use crossbeam::channel::unbounded;

    use super::*;
    use crate::{
        constants::Position,
        frames::{FrameRecord, MemoryFrameSource},
        output::records::RecordKind,
        pipeline::{analysis::StimulusAnalysis, config::StimulusConfig},
        tracking::TrackerParams,
    };

    /// One point moving 5 mm per frame along y for `n` frames from `start`.
    fn moving_point(start: FrameIndex, n: i64) -> Vec<FrameRecord> {
        (start..start + n)
            .map(|f| {
                let y = 5.0 * (f - start) as f64;
                FrameRecord::new(f, f * 5, vec![], vec![Position::new(0.0, y, 400.0)])
            })
            .collect()
    }

    fn drain(rx: Receiver<WorkerMessage>) -> (Vec<OutputRecord>, u64) {
        let mut records = Vec::new();
        let mut frames = 0;
        for msg in rx.try_iter() {
            match msg {
                WorkerMessage::Records { records: r, .. } => records.extend(r),
                WorkerMessage::Progress { frames: f, .. } => frames += f,
                WorkerMessage::Finished { .. } => {}
            }
        }
        (records, frames)
    }

    /// 1150 frames, one point; trajectories are capped at 300 points.
    fn capped_scene() -> (Vec<FrameRecord>, StimulusAnalysis) {
        let config = StimulusConfig {
            tracker: TrackerParams::builder()
                .max_duration_frames(300)
                .build()
                .unwrap(),
            ..StimulusConfig::default()
        };
        (moving_point(0, 1150), StimulusAnalysis::new(&config))
    }

    const LEFT: ShardContext = ShardContext {
        id: 0,
        frame_range_start: 0,
        frame_range_end: 449,
    };
    const RIGHT: ShardContext = ShardContext {
        id: 1,
        frame_range_start: 450,
        frame_range_end: 1149,
    };

    /// Frames covered by the persisted trajectories of `records`.
    fn persisted_spans(records: &[OutputRecord]) -> Vec<(FrameIndex, FrameIndex)> {
        records
            .iter()
            .filter_map(|r| match r {
                OutputRecord::Classification(c) => Some((c.frame_start, c.frame_end)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_boundary_trajectory_reported_by_owner_only() {
        // trajectory spans frames 0..=299, shards split at 150
        let frames = moving_point(0, 300);
        let sharding = ShardingParams::default().with_workers(2);
        let analysis = StimulusAnalysis::default();

        let first = ShardContext {
            id: 0,
            frame_range_start: 0,
            frame_range_end: 149,
        };
        let second = ShardContext {
            id: 1,
            frame_range_start: 150,
            frame_range_end: 299,
        };

        let (tx, rx) = unbounded();
        let mut source = MemoryFrameSource::new(frames.clone());
        let report = run_shard(
            first,
            &analysis,
            &sharding,
            &mut source,
            &Handover::default(),
            &tx,
        )
        .unwrap();
        assert_eq!(report.seam, SeamCheck::Origin);
        assert_eq!(report.trajectories_owned, 1);
        assert_eq!(report.frames_in_range, 150);
        // read past the range until the owned trajectory closed
        assert_eq!(report.frames_read, 300);
        let (records, frames_done) = drain(rx);
        assert_eq!(frames_done, 150);
        assert_eq!(records.len(), 301);
        assert!(matches!(&records[0], OutputRecord::Classification(r) if r.trajectory_id == 1));

        let (tx, rx) = unbounded();
        let mut source = MemoryFrameSource::new(frames);
        let report = run_shard(
            second,
            &analysis,
            &sharding,
            &mut source,
            &Handover::default(),
            &tx,
        )
        .unwrap();
        assert_eq!(report.trajectories_owned, 0);
        assert_eq!(report.trajectories_closed, 1);
        let (records, _) = drain(rx);
        assert!(records.is_empty());
    }

    #[test]
    fn test_global_ids() {
        let frames = moving_point(1000, 250);
        let sharding = ShardingParams::default();
        let shard = ShardContext {
            id: 4,
            frame_range_start: 1000,
            frame_range_end: 1249,
        };
        let (tx, rx) = unbounded();
        let mut source = MemoryFrameSource::new(frames);
        run_shard(
            shard,
            &StimulusAnalysis::default(),
            &sharding,
            &mut source,
            &Handover::default(),
            &tx,
        )
        .unwrap();
        let (records, _) = drain(rx);
        assert!(records
            .iter()
            .filter(|r| r.kind() == RecordKind::TargetTracking)
            .all(|r| r.sort_key().1 == 4_000_001));
    }

    #[test]
    fn test_read_ahead_limit_truncates() {
        let frames = moving_point(0, 300);
        let sharding = ShardingParams {
            read_ahead_frames: Some(10),
            ..ShardingParams::default()
        };
        let shard = ShardContext {
            id: 0,
            frame_range_start: 0,
            frame_range_end: 199,
        };
        let (tx, rx) = unbounded();
        let mut source = MemoryFrameSource::new(frames);
        let report = run_shard(
            shard,
            &StimulusAnalysis::default(),
            &sharding,
            &mut source,
            &Handover::default(),
            &tx,
        )
        .unwrap();
        assert_eq!(report.frames_read, 210);
        let (records, _) = drain(rx);
        // 210 points: long enough to be persisted
        assert_eq!(
            records
                .iter()
                .filter(|r| r.kind() == RecordKind::TargetTracking)
                .count(),
            210
        );
    }

    #[test]
    fn test_closed_queue() {
        let (tx, rx) = unbounded();
        drop(rx);
        let shard = ShardContext {
            id: 2,
            frame_range_start: 0,
            frame_range_end: 9,
        };
        let mut source = MemoryFrameSource::new(moving_point(0, 10));
        let err = run_shard(
            shard,
            &StimulusAnalysis::default(),
            &ShardingParams::default(),
            &mut source,
            &Handover::default(),
            &tx,
        )
        .unwrap_err();
        assert_eq!(err, PerchTrackError::OutputQueueClosed(2));
    }

    #[test]
    fn test_diverging_entry_state_is_replayed() {
        let (frames, analysis) = capped_scene();
        let sharding = ShardingParams {
            warmup_frames: Some(0),
            ..ShardingParams::default()
        };
        let links = Handover::chain(2);

        let (tx, rx) = unbounded();
        let mut source = MemoryFrameSource::new(frames.clone());
        let left = run_shard(LEFT, &analysis, &sharding, &mut source, &links[0], &tx).unwrap();
        assert_eq!(left.seam, SeamCheck::Origin);
        assert!(drain(rx).0.is_empty());

        // without the handed-over piece 300..=449 the right shard would split at 750 and 1050
        let (tx, rx) = unbounded();
        let mut source = MemoryFrameSource::new(frames);
        let right = run_shard(RIGHT, &analysis, &sharding, &mut source, &links[1], &tx).unwrap();
        assert_eq!(right.seam, SeamCheck::Replayed);
        assert_eq!(right.frames_read, 1400);
        assert_eq!(right.frames_in_range, 700);

        let (records, frames_done) = drain(rx);
        assert_eq!(frames_done, 700);
        assert_eq!(persisted_spans(&records), vec![(900, 1149)]);
        assert_eq!(records.len(), 251);
    }

    #[test]
    fn test_long_warmup_matches_handover() {
        let (frames, analysis) = capped_scene();
        let sharding = ShardingParams {
            warmup_frames: Some(450),
            ..ShardingParams::default()
        };
        let links = Handover::chain(2);

        let (tx, _rx) = unbounded();
        let mut source = MemoryFrameSource::new(frames.clone());
        run_shard(LEFT, &analysis, &sharding, &mut source, &links[0], &tx).unwrap();

        let (tx, rx) = unbounded();
        let mut source = MemoryFrameSource::new(frames);
        let right = run_shard(RIGHT, &analysis, &sharding, &mut source, &links[1], &tx).unwrap();
        assert_eq!(right.seam, SeamCheck::Matched);
        assert_eq!(right.frames_read, 1150);
        assert_eq!(right.records_emitted, 251);
        assert_eq!(persisted_spans(&drain(rx).0), vec![(900, 1149)]);
    }

    #[test]
    fn test_missing_handover_keeps_speculative_rows() {
        let (frames, analysis) = capped_scene();
        let sharding = ShardingParams {
            warmup_frames: Some(0),
            ..ShardingParams::default()
        };
        let mut links = Handover::chain(2);
        // the left shard dies before handing over
        drop(links.remove(0));

        let (tx, rx) = unbounded();
        let mut source = MemoryFrameSource::new(frames);
        let right = run_shard(RIGHT, &analysis, &sharding, &mut source, &links[0], &tx).unwrap();
        assert_eq!(right.seam, SeamCheck::Unverified);
        assert_eq!(right.frames_read, 700);
        // speculative split: 450..=749 and 750..=1049 capped, 1050..=1149 too short
        assert!(persisted_spans(&drain(rx).0).is_empty());
    }

    #[test]
    fn test_rows_never_precede_watermark() {
        let frames: Vec<_> = (0..900)
            .map(|f| {
                let mut points = vec![Position::new(0.0, 5.0 * (f % 300) as f64, 400.0)];
                if (100..700).contains(&f) {
                    points.push(Position::new(3000.0, 4.0 * f as f64, 400.0));
                }
                FrameRecord::new(f, f * 5, vec![], points)
            })
            .collect();
        let sharding = ShardingParams {
            batch_size: 50,
            ..ShardingParams::default()
        };
        let shard = ShardContext {
            id: 0,
            frame_range_start: 0,
            frame_range_end: 599,
        };
        let (tx, rx) = unbounded();
        let mut source = MemoryFrameSource::new(frames);
        run_shard(
            shard,
            &StimulusAnalysis::default(),
            &sharding,
            &mut source,
            &Handover::default(),
            &tx,
        )
        .unwrap();

        let mut watermark = 0;
        let mut rows = 0;
        for msg in rx.try_iter() {
            match msg {
                WorkerMessage::Records { records, .. } => {
                    rows += records.len();
                    assert!(records.iter().all(|r| r.frame() >= watermark));
                }
                WorkerMessage::Progress { watermark: w, .. } => {
                    assert!(w >= watermark);
                    watermark = w;
                }
                WorkerMessage::Finished { .. } => unreachable!(),
            }
        }
        assert!(rows > 0);
        assert_eq!(watermark, FrameIndex::MAX);
    }
}
