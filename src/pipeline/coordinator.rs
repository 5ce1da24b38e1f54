//! # Sharded pipeline coordinator
//!
//! [`ShardedPipeline::run`] plans the shards, links neighbours with a [`Handover`] chain,
//! spawns one scoped worker thread per shard and drains the shared bounded channel on the
//! calling thread.
//!
//! Rows are written while the workers run. Each shard announces a watermark with its
//! progress (no later row of that shard has a smaller frame); rows below the lowest
//! watermark of all shards are written in [`OutputRecord::merge_key`] order, so memory
//! holds only the rows waiting for a slower shard and the output does not depend on the
//! number of shards (up to trajectory-id renumbering).
//!
//! Failures are per shard: a failing shard is logged and reported in the
//! [`PipelineReport`], the others run to completion and their rows are written.
use std::collections::BTreeMap;
use std::time::Duration;

use crossbeam::channel::bounded;
use tracing::{debug, error, info, warn};

use crate::{
    constants::{FrameIndex, TakeoffId, TrajectoryId},
    frames::FrameSource,
    output::{
        records::{OutputRecord, RecordKind},
        sink::RecordSink,
    },
    pipeline::{
        analysis::TrajectoryAnalysis,
        config::ShardingParams,
        progress::{fmt_elapsed, ProgressReporter},
        shard::ShardPlan,
        worker::{run_shard, Handover, ShardReport, WorkerMessage},
    },
    PerchTrackError,
};

/// Outcome of a pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    /// One entry per shard, in shard order.
    pub shards: Vec<Result<ShardReport, PerchTrackError>>,
    pub records_written: u64,
    pub elapsed: Duration,
}

impl PipelineReport {
    /// True if every shard completed.
    pub fn is_complete(&self) -> bool {
        self.shards.iter().all(Result::is_ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PerchTrackError> + '_ {
        self.shards.iter().filter_map(|r| r.as_ref().err())
    }

    pub fn reports(&self) -> impl Iterator<Item = &ShardReport> + '_ {
        self.shards.iter().filter_map(|r| r.as_ref().ok())
    }
}

type MergeKey = (FrameIndex, RecordKind, TrajectoryId, TakeoffId, u64);

/// Rows held until every shard's watermark has passed them.
struct WatermarkMerge {
    pending: BTreeMap<MergeKey, OutputRecord>,
    watermarks: Vec<FrameIndex>,
    seq: u64,
    written: u64,
}

impl WatermarkMerge {
    fn new(plan: &ShardPlan) -> Self {
        WatermarkMerge {
            pending: BTreeMap::new(),
            watermarks: plan.shards().iter().map(|s| s.frame_range_start).collect(),
            seq: 0,
            written: 0,
        }
    }

    fn push(&mut self, records: Vec<OutputRecord>) {
        for record in records {
            let (frame, kind, trajectory, takeoff) = record.merge_key();
            self.pending
                .insert((frame, kind, trajectory, takeoff, self.seq), record);
            self.seq += 1;
        }
    }

    fn advance(&mut self, shard: usize, watermark: FrameIndex) {
        if let Some(w) = self.watermarks.get_mut(shard) {
            *w = (*w).max(watermark);
        }
    }

    fn low(&self) -> FrameIndex {
        self.watermarks.iter().copied().min().unwrap_or(FrameIndex::MAX)
    }

    fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Write every row below the lowest watermark.
    fn release<K: RecordSink + ?Sized>(&mut self, sink: &mut K) -> Result<(), PerchTrackError> {
        let low = self.low();
        let keep = self
            .pending
            .split_off(&(low, RecordKind::Classification, 0, 0, 0));
        let ready = std::mem::replace(&mut self.pending, keep);
        self.write(ready, sink)
    }

    /// Write everything left, whatever the watermarks.
    fn drain<K: RecordSink + ?Sized>(&mut self, sink: &mut K) -> Result<(), PerchTrackError> {
        let ready = std::mem::take(&mut self.pending);
        self.write(ready, sink)
    }

    fn write<K: RecordSink + ?Sized>(
        &mut self,
        ready: BTreeMap<MergeKey, OutputRecord>,
        sink: &mut K,
    ) -> Result<(), PerchTrackError> {
        for record in ready.values() {
            sink.write(record)?;
            self.written += 1;
        }
        Ok(())
    }
}

pub struct ShardedPipeline<A: TrajectoryAnalysis> {
    sharding: ShardingParams,
    analysis: A,
}

impl<A: TrajectoryAnalysis> ShardedPipeline<A> {
    /// Validate the sharding and tracker settings and build the pipeline.
    pub fn new(sharding: ShardingParams, analysis: A) -> Result<Self, PerchTrackError> {
        sharding.validate()?;
        analysis.tracker_params().validate()?;
        Ok(ShardedPipeline { sharding, analysis })
    }

    pub fn sharding(&self) -> &ShardingParams {
        &self.sharding
    }

    pub fn analysis(&self) -> &A {
        &self.analysis
    }

    /// Run the analysis over a frame stream.
    ///
    /// Arguments
    /// -----------------
    /// * `source_factory`: opens an independent frame source; called once to read the frame
    ///   range, then once per shard with the shard id, from the worker thread.
    /// * `sink`: receives every row in [`OutputRecord::merge_key`] order, as soon as no
    ///   shard can produce an earlier one.
    ///
    /// Return
    /// ----------
    /// * The [`PipelineReport`]. Shard failures are reported there; only errors that
    ///   prevent the run altogether (empty stream, unreadable range, sink errors) are
    ///   returned as `Err`.
    pub fn run<S, F, K>(
        &self,
        source_factory: F,
        sink: &mut K,
    ) -> Result<PipelineReport, PerchTrackError>
    where
        S: FrameSource,
        F: Fn(usize) -> Result<S, PerchTrackError> + Sync,
        K: RecordSink + ?Sized,
    {
        let (first, last) = source_factory(0)?
            .frame_range()?
            .ok_or(PerchTrackError::EmptyFrameStream)?;
        let plan = ShardPlan::partition(first, last, self.sharding.workers)?;
        info!(
            analysis = self.analysis.name(),
            first,
            last,
            shards = plan.len(),
            "starting pipeline"
        );

        let (tx, rx) = bounded::<WorkerMessage>(self.sharding.queue_capacity);
        let mut progress = ProgressReporter::new(
            plan.frame_count(),
            plan.len(),
            Duration::from_secs_f64(self.sharding.progress_interval_secs),
        );
        let mut merge = WatermarkMerge::new(&plan);
        let mut sink_error = None;

        let shards = std::thread::scope(|scope| {
            let handles: Vec<_> = plan
                .shards()
                .iter()
                .zip(Handover::chain(plan.len()))
                .map(|(&shard, handover)| {
                    let tx = tx.clone();
                    let factory = &source_factory;
                    let analysis = &self.analysis;
                    let sharding = &self.sharding;
                    scope.spawn(move || {
                        let result = factory(shard.id)
                            .map_err(|e| PerchTrackError::ShardFailed {
                                shard: shard.id,
                                resume_from: shard.frame_range_start,
                                range_end: shard.frame_range_end,
                                source: Box::new(e),
                            })
                            .and_then(|mut source| {
                                run_shard(shard, analysis, sharding, &mut source, &handover, &tx)
                            });
                        // the next shard must not wait for a handover that will never come
                        drop(handover);
                        let _ = tx.send(WorkerMessage::Finished { shard: shard.id });
                        result
                    })
                })
                .collect();
            drop(tx);

            for message in rx.iter() {
                match message {
                    WorkerMessage::Records { records, .. } => merge.push(records),
                    WorkerMessage::Progress {
                        shard,
                        frames,
                        open_trajectories,
                        watermark,
                    } => {
                        progress.advance(shard, frames, open_trajectories);
                        merge.advance(shard, watermark);
                    }
                    WorkerMessage::Finished { shard } => {
                        debug!(shard, pending = merge.pending(), "shard finished");
                        merge.advance(shard, FrameIndex::MAX);
                    }
                }
                if let Err(e) = merge.release(sink) {
                    sink_error = Some(e);
                    break;
                }
            }
            // workers still sending see a closed queue and stop
            drop(rx);

            handles
                .into_iter()
                .zip(plan.shards())
                .map(|(handle, shard)| {
                    handle.join().unwrap_or(Err(PerchTrackError::WorkerPanicked {
                        shard: shard.id,
                        range_start: shard.frame_range_start,
                        range_end: shard.frame_range_end,
                    }))
                })
                .collect::<Vec<_>>()
        });

        if let Some(e) = sink_error {
            return Err(e);
        }
        for result in &shards {
            if let Err(e) = result {
                error!(error = %e, "shard failed");
            }
        }

        merge.drain(sink)?;
        sink.finish()?;

        let elapsed = progress.finish();
        let report = PipelineReport {
            shards,
            records_written: merge.written,
            elapsed,
        };
        if report.is_complete() {
            info!(
                records = report.records_written,
                elapsed = %fmt_elapsed(elapsed),
                "pipeline complete"
            );
        } else {
            warn!(
                failed = report.failures().count(),
                records = report.records_written,
                "pipeline finished with failed shards"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod coordinator_test {
    use super::*;
    use crate::{
        constants::Position,
        frames::{FrameRecord, MemoryFrameSource},
        output::{records::TargetTrackingRow, sink::MemoryRecordSink},
        pipeline::analysis::StimulusAnalysis,
    };

    /// Two targets, one on each side of the 3-shard boundaries.
    fn two_targets() -> MemoryFrameSource {
        let frames = (0..1000)
            .map(|f| {
                let mut points = Vec::new();
                if f < 400 {
                    points.push(Position::new(0.0, 5.0 * f as f64, 400.0));
                }
                if f >= 500 {
                    points.push(Position::new(3000.0, 5.0 * (f - 500) as f64, 400.0));
                }
                FrameRecord::new(f, f * 5, vec![], points)
            })
            .collect();
        MemoryFrameSource::new(frames)
    }

    #[test]
    fn test_single_and_multi_shard_agree() {
        let source = two_targets();
        let mut outputs = Vec::new();
        for workers in [1, 3] {
            let pipeline = ShardedPipeline::new(
                ShardingParams::default().with_workers(workers),
                StimulusAnalysis::default(),
            )
            .unwrap();
            let mut sink = MemoryRecordSink::new();
            let report = pipeline.run(|_| Ok(source.clone()), &mut sink).unwrap();
            assert!(report.is_complete());
            assert_eq!(report.shards.len(), workers);

            let rows: Vec<_> = sink
                .of_kind(RecordKind::TargetTracking)
                .map(|r| match r {
                    OutputRecord::TargetTracking(t) => (t.frame, t.x as i64, t.y as i64),
                    _ => unreachable!(),
                })
                .collect();
            assert_eq!(sink.of_kind(RecordKind::Classification).count(), 2);
            outputs.push(rows);
        }
        assert_eq!(outputs[0].len(), 900);
        assert_eq!(outputs[0], outputs[1]);
    }

    fn tracking(frame: FrameIndex) -> Vec<OutputRecord> {
        vec![OutputRecord::TargetTracking(TargetTrackingRow {
            trajectory_id: 1,
            frame,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        })]
    }

    fn frames(sink: &MemoryRecordSink) -> Vec<FrameIndex> {
        sink.records.iter().map(OutputRecord::frame).collect()
    }

    #[test]
    fn test_rows_wait_for_every_watermark() {
        let plan = ShardPlan::partition(0, 999, 2).unwrap();
        let mut merge = WatermarkMerge::new(&plan);
        let mut sink = MemoryRecordSink::new();

        // the second shard is ahead, the first may still produce earlier rows
        merge.push(tracking(600));
        merge.release(&mut sink).unwrap();
        merge.advance(0, 300);
        merge.release(&mut sink).unwrap();
        assert!(sink.records.is_empty());

        merge.push(tracking(100));
        merge.release(&mut sink).unwrap();
        assert_eq!(frames(&sink), vec![100]);

        // first shard done: the second one still holds its range start
        merge.advance(0, FrameIndex::MAX);
        merge.release(&mut sink).unwrap();
        assert_eq!(merge.pending(), 1);

        merge.advance(1, 601);
        merge.release(&mut sink).unwrap();
        assert_eq!(frames(&sink), vec![100, 600]);
        assert_eq!(merge.written, 2);
    }

    #[test]
    fn test_watermarks_never_move_back() {
        let plan = ShardPlan::partition(0, 999, 2).unwrap();
        let mut merge = WatermarkMerge::new(&plan);
        merge.advance(1, 800);
        merge.advance(1, 700);
        merge.advance(0, 900);
        assert_eq!(merge.low(), 800);

        let mut sink = MemoryRecordSink::new();
        merge.push(tracking(850));
        merge.drain(&mut sink).unwrap();
        assert_eq!(frames(&sink), vec![850]);
    }

    /// Rejects every row after the first `limit`.
    struct FullSink {
        limit: usize,
        written: usize,
    }

    impl RecordSink for FullSink {
        fn write(&mut self, _record: &OutputRecord) -> Result<(), PerchTrackError> {
            if self.written == self.limit {
                return Err(std::io::Error::other("disk full").into());
            }
            self.written += 1;
            Ok(())
        }
    }

    #[test]
    fn test_sink_error_stops_the_run() {
        let source = two_targets();
        let pipeline = ShardedPipeline::new(
            ShardingParams {
                batch_size: 100,
                ..ShardingParams::default().with_workers(3)
            },
            StimulusAnalysis::default(),
        )
        .unwrap();
        let mut sink = FullSink {
            limit: 10,
            written: 0,
        };
        let err = pipeline
            .run(|_| Ok(source.clone()), &mut sink)
            .unwrap_err();
        assert!(matches!(err, PerchTrackError::IoError(_)));
        assert_eq!(sink.written, 10);
    }

    #[test]
    fn test_empty_stream() {
        let pipeline =
            ShardedPipeline::new(ShardingParams::default(), StimulusAnalysis::default()).unwrap();
        let mut sink = MemoryRecordSink::new();
        let err = pipeline
            .run(|_| Ok(MemoryFrameSource::new(vec![])), &mut sink)
            .unwrap_err();
        assert_eq!(err, PerchTrackError::EmptyFrameStream);
    }

    #[test]
    fn test_invalid_sharding() {
        let sharding = ShardingParams {
            batch_size: 0,
            ..ShardingParams::default()
        };
        assert!(ShardedPipeline::new(sharding, StimulusAnalysis::default()).is_err());
    }
}
