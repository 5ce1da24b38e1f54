//! # Sharded pipeline
//!
//! Runs one analysis over a frame stream split into contiguous shards processed
//! concurrently.
//!
//! Modules
//! -----------------
//! * [`config`] – [`PipelineConfig`] and its TOML sections.
//! * [`shard`] – [`ShardPlan`] partitioning and [`ShardContext`] id biasing.
//! * [`analysis`] – the [`TrajectoryAnalysis`] seam and the stimulus / perch analyses.
//! * [`worker`] – [`run_shard`], the per-shard loop, and the [`Handover`] of tracker state
//!   between neighbouring shards.
//! * [`coordinator`] – [`ShardedPipeline`], spawning workers and merging their rows.
//! * [`progress`] – periodic progress reports.
//!
//! Example
//! -----------------
//! ```rust
//! use perchtrack::constants::Position;
//! use perchtrack::frames::{FrameRecord, MemoryFrameSource};
//! use perchtrack::output::{MemoryRecordSink, RecordKind};
//! use perchtrack::pipeline::{ShardedPipeline, ShardingParams, StimulusAnalysis};
//!
//! let frames: Vec<_> = (0..400)
//!     .map(|f| FrameRecord::new(f, 5 * f, vec![], vec![Position::new(0.0, 4.0 * f as f64, 500.0)]))
//!     .collect();
//! let source = MemoryFrameSource::new(frames);
//!
//! let pipeline = ShardedPipeline::new(
//!     ShardingParams::default().with_workers(2),
//!     StimulusAnalysis::default(),
//! )?;
//! let mut sink = MemoryRecordSink::new();
//! let report = pipeline.run(|_| Ok(source.clone()), &mut sink)?;
//!
//! assert!(report.is_complete());
//! assert_eq!(sink.of_kind(RecordKind::TargetTracking).count(), 400);
//! # Ok::<(), perchtrack::PerchTrackError>(())
//! ```
pub mod analysis;
pub mod config;
pub mod coordinator;
pub mod progress;
pub mod shard;
pub mod worker;

pub use analysis::{PerchAnalysis, StimulusAnalysis, TrajectoryAnalysis};
pub use config::{PerchConfig, PipelineConfig, ShardingParams, StimulusConfig};
pub use coordinator::{PipelineReport, ShardedPipeline};
pub use shard::{ShardContext, ShardPlan};
pub use worker::{run_shard, Handover, SeamCheck, ShardReport, WorkerMessage};
