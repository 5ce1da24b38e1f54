//! # Pipeline configuration
//!
//! Every tunable of a run, loadable from a TOML file. Each section is optional and every
//! missing key keeps its default:
//!
//! ```toml
//! [sharding]
//! workers = 8
//! batch_size = 2000
//!
//! [stimulus.tracker]
//! max_association_distance = 75.0
//!
//! [stimulus.classifier]
//! min_height = 150.0
//!
//! [perches.tracker]
//! timeout_frames = 200
//!
//! [perches.segments]
//! body_label = "Yframe"
//! ```
//!
//! The `[perches.tracker]` keys override [`TrackerParams::perching`], not the stimulus
//! defaults.
use camino::Utf8Path;
use serde::{Deserialize, Deserializer};

use crate::{
    classification::ClassifierParams,
    constants::{
        FrameIndex, Millimeter, DEFAULT_BATCH_SIZE, DEFAULT_MAX_WARMUP_FRAMES,
        DEFAULT_PROGRESS_INTERVAL_SECS, DEFAULT_QUEUE_CAPACITY,
    },
    segments::SegmentParams,
    tracking::{params::gt0, TrackerParams, TrackerParamsBuilder},
    PerchTrackError,
};

/// How the frame stream is split and fed to the shard workers.
///
/// Fields
/// -----------------
/// * `workers` – number of shards (default: available parallelism).
/// * `batch_size` – frames requested per [`FrameSource::next_batch`](crate::frames::FrameSource::next_batch).
/// * `queue_capacity` – bound of the output channel (messages).
/// * `warmup_frames` – frames tracked before a shard's range to guess the tracker state at
///   the seam (default `max_duration + timeout`, at most
///   [`DEFAULT_MAX_WARMUP_FRAMES`]). The guess is checked against the state handed over by
///   the previous shard and the range is replayed when they differ, so the warm-up only
///   decides how often shards run in parallel, never what they output.
/// * `read_ahead_frames` – hard limit past the range end; `None` reads until no owned
///   trajectory is open.
/// * `progress_interval_secs` – wall time between progress reports.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShardingParams {
    pub workers: usize,
    pub batch_size: usize,
    pub queue_capacity: usize,
    pub warmup_frames: Option<FrameIndex>,
    pub read_ahead_frames: Option<FrameIndex>,
    pub progress_interval_secs: f64,
}

impl Default for ShardingParams {
    fn default() -> Self {
        ShardingParams {
            workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            warmup_frames: None,
            read_ahead_frames: None,
            progress_interval_secs: DEFAULT_PROGRESS_INTERVAL_SECS,
        }
    }
}

impl ShardingParams {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Warm-up length for a given tracker configuration.
    ///
    /// A trajectory open at the seam can be as long as `max_duration`, so the default
    /// covers it plus one timeout. Presets with very long trajectories (perching allows
    /// an hour) are capped: a body perched across a seam makes the next shard replay
    /// its range from the handed-over state instead of warming up for an hour.
    pub fn warmup_for(&self, tracker: &TrackerParams) -> FrameIndex {
        self.warmup_frames.unwrap_or_else(|| {
            FrameIndex::try_from(tracker.max_duration_frames)
                .unwrap_or(FrameIndex::MAX / 4)
                .saturating_add(tracker.timeout_frames)
                .min(DEFAULT_MAX_WARMUP_FRAMES)
        })
    }

    pub fn validate(&self) -> Result<(), PerchTrackError> {
        let invalid = |msg: &str| Err(PerchTrackError::InvalidPipelineParameter(msg.into()));

        if self.workers == 0 {
            return invalid("workers must be >= 1");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be >= 1");
        }
        if self.queue_capacity == 0 {
            return invalid("queue_capacity must be >= 1");
        }
        if self.warmup_frames.is_some_and(|w| w < 0) {
            return invalid("warmup_frames must be >= 0");
        }
        if self.read_ahead_frames.is_some_and(|r| r < 0) {
            return invalid("read_ahead_frames must be >= 0");
        }
        if !gt0(self.progress_interval_secs) {
            return invalid("progress_interval_secs must be > 0");
        }
        Ok(())
    }
}

/// Target-stimulus extraction settings.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct StimulusConfig {
    pub tracker: TrackerParams,
    pub classifier: ClassifierParams,
}

/// Perch and takeoff extraction settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PerchConfig {
    #[serde(deserialize_with = "perch_tracker")]
    pub tracker: TrackerParams,
    pub segments: SegmentParams,
}

impl Default for PerchConfig {
    fn default() -> Self {
        PerchConfig {
            tracker: TrackerParams::perching(),
            segments: SegmentParams::default(),
        }
    }
}

/// Tracker keys present in a section, applied on top of a base parameter set.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TrackerOverrides {
    max_association_distance: Option<Millimeter>,
    timeout_frames: Option<FrameIndex>,
    max_duration_frames: Option<usize>,
    stationary_min_points: Option<usize>,
    stationary_window: Option<usize>,
    stationary_max_span: Option<Millimeter>,
}

impl TrackerOverrides {
    fn apply(self, base: TrackerParams) -> Result<TrackerParams, PerchTrackError> {
        let mut builder = TrackerParamsBuilder::from_params(base);
        if let Some(v) = self.max_association_distance {
            builder = builder.max_association_distance(v);
        }
        if let Some(v) = self.timeout_frames {
            builder = builder.timeout_frames(v);
        }
        if let Some(v) = self.max_duration_frames {
            builder = builder.max_duration_frames(v);
        }
        if let Some(v) = self.stationary_min_points {
            builder = builder.stationary_min_points(v);
        }
        if let Some(v) = self.stationary_window {
            builder = builder.stationary_window(v);
        }
        if let Some(v) = self.stationary_max_span {
            builder = builder.stationary_max_span(v);
        }
        builder.build()
    }
}

fn perch_tracker<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TrackerParams, D::Error> {
    TrackerOverrides::deserialize(deserializer)?
        .apply(TrackerParams::perching())
        .map_err(serde::de::Error::custom)
}

/// Complete configuration of a run.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sharding: ShardingParams,
    pub stimulus: StimulusConfig,
    pub perches: PerchConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, PerchTrackError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    pub fn from_toml_file(path: &Utf8Path) -> Result<Self, PerchTrackError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), PerchTrackError> {
        self.sharding.validate()?;
        self.stimulus.tracker.validate()?;
        self.stimulus.classifier.validate()?;
        self.perches.tracker.validate()?;
        self.perches.segments.validate()?;
        Ok(())
    }
}
