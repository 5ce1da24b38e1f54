use thiserror::Error;

use crate::constants::FrameIndex;

#[derive(Error, Debug)]
pub enum PerchTrackError {
    #[error("Invalid tracker parameter: {0}")]
    InvalidTrackerParameter(String),

    #[error("Invalid classifier parameter: {0}")]
    InvalidClassifierParameter(String),

    #[error("Invalid segment parameter: {0}")]
    InvalidSegmentParameter(String),

    #[error("Invalid pipeline parameter: {0}")]
    InvalidPipelineParameter(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid configuration file: {0}")]
    ConfigError(#[from] toml::de::Error),

    #[error("Invalid frame record at line {line}: {reason}")]
    InvalidFrameRecord { line: u64, reason: String },

    #[error("Frame source failure on shard {shard} at frame {frame}: {reason}")]
    FrameSource {
        shard: usize,
        frame: FrameIndex,
        reason: String,
    },

    #[error("Frame stream is empty")]
    EmptyFrameStream,

    #[error(
        "Shard {shard} failed; frames {resume_from}..={range_end} were not produced: {source}"
    )]
    ShardFailed {
        shard: usize,
        resume_from: FrameIndex,
        range_end: FrameIndex,
        #[source]
        source: Box<PerchTrackError>,
    },

    #[error("Worker thread of shard {shard} panicked; frames {range_start}..={range_end} were not produced")]
    WorkerPanicked {
        shard: usize,
        range_start: FrameIndex,
        range_end: FrameIndex,
    },

    #[error("Output queue closed before shard {0} finished")]
    OutputQueueClosed(usize),
}

impl PartialEq for PerchTrackError {
    fn eq(&self, other: &Self) -> bool {
        use PerchTrackError::*;
        match (self, other) {
            (InvalidTrackerParameter(a), InvalidTrackerParameter(b)) => a == b,
            (InvalidClassifierParameter(a), InvalidClassifierParameter(b)) => a == b,
            (InvalidSegmentParameter(a), InvalidSegmentParameter(b)) => a == b,
            (InvalidPipelineParameter(a), InvalidPipelineParameter(b)) => a == b,

            // Wrapped foreign errors compare by variant only
            (IoError(_), IoError(_)) => true,
            (CsvError(_), CsvError(_)) => true,
            (ConfigError(_), ConfigError(_)) => true,

            (
                InvalidFrameRecord { line: a, reason: ra },
                InvalidFrameRecord { line: b, reason: rb },
            ) => a == b && ra == rb,
            (
                FrameSource {
                    shard: sa,
                    frame: fa,
                    reason: ra,
                },
                FrameSource {
                    shard: sb,
                    frame: fb,
                    reason: rb,
                },
            ) => sa == sb && fa == fb && ra == rb,
            (
                ShardFailed {
                    shard: sa,
                    resume_from: fa,
                    range_end: ea,
                    source: a,
                },
                ShardFailed {
                    shard: sb,
                    resume_from: fb,
                    range_end: eb,
                    source: b,
                },
            ) => sa == sb && fa == fb && ea == eb && a == b,
            (
                WorkerPanicked {
                    shard: sa,
                    range_start: fa,
                    range_end: ea,
                },
                WorkerPanicked {
                    shard: sb,
                    range_start: fb,
                    range_end: eb,
                },
            ) => sa == sb && fa == fb && ea == eb,
            (OutputQueueClosed(a), OutputQueueClosed(b)) => a == b,

            (EmptyFrameStream, EmptyFrameStream) => true,

            _ => false,
        }
    }
}
