//! # Output records and sinks
//!
//! * [`records`] – row structs of the five streams and [`OutputRecord`].
//! * [`sink`] – [`RecordSink`] with CSV and in-memory implementations.
//! * [`targets`] – target-track loading from a previous stimulus run.
pub mod records;
pub mod sink;
pub mod targets;

pub use records::{
    ClassificationRow, OutputRecord, PerchRow, PerchTrackingRow, RecordKind, TakeoffRow,
    TargetTrackingRow,
};
pub use sink::{CsvRecordSink, MemoryRecordSink, RecordSink};
pub use targets::{read_target_track, read_target_track_files};
