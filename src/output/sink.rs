//! Record sinks.
//!
//! The pipeline collector hands every [`OutputRecord`] to a [`RecordSink`] while the shards
//! are still running, in [`OutputRecord::merge_key`] order, then calls
//! [`RecordSink::finish`] once. Within one stream the rows therefore come by frame.
use std::{collections::BTreeMap, fs::File};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::{
    output::records::{OutputRecord, RecordKind},
    PerchTrackError,
};

pub trait RecordSink {
    fn write(&mut self, record: &OutputRecord) -> Result<(), PerchTrackError>;

    /// Flush buffered output. Called once, after the last record.
    fn finish(&mut self) -> Result<(), PerchTrackError> {
        Ok(())
    }
}

/// Keeps every record in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordSink {
    pub records: Vec<OutputRecord>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records of one stream, in write order.
    pub fn of_kind(&self, kind: RecordKind) -> impl Iterator<Item = &OutputRecord> + '_ {
        self.records.iter().filter(move |r| r.kind() == kind)
    }
}

impl RecordSink for MemoryRecordSink {
    fn write(&mut self, record: &OutputRecord) -> Result<(), PerchTrackError> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// Writes one CSV file per stream, named `<dir>/<stem>_<suffix>.csv`.
///
/// Files are created (with their header) up front for the requested streams, so an analysis
/// producing no row still leaves an empty table behind.
pub struct CsvRecordSink {
    writers: BTreeMap<RecordKind, csv::Writer<File>>,
    paths: BTreeMap<RecordKind, Utf8PathBuf>,
}

impl CsvRecordSink {
    /// Create the output files.
    ///
    /// Arguments
    /// -----------------
    /// * `dir`: output directory, created if missing.
    /// * `stem`: common file name prefix (usually the input file stem).
    /// * `kinds`: streams to create.
    pub fn create(
        dir: &Utf8Path,
        stem: &str,
        kinds: &[RecordKind],
    ) -> Result<Self, PerchTrackError> {
        std::fs::create_dir_all(dir)?;
        let mut writers = BTreeMap::new();
        let mut paths = BTreeMap::new();
        for kind in kinds {
            let path = dir.join(format!("{stem}_{}.csv", kind.file_suffix()));
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(&path)?;
            writer.write_record(kind.header())?;
            debug!(%path, "created output file");
            writers.insert(*kind, writer);
            paths.insert(*kind, path);
        }
        Ok(CsvRecordSink { writers, paths })
    }

    pub fn path(&self, kind: RecordKind) -> Option<&Utf8Path> {
        self.paths.get(&kind).map(|p| p.as_path())
    }
}

impl RecordSink for CsvRecordSink {
    fn write(&mut self, record: &OutputRecord) -> Result<(), PerchTrackError> {
        let Some(writer) = self.writers.get_mut(&record.kind()) else {
            // stream not requested
            return Ok(());
        };
        match record {
            OutputRecord::Classification(r) => writer.serialize(r)?,
            OutputRecord::TargetTracking(r) => writer.serialize(r)?,
            OutputRecord::Perch(r) => writer.serialize(r)?,
            OutputRecord::Takeoff(r) => writer.serialize(r)?,
            OutputRecord::PerchTracking(r) => writer.serialize(r)?,
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PerchTrackError> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}
