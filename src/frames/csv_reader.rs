//! # Long-form CSV frame reader
//!
//! Reads capture frames exported as one row per marker:
//!
//! ```text
//! frame,timestamp,body,x,y,z
//! 1200,1489504166535,Yframe,12.5,-3.0,410.2
//! 1200,1489504166535,Yframe,40.1,-2.2,409.7
//! 1200,1489504166535,,503.3,11.0,612.9
//! ```
//!
//! * `body` is the label of the identified rigid body the marker belongs to; an **empty**
//!   `body` marks an unidentified point.
//! * Empty coordinates, `NaN` and the capture sentinel `9999999` are accepted and filtered by
//!   [`FrameRecord::new`] / [`IdentifiedBody::new`].
//! * Rows of one frame do not need to be contiguous; frames are returned in increasing
//!   frame order. The timestamp of the first row of a frame wins.
//!
//! Errors
//! -----------------
//! A malformed row (unparsable frame index, wrong column count, ...) aborts the read with
//! [`PerchTrackError::InvalidFrameRecord`] naming its line. I/O failures are reported as
//! [`PerchTrackError::CsvError`].
use std::collections::BTreeMap;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{FrameIndex, Position, TimestampMillis},
    frames::{FrameRecord, IdentifiedBody},
    PerchTrackError,
};

/// One marker row of the long-form capture export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRow {
    pub frame: FrameIndex,
    pub timestamp: TimestampMillis,
    pub body: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl MarkerRow {
    fn position(&self) -> Position {
        Position::new(
            self.x.unwrap_or(f64::NAN),
            self.y.unwrap_or(f64::NAN),
            self.z.unwrap_or(f64::NAN),
        )
    }
}

#[derive(Default)]
struct PendingFrame {
    timestamp: TimestampMillis,
    bodies: Vec<(String, Vec<Position>)>,
    unidentified: Vec<Position>,
}

impl PendingFrame {
    fn push(&mut self, row: MarkerRow) {
        let position = row.position();
        match row.body.filter(|b| !b.trim().is_empty()) {
            None => self.unidentified.push(position),
            Some(label) => match self.bodies.iter_mut().find(|(l, _)| *l == label) {
                Some((_, points)) => points.push(position),
                None => self.bodies.push((label, vec![position])),
            },
        }
    }

    fn finish(self, frame: FrameIndex) -> FrameRecord {
        let bodies = self
            .bodies
            .into_iter()
            .filter_map(|(label, points)| IdentifiedBody::new(label, points))
            .collect();
        FrameRecord::new(frame, self.timestamp, bodies, self.unidentified)
    }
}

/// Read every frame of a long-form CSV capture export.
///
/// Arguments
/// -----------------
/// * `path`: the CSV file, with a `frame,timestamp,body,x,y,z` header.
///
/// Return
/// ----------
/// * The frames in increasing frame order, or the first I/O / parsing error.
pub fn read_frames_csv(path: &Utf8Path) -> Result<Vec<FrameRecord>, PerchTrackError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    read_frames(reader)
}

/// Same as [`read_frames_csv`] over any reader.
pub fn read_frames<R: std::io::Read>(
    mut reader: csv::Reader<R>,
) -> Result<Vec<FrameRecord>, PerchTrackError> {
    let mut pending: BTreeMap<FrameIndex, PendingFrame> = BTreeMap::new();

    for row in reader.deserialize::<MarkerRow>() {
        let row = row.map_err(invalid_row)?;
        pending
            .entry(row.frame)
            .or_insert_with(|| PendingFrame {
                timestamp: row.timestamp,
                ..PendingFrame::default()
            })
            .push(row);
    }

    Ok(pending
        .into_iter()
        .map(|(frame, p)| p.finish(frame))
        .collect())
}

fn invalid_row(e: csv::Error) -> PerchTrackError {
    if e.is_io_error() {
        return PerchTrackError::CsvError(e);
    }
    let line = e.position().map_or(0, |p| p.line());
    let reason = match e.kind() {
        csv::ErrorKind::Deserialize { err, .. } => err.to_string(),
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => format!("expected {expected_len} fields, found {len}"),
        _ => e.to_string(),
    };
    PerchTrackError::InvalidFrameRecord { line, reason }
}

/// Write frames in the long-form layout understood by [`read_frames_csv`].
///
/// A frame without any marker is written as a single row with empty coordinates, so that
/// it survives a round trip as an empty frame.
pub fn write_frames_csv(path: &Utf8Path, frames: &[FrameRecord]) -> Result<(), PerchTrackError> {
    let mut writer = csv::Writer::from_path(path)?;
    for frame in frames {
        let row = |body: Option<&str>, p: Option<&Position>| MarkerRow {
            frame: frame.frame_index(),
            timestamp: frame.timestamp_millis(),
            body: body.map(str::to_string),
            x: p.map(|p| p.x),
            y: p.map(|p| p.y),
            z: p.map(|p| p.z),
        };

        let mut written = false;
        for body in frame.identified_bodies() {
            for p in body.points() {
                writer.serialize(row(Some(body.label()), Some(p)))?;
                written = true;
            }
        }
        for p in frame.unidentified_points() {
            writer.serialize(row(None, Some(p)))?;
            written = true;
        }
        if !written {
            writer.serialize(row(None, None))?;
        }
    }
    writer.flush()?;
    Ok(())
}
