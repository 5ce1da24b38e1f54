//! Read the target stimulus track back from a previous stimulus run.
//!
//! The stimulus analysis writes a classification table and a target-tracking table; only the
//! trajectories whose `label` is true are the stimulus. The perch analysis reads both back to
//! relate takeoffs to the stimulus position.
use ahash::AHashSet;
use camino::Utf8Path;
use tracing::info;

use crate::{
    constants::Position,
    output::records::{ClassificationRow, TargetTrackingRow},
    segments::TargetTrack,
    PerchTrackError,
};

/// Build a [`TargetTrack`] from readers over the two tables.
pub fn read_target_track<R1: std::io::Read, R2: std::io::Read>(
    mut classification: csv::Reader<R1>,
    mut tracking: csv::Reader<R2>,
) -> Result<TargetTrack, PerchTrackError> {
    let mut labeled = AHashSet::new();
    for row in classification.deserialize::<ClassificationRow>() {
        let row = row?;
        if row.label {
            labeled.insert(row.trajectory_id);
        }
    }

    let mut track = TargetTrack::new();
    for row in tracking.deserialize::<TargetTrackingRow>() {
        let row = row?;
        if labeled.contains(&row.trajectory_id) {
            track.insert(row.frame, row.trajectory_id, Position::new(row.x, row.y, row.z));
        }
    }
    Ok(track)
}

/// Same as [`read_target_track`] from file paths.
pub fn read_target_track_files(
    classification: &Utf8Path,
    tracking: &Utf8Path,
) -> Result<TargetTrack, PerchTrackError> {
    let track = read_target_track(
        csv::Reader::from_path(classification)?,
        csv::Reader::from_path(tracking)?,
    )?;
    info!(frames = track.len(), %classification, "loaded target track");
    Ok(track)
}

#[cfg(test)]
mod targets_test {
    use super::*;

    #[test]
    fn test_only_labeled_trajectories() {
        let classification = "\
trajectoryId,frameStart,frameEnd,label,directionScore,r2,meanAnchorDistance,anchorDistanceStdDev,distOK,lenOK,dirOK,ptStd,stdX,stdY,stdZ
1,0,1,true,0.1,0.9,inf,0.0,true,true,true,0.0,0.0,0.0,0.0
2,0,1,false,NaN,-1.0,10.0,1.0,true,true,false,0.0,NaN,NaN,NaN
";
        let tracking = "\
trajectoryId,frame,x,y,z
1,0,1.0,2.0,3.0
2,0,5.0,5.0,5.0
1,1,1.5,2.0,3.0
2,1,5.0,5.0,5.0
";
        let track = read_target_track(
            csv::Reader::from_reader(classification.as_bytes()),
            csv::Reader::from_reader(tracking.as_bytes()),
        )
        .unwrap();
        assert_eq!(track.len(), 2);
        assert_eq!(track.get(1), Some(&(1, Position::new(1.5, 2.0, 3.0))));
    }
}
