#![allow(dead_code)]

use perchtrack::constants::{FrameIndex, Position, TimestampMillis};
use perchtrack::frames::{FrameRecord, IdentifiedBody, Observation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const T0: TimestampMillis = 1_489_504_166_535;

pub fn timestamp(frame: FrameIndex) -> TimestampMillis {
    T0 + 5 * frame
}

/// Straight motion: `origin + velocity * (frame - start)` for every frame of `frames`.
pub fn linear_track(
    frames: std::ops::Range<FrameIndex>,
    origin: Position,
    velocity: Position,
) -> Vec<(FrameIndex, Position)> {
    let start = frames.start;
    frames
        .map(|f| (f, origin + velocity * (f - start) as f64))
        .collect()
}

/// Group per-point tracks into one observation list per frame, in track order.
pub fn observations_by_frame(
    tracks: &[Vec<(FrameIndex, Position)>],
    frames: std::ops::Range<FrameIndex>,
) -> Vec<(FrameIndex, Vec<Observation>)> {
    let start = frames.start;
    let mut out: Vec<(FrameIndex, Vec<Observation>)> =
        frames.clone().map(|f| (f, Vec::new())).collect();
    for track in tracks {
        for &(f, p) in track {
            if frames.contains(&f) {
                out[(f - start) as usize]
                    .1
                    .push(Observation::bare(f, timestamp(f), p));
            }
        }
    }
    out
}

/// A rigid body of three markers whose centroid is exactly `centroid`.
pub fn body(label: &str, centroid: Position) -> IdentifiedBody {
    let offsets = [
        Position::new(12.0, 0.0, 0.0),
        Position::new(-6.0, 9.0, 0.0),
        Position::new(-6.0, -9.0, 0.0),
    ];
    IdentifiedBody::new(label, offsets.iter().map(|o| centroid + o))
        .expect("markers are finite")
}

/// Centroid of the animal: perched at `perch` until `takeoff`, then climbing 4 mm per frame.
pub fn perch_then_climb(frame: FrameIndex, perch: Position, takeoff: FrameIndex) -> Position {
    if frame < takeoff {
        perch
    } else {
        perch + Position::new(0.0, 0.0, 4.0 * (frame - takeoff + 1) as f64)
    }
}

/// The target stimulus: flies along +y at 3 mm per frame on the plane `z = 0.5·y + 1200`,
/// with a ±2 mm wobble on x.
pub fn stimulus_position(frame: FrameIndex, start: FrameIndex) -> Position {
    let y = -1000.0 + 3.0 * (frame - start) as f64;
    let x = 1500.0 + if frame % 2 == 0 { 2.0 } else { -2.0 };
    Position::new(x, y, 0.5 * y + 1200.0)
}

/// Full capture scene of `n` frames:
///
/// * the animal (`Yframe`) perched at the origin, 100 mm high, taking off at `takeoff`;
/// * a marker carried by the animal, 30 mm beside its centroid;
/// * a static reflection;
/// * the target stimulus from `stimulus_start` on.
pub fn capture_scene(n: FrameIndex, takeoff: FrameIndex, stimulus_start: FrameIndex) -> Vec<FrameRecord> {
    let perch = Position::new(0.0, 0.0, 100.0);
    (0..n)
        .map(|f| {
            let animal = perch_then_climb(f, perch, takeoff);
            let mut points = vec![
                animal + Position::new(30.0, 0.0, 0.0),
                Position::new(-2000.0, 500.0, 50.0),
            ];
            if f >= stimulus_start {
                points.push(stimulus_position(f, stimulus_start));
            }
            FrameRecord::new(f, timestamp(f), vec![body("Yframe", animal)], points)
        })
        .collect()
}

/// Random scene: `targets` straight-flying points with random start, duration, origin and
/// velocity, plus `statics` fixed markers with sub-millimetre noise.
pub fn random_scene(seed: u64, n: FrameIndex, targets: usize, statics: usize) -> Vec<FrameRecord> {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut tracks: Vec<Vec<(FrameIndex, Position)>> = Vec::new();
    for k in 0..targets {
        let start = rng.random_range(0..n - 250);
        let len = rng.random_range(220..=(n - start).min(900));
        // keep the targets 1 m apart so they never compete
        let origin = Position::new(
            1000.0 * k as f64,
            rng.random_range(-500.0..500.0),
            rng.random_range(400.0..800.0),
        );
        let velocity = Position::new(
            rng.random_range(-0.5..0.5),
            rng.random_range(2.0..6.0),
            rng.random_range(-0.2..0.2),
        );
        tracks.push(linear_track(start..start + len, origin, velocity));
    }
    for k in 0..statics {
        let anchor = Position::new(-3000.0 - 500.0 * k as f64, 0.0, 20.0);
        tracks.push(
            (0..n)
                .map(|f| {
                    let noise = Position::new(
                        rng.random_range(-0.3..0.3),
                        rng.random_range(-0.3..0.3),
                        rng.random_range(-0.3..0.3),
                    );
                    (f, anchor + noise)
                })
                .collect(),
        );
    }

    observations_by_frame(&tracks, 0..n)
        .into_iter()
        .map(|(f, obs)| {
            FrameRecord::new(f, timestamp(f), vec![], obs.into_iter().map(|o| o.position))
        })
        .collect()
}
