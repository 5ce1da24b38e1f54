//! Progress reporting for long pipeline runs.
//!
//! [`ProgressReporter`] aggregates the per-shard frame counts sent by the workers and logs
//! them at a fixed wall-clock interval, with a smoothed throughput ([`FrameRate`]) and the
//! remaining time it implies. With the `progress` feature it also drives an `indicatif` bar.
use std::time::{Duration, Instant};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Frames per second, smoothed over successive reports.
///
/// `rate ← α·sample + (1–α)·rate`; the first sample initializes the rate.
#[derive(Debug, Clone)]
pub struct FrameRate {
    alpha: f64,
    rate: Option<f64>,
    last: Instant,
}

impl FrameRate {
    pub fn new(alpha: f64, start: Instant) -> Self {
        FrameRate {
            alpha,
            rate: None,
            last: start,
        }
    }

    /// Account for `frames` processed between the previous update and `now`.
    ///
    /// Return
    /// ----------
    /// * The smoothed rate; unchanged when no time elapsed.
    pub fn update(&mut self, frames: u64, now: Instant) -> f64 {
        let secs = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        if secs > 0.0 {
            let sample = frames as f64 / secs;
            self.rate = Some(match self.rate {
                None => sample,
                Some(rate) => self.alpha * sample + (1.0 - self.alpha) * rate,
            });
        }
        self.per_sec()
    }

    pub fn per_sec(&self) -> f64 {
        self.rate.unwrap_or(0.0)
    }

    /// Time needed for `remaining` frames at the current rate.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        match self.rate {
            Some(rate) if rate > 0.0 => Some(Duration::from_secs_f64(remaining as f64 / rate)),
            _ => None,
        }
    }
}

/// Wall time as `"850ms"`, `"12.4s"`, `"3m07s"` or `"2h05m"`.
pub fn fmt_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    match secs {
        0 => format!("{}ms", d.as_millis()),
        1..=59 => format!("{:.1}s", d.as_secs_f64()),
        60..=3599 => format!("{}m{:02}s", secs / 60, secs % 60),
        _ => format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60),
    }
}

/// Aggregated progress of every shard of a run.
pub struct ProgressReporter {
    total_frames: u64,
    shard_frames: Vec<u64>,
    shard_open: Vec<usize>,
    interval: Duration,
    started: Instant,
    last_report: Instant,
    frames_at_last_report: u64,
    rate: FrameRate,
    #[cfg(feature = "progress")]
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Arguments
    /// -----------------
    /// * `total_frames`: number of frame indices owned by all shards together.
    /// * `shards`: number of shards reporting.
    /// * `interval`: minimum wall time between two log lines.
    pub fn new(total_frames: u64, shards: usize, interval: Duration) -> Self {
        let now = Instant::now();

        #[cfg(feature = "progress")]
        let bar = {
            let pb = ProgressBar::new(total_frames.max(1));
            let style = ProgressStyle::with_template(
                "{bar:40.cyan/blue} {pos}/{len} frames ({percent:>3}%) | {per_sec} | ETA {eta_precise} | {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            pb.enable_steady_tick(Duration::from_millis(200));
            pb
        };

        ProgressReporter {
            total_frames,
            shard_frames: vec![0; shards],
            shard_open: vec![0; shards],
            interval,
            started: now,
            last_report: now,
            frames_at_last_report: 0,
            rate: FrameRate::new(0.3, now),
            #[cfg(feature = "progress")]
            bar,
        }
    }

    /// Record that `shard` finished `frames` more frames of its own range and now holds
    /// `open` open trajectories.
    pub fn advance(&mut self, shard: usize, frames: u64, open: usize) {
        if let Some(count) = self.shard_frames.get_mut(shard) {
            *count += frames;
        }
        if let Some(count) = self.shard_open.get_mut(shard) {
            *count = open;
        }

        #[cfg(feature = "progress")]
        self.bar.inc(frames);

        if self.last_report.elapsed() >= self.interval {
            self.report();
        }
    }

    /// Frames processed so far, all shards together.
    pub fn frames_done(&self) -> u64 {
        self.shard_frames.iter().sum()
    }

    pub fn shard_frames(&self) -> &[u64] {
        &self.shard_frames
    }

    pub fn shard_open(&self) -> &[usize] {
        &self.shard_open
    }

    fn report(&mut self) {
        let now = Instant::now();
        let done = self.frames_done();
        let rate = self
            .rate
            .update(done.saturating_sub(self.frames_at_last_report), now);
        let eta = self
            .rate
            .eta(self.total_frames.saturating_sub(done))
            .map_or_else(|| "?".to_string(), fmt_elapsed);
        let percent = if self.total_frames == 0 {
            100.0
        } else {
            100.0 * done as f64 / self.total_frames as f64
        };

        info!(
            frames = done,
            total = self.total_frames,
            percent = format_args!("{percent:.1}"),
            frames_per_sec = format_args!("{rate:.0}"),
            eta = %eta,
            shard_frames = ?self.shard_frames,
            shard_open = ?self.shard_open,
            "progress"
        );

        #[cfg(feature = "progress")]
        self.bar.set_message(format!(
            "open: {}",
            self.shard_open.iter().sum::<usize>()
        ));

        self.last_report = now;
        self.frames_at_last_report = done;
    }

    /// Stop the bar and return the total elapsed time.
    pub fn finish(self) -> Duration {
        #[cfg(feature = "progress")]
        self.bar.finish_and_clear();

        let elapsed = self.started.elapsed();
        info!(
            frames = self.frames_done(),
            elapsed = %fmt_elapsed(elapsed),
            "all shards done"
        );
        elapsed
    }
}

#[cfg(test)]
mod progress_test {
    use super::*;

    #[test]
    fn test_fmt_elapsed() {
        assert_eq!(fmt_elapsed(Duration::from_millis(850)), "850ms");
        assert_eq!(fmt_elapsed(Duration::from_millis(12_400)), "12.4s");
        assert_eq!(fmt_elapsed(Duration::from_secs(187)), "3m07s");
        assert_eq!(fmt_elapsed(Duration::from_secs(7_500)), "2h05m");
    }

    #[test]
    fn test_frame_rate_smoothing() {
        let t0 = Instant::now();
        let mut rate = FrameRate::new(0.5, t0);
        assert_eq!(rate.per_sec(), 0.0);
        assert_eq!(rate.eta(100), None);

        // first sample initializes the rate
        let r = rate.update(2_000, t0 + Duration::from_secs(2));
        assert!((r - 1_000.0).abs() < 1e-9);
        // 3000 frames/s, averaged with α = 0.5
        let r = rate.update(3_000, t0 + Duration::from_secs(3));
        assert!((r - 2_000.0).abs() < 1e-9);
        // no elapsed time: unchanged
        let r = rate.update(500, t0 + Duration::from_secs(3));
        assert!((r - 2_000.0).abs() < 1e-9);

        assert_eq!(rate.eta(4_000), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_reporter_accumulates_per_shard() {
        let mut reporter = ProgressReporter::new(100, 2, Duration::from_secs(3600));
        reporter.advance(0, 10, 4);
        reporter.advance(1, 5, 2);
        reporter.advance(0, 3, 1);
        // unknown shard ids are ignored
        reporter.advance(7, 1000, 9);
        assert_eq!(reporter.shard_frames(), &[13, 5]);
        assert_eq!(reporter.shard_open(), &[1, 2]);
        assert_eq!(reporter.frames_done(), 18);
        reporter.finish();
    }
}
