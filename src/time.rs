use hifitime::Epoch;

use crate::constants::TimestampMillis;

/// Render a capture timestamp as a UTC date string, truncated to the second.
///
/// Argument
/// --------
/// * `timestamp`: milliseconds since the Unix epoch, as stored in the frame records
///
/// Return
/// ------
/// * a string in the format `YYYY-MM-DD HH:MM:SS`
///
/// Older capture files carry a zero timestamp; they render as `1970-01-01 00:00:00`.
pub fn timestamp_to_utc_string(timestamp: TimestampMillis) -> String {
    let seconds = timestamp.div_euclid(1000);
    let epoch = Epoch::from_unix_seconds(seconds as f64);
    let (year, month, day, hour, minute, second, _) = epoch.to_gregorian_utc();
    format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}")
}
