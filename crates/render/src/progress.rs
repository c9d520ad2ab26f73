//! Parsing of the render tool's diagnostic stream.
//!
//! ffmpeg prints one `Duration: HH:MM:SS.ms,` line for the input and
//! periodic `time=HH:MM:SS.ms` lines while encoding; together they give
//! a completion percentage.

/// Parse a `HH:MM:SS.ms` time string to seconds.
pub(crate) fn parse_time(time_str: &str) -> Option<f64> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Parse the total duration from a `Duration: HH:MM:SS.ms,` line.
pub fn parse_duration_total(line: &str) -> Option<f64> {
    let start = line.find("Duration: ")?;
    let rest = &line[start + 10..];
    let end = rest.find(',').unwrap_or(rest.len());
    parse_time(rest[..end].trim())
}

/// Parse the elapsed time from a `time=HH:MM:SS.ms` progress line.
pub fn parse_elapsed(line: &str) -> Option<f64> {
    let start = line.find("time=")?;
    let rest = &line[start + 5..];
    let end = rest.find(' ').unwrap_or(rest.len());
    parse_time(rest[..end].trim())
}

/// Format seconds as `H:MM:SS.mmm` for render tool arguments.
pub fn format_timestamp(secs: f64) -> String {
    let sign = if secs < 0.0 { "-" } else { "" };
    let total_ms = (secs.abs() * 1000.0).round() as u64;

    let ms = total_ms % 1000;
    let s = total_ms / 1000 % 60;
    let m = total_ms / 60_000 % 60;
    let h = total_ms / 3_600_000;

    format!("{sign}{h}:{m:02}:{s:02}.{ms:03}")
}
