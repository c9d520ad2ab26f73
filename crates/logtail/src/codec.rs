use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// Marker code echoed when a seek/skip phase starts.
pub const CODE_SKIP_START: u32 = 2;
/// Marker code echoed when a recording pass ends.
pub const CODE_RECORD_END: u32 = 5;
/// Marker code echoed for recording; with a progress bracket it is a
/// progress update, without one it marks the start of the pass.
pub const CODE_RECORD: u32 = 6;

/// Free-text line the engine prints when the demo's map is absent.
static MAP_MISSING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Missing map maps/(.+)\.bsp").expect("static pattern"));

/// Free-text line the render companion prints once every output file is
/// flushed. Authoritative completion, independent of marker traffic.
const MOVIE_ENDED: &str = "Movie ended";

/// Structured telemetry decoded from console log chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    SkipStart { segment: usize },
    RecordStart { segment: usize },
    RecordProgress { segment: usize, percent: u8 },
    RecordEnd { segment: usize },
    MapMissing { map: String },
    MovieEnded,
}

/// Decoder for `[token][segment][c1,c2,...][progress]` markers.
///
/// Markers carrying a foreign session token are ignored. The console
/// may wrap a marker across physical lines, so embedded line breaks are
/// stripped before scanning; a chunk never splits a marker at its
/// boundary.
pub struct MarkerCodec {
    marker: Regex,
}

impl MarkerCodec {
    pub fn new(session_token: &str) -> Self {
        let pattern = format!(
            r"\[{}\]\[(\d+)\]\[(\d+(?:,\d+)*)\](?:\[(\d+)\])?",
            regex::escape(session_token)
        );
        Self {
            // The token is escaped, so the pattern is always valid.
            marker: Regex::new(&pattern).expect("escaped marker pattern"),
        }
    }

    /// Decodes every event in `chunk`, preserving on-disk order of the
    /// markers. Out-of-band signals are appended after marker events:
    /// both are terminal for their request, so nothing is ordered
    /// behind them.
    pub fn decode(&self, chunk: &str) -> Vec<LogEvent> {
        let mut events = Vec::new();

        let stripped: String = chunk.replace(['\r', '\n'], "");
        for capture in self.marker.captures_iter(&stripped) {
            let Ok(segment) = capture[1].parse::<usize>() else {
                continue;
            };
            let progress = match capture.get(3) {
                None => None,
                Some(p) => match p.as_str().parse::<u8>() {
                    Ok(percent) if percent <= 100 => Some(percent),
                    _ => {
                        debug!(marker = &capture[0], "marker progress out of range");
                        continue;
                    }
                },
            };
            for code in capture[2].split(',') {
                match (code.parse::<u32>(), progress) {
                    (Ok(CODE_SKIP_START), _) => events.push(LogEvent::SkipStart { segment }),
                    (Ok(CODE_RECORD_END), _) => events.push(LogEvent::RecordEnd { segment }),
                    (Ok(CODE_RECORD), Some(percent)) => {
                        events.push(LogEvent::RecordProgress { segment, percent });
                    }
                    (Ok(CODE_RECORD), None) => events.push(LogEvent::RecordStart { segment }),
                    (Ok(other), _) => {
                        debug!(code = other, segment, "unknown marker code");
                    }
                    (Err(_), _) => {}
                }
            }
        }

        for line in chunk.lines() {
            if let Some(capture) = MAP_MISSING.captures(line) {
                events.push(LogEvent::MapMissing {
                    map: capture[1].to_owned(),
                });
            } else if line.contains(MOVIE_ENDED) {
                events.push(LogEvent::MovieEnded);
            }
        }

        events
    }
}
