use std::collections::HashMap;

use serde::Deserialize;

use crate::error::RecordError;

/// A recording must cover at least this many ticks to be worth a pass.
pub const MIN_RANGE_TICKS: u32 = 10;

/// One requested clip, as supplied by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct Segment {
    /// Inclusive start and end tick of the clip.
    pub ticks: (u32, u32),
    /// Ticks of pre-roll ahead of the range where the segment command
    /// file runs, letting effects settle before capture starts.
    #[serde(default)]
    pub pre: u32,
    /// Ticks of padding the range is widened by on both sides.
    #[serde(default)]
    pub padding: u32,
    /// Console commands written to a per-segment command file.
    #[serde(default)]
    pub cmd: Option<String>,
    /// Output name; consecutive segments may share one to append into
    /// the same recording pass.
    pub output: String,
    /// Named substitutions for this output's render pipeline.
    #[serde(default)]
    pub vars: HashMap<String, String>,
}

/// A segment after padding expansion and validation against the demo.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSegment {
    pub index: usize,
    pub start: u32,
    pub end: u32,
    pub pre: u32,
    pub padding: u32,
    pub cmd: Option<String>,
    pub output: String,
    pub vars: HashMap<String, String>,
}

impl NormalizedSegment {
    pub fn len_ticks(&self) -> u32 {
        self.end - self.start
    }
}

/// Expands padding and validates every segment against the demo's tick
/// count. Segments must arrive in ascending, non-overlapping order.
pub fn normalize(
    segments: &[Segment],
    total_ticks: u32,
) -> Result<Vec<NormalizedSegment>, RecordError> {
    if segments.is_empty() {
        return Err(RecordError::configuration("no segments provided"));
    }

    let mut normalized = Vec::with_capacity(segments.len());
    for (index, seg) in segments.iter().enumerate() {
        let (raw_start, raw_end) = seg.ticks;
        let start = raw_start.saturating_sub(seg.padding).min(total_ticks);
        let end = raw_end.saturating_add(seg.padding).min(total_ticks);

        if end.saturating_sub(start) < MIN_RANGE_TICKS {
            return Err(RecordError::InvalidTickRange { segment: index });
        }
        if start.checked_sub(seg.pre).is_none() {
            return Err(RecordError::PreRollBeforeStart { segment: index });
        }

        normalized.push(NormalizedSegment {
            index,
            start,
            end,
            pre: seg.pre,
            padding: seg.padding,
            cmd: seg.cmd.clone(),
            output: seg.output.clone(),
            vars: seg.vars.clone(),
        });
    }

    // Ranges must be disjoint even at their boundary ticks, otherwise
    // a stop and a start action would land on the same tick.
    for pair in normalized.windows(2) {
        if pair[1].start <= pair[0].end {
            return Err(RecordError::OverlappingTicks {
                first: pair[0].index,
                second: pair[1].index,
            });
        }
    }

    Ok(normalized)
}
