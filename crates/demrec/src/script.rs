//! Per-segment action script synthesis.
//!
//! One replay pass visits every segment in order. At each boundary the
//! script seeks to the next range, starts or continues a capture pass,
//! streams progress markers across the range and tears everything down
//! after the last segment. Marker echoes use the session token so a
//! log decoder can attribute them.

use logtail::{CODE_RECORD, CODE_RECORD_END, CODE_SKIP_START};
use vdm::Script;

use crate::segment::NormalizedSegment;

/// Builds the action script driving one replay pass.
///
/// `exec_paths[i]` holds the `exec`-relative path of segment `i`'s
/// command file, when it has one. `profile` is the capture profile name
/// passed to `startmovie`.
pub fn synthesize(
    token: &str,
    profile: &str,
    segments: &[NormalizedSegment],
    exec_paths: &[Option<String>],
) -> Script {
    let mut script = Script::new();
    let mut prev: Option<&NormalizedSegment> = None;

    for seg in segments {
        let continues = prev.is_some_and(|p| p.output == seg.output);
        let prev_end = prev.map_or(0, |p| p.end);

        // Seek to the range, closing out the previous pass first.
        if seg.start != prev_end || prev.is_some() {
            let mut fragments: Vec<String> = Vec::new();
            if let Some(p) = prev {
                if !continues {
                    fragments.push("endmovie".to_owned());
                }
                fragments.push(marker(token, p.index, CODE_RECORD_END));
            }
            fragments.push(marker(token, seg.index, CODE_SKIP_START));
            fragments.push(format!("demo_gototick {}", seg.start));
            script.add_action(prev_end, fragments);
        }

        let exec = exec_paths
            .get(seg.index)
            .and_then(|p| p.as_deref())
            .map(|p| format!("exec {p}"));

        // Pre-roll runs the segment commands ahead of capture.
        if seg.pre > 0 {
            if let Some(cmd) = &exec {
                script.add_action(seg.start - seg.pre, [cmd.as_str()]);
            }
        }

        let mut start_fragments: Vec<String> = Vec::new();
        if seg.pre == 0 {
            if let Some(cmd) = &exec {
                start_fragments.push(cmd.clone());
            }
        }
        if !continues {
            start_fragments.push(format!("startmovie {}.mp4 {profile}", seg.output));
        }
        start_fragments.push(marker(token, seg.index, CODE_RECORD));
        script.add_action(seg.start, start_fragments);

        script.add_range(
            seg.start,
            seg.end,
            &format!("echo [{token}][{}][{CODE_RECORD}][{{step}}]", seg.index),
            "{step}",
        );

        prev = Some(seg);
    }

    if let Some(last) = prev {
        script.add_action(
            last.end,
            [
                marker(token, last.index, CODE_RECORD_END),
                "endmovie".to_owned(),
                "stopdemo".to_owned(),
            ],
        );
    }

    script
}

fn marker(token: &str, segment: usize, code: u32) -> String {
    format!("echo [{token}][{segment}][{code}]")
}
