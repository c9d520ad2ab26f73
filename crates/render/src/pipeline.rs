use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::RenderError;
use crate::invoke::{RenderProgress, RenderTool};
use crate::template::{StageContext, substitute_args};

/// One configured pass: an ordered argument template with named
/// placeholders. Immutable once loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStep {
    pub args: Vec<String>,
}

/// Everything needed to post-process one output name.
pub struct OutputJob<'a> {
    /// Raw captured video deposited by the companion process.
    pub raw_video: PathBuf,
    /// Raw captured audio next to the video.
    pub raw_audio: PathBuf,
    /// Final artifact path.
    pub final_output: PathBuf,
    /// Shared staging directory all passes work in.
    pub staging_dir: &'a Path,
    /// Clip duration in seconds.
    pub duration_secs: f64,
    /// Pre-roll duration in seconds.
    pub pre_secs: f64,
    /// Clip duration with post-padding trimmed, in seconds.
    pub trimmed_secs: f64,
    /// Segment-specific named substitutions.
    pub vars: &'a HashMap<String, String>,
}

// Every invocation overwrites silently and skips the banner.
const TAIL_ARGS: [&str; 2] = ["-hide_banner", "-y"];

/// Runs the configured passes for one output, strictly sequentially.
///
/// The raw capture is first muxed (video stream-copied, audio
/// transcoded to AAC); with no configured pipeline that mux writes the
/// final output directly. Otherwise pass `i` consumes pass `i-1`'s
/// intermediate and the consumed intermediate is deleted once the next
/// pass has finished with it; the last pass writes the final output.
pub async fn run_output(
    tool: &RenderTool,
    steps: &[PipelineStep],
    job: &OutputJob<'_>,
    cancel: &CancellationToken,
    on_progress: &mut (dyn FnMut(usize, RenderProgress) + Send),
) -> Result<PathBuf, RenderError> {
    let mux_target = if steps.is_empty() {
        job.final_output.clone()
    } else {
        job.staging_dir.join("stage0.mp4")
    };

    info!(output = %job.final_output.display(), passes = steps.len() + 1, "post-processing output");

    let mux_args = mux_pass_args(job, &mux_target);
    tool.run(&mux_args, job.staging_dir, cancel, &mut |p| on_progress(0, p))
        .await?;

    let mut prev = mux_target;
    for (i, step) in steps.iter().enumerate() {
        let last = i + 1 == steps.len();
        let next = if last {
            job.final_output.clone()
        } else {
            job.staging_dir.join(format!("stage{}.mp4", i + 1))
        };

        let ctx = StageContext {
            prev: &prev,
            next: &next,
            dir: job.staging_dir,
            out: &job.final_output,
            duration_secs: job.duration_secs,
            pre_secs: job.pre_secs,
            trimmed_secs: job.trimmed_secs,
            vars: job.vars,
        };
        let mut args = substitute_args(&step.args, &ctx)?;
        args.extend(TAIL_ARGS.iter().map(|a| (*a).to_owned()));

        let pass = i + 1;
        tool.run(&args, job.staging_dir, cancel, &mut |p| on_progress(pass, p))
            .await?;

        // The consumed intermediate is no longer an input for anything.
        debug!(path = %prev.display(), "removing consumed intermediate");
        let _ = tokio::fs::remove_file(&prev).await;
        prev = next;
    }

    Ok(job.final_output.clone())
}

fn mux_pass_args(job: &OutputJob<'_>, target: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-i".into(),
        job.raw_video.display().to_string(),
        "-i".into(),
        job.raw_audio.display().to_string(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        target.display().to_string(),
    ];
    args.extend(TAIL_ARGS.iter().map(|a| (*a).to_owned()));
    args
}

/// Purges and recreates the shared staging directory.
pub async fn reset_staging(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(dir).await
}
