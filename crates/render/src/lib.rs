//! # render
//!
//! Wrapper around an external render tool (ffmpeg) used for
//! post-processing raw captures: argument templates with named
//! placeholders, diagnostic-stream progress parsing, bounded retry on
//! transient failures, and sequential multi-pass pipelines sharing one
//! staging directory.

use thiserror::Error;

mod invoke;
mod pipeline;
mod progress;
mod template;

pub use invoke::{DEFAULT_TRANSIENT_PHRASES, RenderProgress, RenderTool, RetryBudget};
pub use pipeline::{OutputJob, PipelineStep, reset_staging, run_output};
pub use progress::{format_timestamp, parse_duration_total, parse_elapsed};
pub use template::{StageContext, substitute_args};

/// Errors surfaced by render invocations and pipelines.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to spawn render tool `{binary}`: {source}")]
    Spawn {
        binary: String,
        source: std::io::Error,
    },

    #[error("unknown placeholder `{{{name}}}`")]
    UnknownPlaceholder { name: String },

    #[error("render tool failed: {diagnostic}")]
    Tool { diagnostic: String },

    #[error("render cancelled")]
    Cancelled,
}
