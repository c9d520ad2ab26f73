use std::path::PathBuf;

use thiserror::Error;

/// Every way a recording request can fail.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("output directory `{path}` is not usable: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no demo file provided")]
    NoDemo,

    #[error("demo file `{path}` not found")]
    DemoNotFound { path: PathBuf },

    #[error("invalid demo header: {source}")]
    InvalidDemoHeader {
        #[source]
        source: dem::DemError,
    },

    #[error("failed to patch demo for isolated playback: {source}")]
    DemoPatch {
        #[source]
        source: dem::DemError,
    },

    #[error("segment {segment} has an invalid tick range")]
    InvalidTickRange { segment: usize },

    #[error("segments {first} and {second} overlap")]
    OverlappingTicks { first: usize, second: usize },

    #[error("segment {segment} pre-roll reaches before the demo start")]
    PreRollBeforeStart { segment: usize },

    #[error("game process is not running")]
    GameNotRunning,

    #[error("a recording is already in flight")]
    Busy,

    #[error("the game is missing map `{map}`")]
    MapMissing { map: String },

    #[error(transparent)]
    Render(#[from] render::RenderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("recording cancelled")]
    Cancelled,
}

impl RecordError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// True for failures of the request itself, detectable before the
    /// game is touched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::NoDemo
                | Self::DemoNotFound { .. }
                | Self::InvalidDemoHeader { .. }
                | Self::InvalidTickRange { .. }
                | Self::OverlappingTicks { .. }
                | Self::PreRollBeforeStart { .. }
        )
    }
}

impl From<dem::DemError> for RecordError {
    fn from(source: dem::DemError) -> Self {
        match source {
            dem::DemError::AnchorNotFound
            | dem::DemError::UnterminatedToken
            | dem::DemError::TokenTooLong { .. } => Self::DemoPatch { source },
            _ => Self::InvalidDemoHeader { source },
        }
    }
}
