//! # dem
//!
//! Parsing and patching for Source engine demo (`.dem`) files.
//!
//! Only the pieces the recorder needs are implemented: the fixed-size
//! file header (map name, tick count) and the embedded game-directory
//! token inside the signon payload, which is rewritten so a replayed
//! demo picks up an isolated config directory.

use thiserror::Error;

mod header;
mod patch;

pub use header::{DEMO_MAGIC, DemoHeader, DemoInfo, HEADER_SIZE};
pub use patch::{GAME_DIR_ANCHORS, patch_game_dir_token, read_game_dir_token};

/// Errors for demo file parsing and patching.
#[derive(Debug, Error)]
pub enum DemError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid demo file magic (expected HL2DEMO)")]
    InvalidMagic,

    #[error("demo header field `{field}` is not valid UTF-8")]
    InvalidString { field: &'static str },

    #[error("game directory anchor signature not found in signon data")]
    AnchorNotFound,

    #[error("game directory token is not NUL-terminated")]
    UnterminatedToken,

    #[error("replacement token of {len} bytes does not fit the length byte")]
    TokenTooLong { len: usize },
}
