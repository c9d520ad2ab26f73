use std::path::Path;

use async_trait::async_trait;

/// Control capability over the running game process. Implementations
/// deliver console commands however the platform allows (re-invocation
/// with `-hijack`, IPC, a test double).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GameProcess: Send + Sync {
    /// True while the target process is alive.
    fn is_running(&self) -> bool;

    /// Delivers one console command line. Commands sent back to back
    /// arrive in order.
    async fn send(&self, command: &str) -> std::io::Result<()>;

    /// Requests process exit; tolerates an already-exited process.
    async fn exit(&self) -> std::io::Result<()>;
}

/// Directory layout discovered at launch time.
pub trait Environment: Send + Sync {
    /// Game installation directory, the one containing `cfg/`.
    fn game_dir(&self) -> &Path;

    /// Capture staging directory where raw movie files land.
    fn staging_dir(&self) -> &Path;
}

/// Plain value implementation of [`Environment`].
#[derive(Debug, Clone)]
pub struct GameEnvironment {
    pub game_dir: std::path::PathBuf,
    pub staging_dir: std::path::PathBuf,
}

impl Environment for GameEnvironment {
    fn game_dir(&self) -> &Path {
        &self.game_dir
    }

    fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }
}
