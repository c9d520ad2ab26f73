use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use demrec_engine::GameProcess;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::debug;

/// Console access to a Source engine game through executable
/// re-invocation: launching the game binary again with `-hijack` hands
/// the `+command` arguments to the already running instance instead of
/// starting a second one.
pub struct HijackProcess {
    game_exe: PathBuf,
    child: Mutex<Option<Child>>,
}

impl HijackProcess {
    /// Attaches to a game instance this process did not start. Without
    /// a child handle, liveness is assumed and failures surface on the
    /// first delivery instead.
    pub fn attach(game_exe: impl Into<PathBuf>) -> Self {
        Self {
            game_exe: game_exe.into(),
            child: Mutex::new(None),
        }
    }

    /// Wraps an instance launched by us, so liveness checks can poll
    /// the child.
    pub fn from_child(game_exe: impl Into<PathBuf>, child: Child) -> Self {
        Self {
            game_exe: game_exe.into(),
            child: Mutex::new(Some(child)),
        }
    }

    async fn deliver(&self, command: &str) -> std::io::Result<()> {
        debug!(command, "delivering console command");
        let mut invocation = Command::new(&self.game_exe);
        invocation
            .arg("-hijack")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        for part in command.split("; ") {
            invocation.arg(format!("+{part}"));
        }
        let status = invocation.status().await?;
        if !status.success() {
            return Err(std::io::Error::other(format!(
                "console command delivery exited with {status}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl GameProcess for HijackProcess {
    fn is_running(&self) -> bool {
        match self.child.try_lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(child) => matches!(child.try_wait(), Ok(None)),
                None => true,
            },
            // Someone else is holding the handle, so it exists.
            Err(_) => true,
        }
    }

    async fn send(&self, command: &str) -> std::io::Result<()> {
        self.deliver(command).await
    }

    async fn exit(&self) -> std::io::Result<()> {
        if self.deliver("quit").await.is_ok() {
            return Ok(());
        }
        // No console path left; fall back to killing our own child.
        if let Some(child) = self.child.lock().await.as_mut() {
            child.kill().await?;
        }
        Ok(())
    }
}
