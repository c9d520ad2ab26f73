use std::path::{Path, PathBuf};

use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::debug;

use crate::config::Config;
use crate::error::RecordError;
use crate::segment::NormalizedSegment;

const TOKEN_PREFIX: &str = "demrec_";
const TOKEN_RANDOM_LEN: usize = 8;

/// One recording session's isolated on-disk state: a random token, a
/// scratch directory under the game's `cfg/` and a capture profile in
/// the companion's profile store. Everything is removed on cleanup.
#[derive(Debug)]
pub struct Session {
    pub token: String,
    /// `<game>/cfg/<token>`, holds the patched demo, its action script
    /// and the per-segment command files.
    pub scratch_dir: PathBuf,
    pub demo_path: PathBuf,
    pub script_path: PathBuf,
    pub log_path: PathBuf,
    profile_path: PathBuf,
}

impl Session {
    /// Creates the scratch directory and writes the capture profile.
    ///
    /// A session that fails partway through setup removes whatever it
    /// already put on disk before the error surfaces.
    pub async fn create(game_dir: &Path, config: &Config) -> Result<Self, RecordError> {
        let token = session_token();
        let scratch_dir = game_dir.join("cfg").join(&token);
        let demo_path = scratch_dir.join("demo.dem");
        let script_path = vdm::script_path_for(&demo_path);
        let log_path = scratch_dir.join("console.log");
        let profiles_dir = config.general.svr_dir.join("data").join("profiles");
        let profile_path = profiles_dir.join(format!("{token}.ini"));

        let session = Self {
            token,
            scratch_dir,
            demo_path,
            script_path,
            log_path,
            profile_path,
        };
        if let Err(e) = session.materialize(&profiles_dir, config).await {
            session.cleanup().await;
            return Err(e.into());
        }

        debug!(token = %session.token, dir = %session.scratch_dir.display(), "session created");
        Ok(session)
    }

    async fn materialize(&self, profiles_dir: &Path, config: &Config) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        tokio::fs::create_dir_all(profiles_dir).await?;
        tokio::fs::write(&self.profile_path, config.profile_contents()).await
    }

    /// Writes each segment's command file and returns the `exec` paths,
    /// indexed like `segments`. Segments without commands get `None`.
    pub async fn write_command_files(
        &self,
        segments: &[NormalizedSegment],
    ) -> Result<Vec<Option<String>>, RecordError> {
        let mut exec_paths = Vec::with_capacity(segments.len());
        for seg in segments {
            match &seg.cmd {
                Some(cmd) => {
                    let name = format!("cmd_{}.cfg", seg.index);
                    tokio::fs::write(self.scratch_dir.join(&name), cmd).await?;
                    // exec resolves relative to cfg/.
                    exec_paths.push(Some(format!("{}/{name}", self.token)));
                }
                None => exec_paths.push(None),
            }
        }
        Ok(exec_paths)
    }

    /// Demo path as passed to `playdemo`, relative to the game dir.
    pub fn playdemo_path(&self) -> String {
        format!("cfg/{}/demo.dem", self.token)
    }

    /// Removes every trace of the session. Missing pieces are fine.
    pub async fn cleanup(&self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.scratch_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(dir = %self.scratch_dir.display(), error = %e, "scratch removal failed");
            }
        }
        let _ = tokio::fs::remove_file(&self.profile_path).await;
        debug!(token = %self.token, "session cleaned up");
    }
}

fn session_token() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{TOKEN_PREFIX}{}", suffix.to_lowercase())
}
