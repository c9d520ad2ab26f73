use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::RenderError;
use crate::progress::{parse_duration_total, parse_elapsed};

/// Diagnostic phrases that indicate a transient failure worth retrying,
/// typically a raw capture that the companion process has not finished
/// flushing yet. The set is configurable; these are the two observed
/// defaults.
pub const DEFAULT_TRANSIENT_PHRASES: [&str; 2] = [
    "Invalid data found when processing input",
    "Resource temporarily unavailable",
];

/// Fixed retry budget for transient render failures.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    /// Retries after the initial attempt.
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Progress reported while an invocation runs.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderProgress {
    /// Completion percentage in `[0, 100)`.
    Percent(f64),
    /// A transient failure is being retried. Informational only.
    Retrying { attempt: u32 },
}

/// One external render tool plus its retry policy.
#[derive(Debug, Clone)]
pub struct RenderTool {
    binary: String,
    transient_phrases: Vec<String>,
    retry: RetryBudget,
}

impl RenderTool {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            transient_phrases: DEFAULT_TRANSIENT_PHRASES
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            retry: RetryBudget::default(),
        }
    }

    pub fn with_transient_phrases(mut self, phrases: Vec<String>) -> Self {
        self.transient_phrases = phrases;
        self
    }

    pub fn with_retry(mut self, retry: RetryBudget) -> Self {
        self.retry = retry;
        self
    }

    /// Runs one fully substituted invocation to completion, retrying
    /// transient failures up to the budget.
    ///
    /// A nonzero exit whose last diagnostic line matches a configured
    /// transient phrase sleeps the fixed delay and tries again; retry
    /// exhaustion (or any other failure) surfaces the last diagnostic
    /// line. The retry is a bounded loop, never recursion.
    pub async fn run(
        &self,
        args: &[String],
        dir: &Path,
        cancel: &CancellationToken,
        on_progress: &mut (dyn FnMut(RenderProgress) + Send),
    ) -> Result<(), RenderError> {
        for attempt in 0..=self.retry.attempts {
            match self.run_once(args, dir, cancel, on_progress).await {
                Ok(()) => return Ok(()),
                Err(RenderError::Tool { diagnostic })
                    if attempt < self.retry.attempts && self.is_transient(&diagnostic) =>
                {
                    warn!(
                        attempt = attempt + 1,
                        max = self.retry.attempts,
                        diagnostic,
                        "render tool failed transiently, retrying"
                    );
                    on_progress(RenderProgress::Retrying {
                        attempt: attempt + 1,
                    });
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(RenderError::Cancelled),
                        _ = tokio::time::sleep(self.retry.delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }

        // The loop always returns from its last iteration.
        Err(RenderError::Tool {
            diagnostic: "retry loop exited without result".to_owned(),
        })
    }

    fn is_transient(&self, diagnostic: &str) -> bool {
        self.transient_phrases
            .iter()
            .any(|phrase| diagnostic.contains(phrase))
    }

    async fn run_once(
        &self,
        args: &[String],
        dir: &Path,
        cancel: &CancellationToken,
        on_progress: &mut (dyn FnMut(RenderProgress) + Send),
    ) -> Result<(), RenderError> {
        debug!(binary = %self.binary, ?args, "spawning render tool");

        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        no_window(&mut command);

        let mut child = command.spawn().map_err(|source| RenderError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;

        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("render tool stderr not captured"))?;

        // ffmpeg separates progress updates with carriage returns, so a
        // plain line reader would sit on them until process exit.
        let mut total: Option<f64> = None;
        let mut last_line = String::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    return Err(RenderError::Cancelled);
                }
                read = stderr.read(&mut chunk) => read?,
            };
            if read == 0 {
                break;
            }
            pending.extend_from_slice(&chunk[..read]);

            while let Some(pos) = pending.iter().position(|&b| b == b'\n' || b == b'\r') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line[..line.len() - 1])
                    .trim()
                    .to_owned();
                if !line.is_empty() {
                    self.observe_line(&line, &mut total, on_progress);
                    last_line = line;
                }
            }
        }
        if !pending.is_empty() {
            let line = String::from_utf8_lossy(&pending).trim().to_owned();
            if !line.is_empty() {
                last_line = line;
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(RenderError::Cancelled);
            }
            status = child.wait() => status?,
        };

        if status.success() {
            Ok(())
        } else {
            Err(RenderError::Tool {
                diagnostic: last_line,
            })
        }
    }

    fn observe_line(
        &self,
        line: &str,
        total: &mut Option<f64>,
        on_progress: &mut (dyn FnMut(RenderProgress) + Send),
    ) {
        match *total {
            None => {
                if let Some(t) = parse_duration_total(line) {
                    *total = Some(t);
                    on_progress(RenderProgress::Percent(0.0));
                }
            }
            Some(t) if t > 0.0 => {
                if let Some(elapsed) = parse_elapsed(line) {
                    let percent = (elapsed / t * 100.0).clamp(0.0, 100.0);
                    if percent < 100.0 {
                        on_progress(RenderProgress::Percent(percent));
                    }
                }
            }
            Some(_) => {}
        }
    }
}

fn no_window(command: &mut Command) {
    // The tool runs behind a GUI-less recorder on Windows.
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        command.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(windows))]
    {
        let _ = command;
    }
}
