use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Capability handed to watch handlers to unsubscribe the watch they
/// are running under. Calling [`close`](CloseHandle::close) more than
/// once is fine.
#[derive(Clone)]
pub struct CloseHandle {
    token: CancellationToken,
}

impl CloseHandle {
    pub fn close(&self) {
        self.token.cancel();
    }
}

/// Watches append-only files for growth without re-delivering bytes.
///
/// Each watched path is polled on a fixed interval. A delivery happens
/// only when the modification timestamp advanced *and* the size grew;
/// exactly the byte range `[old_size, new_size)` is then read, decoded
/// lossily as UTF-8 and passed to the handler. Shrinkage or an
/// unchanged timestamp produces no event. A missing file is not an
/// error; content is delivered once it appears.
pub struct Tailer {
    interval: Duration,
    generation: AtomicU64,
    watches: Arc<Mutex<HashMap<PathBuf, WatchEntry>>>,
}

struct WatchEntry {
    generation: u64,
    token: CancellationToken,
}

impl Default for Tailer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tailer {
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            generation: AtomicU64::new(0),
            watches: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Starts watching `path`, replacing any existing watch on the same
    /// path. Must be called from within a tokio runtime.
    ///
    /// Content present before the watch starts is never replayed: the
    /// first successful poll only establishes the baseline offset.
    pub fn watch<F>(&self, path: impl Into<PathBuf>, mut handler: F)
    where
        F: FnMut(&str, &CloseHandle) + Send + 'static,
    {
        let path = path.into();
        let token = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        {
            let mut watches = self.watches.lock();
            if let Some(prev) = watches.insert(
                path.clone(),
                WatchEntry {
                    generation,
                    token: token.clone(),
                },
            ) {
                prev.token.cancel();
            }
        }

        let close = CloseHandle {
            token: token.clone(),
        };
        let interval = self.interval;
        let watches = Arc::clone(&self.watches);

        tokio::spawn(async move {
            let mut last: Option<(SystemTime, u64)> = None;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let meta = match tokio::fs::metadata(&path).await {
                    Ok(meta) => meta,
                    Err(_) => {
                        // Not watching anything yet; once the file shows
                        // up its full content counts as appended.
                        if last.is_none() {
                            last = Some((SystemTime::UNIX_EPOCH, 0));
                        }
                        continue;
                    }
                };
                let Ok(mtime) = meta.modified() else {
                    continue;
                };
                let size = meta.len();

                match last {
                    None => last = Some((mtime, size)),
                    Some((prev_mtime, prev_size)) => {
                        if mtime > prev_mtime && size > prev_size {
                            match read_delta(&path, prev_size, size).await {
                                Ok(chunk) => handler(&chunk, &close),
                                Err(e) => {
                                    warn!(path = %path.display(), error = %e, "failed to read log delta");
                                }
                            }
                        }
                        last = Some((mtime, size));
                    }
                }
            }

            // Drop the registry entry unless a newer watch replaced it.
            let mut watches = watches.lock();
            if watches
                .get(&path)
                .is_some_and(|entry| entry.generation == generation)
            {
                watches.remove(&path);
            }
            debug!(path = %path.display(), "log watch ended");
        });
    }

    /// Cancels the watch on `path`. Safe to call when not watching.
    pub fn unwatch(&self, path: &Path) {
        if let Some(entry) = self.watches.lock().remove(path) {
            entry.token.cancel();
        }
    }

    /// Cancels every active watch.
    pub fn unwatch_all(&self) {
        let mut watches = self.watches.lock();
        for (_, entry) in watches.drain() {
            entry.token.cancel();
        }
    }
}

async fn read_delta(path: &Path, from: u64, to: u64) -> std::io::Result<String> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(from)).await?;
    let mut buf = vec![0u8; (to - from) as usize];
    file.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
