//! Recording coordination: one request end to end.
//!
//! A request validates the demo and segments, stages an isolated
//! session under the game's `cfg/`, drives playback through a patched
//! demo plus action script, follows the console log for telemetry and
//! finally post-processes the raw captures into the output directory.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use logtail::{LogEvent, MarkerCodec, Tailer};
use parking_lot::Mutex;
use render::{OutputJob, RenderProgress, reset_staging, run_output};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::RecordError;
use crate::process::{Environment, GameProcess};
use crate::script;
use crate::segment::{self, NormalizedSegment, Segment};
use crate::session::Session;

const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle of one recording request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Idle,
    Init,
    Launched,
    Skipping,
    Recording,
    Done,
    PostProcessing,
    Complete,
    Failed,
}

/// Telemetry published over the coordinator's broadcast channel.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordEvent {
    State(RecordState),
    Skipping { segment: usize },
    RecordStarted { segment: usize },
    RecordProgress { segment: usize, percent: u8 },
    SegmentFinished { segment: usize },
    RenderProgress { output: String, pass: usize, percent: f64 },
    RenderRetrying { output: String, attempt: u32 },
}

enum ChannelMsg {
    /// Playback acknowledged the queued commands.
    Heartbeat,
    Event(LogEvent),
}

/// Orchestrates recording requests against one game process.
///
/// At most one request runs at a time; a second concurrent call fails
/// with [`RecordError::Busy`]. Observers subscribe to the broadcast
/// channel; slow subscribers lag rather than block the request.
pub struct Coordinator {
    config: Config,
    env: Arc<dyn Environment>,
    process: Arc<dyn GameProcess>,
    tailer: Tailer,
    events: broadcast::Sender<RecordEvent>,
    state: Mutex<RecordState>,
    busy: AtomicBool,
    cancellation: Mutex<CancellationToken>,
    heartbeat_timeout: Duration,
    settle_delay: Duration,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Coordinator {
    pub fn new(config: Config, env: Arc<dyn Environment>, process: Arc<dyn GameProcess>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            env,
            process,
            tailer: Tailer::new(),
            events,
            state: Mutex::new(RecordState::Idle),
            busy: AtomicBool::new(false),
            cancellation: Mutex::new(CancellationToken::new()),
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Overrides the playback acknowledgement timeout and the delay
    /// between movie end and post-processing.
    pub fn with_timing(mut self, heartbeat_timeout: Duration, settle_delay: Duration) -> Self {
        self.heartbeat_timeout = heartbeat_timeout;
        self.settle_delay = settle_delay;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> RecordState {
        *self.state.lock()
    }

    /// Cancels the in-flight request, if any.
    pub fn cancel(&self) {
        self.cancellation.lock().cancel();
    }

    /// Cancels any in-flight request, asks the game to exit and purges
    /// the capture staging directory.
    pub async fn shutdown(&self) {
        self.cancel();
        self.tailer.unwatch_all();
        if let Err(e) = self.process.exit().await {
            debug!(error = %e, "game exit request failed");
        }
        let _ = reset_staging(self.env.staging_dir()).await;
    }

    /// Records `segments` of `demo_path` into `output_dir`, returning
    /// the final artifact paths in output order.
    pub async fn record(
        &self,
        demo_path: &Path,
        segments: &[Segment],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, RecordError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(RecordError::Busy);
        }
        let _guard = BusyGuard(&self.busy);

        let cancel = CancellationToken::new();
        *self.cancellation.lock() = cancel.clone();

        self.set_state(RecordState::Init);
        let result = self
            .record_inner(demo_path, segments, output_dir, &cancel)
            .await;
        match &result {
            Ok(artifacts) => {
                self.set_state(RecordState::Complete);
                info!(count = artifacts.len(), "recording complete");
            }
            Err(e) => {
                self.set_state(RecordState::Failed);
                warn!(error = %e, "recording failed");
            }
        }
        result
    }

    async fn record_inner(
        &self,
        demo_path: &Path,
        segments: &[Segment],
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, RecordError> {
        if !self.process.is_running() {
            return Err(RecordError::GameNotRunning);
        }
        if demo_path.as_os_str().is_empty() {
            return Err(RecordError::NoDemo);
        }
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| RecordError::OutputDir {
                path: output_dir.to_owned(),
                source,
            })?;

        let raw = match tokio::fs::read(demo_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RecordError::DemoNotFound {
                    path: demo_path.to_owned(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let header = dem::DemoHeader::parse(&mut Cursor::new(&raw[..]))?;
        let info = header.info();
        let normalized = segment::normalize(segments, info.total_ticks)?;
        info!(
            demo = %demo_path.display(),
            map = %info.map_name,
            ticks = info.total_ticks,
            segments = normalized.len(),
            "recording request accepted"
        );

        let session = Session::create(self.env.game_dir(), &self.config).await?;
        let result = self
            .run_session(&session, &raw, &normalized, output_dir, cancel)
            .await;

        self.tailer.unwatch(&session.log_path);
        session.cleanup().await;
        if result.is_err() {
            // Partial captures are worthless; leave staging empty.
            let _ = reset_staging(self.env.staging_dir()).await;
        }
        result
    }

    async fn run_session(
        &self,
        session: &Session,
        raw: &[u8],
        segments: &[NormalizedSegment],
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, RecordError> {
        let exec_paths = session.write_command_files(segments).await?;
        let script = script::synthesize(&session.token, &session.token, segments, &exec_paths);

        let patched = dem::patch_game_dir_token(raw, &session.token)?;
        tokio::fs::write(&session.demo_path, &patched).await?;
        tokio::fs::write(&session.script_path, script.render()).await?;

        reset_staging(self.env.staging_dir()).await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<ChannelMsg>();
        let codec = MarkerCodec::new(&session.token);
        let heartbeat = session.token.clone();
        self.tailer.watch(&session.log_path, move |chunk, _close| {
            if chunk.lines().any(|line| line.trim() == heartbeat) {
                let _ = tx.send(ChannelMsg::Heartbeat);
            }
            for event in codec.decode(chunk) {
                let _ = tx.send(ChannelMsg::Event(event));
            }
        });

        // Console output is routed into the session log first; the
        // trailing echo bounces the token back through it, proving both
        // the command path and the log path work.
        let play = format!(
            "con_logfile cfg/{}/console.log; playdemo {}; echo {}",
            session.token,
            session.playdemo_path(),
            session.token
        );
        self.process
            .send(&play)
            .await
            .map_err(|_| RecordError::GameNotRunning)?;
        self.set_state(RecordState::Launched);

        // Until the first line comes back there is no proof playback
        // started, so the wait is bounded.
        let mut deadline = Some(tokio::time::Instant::now() + self.heartbeat_timeout);
        loop {
            let ack_timeout = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = cancel.cancelled() => return Err(RecordError::Cancelled),
                _ = ack_timeout => {
                    warn!(timeout = ?self.heartbeat_timeout, "playback never acknowledged");
                    return Err(RecordError::GameNotRunning);
                }
                msg = rx.recv() => {
                    deadline = None;
                    match msg {
                        None => return Err(RecordError::Cancelled),
                        Some(ChannelMsg::Heartbeat) => {}
                        Some(ChannelMsg::Event(event)) => {
                            if self.handle_log_event(event)? {
                                break;
                            }
                        }
                    }
                }
            }
        }

        self.set_state(RecordState::Done);
        self.tailer.unwatch(&session.log_path);
        // Give the capture companion a moment to close its files.
        tokio::time::sleep(self.settle_delay).await;

        self.set_state(RecordState::PostProcessing);
        self.post_process(segments, output_dir, cancel).await
    }

    /// Applies one decoded log event; returns `true` once the movie is
    /// fully flushed.
    fn handle_log_event(&self, event: LogEvent) -> Result<bool, RecordError> {
        match event {
            LogEvent::SkipStart { segment } => {
                self.set_state(RecordState::Skipping);
                self.emit(RecordEvent::Skipping { segment });
            }
            LogEvent::RecordStart { segment } => {
                self.set_state(RecordState::Recording);
                self.emit(RecordEvent::RecordStarted { segment });
            }
            LogEvent::RecordProgress { segment, percent } => {
                self.emit(RecordEvent::RecordProgress { segment, percent });
            }
            LogEvent::RecordEnd { segment } => {
                self.emit(RecordEvent::SegmentFinished { segment });
            }
            LogEvent::MapMissing { map } => return Err(RecordError::MapMissing { map }),
            LogEvent::MovieEnded => return Ok(true),
        }
        Ok(false)
    }

    async fn post_process(
        &self,
        segments: &[NormalizedSegment],
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, RecordError> {
        let tool = self.config.render_tool();
        let staging = self.env.staging_dir();

        let mut artifacts = Vec::new();
        for group in output_groups(&self.config, segments) {
            let steps = self.config.pipeline_for(&group.name);
            let job = OutputJob {
                raw_video: staging.join(format!("{}.mp4", group.name)),
                raw_audio: staging.join(format!("{}.wav", group.name)),
                final_output: output_dir.join(format!("{}.mp4", group.name)),
                staging_dir: staging,
                duration_secs: group.duration_secs,
                pre_secs: group.pre_secs,
                trimmed_secs: group.trimmed_secs,
                vars: &group.vars,
            };

            let name = group.name.clone();
            let events = self.events.clone();
            let artifact = run_output(&tool, &steps, &job, cancel, &mut |pass, progress| {
                let event = match progress {
                    RenderProgress::Percent(percent) => RecordEvent::RenderProgress {
                        output: name.clone(),
                        pass,
                        percent,
                    },
                    RenderProgress::Retrying { attempt } => RecordEvent::RenderRetrying {
                        output: name.clone(),
                        attempt,
                    },
                };
                let _ = events.send(event);
            })
            .await?;
            artifacts.push(artifact);
        }

        reset_staging(staging).await?;
        Ok(artifacts)
    }

    fn set_state(&self, state: RecordState) {
        *self.state.lock() = state;
        debug!(?state, "state change");
        self.emit(RecordEvent::State(state));
    }

    fn emit(&self, event: RecordEvent) {
        let _ = self.events.send(event);
    }
}

struct OutputGroup {
    name: String,
    duration_secs: f64,
    pre_secs: f64,
    trimmed_secs: f64,
    vars: std::collections::HashMap<String, String>,
}

/// Folds segments into their distinct outputs, first appearance first.
/// Durations accumulate across segments sharing an output; the trimmed
/// duration excludes the last contributing segment's padding.
fn output_groups(config: &Config, segments: &[NormalizedSegment]) -> Vec<OutputGroup> {
    let mut groups: Vec<OutputGroup> = Vec::new();
    for seg in segments {
        let duration = config.seconds_for_ticks(seg.len_ticks());
        match groups.iter_mut().find(|g| g.name == seg.output) {
            Some(group) => {
                group.duration_secs += duration;
                group.trimmed_secs = group.duration_secs - config.seconds_for_ticks(seg.padding);
                group.vars.extend(seg.vars.clone());
            }
            None => groups.push(OutputGroup {
                name: seg.output.clone(),
                duration_secs: duration,
                pre_secs: config.seconds_for_ticks(seg.pre),
                trimmed_secs: duration - config.seconds_for_ticks(seg.padding),
                vars: seg.vars.clone(),
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{GameEnvironment, MockGameProcess};
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn test_config(render_binary: &str, svr_dir: &Path) -> Config {
        serde_json::from_str(&format!(
            r#"{{
                "general": {{ "svr_dir": "{}", "game_exe": "/g/hl2.exe" }},
                "render": {{ "binary": "{render_binary}" }}
            }}"#,
            svr_dir.display()
        ))
        .unwrap()
    }

    fn demo_bytes(total_ticks: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(dem::DEMO_MAGIC);
        buf.extend_from_slice(&3i32.to_le_bytes());
        buf.extend_from_slice(&24i32.to_le_bytes());
        for value in ["server", "player", "koth_product_final", "tf"] {
            let mut field = [0u8; 260];
            field[..value.len()].copy_from_slice(value.as_bytes());
            buf.extend_from_slice(&field);
        }
        buf.extend_from_slice(&30.0f32.to_le_bytes());
        buf.extend_from_slice(&total_ticks.to_le_bytes());
        buf.extend_from_slice(&1990i32.to_le_bytes());
        buf.extend_from_slice(&64i32.to_le_bytes());
        // Signon payload carrying the embedded game dir token.
        buf.extend_from_slice(&dem::GAME_DIR_ANCHORS[0]);
        buf.push(2 + 9);
        buf.extend_from_slice(b"tf\0");
        buf.extend_from_slice(b"rest of signon");
        buf
    }

    fn seg(start: u32, end: u32, output: &str) -> Segment {
        Segment {
            ticks: (start, end),
            pre: 0,
            padding: 0,
            cmd: None,
            output: output.to_owned(),
            vars: HashMap::new(),
        }
    }

    struct TestWorld {
        _tmp: tempfile::TempDir,
        game_dir: PathBuf,
        staging_dir: PathBuf,
        output_dir: PathBuf,
        svr_dir: PathBuf,
        demo: PathBuf,
    }

    fn world() -> TestWorld {
        let tmp = tempfile::tempdir().unwrap();
        let game_dir = tmp.path().join("tf2");
        let staging_dir = tmp.path().join("movies");
        let output_dir = tmp.path().join("clips");
        let svr_dir = tmp.path().join("svr");
        std::fs::create_dir_all(&game_dir).unwrap();
        std::fs::create_dir_all(&staging_dir).unwrap();
        let demo = tmp.path().join("match.dem");
        std::fs::write(&demo, demo_bytes(2000)).unwrap();
        TestWorld {
            _tmp: tmp,
            game_dir,
            staging_dir,
            output_dir,
            svr_dir,
            demo,
        }
    }

    fn coordinator(
        world: &TestWorld,
        config: Config,
        process: Arc<dyn GameProcess>,
    ) -> Coordinator {
        let env = Arc::new(GameEnvironment {
            game_dir: world.game_dir.clone(),
            staging_dir: world.staging_dir.clone(),
        });
        Coordinator::new(config, env, process)
            .with_timing(Duration::from_secs(5), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn rejects_when_game_not_running() {
        let w = world();
        let mut process = MockGameProcess::new();
        process.expect_is_running().return_const(false);

        let coord = coordinator(&w, test_config("ffmpeg", &w.svr_dir), Arc::new(process));
        let err = coord
            .record(&w.demo, &[seg(100, 300, "take1")], &w.output_dir)
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::GameNotRunning));
        assert_eq!(coord.state(), RecordState::Failed);
    }

    #[tokio::test]
    async fn empty_demo_path_is_rejected() {
        let w = world();
        let mut process = MockGameProcess::new();
        process.expect_is_running().return_const(true);

        let coord = coordinator(&w, test_config("ffmpeg", &w.svr_dir), Arc::new(process));
        let err = coord
            .record(Path::new(""), &[seg(100, 300, "take1")], &w.output_dir)
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::NoDemo));
    }

    #[tokio::test]
    async fn missing_demo_file_is_named() {
        let w = world();
        let mut process = MockGameProcess::new();
        process.expect_is_running().return_const(true);

        let coord = coordinator(&w, test_config("ffmpeg", &w.svr_dir), Arc::new(process));
        let missing = w.game_dir.join("nope.dem");
        let err = coord
            .record(&missing, &[seg(100, 300, "take1")], &w.output_dir)
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::DemoNotFound { path } if path == missing));
    }

    #[tokio::test]
    async fn corrupt_demo_header_is_rejected() {
        let w = world();
        std::fs::write(&w.demo, b"not a demo at all").unwrap();
        let mut process = MockGameProcess::new();
        process.expect_is_running().return_const(true);

        let coord = coordinator(&w, test_config("ffmpeg", &w.svr_dir), Arc::new(process));
        let err = coord
            .record(&w.demo, &[seg(100, 300, "take1")], &w.output_dir)
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidDemoHeader { .. }));
    }

    #[tokio::test]
    async fn segment_validation_happens_before_launch() {
        let w = world();
        let mut process = MockGameProcess::new();
        process.expect_is_running().return_const(true);
        // No send expectation: validation must fail first.

        let coord = coordinator(&w, test_config("ffmpeg", &w.svr_dir), Arc::new(process));
        let err = coord
            .record(
                &w.demo,
                &[seg(100, 300, "a"), seg(500, 900, "a"), seg(900, 1200, "b")],
                &w.output_dir,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecordError::OverlappingTicks {
                first: 1,
                second: 2
            }
        ));
    }

    /// Fakes a game that never prints anything to the console log.
    struct SilentProcess;

    #[async_trait]
    impl GameProcess for SilentProcess {
        fn is_running(&self) -> bool {
            true
        }
        async fn send(&self, _command: &str) -> std::io::Result<()> {
            Ok(())
        }
        async fn exit(&self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn concurrent_request_is_busy() {
        let w = world();
        let coord = Arc::new(coordinator(&w, test_config("ffmpeg", &w.svr_dir), Arc::new(SilentProcess)));

        let first = {
            let coord = Arc::clone(&coord);
            let demo = w.demo.clone();
            let out = w.output_dir.clone();
            tokio::spawn(
                async move { coord.record(&demo, &[seg(100, 300, "take1")], &out).await },
            )
        };
        tokio::time::sleep(Duration::from_millis(200)).await;

        let err = coord
            .record(&w.demo, &[seg(100, 300, "take1")], &w.output_dir)
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::Busy));

        coord.cancel();
        let err = first.await.unwrap().unwrap_err();
        assert!(matches!(err, RecordError::Cancelled));
    }

    #[tokio::test]
    async fn unacknowledged_playback_times_out() {
        let w = world();
        let coord = coordinator(&w, test_config("ffmpeg", &w.svr_dir), Arc::new(SilentProcess))
            .with_timing(Duration::from_millis(200), Duration::from_millis(10));

        let err = coord
            .record(&w.demo, &[seg(100, 300, "take1")], &w.output_dir)
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::GameNotRunning));

        // The scratch session is gone again.
        let cfg_dir = w.game_dir.join("cfg");
        assert_eq!(std::fs::read_dir(&cfg_dir).unwrap().count(), 0);
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        // Tolerates a scratch dir that the coordinator already removed.
        fn append(path: &Path, text: &str) {
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                let _ = file.write_all(text.as_bytes());
                let _ = file.sync_all();
            }
        }

        fn write_touch_tool(dir: &Path) -> PathBuf {
            let path = dir.join("touch_tool.sh");
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(
                file,
                "#!/bin/sh\n\
                 out=\"\"\n\
                 for a in \"$@\"; do\n\
                 \x20\x20case \"$a\" in -hide_banner|-y) ;; *) out=\"$a\" ;; esac\n\
                 done\n\
                 echo done > \"$out\"\n\
                 exit 0"
            )
            .unwrap();
            drop(file);
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        /// Fakes the full game side: acknowledges the play command,
        /// streams the telemetry a real replay would produce and drops
        /// raw captures into staging before announcing the movie end.
        /// With `finish` unset it stalls after the scripted lines, as a
        /// replay does while a pass is still capturing.
        struct ScriptedProcess {
            game_dir: PathBuf,
            staging_dir: PathBuf,
            lines: Vec<String>,
            outputs: Vec<String>,
            finish: bool,
        }

        #[async_trait]
        impl GameProcess for ScriptedProcess {
            fn is_running(&self) -> bool {
                true
            }

            async fn send(&self, command: &str) -> std::io::Result<()> {
                let token = command
                    .rsplit("echo ")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_owned();
                let log = self
                    .game_dir
                    .join("cfg")
                    .join(&token)
                    .join("console.log");
                let staging = self.staging_dir.clone();
                let lines = self.lines.clone();
                let outputs = self.outputs.clone();
                let finish = self.finish;

                tokio::spawn(async move {
                    let step = Duration::from_millis(120);
                    tokio::time::sleep(step).await;
                    append(&log, &format!("{token}\n"));
                    for line in lines {
                        tokio::time::sleep(step).await;
                        append(&log, &format!("{}\n", line.replace("{tok}", &token)));
                    }
                    for output in outputs {
                        std::fs::write(staging.join(format!("{output}.mp4")), b"video").unwrap();
                        std::fs::write(staging.join(format!("{output}.wav")), b"audio").unwrap();
                    }
                    if finish {
                        tokio::time::sleep(step).await;
                        append(&log, "Movie ended\n");
                    }
                });
                Ok(())
            }

            async fn exit(&self) -> std::io::Result<()> {
                Ok(())
            }
        }

        #[tokio::test]
        async fn full_request_produces_artifacts_and_cleans_up() {
            let w = world();
            let tool = write_touch_tool(w._tmp.path());
            let config = test_config(&tool.to_string_lossy(), &w.svr_dir);

            let process = Arc::new(ScriptedProcess {
                game_dir: w.game_dir.clone(),
                staging_dir: w.staging_dir.clone(),
                lines: vec![
                    "[{tok}][0][2]".to_owned(),
                    "[{tok}][0][6]".to_owned(),
                    "[{tok}][0][6][50]".to_owned(),
                    "[{tok}][0][5]".to_owned(),
                ],
                outputs: vec!["take1".to_owned()],
                finish: true,
            });

            let coord = coordinator(&w, config, process);
            let mut events = coord.subscribe();

            let artifacts = coord
                .record(&w.demo, &[seg(100, 300, "take1")], &w.output_dir)
                .await
                .unwrap();

            let expected = w.output_dir.join("take1.mp4");
            assert_eq!(artifacts, vec![expected.clone()]);
            assert!(expected.exists());
            assert_eq!(coord.state(), RecordState::Complete);

            // Staging was purged, the scratch session removed.
            assert_eq!(std::fs::read_dir(&w.staging_dir).unwrap().count(), 0);
            assert_eq!(
                std::fs::read_dir(w.game_dir.join("cfg")).unwrap().count(),
                0
            );

            let mut seen = Vec::new();
            while let Ok(event) = events.try_recv() {
                seen.push(event);
            }
            assert!(seen.contains(&RecordEvent::Skipping { segment: 0 }));
            assert!(seen.contains(&RecordEvent::RecordStarted { segment: 0 }));
            assert!(seen.contains(&RecordEvent::RecordProgress {
                segment: 0,
                percent: 50
            }));
            assert!(seen.contains(&RecordEvent::SegmentFinished { segment: 0 }));
            assert!(seen.contains(&RecordEvent::State(RecordState::Complete)));
        }

        #[tokio::test]
        async fn cancel_mid_recording_purges_staging_and_scratch() {
            let w = world();
            // Captures land in staging, but the movie never ends.
            let process = Arc::new(ScriptedProcess {
                game_dir: w.game_dir.clone(),
                staging_dir: w.staging_dir.clone(),
                lines: vec!["[{tok}][0][2]".to_owned(), "[{tok}][0][6]".to_owned()],
                outputs: vec!["take1".to_owned()],
                finish: false,
            });

            let coord = Arc::new(coordinator(&w, test_config("ffmpeg", &w.svr_dir), process));
            let mut events = coord.subscribe();

            let request = {
                let coord = Arc::clone(&coord);
                let demo = w.demo.clone();
                let out = w.output_dir.clone();
                tokio::spawn(
                    async move { coord.record(&demo, &[seg(100, 300, "take1")], &out).await },
                )
            };

            let started = async {
                loop {
                    if let RecordEvent::RecordStarted { .. } = events.recv().await.unwrap() {
                        break;
                    }
                }
            };
            tokio::time::timeout(Duration::from_secs(10), started)
                .await
                .unwrap();
            // Let the in-flight capture files reach staging.
            tokio::time::sleep(Duration::from_millis(300)).await;
            assert!(w.staging_dir.join("take1.mp4").exists());

            coord.cancel();
            let err = request.await.unwrap().unwrap_err();
            assert!(matches!(err, RecordError::Cancelled));
            assert_eq!(coord.state(), RecordState::Failed);

            assert_eq!(std::fs::read_dir(&w.staging_dir).unwrap().count(), 0);
            assert_eq!(
                std::fs::read_dir(w.game_dir.join("cfg")).unwrap().count(),
                0
            );
        }

        #[tokio::test]
        async fn missing_map_fails_the_request_and_purges_staging() {
            let w = world();
            let process = Arc::new(ScriptedProcess {
                game_dir: w.game_dir.clone(),
                staging_dir: w.staging_dir.clone(),
                lines: vec!["Missing map maps/koth_product_final.bsp, disconnecting".to_owned()],
                outputs: vec![],
                finish: true,
            });

            let coord = coordinator(&w, test_config("ffmpeg", &w.svr_dir), process);
            let err = coord
                .record(&w.demo, &[seg(100, 300, "take1")], &w.output_dir)
                .await
                .unwrap_err();

            assert!(matches!(err, RecordError::MapMissing { map } if map == "koth_product_final"));
            assert_eq!(coord.state(), RecordState::Failed);
            assert_eq!(std::fs::read_dir(&w.staging_dir).unwrap().count(), 0);
            assert_eq!(
                std::fs::read_dir(w.game_dir.join("cfg")).unwrap().count(),
                0
            );
        }
    }

    #[test]
    fn output_groups_fold_shared_outputs() {
        let config = test_config("ffmpeg", Path::new("/svr"));
        let mk = |index, start: u32, end: u32, output: &str, padding: u32| NormalizedSegment {
            index,
            start,
            end,
            pre: 0,
            padding,
            cmd: None,
            output: output.to_owned(),
            vars: HashMap::new(),
        };
        let segments = [
            mk(0, 100, 300, "a", 20),
            mk(1, 500, 900, "b", 0),
            mk(2, 1000, 1200, "a", 0),
        ];

        let groups = output_groups(&config, &segments);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "a");
        assert_eq!(groups[1].name, "b");

        let tick = 1.0 / config.general.tickrate;
        assert!((groups[0].duration_secs - 400.0 * tick).abs() < 1e-9);
        assert!((groups[0].trimmed_secs - groups[0].duration_secs).abs() < 1e-9);
        assert!((groups[1].duration_secs - 400.0 * tick).abs() < 1e-9);
    }
}
