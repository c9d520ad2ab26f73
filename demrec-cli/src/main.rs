mod cli;
mod error;
mod game;
mod launcher;

use std::path::Path;
use std::process;
use std::sync::Arc;

use clap::Parser;
use demrec_engine::{Config, Coordinator, GameEnvironment, RecordEvent, RecordState, Segment};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Args, Commands};
use crate::error::{AppError, Result};
use crate::game::HijackProcess;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args).await {
        error!("{e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "demrec=info",
        1 => "demrec=debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(&args.config)?;

    match args.command {
        Commands::Launch { game_dir } => {
            launcher::launch(&config, &game_dir).await?;
            info!("game launched");
            Ok(())
        }
        Commands::Record {
            demo,
            segments,
            out,
            game_dir,
            staging_dir,
        } => record(config, &demo, &segments, &out, &game_dir, staging_dir.as_deref()).await,
    }
}

async fn record(
    config: Config,
    demo: &Path,
    segments_path: &Path,
    out: &Path,
    game_dir: &Path,
    staging_dir: Option<&Path>,
) -> Result<()> {
    let segments = load_segments(segments_path)?;
    let staging_dir = staging_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.general.svr_dir.join("movies"));

    let env = Arc::new(GameEnvironment {
        game_dir: game_dir.to_path_buf(),
        staging_dir,
    });
    let process = Arc::new(HijackProcess::attach(&config.general.game_exe));
    let coordinator = Coordinator::new(config, env, process);

    let reporter = tokio::spawn(report_events(coordinator.subscribe()));

    let artifacts = coordinator.record(demo, &segments, out).await?;
    let _ = reporter.await;

    for artifact in artifacts {
        println!("{}", artifact.display());
    }
    Ok(())
}

fn load_segments(path: &Path) -> Result<Vec<Segment>> {
    let text = std::fs::read_to_string(path)?;
    let segments: Vec<Segment> = serde_json::from_str(&text)
        .map_err(|e| AppError::InvalidInput(format!("segment file `{}`: {e}", path.display())))?;
    if segments.is_empty() {
        return Err(AppError::InvalidInput(format!(
            "segment file `{}` is empty",
            path.display()
        )));
    }
    Ok(segments)
}

/// Logs events until the run reaches a terminal state. A slow terminal
/// may lag the broadcast channel; dropped events are only progress
/// noise, so the reporter keeps going.
async fn report_events(mut events: broadcast::Receiver<RecordEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                report(&event);
                if matches!(
                    event,
                    RecordEvent::State(RecordState::Complete)
                        | RecordEvent::State(RecordState::Failed)
                ) {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "event reporting fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn report(event: &RecordEvent) {
    match event {
        RecordEvent::State(state) => info!(?state, "state"),
        RecordEvent::Skipping { segment } => info!(segment, "seeking"),
        RecordEvent::RecordStarted { segment } => info!(segment, "recording"),
        RecordEvent::RecordProgress { segment, percent } => {
            info!(segment, percent, "capture progress");
        }
        RecordEvent::SegmentFinished { segment } => info!(segment, "segment finished"),
        RecordEvent::RenderProgress {
            output,
            pass,
            percent,
        } => info!(output = %output, pass, percent, "render progress"),
        RecordEvent::RenderRetrying { output, attempt } => {
            info!(output = %output, attempt, "render retrying");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn segment_file_round_trips() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{ "ticks": [100, 300], "output": "take1", "pre": 50 }},
                {{ "ticks": [500, 900], "output": "take2", "cmd": "spec_mode 5" }}
            ]"#
        )
        .unwrap();

        let segments = load_segments(file.path()).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].ticks, (100, 300));
        assert_eq!(segments[0].pre, 50);
        assert_eq!(segments[1].cmd.as_deref(), Some("spec_mode 5"));
    }

    #[test]
    fn empty_segment_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();
        assert!(matches!(
            load_segments(file.path()),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn reporter_survives_a_lagged_channel() {
        let (tx, rx) = broadcast::channel(2);
        // Overflow the tiny channel before the reporter starts reading.
        for percent in 0..16 {
            tx.send(RecordEvent::RecordProgress {
                segment: 0,
                percent,
            })
            .unwrap();
        }

        let reporter = tokio::spawn(report_events(rx));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        tx.send(RecordEvent::State(RecordState::Complete)).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), reporter)
            .await
            .expect("reporter stalled after lagging")
            .unwrap();
    }
}
