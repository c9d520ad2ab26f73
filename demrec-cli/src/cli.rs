use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "demrec", version, about = "Automated Source engine demo recording")]
pub struct Args {
    /// Configuration file.
    #[arg(short, long, global = true, default_value = "demrec.json")]
    pub config: PathBuf,

    /// Verbose logging (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Launch the game through the capture companion.
    Launch {
        /// Game installation directory, the one containing `cfg/`.
        #[arg(long)]
        game_dir: PathBuf,
    },

    /// Record segments of a demo against the already running game.
    Record {
        /// Demo file to replay.
        demo: PathBuf,

        /// JSON file holding the segment list.
        #[arg(short, long)]
        segments: PathBuf,

        /// Directory the final clips are written to.
        #[arg(short, long, default_value = "clips")]
        out: PathBuf,

        /// Game installation directory, the one containing `cfg/`.
        #[arg(long)]
        game_dir: PathBuf,

        /// Capture staging directory; defaults to `movies/` under the
        /// companion installation.
        #[arg(long)]
        staging_dir: Option<PathBuf>,
    },
}
