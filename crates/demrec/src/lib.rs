//! # demrec-engine
//!
//! Orchestration of Source engine demo recording: a [`Coordinator`]
//! takes a demo file plus a list of tick segments, replays the demo in
//! an isolated per-session profile while a capture companion records
//! raw footage, follows the game console log for telemetry and
//! post-processes the captures into final clips.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod process;
pub mod script;
pub mod segment;
pub mod session;

pub use config::{Config, General, RenderSettings};
pub use coordinator::{Coordinator, RecordEvent, RecordState};
pub use error::RecordError;
pub use process::{Environment, GameEnvironment, GameProcess};
pub use segment::{NormalizedSegment, Segment};
pub use session::Session;
