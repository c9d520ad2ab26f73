//! # logtail
//!
//! Incremental observation of append-only text files plus decoding of
//! the telemetry markers the recorder's action scripts echo into the
//! game console log.
//!
//! [`Tailer`] polls a file for growth and delivers exactly the newly
//! appended bytes; [`MarkerCodec`] turns those chunks into structured
//! [`LogEvent`]s.

mod codec;
mod tailer;

pub use codec::{CODE_RECORD, CODE_RECORD_END, CODE_SKIP_START, LogEvent, MarkerCodec};
pub use tailer::{CloseHandle, Tailer};
