//! MPlayer slave-mode module - spawns and controls an external MPlayer process.
//!
//! Architecture:
//! - `process.rs` - MPlayer binary detection and process spawning
//! - `transport.rs` - Line I/O over the process's stdin/stdout/stderr
//! - `protocol.rs` - Command formatting and output-line recognizers
//! - `session.rs` - Process lifecycle, reply correlation, critical-section gate
//! - `media.rs` - Per-file playback state machine
//! - `metadata.rs` - Metadata payload decoding
//! - `client.rs` - High-level client that opens files

mod client;
mod error;
mod media;
mod metadata;
mod process;
mod protocol;
mod session;
mod transport;

#[cfg(test)]
mod testing;

pub use client::MPlayer;
pub use error::PlayerError;
pub use media::MediaItem;
pub use metadata::{parse_key_value_list, Metadata};
pub use process::{
  find_mplayer, EngineChild, EngineProcess, ExitReport, MPlayerSpawner, ProcessError, Spawner,
  MPLAYER_ARGS,
};
pub use protocol::{EngineCommand, EngineLine, LineSource, SeekType};
pub use session::{GateState, Operation, Session, SessionState};
pub use transport::{EngineSignal, Listener, OperationId, Transport, TransportError};
