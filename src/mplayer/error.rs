//! Errors surfaced by player operations.

use thiserror::Error;

use super::process::{ExitReport, ProcessError};
use super::transport::TransportError;

/// Rejection reason of a player operation.
#[derive(Debug, Error)]
pub enum PlayerError {
  /// A critical operation is already outstanding.
  #[error("Busy - cannot execute operation")]
  Busy,

  /// The media item was stopped, ended, or replaced.
  #[error("Media item is not in a valid state")]
  InvalidState,

  /// MPlayer reported an explicit failure.
  #[error("{0}")]
  Engine(String),

  #[error("Timed out")]
  Timeout,

  #[error("MPlayer exited ({0})")]
  Exited(ExitReport),

  #[error("MPlayer error: {0}")]
  Fault(String),

  #[error("Playback ended prematurely (EOF code: {0})")]
  PrematureEnd(i32),

  #[error("Failed to stop previous media item: {0}")]
  StopPrevious(#[source] Box<PlayerError>),

  #[error("Invalid answer for {property}: {value:?}")]
  InvalidAnswer { property: String, value: String },

  #[error("Process error: {0}")]
  Process(#[from] ProcessError),

  #[error("Transport error: {0}")]
  Transport(#[from] TransportError),
}
