//! Handle to the file currently loaded in MPlayer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::error::PlayerError;
use super::metadata::Metadata;
use super::protocol::{is_normal_eof, EngineCommand, EngineLine, SeekType};
use super::session::{Operation, Session};

const MIN_VOLUME: f64 = 0.0;
const MAX_VOLUME: f64 = 100.0;

#[derive(Debug)]
struct ItemState {
  playing: bool,
  /// Cleared by stop, end of stream, or opening another file. Never set again.
  active: bool,
}

/// One opened media file.
///
/// Clones share state. Once the item is invalid every operation fails with
/// [`PlayerError::InvalidState`] without touching the process.
#[derive(Clone)]
pub struct MediaItem {
  file_name: String,
  session: Session,
  /// Process generation the file was opened on.
  generation: u64,
  timeout: Duration,
  state: Arc<Mutex<ItemState>>,
}

impl MediaItem {
  /// New item for a file MPlayer has just started playing.
  pub(crate) fn new(file_name: &str, session: Session, generation: u64, timeout: Duration) -> Self {
    Self {
      file_name: file_name.to_string(),
      session,
      generation,
      timeout,
      state: Arc::new(Mutex::new(ItemState {
        playing: true,
        active: true,
      })),
    }
  }

  pub fn file_name(&self) -> &str {
    &self.file_name
  }

  pub fn is_playing(&self) -> bool {
    self.state.lock().playing
  }

  /// False after stop, end of stream, replacement, or an engine crash.
  pub fn is_active(&self) -> bool {
    self.state.lock().active && self.session.is_current(self.generation)
  }

  pub(crate) fn invalidate(&self) {
    let mut state = self.state.lock();
    if state.active {
      log::debug!("Media item '{}' invalidated", self.file_name);
    }
    state.active = false;
  }

  fn ensure_active(&self) -> Result<(), PlayerError> {
    if self.is_active() {
      Ok(())
    } else {
      log::warn!("Media item '{}' is not in a valid state", self.file_name);
      Err(PlayerError::InvalidState)
    }
  }

  /// Resume playback. No-op if already playing.
  pub async fn play(&self) -> Result<(), PlayerError> {
    self.ensure_active()?;
    if self.is_playing() {
      return Ok(());
    }

    // Toggle, then confirm through the pause property inside the same window.
    let op = Operation::new(|line: &EngineLine| (line.answer("pause")? == "no").then_some(()))
      .command(EngineCommand::pause())
      .command(EngineCommand::get_property("pause"))
      .on_error(|line| {
        (line.answer("pause")? == "yes")
          .then(|| PlayerError::Engine("Playback is still paused".to_string()))
      })
      .timeout(self.timeout);
    self.session.submit_critical(op).await?;

    self.state.lock().playing = true;
    Ok(())
  }

  /// Pause playback. No-op if already paused.
  pub async fn pause(&self) -> Result<(), PlayerError> {
    self.ensure_active()?;
    if !self.is_playing() {
      return Ok(());
    }

    let op = Operation::new(|line: &EngineLine| line.is_pause_banner().then_some(()))
      .command(EngineCommand::pause())
      .timeout(self.timeout);
    self.session.submit_critical(op).await?;

    self.state.lock().playing = false;
    Ok(())
  }

  /// Seek to an absolute position in seconds.
  pub async fn seek_to(&self, seconds: f64) -> Result<(), PlayerError> {
    self.seek(seconds, SeekType::Absolute).await
  }

  /// Seek relative to the current position.
  pub async fn seek_by(&self, delta_seconds: f64) -> Result<(), PlayerError> {
    self.seek(delta_seconds, SeekType::Relative).await
  }

  async fn seek(&self, value: f64, seek_type: SeekType) -> Result<(), PlayerError> {
    self.ensure_active()?;
    let op = Operation::new(|line: &EngineLine| line.is_position_report().then_some(()))
      .command(EngineCommand::seek(value, seek_type))
      .timeout(self.timeout);
    self.session.submit_critical(op).await
  }

  /// Playback position in seconds.
  pub async fn get_current_time(&self) -> Result<f64, PlayerError> {
    self.query_number("time_pos").await
  }

  /// Playback position as a percentage of the file.
  pub async fn get_current_percent(&self) -> Result<f64, PlayerError> {
    self.query_number("percent_pos").await
  }

  /// File length in seconds.
  pub async fn get_length(&self) -> Result<f64, PlayerError> {
    self.query_number("length").await
  }

  pub async fn get_volume(&self) -> Result<f64, PlayerError> {
    self.query_number("volume").await
  }

  /// Set the volume, clamped to 0..=100. Returns the volume MPlayer confirms.
  pub async fn set_volume(&self, volume: f64) -> Result<f64, PlayerError> {
    self.ensure_active()?;
    let volume = volume.clamp(MIN_VOLUME, MAX_VOLUME);

    let op = number_answer("volume")
      .command(EngineCommand::set_property("volume", volume))
      .command(EngineCommand::get_property("volume"))
      .timeout(self.timeout);
    self.session.submit_critical(op).await
  }

  pub async fn get_metadata(&self) -> Result<Metadata, PlayerError> {
    self.ensure_active()?;
    let op = Operation::new(|line: &EngineLine| line.answer("metadata").map(Metadata::parse))
      .command(EngineCommand::get_property("metadata"))
      .timeout(self.timeout);
    self.session.submit(op).await
  }

  /// Stop playback. The item is invalid afterwards.
  pub async fn stop(&self) -> Result<(), PlayerError> {
    self.ensure_active()?;
    let op = Operation::new(|line: &EngineLine| line.eof_code().map(|_| ()))
      .command(EngineCommand::stop())
      .timeout(self.timeout);
    self.session.submit_critical(op).await?;

    self.invalidate();
    Ok(())
  }

  /// Wait for the end of the stream.
  ///
  /// Resolves on a normal end, rejects with [`PlayerError::PrematureEnd`]
  /// otherwise. The item is invalid once this settles either way.
  pub async fn listen(&self) -> Result<(), PlayerError> {
    self.ensure_active()?;
    let op = Operation::new(|line: &EngineLine| {
      line.eof_code().filter(|c| is_normal_eof(*c)).map(|_| ())
    })
    .on_error(|line| {
      line
        .eof_code()
        .filter(|c| !is_normal_eof(*c))
        .map(PlayerError::PrematureEnd)
    });
    let result = self.session.submit(op).await;

    self.invalidate();
    result
  }

  async fn query_number(&self, property: &'static str) -> Result<f64, PlayerError> {
    self.ensure_active()?;
    let op = number_answer(property)
      .command(EngineCommand::get_property(property))
      .timeout(self.timeout);
    self.session.submit(op).await
  }

  #[cfg(test)]
  pub(crate) fn set_playing(&self, playing: bool) {
    self.state.lock().playing = playing;
  }
}

impl fmt::Debug for MediaItem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("MediaItem")
      .field("file_name", &self.file_name)
      .field("generation", &self.generation)
      .field("playing", &state.playing)
      .field("active", &state.active)
      .finish()
  }
}

/// Operation settled by a numeric `ANS_<property>=` line.
fn number_answer(property: &'static str) -> Operation<f64> {
  Operation::new(move |line: &EngineLine| line.answer(property)?.parse().ok()).on_error(
    move |line| {
      let value = line.answer(property)?;
      value
        .parse::<f64>()
        .is_err()
        .then(|| PlayerError::InvalidAnswer {
          property: property.to_string(),
          value: value.to_string(),
        })
    },
  )
}
