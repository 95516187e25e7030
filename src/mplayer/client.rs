//! High-level MPlayer client: opens files and owns the session.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::PlayerError;
use super::media::MediaItem;
use super::process::{MPlayerSpawner, Spawner};
use super::protocol::{EngineCommand, EngineLine};
use super::session::{Operation, Session};
use crate::config::PlayerConfig;

/// High-level MPlayer client.
///
/// At most one [`MediaItem`] is valid at a time; opening a file stops and
/// invalidates the previous one.
#[derive(Clone)]
pub struct MPlayer {
  session: Session,
  config: Arc<PlayerConfig>,
  current: Arc<Mutex<Option<MediaItem>>>,
}

impl MPlayer {
  /// Create a client driving the `mplayer` binary described by `config`.
  pub fn new(config: PlayerConfig) -> Self {
    let mplayer_path = config
      .mplayer_path
      .as_ref()
      .filter(|s| !s.is_empty())
      .map(PathBuf::from);
    let spawner = MPlayerSpawner::new(mplayer_path, config.mplayer_args.clone());
    Self::with_spawner(config, Arc::new(spawner))
  }

  /// Create a client with a custom process spawner.
  pub fn with_spawner(config: PlayerConfig, spawner: Arc<dyn Spawner>) -> Self {
    let session = Session::new(spawner, config.startup_timeout());
    Self {
      session,
      config: Arc::new(config),
      current: Arc::new(Mutex::new(None)),
    }
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  /// The most recently opened item, if it is still valid.
  pub fn current_item(&self) -> Option<MediaItem> {
    let item = self.current.lock().clone();
    item.filter(|item| item.is_active())
  }

  /// Load a file and resolve once MPlayer starts playing it.
  pub async fn open_file(&self, path: &str) -> Result<MediaItem, PlayerError> {
    log::info!("Opening file '{}'", path);

    if let Some(previous) = self.current_item() {
      log::info!("Stopping previous media item '{}'", previous.file_name());
      previous
        .stop()
        .await
        .map_err(|e| PlayerError::StopPrevious(Box::new(e)))?;
    }

    let op = Operation::new(|line: &EngineLine| line.is_playback_started().then_some(()))
      .command(EngineCommand::loadfile(path))
      .on_error(|line| line.open_error().map(|reason| PlayerError::Engine(reason.to_string())))
      .timeout(self.config.open_timeout());
    let ((), generation) = self.session.submit_critical_tracked(op).await?;

    let item = MediaItem::new(
      path,
      self.session.clone(),
      generation,
      self.config.command_timeout(),
    );
    let replaced = self.current.lock().replace(item.clone());
    if let Some(replaced) = replaced {
      replaced.invalidate();
    }

    log::info!("Playing '{}'", path);
    Ok(item)
  }

  /// Shut MPlayer down. The current item, if any, becomes invalid.
  pub async fn shutdown(&self) -> Result<(), PlayerError> {
    let current = self.current.lock().take();
    if let Some(item) = current {
      item.invalidate();
    }
    self.session.shutdown().await
  }
}
