//! Asynchronous control of a single MPlayer process over its slave-mode
//! text protocol.
//!
//! ```rust,ignore
//! use mplayer_remote::{MPlayer, PlayerConfig};
//!
//! let player = MPlayer::new(PlayerConfig::load_or_default()?);
//! let item = player.open_file("song.ogg").await?;
//! item.set_volume(80.0).await?;
//! item.listen().await?;
//! player.shutdown().await?;
//! ```

mod config;
mod mplayer;

pub use config::{ConfigError, PlayerConfig};
pub use mplayer::*;
