//! MPlayer process detection and spawning.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

/// Arguments that put MPlayer into slave mode with module-tagged, verbose output.
///
/// The engine's output vocabulary depends on these exact flags.
pub const MPLAYER_ARGS: [&str; 8] = [
  "-msgmodule",
  "-msglevel",
  "all=6:statusline=4",
  "-idle",
  "-slave",
  "-fs",
  "-noborder",
  "-nofontconfig",
];

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("MPlayer executable not found")]
  NotFound,
  #[error("Failed to spawn MPlayer: {0}")]
  SpawnFailed(#[from] io::Error),
  #[error("MPlayer {0} stream was not captured")]
  MissingPipe(&'static str),
}

/// How the engine process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
  pub code: Option<i32>,
  pub signal: Option<i32>,
}

impl From<ExitStatus> for ExitReport {
  fn from(status: ExitStatus) -> Self {
    #[cfg(unix)]
    let signal = {
      use std::os::unix::process::ExitStatusExt;
      status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    Self {
      code: status.code(),
      signal,
    }
  }
}

impl fmt::Display for ExitReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let code = self.code.map_or_else(|| "null".to_string(), |c| c.to_string());
    let signal = self
      .signal
      .map_or_else(|| "null".to_string(), |s| s.to_string());
    write!(f, "{} - {}", code, signal)
  }
}

/// Handle to a running engine used to request termination and observe exit.
pub trait EngineChild: Send {
  /// Ask the process to terminate without waiting for it.
  fn start_kill(&mut self) -> io::Result<()>;

  /// Resolve once the process has exited.
  fn wait(&mut self) -> BoxFuture<'_, io::Result<ExitReport>>;
}

impl EngineChild for Child {
  fn start_kill(&mut self) -> io::Result<()> {
    Child::start_kill(self)
  }

  fn wait(&mut self) -> BoxFuture<'_, io::Result<ExitReport>> {
    Box::pin(async move { Child::wait(self).await.map(ExitReport::from) })
  }
}

/// A spawned engine: one writable input stream, two readable output streams
/// and the child handle.
pub struct EngineProcess {
  pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
  pub stdout: Box<dyn AsyncRead + Send + Unpin>,
  pub stderr: Box<dyn AsyncRead + Send + Unpin>,
  pub child: Box<dyn EngineChild>,
}

/// Capability to start a fresh engine process.
pub trait Spawner: Send + Sync {
  fn spawn(&self) -> Result<EngineProcess, ProcessError>;
}

/// Install locations checked when `mplayer` is not on `PATH`.
fn common_paths() -> &'static [&'static str] {
  if cfg!(windows) {
    &[
      r"C:\Program Files\MPlayer\mplayer.exe",
      r"C:\Program Files (x86)\MPlayer\mplayer.exe",
      r"C:\mplayer\mplayer.exe",
    ]
  } else if cfg!(target_os = "macos") {
    &["/usr/local/bin/mplayer", "/opt/homebrew/bin/mplayer"]
  } else {
    &["/usr/bin/mplayer", "/usr/local/bin/mplayer"]
  }
}

/// Locate the MPlayer executable: `PATH` first, then [`common_paths`].
pub fn find_mplayer() -> Option<PathBuf> {
  which::which("mplayer").ok().or_else(|| {
    common_paths()
      .iter()
      .map(PathBuf::from)
      .find(|p| p.exists())
  })
}

/// Spawns the real `mplayer` binary with piped stdio.
#[derive(Debug, Clone, Default)]
pub struct MPlayerSpawner {
  mplayer_path: Option<PathBuf>,
  extra_args: Vec<String>,
}

impl MPlayerSpawner {
  pub fn new(mplayer_path: Option<PathBuf>, extra_args: Vec<String>) -> Self {
    Self {
      mplayer_path,
      extra_args,
    }
  }

  /// Full argument vector passed to the engine.
  pub fn args(&self) -> Vec<String> {
    MPLAYER_ARGS
      .iter()
      .map(|s| s.to_string())
      .chain(self.extra_args.iter().cloned())
      .collect()
  }
}

impl Spawner for MPlayerSpawner {
  fn spawn(&self) -> Result<EngineProcess, ProcessError> {
    let exe = self
      .mplayer_path
      .clone()
      .or_else(find_mplayer)
      .ok_or(ProcessError::NotFound)?;

    let args = self.args();
    log::info!("Spawning MPlayer: {:?} {:?}", exe, args);

    let mut child = Command::new(&exe)
      .args(&args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()?;

    let stdin = child.stdin.take().ok_or(ProcessError::MissingPipe("stdin"))?;
    let stdout = child
      .stdout
      .take()
      .ok_or(ProcessError::MissingPipe("stdout"))?;
    let stderr = child
      .stderr
      .take()
      .ok_or(ProcessError::MissingPipe("stderr"))?;

    log::info!("MPlayer spawned (pid: {:?})", child.id());

    Ok(EngineProcess {
      stdin: Box::new(stdin),
      stdout: Box::new(stdout),
      stderr: Box::new(stderr),
      child: Box::new(child),
    })
  }
}
