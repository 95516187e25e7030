//! Scripted stand-in for the MPlayer binary, wired through in-memory pipes.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;

use super::process::{EngineChild, EngineProcess, ExitReport, ProcessError, Spawner};

const PIPE_CAPACITY: usize = 64 * 1024;

pub const READY_BANNER: &str = "CPLAYER: MPlayer 1.4 (C) 2000-2019 MPlayer Team";

/// Install a test logger once; later calls are no-ops.
pub fn init_logging() {
  let _ = env_logger::builder().is_test(true).try_init();
}

/// Spawner handing every fake process to the test through a channel.
pub struct FakeSpawner {
  engines_tx: async_channel::Sender<FakeEngine>,
  engines_rx: async_channel::Receiver<FakeEngine>,
  spawned: AtomicUsize,
  fail_spawn: AtomicBool,
  fail_kill: AtomicBool,
}

impl FakeSpawner {
  pub fn new() -> Arc<Self> {
    init_logging();
    let (engines_tx, engines_rx) = async_channel::unbounded();
    Arc::new(Self {
      engines_tx,
      engines_rx,
      spawned: AtomicUsize::new(0),
      fail_spawn: AtomicBool::new(false),
      fail_kill: AtomicBool::new(false),
    })
  }

  /// Number of processes spawned so far.
  pub fn spawn_count(&self) -> usize {
    self.spawned.load(Ordering::SeqCst)
  }

  pub fn set_fail_spawn(&self, fail: bool) {
    self.fail_spawn.store(fail, Ordering::SeqCst);
  }

  pub fn set_fail_kill(&self, fail: bool) {
    self.fail_kill.store(fail, Ordering::SeqCst);
  }

  /// The next spawned engine.
  pub async fn next_engine(&self) -> FakeEngine {
    self
      .engines_rx
      .recv()
      .await
      .expect("spawner channel closed")
  }

  /// The next spawned engine, after it has printed its readiness banner.
  pub async fn next_ready_engine(&self) -> FakeEngine {
    let mut engine = self.next_engine().await;
    engine.emit(READY_BANNER).await;
    engine
  }
}

impl Spawner for FakeSpawner {
  fn spawn(&self) -> Result<EngineProcess, ProcessError> {
    if self.fail_spawn.load(Ordering::SeqCst) {
      return Err(ProcessError::NotFound);
    }
    self.spawned.fetch_add(1, Ordering::SeqCst);

    let (stdin, stdin_peer) = tokio::io::duplex(PIPE_CAPACITY);
    let (stdout_peer, stdout) = tokio::io::duplex(PIPE_CAPACITY);
    let (stderr_peer, stderr) = tokio::io::duplex(PIPE_CAPACITY);
    let (exit_tx, exit_rx) = mpsc::unbounded_channel();
    let killed = Arc::new(AtomicBool::new(false));

    let engine = FakeEngine {
      stdin: BufReader::new(stdin_peer),
      stdout: stdout_peer,
      stderr: stderr_peer,
      exit_tx: exit_tx.clone(),
      killed: killed.clone(),
    };
    let child = FakeChild {
      exit_tx,
      exit_rx,
      killed,
      fail_kill: self.fail_kill.load(Ordering::SeqCst),
    };

    let _ = self.engines_tx.try_send(engine);

    Ok(EngineProcess {
      stdin: Box::new(stdin),
      stdout: Box::new(stdout),
      stderr: Box::new(stderr),
      child: Box::new(child),
    })
  }
}

struct FakeChild {
  exit_tx: mpsc::UnboundedSender<ExitReport>,
  exit_rx: mpsc::UnboundedReceiver<ExitReport>,
  killed: Arc<AtomicBool>,
  fail_kill: bool,
}

impl EngineChild for FakeChild {
  fn start_kill(&mut self) -> io::Result<()> {
    if self.fail_kill {
      return Err(io::Error::other("failed to shutdown"));
    }
    self.killed.store(true, Ordering::SeqCst);
    let _ = self.exit_tx.send(ExitReport {
      code: None,
      signal: Some(15),
    });
    Ok(())
  }

  fn wait(&mut self) -> BoxFuture<'_, io::Result<ExitReport>> {
    Box::pin(async move {
      self
        .exit_rx
        .recv()
        .await
        .ok_or_else(|| io::Error::other("exit channel closed"))
    })
  }
}

/// Test-side ends of a fake process's pipes.
pub struct FakeEngine {
  stdin: BufReader<DuplexStream>,
  stdout: DuplexStream,
  stderr: DuplexStream,
  exit_tx: mpsc::UnboundedSender<ExitReport>,
  killed: Arc<AtomicBool>,
}

impl FakeEngine {
  /// Print a line on stdout.
  pub async fn emit(&mut self, line: &str) {
    Self::write_line(&mut self.stdout, line).await;
  }

  /// Print a line on stderr.
  pub async fn emit_stderr(&mut self, line: &str) {
    Self::write_line(&mut self.stderr, line).await;
  }

  async fn write_line(stream: &mut DuplexStream, line: &str) {
    stream
      .write_all(format!("{}\n", line).as_bytes())
      .await
      .expect("fake engine pipe closed");
    stream.flush().await.expect("fake engine pipe closed");
  }

  /// Next command line written by the controller.
  pub async fn next_command(&mut self) -> Option<String> {
    let mut line = String::new();
    match self.stdin.read_line(&mut line).await {
      Ok(0) | Err(_) => None,
      Ok(_) => Some(line.trim_end_matches('\n').to_string()),
    }
  }

  /// Next command line if one arrives shortly, `None` otherwise.
  pub async fn try_next_command(&mut self) -> Option<String> {
    tokio::time::timeout(Duration::from_millis(50), self.next_command())
      .await
      .ok()
      .flatten()
  }

  /// Make the process exit on its own.
  pub fn exit(&self, code: Option<i32>) {
    let _ = self.exit_tx.send(ExitReport { code, signal: None });
  }

  pub fn was_killed(&self) -> bool {
    self.killed.load(Ordering::SeqCst)
  }
}
