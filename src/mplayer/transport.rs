//! Line transport over MPlayer's stdio.
//!
//! One writer task owns stdin, one reader task per output stream decodes
//! lines, and a waiter task observes process exit. Every decoded line is
//! broadcast to the listeners registered at that moment.

use std::fmt;
use std::io;
use std::sync::Arc;

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::process::{EngineChild, EngineProcess, ExitReport};
use super::protocol::{EngineCommand, EngineLine, LineSource};

#[derive(Error, Debug)]
pub enum TransportError {
  #[error("Write failed: {0}")]
  WriteFailed(#[from] io::Error),
  #[error("Disconnected")]
  Disconnected,
}

/// Identity of one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(Uuid);

impl OperationId {
  pub fn new() -> Self {
    Self(Uuid::new_v4())
  }
}

impl Default for OperationId {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for OperationId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.0, f)
  }
}

/// What a listener observes.
#[derive(Debug, Clone)]
pub enum EngineSignal {
  Line(EngineLine),
  Exited(ExitReport),
  /// The process could not be waited on or killed.
  Fault(String),
}

/// Listener bookkeeping shared by the reader and waiter tasks.
struct Registry {
  listeners: Vec<(OperationId, Sender<EngineSignal>)>,
  /// Terminal signal, set once the process is gone.
  closed: Option<EngineSignal>,
}

impl Registry {
  fn dispatch(&mut self, signal: EngineSignal) {
    self
      .listeners
      .retain(|(_, tx)| tx.try_send(signal.clone()).is_ok());
  }

  fn close(&mut self, signal: EngineSignal) {
    self.dispatch(signal.clone());
    self.listeners.clear();
    self.closed = Some(signal);
  }
}

/// Registered observer of engine output. Deregisters itself on drop.
pub struct Listener {
  id: OperationId,
  rx: Receiver<EngineSignal>,
  registry: Arc<Mutex<Registry>>,
}

impl Listener {
  pub fn id(&self) -> OperationId {
    self.id
  }

  /// Next signal, or `None` once the transport is gone and nothing is buffered.
  pub async fn recv(&self) -> Option<EngineSignal> {
    self.rx.recv().await.ok()
  }
}

impl Drop for Listener {
  fn drop(&mut self) {
    let id = self.id;
    self.registry.lock().listeners.retain(|(l, _)| *l != id);
  }
}

/// Writer channel message.
struct WriteMessage {
  line: String,
  done: oneshot::Sender<io::Result<()>>,
}

/// Connection to one spawned MPlayer process.
pub struct Transport {
  generation: u64,
  registry: Arc<Mutex<Registry>>,
  write_tx: Sender<WriteMessage>,
  kill_tx: Mutex<Option<oneshot::Sender<()>>>,
  _reader_handles: [JoinHandle<()>; 2],
  _writer_handle: JoinHandle<()>,
  _waiter_handle: JoinHandle<()>,
}

impl Transport {
  /// Take ownership of a spawned process and start the I/O tasks.
  ///
  /// The returned listener is registered before any output is read, so it
  /// sees the very first line. `on_close` runs once the process is gone.
  pub fn attach<F>(process: EngineProcess, generation: u64, on_close: F) -> (Self, Listener)
  where
    F: FnOnce() + Send + 'static,
  {
    let registry = Arc::new(Mutex::new(Registry {
      listeners: Vec::new(),
      closed: None,
    }));
    let startup = Self::register(&registry, OperationId::new());

    let EngineProcess {
      stdin,
      stdout,
      stderr,
      child,
    } = process;

    let (write_tx, write_rx) = async_channel::unbounded::<WriteMessage>();
    let (kill_tx, kill_rx) = oneshot::channel();

    let stdout_handle = tokio::spawn(Self::reader_loop(
      stdout,
      LineSource::Stdout,
      registry.clone(),
    ));
    let stderr_handle = tokio::spawn(Self::reader_loop(
      stderr,
      LineSource::Stderr,
      registry.clone(),
    ));
    let writer_handle = tokio::spawn(Self::writer_loop(stdin, write_rx));
    let waiter_handle = tokio::spawn(Self::wait_loop(
      child,
      kill_rx,
      registry.clone(),
      on_close,
    ));

    let transport = Self {
      generation,
      registry,
      write_tx,
      kill_tx: Mutex::new(Some(kill_tx)),
      _reader_handles: [stdout_handle, stderr_handle],
      _writer_handle: writer_handle,
      _waiter_handle: waiter_handle,
    };

    (transport, startup)
  }

  fn register(registry: &Arc<Mutex<Registry>>, id: OperationId) -> Listener {
    let (tx, rx) = async_channel::unbounded();
    let mut state = registry.lock();
    match &state.closed {
      Some(signal) => {
        let _ = tx.try_send(signal.clone());
      }
      None => state.listeners.push((id, tx)),
    }
    Listener {
      id,
      rx,
      registry: registry.clone(),
    }
  }

  async fn reader_loop<R: AsyncRead + Unpin>(
    reader: R,
    source: LineSource,
    registry: Arc<Mutex<Registry>>,
  ) {
    let mut buf_reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
      buf.clear();
      match buf_reader.read_until(b'\n', &mut buf).await {
        Ok(0) => {
          log::debug!("MPlayer {:?} closed", source);
          break;
        }
        Ok(_) => {
          let decoded = String::from_utf8_lossy(&buf);
          let text = decoded.trim_end_matches(['\n', '\r']);
          if text.is_empty() {
            continue;
          }
          log::debug!("data received: {}", text);
          let line = EngineLine {
            source,
            text: text.to_string(),
          };
          registry.lock().dispatch(EngineSignal::Line(line));
        }
        Err(e) => {
          log::error!("MPlayer {:?} read error: {}", source, e);
          break;
        }
      }
    }
  }

  async fn writer_loop<W: AsyncWrite + Unpin>(mut writer: W, write_rx: Receiver<WriteMessage>) {
    while let Ok(WriteMessage { line, done }) = write_rx.recv().await {
      let mut data = line.into_bytes();
      data.push(b'\n');

      let result = match writer.write_all(&data).await {
        Ok(()) => writer.flush().await,
        Err(e) => Err(e),
      };
      let failed = result.is_err();
      let _ = done.send(result);
      if failed {
        log::error!("MPlayer stdin closed after write failure");
        break;
      }
    }
  }

  async fn wait_loop<F: FnOnce()>(
    mut child: Box<dyn EngineChild>,
    kill_rx: oneshot::Receiver<()>,
    registry: Arc<Mutex<Registry>>,
    on_close: F,
  ) {
    // A dropped kill sender means the transport itself was dropped.
    let exited = tokio::select! {
      result = child.wait() => Some(result),
      _ = kill_rx => None,
    };

    let result = match exited {
      Some(result) => result,
      None => {
        log::info!("Killing MPlayer process");
        match child.start_kill() {
          Ok(()) => child.wait().await,
          Err(e) => Err(e),
        }
      }
    };

    let signal = match result {
      Ok(report) => {
        log::info!("MPlayer exit: {}", report);
        EngineSignal::Exited(report)
      }
      Err(e) => {
        log::error!("MPlayer error: {}", e);
        EngineSignal::Fault(e.to_string())
      }
    };

    registry.lock().close(signal);
    on_close();
  }

  /// Process generation this transport was attached for.
  pub fn generation(&self) -> u64 {
    self.generation
  }

  /// Register a listener for the signals that follow.
  pub fn listen(&self, id: OperationId) -> Listener {
    Self::register(&self.registry, id)
  }

  /// Number of listeners currently registered.
  pub fn listener_count(&self) -> usize {
    self.registry.lock().listeners.len()
  }

  /// Whether the process has exited or faulted.
  pub fn is_closed(&self) -> bool {
    self.registry.lock().closed.is_some()
  }

  /// Write one command line and wait until it is flushed to stdin.
  pub async fn write(&self, cmd: &EngineCommand) -> Result<(), TransportError> {
    let line = cmd.to_line();
    log::info!("Executing: '{}'", line);

    let (done, done_rx) = oneshot::channel();
    self
      .write_tx
      .send(WriteMessage { line, done })
      .await
      .map_err(|_| TransportError::Disconnected)?;

    done_rx.await.map_err(|_| TransportError::Disconnected)??;
    Ok(())
  }

  /// Request termination. The exit is delivered to listeners as usual.
  pub fn kill(&self) {
    if let Some(tx) = self.kill_tx.lock().take() {
      let _ = tx.send(());
    }
  }
}
