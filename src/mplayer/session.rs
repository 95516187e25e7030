//! MPlayer session: process lifecycle, response correlation and the
//! critical-section gate.
//!
//! The wire protocol has no request identifiers, so an operation is a set of
//! command lines plus predicates over the output lines that follow them. The
//! first predicate to produce a value settles the operation.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::error::PlayerError;
use super::process::Spawner;
use super::protocol::{EngineCommand, EngineLine};
use super::transport::{EngineSignal, Listener, OperationId, Transport, TransportError};

type DataMatcher<T> = Box<dyn FnMut(&EngineLine) -> Option<T> + Send>;
type ErrorMatcher = Box<dyn FnMut(&EngineLine) -> Option<PlayerError> + Send>;

/// Pending unit of work: command lines to write and how to recognize the reply.
pub struct Operation<T> {
  commands: Vec<EngineCommand>,
  on_data: DataMatcher<T>,
  on_error: ErrorMatcher,
  timeout: Option<Duration>,
}

impl<T> Operation<T> {
  /// Operation settled by the first line `on_data` maps to a value.
  pub fn new<F>(on_data: F) -> Self
  where
    F: FnMut(&EngineLine) -> Option<T> + Send + 'static,
  {
    Self {
      commands: Vec::new(),
      on_data: Box::new(on_data),
      on_error: Box::new(|_| None),
      timeout: None,
    }
  }

  /// Append a command; commands are written in the order they were added.
  pub fn command(mut self, cmd: EngineCommand) -> Self {
    self.commands.push(cmd);
    self
  }

  /// Lines mapped to an error reject the operation. Checked after `on_data`.
  pub fn on_error<F>(mut self, on_error: F) -> Self
  where
    F: FnMut(&EngineLine) -> Option<PlayerError> + Send + 'static,
  {
    self.on_error = Box::new(on_error);
    self
  }

  /// Reject with [`PlayerError::Timeout`] if nothing matches in time.
  /// Without a timeout the operation waits indefinitely.
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  fn settle(&mut self, line: &EngineLine) -> Option<Result<T, PlayerError>> {
    if let Some(value) = (self.on_data)(line) {
      return Some(Ok(value));
    }
    (self.on_error)(line).map(Err)
  }
}

/// Lifecycle of the engine process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  NoProcess,
  /// Spawned, waiting for the readiness banner.
  Starting,
  Ready,
  ShuttingDown,
}

/// Holder of the critical-section token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
  Idle,
  Busy(OperationId),
}

struct Lifecycle {
  state: SessionState,
  transport: Option<Arc<Transport>>,
  /// Incremented for every spawn attempt.
  generation: u64,
}

struct SessionInner {
  spawner: Arc<dyn Spawner>,
  startup_timeout: Option<Duration>,
  lifecycle: Mutex<Lifecycle>,
  gate: Mutex<GateState>,
  /// Serializes spawning.
  ready_lock: tokio::sync::Mutex<()>,
}

impl SessionInner {
  fn handle_close(&self, generation: u64) {
    let mut lifecycle = self.lifecycle.lock();
    if lifecycle.generation == generation {
      log::info!("MPlayer session closed (generation {})", generation);
      lifecycle.state = SessionState::NoProcess;
      lifecycle.transport = None;
    }
  }

  fn reset(&self, generation: u64) -> Option<Arc<Transport>> {
    let mut lifecycle = self.lifecycle.lock();
    if lifecycle.generation != generation {
      return None;
    }
    lifecycle.state = SessionState::NoProcess;
    lifecycle.transport.take()
  }
}

/// Critical-section token; releases the gate when dropped.
struct GateToken<'a> {
  gate: &'a Mutex<GateState>,
  id: OperationId,
}

impl Drop for GateToken<'_> {
  fn drop(&mut self) {
    let mut gate = self.gate.lock();
    if *gate == GateState::Busy(self.id) {
      *gate = GateState::Idle;
    }
  }
}

/// Owner of the single MPlayer process.
#[derive(Clone)]
pub struct Session {
  inner: Arc<SessionInner>,
}

impl Session {
  /// Create a session. Nothing is spawned until the first operation.
  pub fn new(spawner: Arc<dyn Spawner>, startup_timeout: Option<Duration>) -> Self {
    Self {
      inner: Arc::new(SessionInner {
        spawner,
        startup_timeout,
        lifecycle: Mutex::new(Lifecycle {
          state: SessionState::NoProcess,
          transport: None,
          generation: 0,
        }),
        gate: Mutex::new(GateState::Idle),
        ready_lock: tokio::sync::Mutex::new(()),
      }),
    }
  }

  pub fn state(&self) -> SessionState {
    self.inner.lifecycle.lock().state
  }

  pub fn gate_state(&self) -> GateState {
    *self.inner.gate.lock()
  }

  /// Generation of the most recent spawn attempt.
  pub fn generation(&self) -> u64 {
    self.inner.lifecycle.lock().generation
  }

  /// Whether the process of `generation` is still up and ready.
  pub fn is_current(&self, generation: u64) -> bool {
    let lifecycle = self.inner.lifecycle.lock();
    lifecycle.state == SessionState::Ready && lifecycle.generation == generation
  }

  /// Listeners currently attached to the running process.
  pub fn listener_count(&self) -> usize {
    self
      .inner
      .lifecycle
      .lock()
      .transport
      .as_ref()
      .map_or(0, |t| t.listener_count())
  }

  /// Resolve once a process has printed its readiness banner, spawning one
  /// if needed.
  pub async fn ensure_ready(&self) -> Result<Arc<Transport>, PlayerError> {
    let _guard = self.inner.ready_lock.lock().await;

    let (generation, stale) = {
      let mut lifecycle = self.inner.lifecycle.lock();
      if lifecycle.state == SessionState::Ready {
        if let Some(transport) = lifecycle.transport.as_ref().filter(|t| !t.is_closed()) {
          return Ok(transport.clone());
        }
      }
      lifecycle.generation += 1;
      lifecycle.state = SessionState::Starting;
      (lifecycle.generation, lifecycle.transport.take())
    };

    if let Some(stale) = stale {
      log::info!("Discarding MPlayer process (generation {})", stale.generation());
      stale.kill();
    }

    let process = match self.inner.spawner.spawn() {
      Ok(process) => process,
      Err(e) => {
        log::error!("Failed to start MPlayer: {}", e);
        self.inner.reset(generation);
        return Err(e.into());
      }
    };

    let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);
    let (transport, startup) = Transport::attach(process, generation, move || {
      if let Some(inner) = weak.upgrade() {
        inner.handle_close(generation);
      }
    });
    let transport = Arc::new(transport);
    self.inner.lifecycle.lock().transport = Some(transport.clone());

    match self.await_banner(&startup).await {
      Ok(()) => {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.generation != generation
          || lifecycle.state != SessionState::Starting
          || transport.is_closed()
        {
          return Err(TransportError::Disconnected.into());
        }
        lifecycle.state = SessionState::Ready;
        log::info!("MPlayer ready (generation {})", generation);
        Ok(transport)
      }
      Err(e) => {
        log::error!("MPlayer failed to become ready: {}", e);
        if let Some(transport) = self.inner.reset(generation) {
          transport.kill();
        }
        Err(e)
      }
    }
  }

  async fn await_banner(&self, startup: &Listener) -> Result<(), PlayerError> {
    let banner = async {
      loop {
        match startup.recv().await {
          Some(EngineSignal::Line(line)) if line.is_ready_banner() => return Ok(()),
          Some(EngineSignal::Line(_)) => {}
          Some(EngineSignal::Exited(report)) => return Err(PlayerError::Exited(report)),
          Some(EngineSignal::Fault(e)) => return Err(PlayerError::Fault(e)),
          None => return Err(TransportError::Disconnected.into()),
        }
      }
    };

    match self.inner.startup_timeout {
      Some(timeout) => tokio::time::timeout(timeout, banner)
        .await
        .map_err(|_| PlayerError::Timeout)?,
      None => banner.await,
    }
  }

  /// Terminate the process, if any, and wait for it to exit.
  ///
  /// A process still waiting for its banner is killed too; the pending
  /// `ensure_ready` then rejects with the exit.
  pub async fn shutdown(&self) -> Result<(), PlayerError> {
    let transport = {
      let mut lifecycle = self.inner.lifecycle.lock();
      match lifecycle.transport.clone() {
        Some(transport) => {
          lifecycle.state = SessionState::ShuttingDown;
          transport
        }
        None => return Ok(()),
      }
    };

    log::info!("Shutting down MPlayer (generation {})", transport.generation());
    let listener = transport.listen(OperationId::new());
    transport.kill();

    let result = loop {
      match listener.recv().await {
        Some(EngineSignal::Line(_)) => {}
        Some(EngineSignal::Exited(_)) | None => break Ok(()),
        Some(EngineSignal::Fault(e)) => break Err(PlayerError::Fault(e)),
      }
    };
    drop(listener);

    self.inner.reset(transport.generation());
    result
  }

  /// Run a non-exclusive operation. It may overlap any other operation.
  pub async fn submit<T>(&self, op: Operation<T>) -> Result<T, PlayerError> {
    self
      .run(OperationId::new(), op)
      .await
      .map(|(value, _)| value)
  }

  /// Run an operation inside the critical section.
  ///
  /// Rejects with [`PlayerError::Busy`] without touching the process when
  /// another critical operation is outstanding.
  pub async fn submit_critical<T>(&self, op: Operation<T>) -> Result<T, PlayerError> {
    self.submit_critical_tracked(op).await.map(|(value, _)| value)
  }

  /// Like [`Session::submit_critical`], also returning the generation of the
  /// process that answered.
  pub async fn submit_critical_tracked<T>(
    &self,
    op: Operation<T>,
  ) -> Result<(T, u64), PlayerError> {
    let id = OperationId::new();
    let _token = self.acquire(id)?;
    self.run(id, op).await
  }

  fn acquire(&self, id: OperationId) -> Result<GateToken<'_>, PlayerError> {
    let mut gate = self.inner.gate.lock();
    if let GateState::Busy(holder) = *gate {
      log::warn!("Busy - cannot execute operation ({} outstanding)", holder);
      return Err(PlayerError::Busy);
    }
    *gate = GateState::Busy(id);
    Ok(GateToken {
      gate: &self.inner.gate,
      id,
    })
  }

  async fn run<T>(
    &self,
    id: OperationId,
    mut op: Operation<T>,
  ) -> Result<(T, u64), PlayerError> {
    let transport = self.ensure_ready().await?;
    let generation = transport.generation();
    let listener = transport.listen(id);

    for cmd in &op.commands {
      transport.write(cmd).await?;
    }

    let deadline = op.timeout.map(|t| Instant::now() + t);
    loop {
      let signal = match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, listener.recv()).await {
          Ok(signal) => signal,
          Err(_) => {
            log::warn!("Operation {} timed out", id);
            return Err(PlayerError::Timeout);
          }
        },
        None => listener.recv().await,
      };

      match signal {
        Some(EngineSignal::Line(line)) => {
          if let Some(result) = op.settle(&line) {
            return result.map(|value| (value, generation));
          }
        }
        Some(EngineSignal::Exited(report)) => return Err(PlayerError::Exited(report)),
        Some(EngineSignal::Fault(e)) => return Err(PlayerError::Fault(e)),
        None => return Err(TransportError::Disconnected.into()),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mplayer::testing::{FakeSpawner, READY_BANNER};

  const SHORT: Duration = Duration::from_millis(200);

  fn session(spawner: &Arc<FakeSpawner>) -> Session {
    Session::new(spawner.clone(), Some(Duration::from_secs(2)))
  }

  fn answer_op(property: &'static str) -> Operation<String> {
    Operation::new(move |line| line.answer(property).map(str::to_string))
      .command(EngineCommand::get_property(property))
      .timeout(Duration::from_secs(2))
  }

  /// Wait until the process is ready and an operation is listening.
  async fn wait_for_listener(session: &Session) {
    while session.state() != SessionState::Ready || session.listener_count() == 0 {
      tokio::task::yield_now().await;
    }
  }

  #[tokio::test]
  async fn test_ensure_ready_waits_for_banner() {
    let spawner = FakeSpawner::new();
    let session = session(&spawner);
    assert_eq!(session.state(), SessionState::NoProcess);

    let task = tokio::spawn({
      let session = session.clone();
      async move { session.ensure_ready().await.map(|_| ()) }
    });

    let mut engine = spawner.next_engine().await;
    assert_eq!(session.state(), SessionState::Starting);
    engine.emit("MPlayer noise before the banner").await;
    engine.emit(READY_BANNER).await;

    task.await.unwrap().unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(spawner.spawn_count(), 1);
    // Startup listener is gone once ready.
    assert_eq!(session.listener_count(), 0);

    // Already ready: no second spawn.
    session.ensure_ready().await.unwrap();
    assert_eq!(spawner.spawn_count(), 1);
  }

  #[tokio::test]
  async fn test_ensure_ready_rejects_on_exit_before_banner() {
    let spawner = FakeSpawner::new();
    let session = session(&spawner);

    let task = tokio::spawn({
      let session = session.clone();
      async move { session.ensure_ready().await.map(|_| ()) }
    });
    let engine = spawner.next_engine().await;
    engine.exit(Some(1));

    match task.await.unwrap() {
      Err(PlayerError::Exited(report)) => assert_eq!(report.code, Some(1)),
      other => panic!("expected exit, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::NoProcess);
  }

  #[tokio::test]
  async fn test_ensure_ready_times_out_without_banner() {
    let spawner = FakeSpawner::new();
    let session = Session::new(spawner.clone(), Some(SHORT));

    let task = tokio::spawn({
      let session = session.clone();
      async move { session.ensure_ready().await.map(|_| ()) }
    });
    let engine = spawner.next_engine().await;

    assert!(matches!(task.await.unwrap(), Err(PlayerError::Timeout)));
    assert_eq!(session.state(), SessionState::NoProcess);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(engine.was_killed());
  }

  #[tokio::test]
  async fn test_spawn_failure_is_reported() {
    let spawner = FakeSpawner::new();
    spawner.set_fail_spawn(true);
    let session = session(&spawner);

    assert!(matches!(
      session.ensure_ready().await,
      Err(PlayerError::Process(_))
    ));
    assert_eq!(session.state(), SessionState::NoProcess);
  }

  #[tokio::test]
  async fn test_submit_resolves_on_matching_line() {
    let spawner = FakeSpawner::new();
    let session = session(&spawner);

    let task = tokio::spawn({
      let session = session.clone();
      async move { session.submit(answer_op("volume")).await }
    });

    let mut engine = spawner.next_ready_engine().await;
    assert_eq!(
      engine.next_command().await.as_deref(),
      Some("pausing_keep_force get_property volume")
    );
    engine.emit("GLOBAL: ANS_time_pos=3.0").await;
    engine.emit("GLOBAL: ANS_volume=42.0").await;

    assert_eq!(task.await.unwrap().unwrap(), "42.0");
    assert_eq!(session.listener_count(), 0);
  }

  #[tokio::test]
  async fn test_error_predicate_rejects() {
    let spawner = FakeSpawner::new();
    let session = session(&spawner);

    let op = Operation::new(|line: &EngineLine| line.is_playback_started().then_some(()))
      .command(EngineCommand::loadfile("bob"))
      .on_error(|line| line.open_error().map(|e| PlayerError::Engine(e.to_string())))
      .timeout(Duration::from_secs(2));
    let task = tokio::spawn({
      let session = session.clone();
      async move { session.submit_critical(op).await }
    });

    let mut engine = spawner.next_ready_engine().await;
    assert_eq!(engine.next_command().await.as_deref(), Some("loadfile \"bob\""));
    engine.emit_stderr("OPEN: File not found \"bob\"").await;

    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err.to_string(), "File not found \"bob\"");
    assert_eq!(session.gate_state(), GateState::Idle);
  }

  #[tokio::test]
  async fn test_submit_times_out() {
    let spawner = FakeSpawner::new();
    let session = session(&spawner);

    let op = answer_op("length").timeout(SHORT);
    let task = tokio::spawn({
      let session = session.clone();
      async move { session.submit_critical(op).await }
    });

    let mut engine = spawner.next_ready_engine().await;
    engine.next_command().await;

    assert!(matches!(task.await.unwrap(), Err(PlayerError::Timeout)));
    assert_eq!(session.gate_state(), GateState::Idle);
    assert_eq!(session.listener_count(), 0);
  }

  #[tokio::test]
  async fn test_critical_rejects_while_busy() {
    let spawner = FakeSpawner::new();
    let session = session(&spawner);

    let first = tokio::spawn({
      let session = session.clone();
      async move { session.submit_critical(answer_op("volume")).await }
    });

    let mut engine = spawner.next_ready_engine().await;
    engine.next_command().await;
    let holder = match session.gate_state() {
      GateState::Busy(id) => id,
      GateState::Idle => panic!("gate should be held"),
    };

    let second = session.submit_critical(answer_op("length")).await;
    assert!(matches!(second, Err(PlayerError::Busy)));
    assert_eq!(second.unwrap_err().to_string(), "Busy - cannot execute operation");
    assert_eq!(engine.try_next_command().await, None);
    assert_eq!(session.gate_state(), GateState::Busy(holder));

    engine.emit("GLOBAL: ANS_volume=80").await;
    assert_eq!(first.await.unwrap().unwrap(), "80");
    assert_eq!(session.gate_state(), GateState::Idle);
  }

  #[tokio::test]
  async fn test_non_exclusive_runs_alongside_critical() {
    let spawner = FakeSpawner::new();
    let session = session(&spawner);

    let critical = tokio::spawn({
      let session = session.clone();
      async move { session.submit_critical(answer_op("volume")).await }
    });
    let mut engine = spawner.next_ready_engine().await;
    engine.next_command().await;

    let shared = tokio::spawn({
      let session = session.clone();
      async move { session.submit(answer_op("length")).await }
    });
    assert_eq!(
      engine.next_command().await.as_deref(),
      Some("pausing_keep_force get_property length")
    );

    engine.emit("GLOBAL: ANS_length=120.7").await;
    engine.emit("GLOBAL: ANS_volume=55").await;
    assert_eq!(shared.await.unwrap().unwrap(), "120.7");
    assert_eq!(critical.await.unwrap().unwrap(), "55");
  }

  #[tokio::test]
  async fn test_exit_rejects_outstanding_and_respawns() {
    let spawner = FakeSpawner::new();
    let session = session(&spawner);

    let op = Operation::new(|line: &EngineLine| line.eof_code());
    let task = tokio::spawn({
      let session = session.clone();
      async move { session.submit(op).await }
    });
    let engine = spawner.next_ready_engine().await;
    wait_for_listener(&session).await;
    engine.exit(Some(139));

    match task.await.unwrap() {
      Err(PlayerError::Exited(report)) => assert_eq!(report.code, Some(139)),
      other => panic!("expected exit, got {:?}", other),
    }
    while session.state() != SessionState::NoProcess {
      tokio::task::yield_now().await;
    }

    let task = tokio::spawn({
      let session = session.clone();
      async move { session.submit(answer_op("volume")).await }
    });
    let mut engine = spawner.next_ready_engine().await;
    engine.next_command().await;
    engine.emit("GLOBAL: ANS_volume=10").await;
    assert_eq!(task.await.unwrap().unwrap(), "10");
    assert_eq!(spawner.spawn_count(), 2);
    assert_eq!(session.generation(), 2);
  }

  #[tokio::test]
  async fn test_shutdown_without_process_is_trivial() {
    let spawner = FakeSpawner::new();
    let session = session(&spawner);

    session.shutdown().await.unwrap();
    assert_eq!(spawner.spawn_count(), 0);
    assert_eq!(session.state(), SessionState::NoProcess);
  }

  #[tokio::test]
  async fn test_shutdown_kills_process() {
    let spawner = FakeSpawner::new();
    let session = session(&spawner);

    let task = tokio::spawn({
      let session = session.clone();
      async move { session.ensure_ready().await.map(|_| ()) }
    });
    let engine = spawner.next_ready_engine().await;
    task.await.unwrap().unwrap();

    session.shutdown().await.unwrap();
    assert!(engine.was_killed());
    assert_eq!(session.state(), SessionState::NoProcess);
    assert_eq!(session.listener_count(), 0);
  }

  #[tokio::test]
  async fn test_shutdown_reports_kill_failure() {
    let spawner = FakeSpawner::new();
    spawner.set_fail_kill(true);
    let session = session(&spawner);

    let task = tokio::spawn({
      let session = session.clone();
      async move { session.ensure_ready().await.map(|_| ()) }
    });
    let _engine = spawner.next_ready_engine().await;
    task.await.unwrap().unwrap();

    let err = session.shutdown().await.unwrap_err();
    assert_eq!(err.to_string(), "MPlayer error: failed to shutdown");
    assert_eq!(session.state(), SessionState::NoProcess);
  }

  #[tokio::test]
  async fn test_shutdown_during_unbounded_startup() {
    let spawner = FakeSpawner::new();
    let session = Session::new(spawner.clone(), None);

    let startup = tokio::spawn({
      let session = session.clone();
      async move { session.ensure_ready().await.map(|_| ()) }
    });
    let engine = spawner.next_engine().await;
    assert_eq!(session.state(), SessionState::Starting);

    tokio::time::timeout(Duration::from_secs(2), session.shutdown())
      .await
      .expect("shutdown waited for the banner")
      .unwrap();
    assert!(engine.was_killed());
    assert!(matches!(startup.await.unwrap(), Err(PlayerError::Exited(_))));
    assert_eq!(session.state(), SessionState::NoProcess);
    assert_eq!(session.listener_count(), 0);
  }

  #[tokio::test]
  async fn test_fault_rejects_outstanding_operation() {
    let spawner = FakeSpawner::new();
    spawner.set_fail_kill(true);
    let session = session(&spawner);

    let op = Operation::new(|line: &EngineLine| line.eof_code());
    let pending = tokio::spawn({
      let session = session.clone();
      async move { session.submit(op).await }
    });
    let _engine = spawner.next_ready_engine().await;
    wait_for_listener(&session).await;

    let err = session.shutdown().await.unwrap_err();
    assert!(matches!(err, PlayerError::Fault(_)));
    match pending.await.unwrap() {
      Err(PlayerError::Fault(reason)) => assert_eq!(reason, "failed to shutdown"),
      other => panic!("expected fault, got {:?}", other),
    }
    assert_eq!(session.listener_count(), 0);
    assert_eq!(session.state(), SessionState::NoProcess);
  }

  #[tokio::test]
  async fn test_tracked_submit_reports_answering_generation() {
    let spawner = FakeSpawner::new();
    let session = session(&spawner);

    let task = tokio::spawn({
      let session = session.clone();
      async move { session.submit_critical_tracked(answer_op("volume")).await }
    });
    let mut engine = spawner.next_ready_engine().await;
    engine.next_command().await;
    engine.emit("GLOBAL: ANS_volume=20").await;
    assert_eq!(task.await.unwrap().unwrap(), ("20".to_string(), 1));

    engine.exit(Some(0));
    while session.state() != SessionState::NoProcess {
      tokio::task::yield_now().await;
    }

    let task = tokio::spawn({
      let session = session.clone();
      async move { session.submit_critical_tracked(answer_op("volume")).await }
    });
    let mut engine = spawner.next_ready_engine().await;
    engine.next_command().await;
    engine.emit("GLOBAL: ANS_volume=25").await;
    assert_eq!(task.await.unwrap().unwrap(), ("25".to_string(), 2));
    assert_eq!(session.generation(), 2);
  }

  #[tokio::test]
  async fn test_commands_written_in_order() {
    let spawner = FakeSpawner::new();
    let session = session(&spawner);

    let op = Operation::new(|line: &EngineLine| line.answer("volume").map(str::to_string))
      .command(EngineCommand::set_property("volume", 30.0))
      .command(EngineCommand::get_property("volume"))
      .timeout(Duration::from_secs(2));
    let task = tokio::spawn({
      let session = session.clone();
      async move { session.submit_critical(op).await }
    });

    let mut engine = spawner.next_ready_engine().await;
    assert_eq!(
      engine.next_command().await.as_deref(),
      Some("pausing_keep_force set_property volume 30")
    );
    assert_eq!(
      engine.next_command().await.as_deref(),
      Some("pausing_keep_force get_property volume")
    );
    engine.emit("GLOBAL: ANS_volume=30.000000").await;
    assert_eq!(task.await.unwrap().unwrap(), "30.000000");
  }
}
