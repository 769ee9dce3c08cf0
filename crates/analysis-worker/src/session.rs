//! Engine session: one UCI engine process driven as an async request/response channel.
//!
//! UCI has no request identifiers, so a session serializes searches: a fair
//! turn lock admits one `analyze` call at a time and a FIFO queue matches each
//! `bestmove` line to the oldest outstanding request.

use std::collections::VecDeque;
use std::future::Future;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::{EngineOptions, WorkerConfig};
use crate::error::WorkerError;
use crate::uci::{self, Command, EngineEvent, EvaluationResult, SearchTracker};

/// Grace period for the engine to exit after `quit` before it is killed.
const QUIT_GRACE: Duration = Duration::from_millis(500);

/// Ordered by progress; a session only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Uninitialized,
    HandshakeSent,
    HandshakeAcked,
    Ready,
    /// Engine gone or shut down; terminal
    Closed,
}

type Reply<T> = oneshot::Sender<Result<T, WorkerError>>;

/// FIFO of requesters awaiting a terminal engine line.
///
/// Values resolve strictly in submission order. Once closed, every pending
/// requester is failed and later submissions are refused.
pub struct RequestQueue<T> {
    waiters: VecDeque<Reply<T>>,
    closed: bool,
}

impl<T> Default for RequestQueue<T> {
    fn default() -> Self {
        Self {
            waiters: VecDeque::new(),
            closed: false,
        }
    }
}

impl<T> RequestQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self) -> Result<oneshot::Receiver<Result<T, WorkerError>>, WorkerError> {
        if self.closed {
            return Err(WorkerError::EngineExited);
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.push_back(tx);
        Ok(rx)
    }

    /// Hand `value` to the oldest requester. Returns false if none was waiting.
    pub fn resolve(&mut self, value: T) -> bool {
        match self.waiters.pop_front() {
            Some(tx) => {
                // A requester that gave up has dropped its receiver
                let _ = tx.send(Ok(value));
                true
            }
            None => false,
        }
    }

    /// Take back the most recent submission. Returns false if none was waiting.
    pub fn withdraw_latest(&mut self) -> bool {
        self.waiters.pop_back().is_some()
    }

    /// Fail every pending requester and refuse new ones. Returns how many were failed.
    pub fn close(&mut self, error: impl Fn() -> WorkerError) -> usize {
        self.closed = true;
        let failed = self.waiters.len();
        for tx in self.waiters.drain(..) {
            let _ = tx.send(Err(error()));
        }
        failed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

type EngineWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// State shared between the session handle and its reader task.
struct Shared {
    writer: Mutex<EngineWriter>,
    pending: StdMutex<RequestQueue<EvaluationResult>>,
    state: watch::Sender<SessionState>,
    options: EngineOptions,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, RequestQueue<EvaluationResult>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Advance to `next`; never moves backwards.
    fn transition(&self, next: SessionState) {
        self.state.send_if_modified(|state| {
            if *state >= next {
                return false;
            }
            debug!(from = ?*state, to = ?next, "Engine session state");
            *state = next;
            true
        });
    }

    fn close(&self) {
        let failed = self.pending().close(|| WorkerError::EngineExited);
        if failed > 0 {
            warn!(failed, "Engine session closed with pending requests");
        }
        self.state.send_replace(SessionState::Closed);
    }

    async fn send(&self, commands: &[Command]) -> Result<(), WorkerError> {
        let mut writer = self.writer.lock().await;
        write_commands(&mut writer, commands).await
    }

    async fn configure(&self) -> Result<(), WorkerError> {
        self.send(&[
            Command::threads(self.options.threads),
            Command::hash(self.options.hash_mb),
            Command::multi_pv(1),
            Command::analyse_mode(true),
            Command::ponder(false),
            Command::IsReady,
        ])
        .await
    }
}

async fn write_commands(writer: &mut EngineWriter, commands: &[Command]) -> Result<(), WorkerError> {
    for command in commands {
        let line = command.encode();
        debug!(cmd = %line, "SF <");
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Keeps the request queue in step with the commands actually sent.
///
/// If an `analyze` call is dropped before its search reached the engine, its
/// waiter must not stay queued, or every later `bestmove` would go to the
/// wrong caller. Nothing written yet: the waiter is withdrawn. Dropped part way
/// through writing: the stream can no longer be trusted and the session closes.
struct Submission<'a> {
    shared: &'a Shared,
    stage: SubmitStage,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SubmitStage {
    Queued,
    Writing,
    Sent,
}

impl<'a> Submission<'a> {
    fn new(shared: &'a Shared) -> Self {
        Self {
            shared,
            stage: SubmitStage::Queued,
        }
    }
}

impl Drop for Submission<'_> {
    fn drop(&mut self) {
        match self.stage {
            SubmitStage::Queued => {
                if self.shared.pending().withdraw_latest() {
                    debug!("Search cancelled before it was sent, request withdrawn");
                }
            }
            SubmitStage::Writing => {
                warn!("Search cancelled mid-write, closing session");
                self.shared.close();
            }
            SubmitStage::Sent => {}
        }
    }
}

/// Consume engine output until EOF, then close the session.
async fn read_loop<R>(reader: R, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin + Send,
{
    let mut lines = BufReader::new(reader).lines();
    let mut tracker = SearchTracker::new();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Engine output closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read from engine");
                break;
            }
        };
        debug!(line = line.trim(), "SF >");

        match uci::decode(&line) {
            EngineEvent::HandshakeAck => {
                shared.transition(SessionState::HandshakeAcked);
                if let Err(e) = shared.configure().await {
                    warn!(error = %e, "Failed to configure engine");
                    break;
                }
            }
            EngineEvent::ReadinessAck => shared.transition(SessionState::Ready),
            EngineEvent::Identity { name } => info!(engine = %name, "Engine identified"),
            EngineEvent::SearchProgress { depth, score, pv } => tracker.observe(depth, score, &pv),
            EngineEvent::SearchComplete { best_move } => {
                let result = tracker.finish(best_move);
                if !shared.pending().resolve(result) {
                    debug!("bestmove with no outstanding request, dropped");
                }
            }
            EngineEvent::Unrecognized(line) => trace!(line = %line, "Ignoring engine line"),
        }
    }

    shared.close();
}

/// An owned engine instance. Dropping it kills the process.
pub struct EngineSession {
    shared: Arc<Shared>,
    /// Held for a whole search; the flag records whether `ucinewgame` was sent
    turn: Mutex<bool>,
    reader: StdMutex<Option<JoinHandle<()>>>,
    child: Mutex<Option<Child>>,
    search_timeout: Option<Duration>,
}

impl EngineSession {
    /// Locate and spawn the engine, then start the handshake.
    pub async fn start(config: &WorkerConfig) -> Result<Self, WorkerError> {
        let path = config.locate_engine()?;
        info!(path = %path.display(), "Starting engine");

        let mut child = tokio::process::Command::new(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                WorkerError::EngineUnavailable(format!("failed to spawn {}: {e}", path.display()))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerError::EngineUnavailable("engine stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::EngineUnavailable("engine stdout not captured".into()))?;

        Self::connect(stdout, stdin, Some(child), config).await
    }

    /// Run a session over arbitrary streams instead of a spawned process.
    pub async fn from_io<R, W>(reader: R, writer: W, config: &WorkerConfig) -> Result<Self, WorkerError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::connect(reader, writer, None, config).await
    }

    async fn connect<R, W>(
        reader: R,
        writer: W,
        child: Option<Child>,
        config: &WorkerConfig,
    ) -> Result<Self, WorkerError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        let shared = Arc::new(Shared {
            writer: Mutex::new(Box::new(writer)),
            pending: StdMutex::new(RequestQueue::new()),
            state,
            options: config.engine_options,
        });

        let reader = tokio::spawn(read_loop(reader, shared.clone()));

        let session = Self {
            shared,
            turn: Mutex::new(false),
            reader: StdMutex::new(Some(reader)),
            child: Mutex::new(child),
            search_timeout: config.search_timeout,
        };

        session.shared.transition(SessionState::HandshakeSent);
        session.shared.send(&[Command::Uci]).await?;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Wait for `readyok`. On timeout the caller may proceed: returns `Ok(false)`.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<bool, WorkerError> {
        let mut state = self.shared.state.subscribe();
        let waited = tokio::time::timeout(timeout, async {
            state
                .wait_for(|s| matches!(s, SessionState::Ready | SessionState::Closed))
                .await
                .map(|s| *s == SessionState::Ready)
        })
        .await;

        match waited {
            Ok(Ok(true)) => Ok(true),
            Ok(_) => Err(WorkerError::EngineExited),
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    state = ?self.state(),
                    "Engine not ready in time, proceeding anyway"
                );
                Ok(false)
            }
        }
    }

    /// Search `fen` to `depth` and return the final score, best move and PV.
    pub async fn analyze(&self, fen: &str, depth: u32) -> Result<EvaluationResult, WorkerError> {
        let mut new_game_sent = self.turn.lock().await;

        let mut commands = Vec::with_capacity(3);
        if !*new_game_sent {
            commands.push(Command::UciNewGame);
        }
        commands.push(Command::PositionFen(fen.to_string()));
        commands.push(Command::GoDepth(depth));

        let reply = self.shared.pending().submit()?;
        let mut submission = Submission::new(&self.shared);

        let mut writer = self.shared.writer.lock().await;
        submission.stage = SubmitStage::Writing;
        let written = write_commands(&mut writer, &commands).await;
        drop(writer);
        submission.stage = SubmitStage::Sent;
        drop(submission);

        if let Err(e) = written {
            self.shared.close();
            return Err(e);
        }
        *new_game_sent = true;

        let outcome = match self.search_timeout {
            Some(limit) => match tokio::time::timeout(limit, reply).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let limit_ms = limit.as_millis() as u64;
                    warn!(fen, depth, limit_ms, "Engine search timed out, closing session");
                    // The stream is out of step with the queue from here on
                    self.shared.close();
                    return Err(WorkerError::SearchTimeout(limit_ms));
                }
            },
            None => reply.await,
        };

        outcome.unwrap_or(Err(WorkerError::EngineExited))
    }

    /// Ask the engine to quit, kill it if it lingers, and fail anything pending.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.state() != SessionState::Closed {
            if let Err(e) = self.shared.send(&[Command::Quit]).await {
                debug!(error = %e, "Failed to send quit");
            }
        }

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(QUIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => debug!(%status, "Engine exited"),
                _ => {
                    debug!("Killing engine");
                    let _ = child.kill().await;
                }
            }
        }

        if let Some(reader) = self.reader_handle().take() {
            reader.abort();
        }
        self.shared.close();
    }

    fn reader_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.reader.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        if let Some(reader) = self.reader_handle().take() {
            reader.abort();
        }
        // Best-effort synchronous kill in drop
        if let Some(child) = self.child.get_mut().as_mut() {
            let _ = child.start_kill();
        }
    }
}

/// Start an engine, wait for readiness, run `job`, and shut the engine down
/// whether the job succeeded or not.
pub async fn with_engine<T, F, Fut>(config: &WorkerConfig, job: F) -> Result<T, WorkerError>
where
    F: FnOnce(Arc<EngineSession>) -> Fut,
    Fut: Future<Output = Result<T, WorkerError>>,
{
    let session = Arc::new(EngineSession::start(config).await?);

    let outcome = match session.wait_until_ready(config.ready_timeout).await {
        Ok(_) => job(session.clone()).await,
        Err(e) => Err(e),
    };

    session.shutdown().await;
    outcome
}
