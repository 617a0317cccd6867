// ── Board ──
//
// Owns the connection state of one device and the background watch task
// that keeps probing it while the caller wants it connected. `connected`
// is the caller's intent; `online` is what the last probe saw.
//
// State sits behind a std mutex that is never held across an await.
// Events for a state change are published while the lock is held, so the
// order subscribers see always matches the order of the transitions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use smoothly_api::parse::parse_version;
use smoothly_api::{
    BoardInfo, HttpTransport, ParsedResponse, Transport, TransportConfig, parse_response, wire,
};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandOutcome, CommandReply, PROBE_COMMAND};
use crate::config::BoardConfig;
use crate::error::CoreError;
use crate::event::{BoardEmitter, BoardEvent, BoardEventKind, EventData, TransportEvent};
use crate::pipeline::CommandPipeline;

// ── ConnectionStatus ─────────────────────────────────────────────────

/// Snapshot of a board's connection state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// The caller asked for the board to be connected.
    pub connected: bool,
    /// The most recent probe got an answer.
    pub online: bool,
    pub last_online_time: Option<DateTime<Utc>>,
    /// Consecutive failed probes since the board went offline.
    pub reconnect_attempts: u32,
    /// Successful `connect()` calls.
    pub connections: u32,
    /// Offline to online transitions since the last `connect()`.
    pub reconnections: u32,
    /// A watch cycle is scheduled.
    pub watching: bool,
}

struct WatchHandle {
    cancel: CancellationToken,
}

struct BoardState {
    status: ConnectionStatus,
    last_online: Option<Instant>,
    info: Option<BoardInfo>,
    /// Bumped on every successful `connect()`; a watch task only acts on
    /// the session it was started for.
    session: u64,
    watch: Option<WatchHandle>,
}

impl BoardState {
    fn new() -> Self {
        Self {
            status: ConnectionStatus::default(),
            last_online: None,
            info: None,
            session: 0,
            watch: None,
        }
    }

    fn mark_online(&mut self) {
        self.status.online = true;
        self.status.last_online_time = Some(Utc::now());
        self.last_online = Some(Instant::now());
    }

    /// Apply the result of one watch probe and return the events it
    /// produces, in order.
    fn apply_probe(&mut self, alive: bool) -> Vec<(BoardEventKind, EventData)> {
        let mut events = Vec::new();
        if alive {
            if !self.status.online {
                self.status.reconnect_attempts = 0;
                self.status.reconnections += 1;
                events.push((BoardEventKind::Connect, EventData::None));
                events.push((BoardEventKind::Reconnect, EventData::None));
            }
            self.mark_online();
        } else if self.status.online {
            self.status.online = false;
            events.push((BoardEventKind::Disconnect, EventData::None));
            if self.status.reconnections > 0 {
                events.push((BoardEventKind::Redisconnect, EventData::None));
            }
        } else {
            self.status.reconnect_attempts += 1;
            events.push((
                BoardEventKind::ReconnectAttempt,
                EventData::Attempts(self.status.reconnect_attempts),
            ));
        }
        events
    }
}

/// Delay before the next watch probe. A board seen online less than one
/// interval ago waits that much longer, so a busy board is not flooded.
pub(crate) fn watch_delay(interval: Duration, since_online: Option<Duration>) -> Duration {
    match since_online {
        Some(elapsed) if elapsed < interval => interval + elapsed,
        _ => interval,
    }
}

// ── Board ────────────────────────────────────────────────────────────

struct BoardInner<T: Transport> {
    config: BoardConfig,
    pipeline: CommandPipeline<T>,
    events: BoardEmitter,
    state: Mutex<BoardState>,
    /// Serializes `connect()` calls.
    connecting: tokio::sync::Mutex<()>,
    /// Fires when the last handle is dropped.
    lifetime: CancellationToken,
}

impl<T: Transport> Drop for BoardInner<T> {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

impl<T: Transport> BoardInner<T> {
    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, kind: BoardEventKind, data: EventData) {
        self.events.emit(kind, data, None);
    }

    /// Handle a finished watch probe. Returns `false` when the watch task
    /// should exit.
    fn finish_watch_cycle(&self, session: u64, outcome: &Result<CommandOutcome, CoreError>) -> bool {
        let mut state = self.lock();
        if !state.status.connected || state.session != session {
            return false;
        }

        let alive = matches!(outcome, Ok(o) if o.board_answered());
        if let Ok(CommandOutcome::Success(response)) = outcome {
            if let Ok(info) = parse_version(&response.body) {
                state.info = Some(info);
            }
        }

        let was_online = state.status.online;
        for (kind, data) in state.apply_probe(alive) {
            self.emit(kind, data);
        }
        match (was_online, state.status.online) {
            (false, true) => info!(address = %self.config.address, "board reconnected"),
            (true, false) => warn!(address = %self.config.address, "board went offline"),
            _ => {}
        }

        self.emit(BoardEventKind::Watch, EventData::None);
        true
    }
}

/// Handle to one board. Clones share the same connection.
pub struct Board<T: Transport = HttpTransport> {
    inner: Arc<BoardInner<T>>,
}

impl<T: Transport> Clone for Board<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Board<HttpTransport> {
    /// A board reached over HTTP with a default client.
    pub fn http(config: BoardConfig) -> Result<Self, CoreError> {
        let transport = HttpTransport::new(&TransportConfig::default())?;
        Self::new(config, Arc::new(transport))
    }
}

impl<T: Transport> Board<T> {
    /// Fails if `config.address` cannot form a command URL.
    pub fn new(config: BoardConfig, transport: Arc<T>) -> Result<Self, CoreError> {
        wire::command_url(&config.address)?;

        let events = BoardEmitter::new(&config.address);
        let lifetime = CancellationToken::new();
        let pipeline = CommandPipeline::new(transport)
            .with_events(events.clone())
            .with_cancel(lifetime.child_token());

        Ok(Self {
            inner: Arc::new(BoardInner {
                config,
                pipeline,
                events,
                state: Mutex::new(BoardState::new()),
                connecting: tokio::sync::Mutex::new(()),
                lifetime,
            }),
        })
    }

    pub fn address(&self) -> &str {
        &self.inner.config.address
    }

    pub fn config(&self) -> &BoardConfig {
        &self.inner.config
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.lock().status.clone()
    }

    /// Board identity from the last successful `version` answer.
    pub fn info(&self) -> Option<BoardInfo> {
        self.inner.lock().info.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BoardEvent>> {
        self.inner.events.subscribe()
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Connect with the board's command timeout.
    pub async fn connect(&self) -> Result<BoardInfo, CoreError> {
        self.connect_with_timeout(self.inner.config.command.timeout).await
    }

    /// Probe the board once and, if it answers with a valid version,
    /// mark it connected and start watching it.
    pub async fn connect_with_timeout(&self, timeout: Duration) -> Result<BoardInfo, CoreError> {
        let _connecting = self.inner.connecting.lock().await;
        let address = self.address();

        {
            let mut state = self.inner.lock();
            if state.status.connected {
                return Err(CoreError::AlreadyConnected {
                    address: address.to_owned(),
                });
            }
            state.status.reconnect_attempts = 0;
        }

        debug!(address, ?timeout, "connecting");
        // Liveness probes stay off the event channel, like watch probes.
        let mut probe = Command::probe(PROBE_COMMAND, timeout);
        let response = self
            .inner
            .pipeline
            .silent()
            .submit(&mut probe, address)
            .await?
            .into_response(address, PROBE_COMMAND)?;
        let board_info = parse_version(&response.body)?;

        let mut state = self.inner.lock();
        state.status.connected = true;
        state.mark_online();
        state.status.connections += 1;
        state.status.reconnections = 0;
        state.info = Some(board_info.clone());
        state.session += 1;

        let cancel = self.inner.lifetime.child_token();
        state.watch = Some(WatchHandle {
            cancel: cancel.clone(),
        });
        state.status.watching = true;
        tokio::spawn(watch_loop(
            Arc::downgrade(&self.inner),
            cancel,
            state.session,
        ));

        info!(address, firmware = %board_info.branch, mcu = %board_info.mcu, "board connected");
        self.inner
            .emit(BoardEventKind::Connect, EventData::Info(board_info.clone()));
        Ok(board_info)
    }

    /// Stop watching the board. A probe already in flight is left to
    /// finish but its result is ignored.
    pub fn disconnect(&self) -> Result<(), CoreError> {
        let mut state = self.inner.lock();
        if !state.status.connected {
            return Err(CoreError::NotConnected {
                address: self.address().to_owned(),
            });
        }
        if let Some(watch) = state.watch.take() {
            watch.cancel.cancel();
        }
        state.status.connected = false;
        state.status.watching = false;

        info!(address = %self.address(), "board disconnected");
        self.inner.emit(BoardEventKind::Disconnect, EventData::None);
        Ok(())
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// A command carrying this board's defaults.
    pub fn new_command(&self, text: impl Into<String>) -> Command {
        Command::with_defaults(text, &self.inner.config.command)
    }

    /// Submit `command` and wait for its terminal outcome.
    pub async fn send(&self, mut command: Command) -> Result<CommandReply, CoreError> {
        let address = self.address();
        let response = self
            .inner
            .pipeline
            .submit(&mut command, address)
            .await?
            .into_response(address, command.text())?;

        {
            let mut state = self.inner.lock();
            state.status.last_online_time = Some(Utc::now());
            state.last_online = Some(Instant::now());
        }

        let parsed = if command.parse_response {
            match parse_response(command.text(), &response.body) {
                Ok(parsed) => {
                    if let ParsedResponse::Version(info) = &parsed {
                        self.inner.lock().info = Some(info.clone());
                    }
                    self.inner.events.emit(
                        BoardEventKind::Data,
                        EventData::Parsed {
                            request: command.request_info(),
                            response: parsed.clone(),
                        },
                        Some(TransportEvent::Response(response.clone())),
                    );
                    Some(parsed)
                }
                Err(err) => {
                    self.inner.events.emit(
                        BoardEventKind::Error,
                        EventData::Error(err.to_string()),
                        Some(TransportEvent::Response(response)),
                    );
                    return Err(err.into());
                }
            }
        } else {
            None
        };

        Ok(CommandReply {
            command: command.text().to_owned(),
            raw: response.body,
            parsed,
            attempts: command.attempts(),
        })
    }

    /// Send raw text with the board's defaults; the reply is not parsed.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<CommandReply, CoreError> {
        self.send(self.new_command(text)).await
    }

    /// Send text with the board's defaults and parse the reply.
    pub async fn command(&self, text: impl Into<String>) -> Result<CommandReply, CoreError> {
        self.send(self.new_command(text).parsed()).await
    }

    /// Ask the board for its firmware and hardware identity.
    pub async fn version(&self) -> Result<BoardInfo, CoreError> {
        let reply = self.command(PROBE_COMMAND).await?;
        match reply.parsed {
            Some(ParsedResponse::Version(info)) => Ok(info),
            _ => Err(smoothly_api::Error::Parse {
                command: PROBE_COMMAND.into(),
                message: "Unknown version string".into(),
            }
            .into()),
        }
    }
}

// ── Watch task ───────────────────────────────────────────────────────

/// Probe the board every watch interval until `cancel` fires, the
/// session changes, or the board is dropped.
///
/// Only a weak reference is held while sleeping and while the probe is
/// in flight, so dropping the last `Board` handle ends the task and
/// aborts the probe. Watch probes publish no request/response events;
/// subscribers see the state transitions and `watch` only.
async fn watch_loop<T: Transport>(
    board: Weak<BoardInner<T>>,
    cancel: CancellationToken,
    session: u64,
) {
    loop {
        let Some((delay, pipeline, address, timeout)) = board.upgrade().map(|inner| {
            let since_online = inner.lock().last_online.map(|at| at.elapsed());
            (
                watch_delay(inner.config.watch.interval, since_online),
                inner.pipeline.silent(),
                inner.config.address.clone(),
                inner.config.watch.timeout,
            )
        }) else {
            break;
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        let mut probe = Command::probe(PROBE_COMMAND, timeout);
        let outcome = pipeline.submit(&mut probe, &address).await;
        drop(pipeline);

        let Some(inner) = board.upgrade() else { break };
        if !inner.finish_watch_cycle(session, &outcome) {
            break;
        }
    }
    debug!(session, "watch task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(5000);

    #[test]
    fn watch_delay_without_recent_contact() {
        assert_eq!(watch_delay(INTERVAL, None), INTERVAL);
        assert_eq!(
            watch_delay(INTERVAL, Some(Duration::from_millis(7000))),
            INTERVAL
        );
        assert_eq!(watch_delay(INTERVAL, Some(INTERVAL)), INTERVAL);
    }

    #[test]
    fn watch_delay_backs_off_after_recent_contact() {
        assert_eq!(
            watch_delay(INTERVAL, Some(Duration::from_millis(1200))),
            Duration::from_millis(6200)
        );
        assert_eq!(watch_delay(INTERVAL, Some(Duration::ZERO)), INTERVAL);
    }

    fn online_state() -> BoardState {
        let mut state = BoardState::new();
        state.status.connected = true;
        state.mark_online();
        state
    }

    fn kinds(events: &[(BoardEventKind, EventData)]) -> Vec<BoardEventKind> {
        events.iter().map(|(kind, _)| *kind).collect()
    }

    #[test]
    fn probe_failure_while_online_disconnects() {
        let mut state = online_state();
        let events = state.apply_probe(false);
        assert_eq!(kinds(&events), [BoardEventKind::Disconnect]);
        assert!(!state.status.online);
        assert_eq!(state.status.reconnect_attempts, 0);
    }

    #[test]
    fn failures_while_offline_count_attempts() {
        let mut state = online_state();
        state.apply_probe(false);
        let first = state.apply_probe(false);
        let second = state.apply_probe(false);
        assert_eq!(first[0].1, EventData::Attempts(1));
        assert_eq!(second[0].1, EventData::Attempts(2));
        assert_eq!(state.status.reconnect_attempts, 2);
    }

    #[test]
    fn recovery_reconnects_and_resets_attempts() {
        let mut state = online_state();
        state.apply_probe(false);
        state.apply_probe(false);

        let events = state.apply_probe(true);
        assert_eq!(
            kinds(&events),
            [BoardEventKind::Connect, BoardEventKind::Reconnect]
        );
        assert!(state.status.online);
        assert_eq!(state.status.reconnect_attempts, 0);
        assert_eq!(state.status.reconnections, 1);
    }

    #[test]
    fn second_outage_after_reconnect_redisconnects() {
        let mut state = online_state();
        state.apply_probe(false);
        state.apply_probe(true);

        let events = state.apply_probe(false);
        assert_eq!(
            kinds(&events),
            [BoardEventKind::Disconnect, BoardEventKind::Redisconnect]
        );
    }

    #[test]
    fn steady_online_emits_nothing() {
        let mut state = online_state();
        assert!(state.apply_probe(true).is_empty());
        assert_eq!(state.status.reconnections, 0);
    }
}
