// ── Scanner ──
//
// Finds boards by probing a queue of addresses one at a time with a
// single-shot `version` command. The scan loop runs as one background
// task per chain; `pause()` halts the chain after the probe in flight,
// `resume()` picks the queue up where it stopped.

mod input;

pub use input::{ScanInput, ScanTarget};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use serde::Serialize;
use smoothly_api::parse::parse_version;
use smoothly_api::{BoardInfo, HttpTransport, Transport, TransportConfig};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::board::Board;
use crate::command::{Command, CommandOutcome, PROBE_COMMAND};
use crate::config::{BoardConfig, MAX_SCAN_TIMEOUT_MS, MIN_SCAN_TIMEOUT_MS, ScanConfig};
use crate::error::CoreError;
use crate::event::{SCAN_EVENT_CAPACITY, ScanEvent, ScanEventKind, ScanProgress, millis};
use crate::pipeline::CommandPipeline;

// ── Types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScanStatus {
    #[default]
    Idle,
    Scanning,
    Paused,
    Stopped,
}

impl ScanStatus {
    /// `true` while a job owns the queue (scanning or paused).
    pub fn is_active(self) -> bool {
        matches!(self, Self::Scanning | Self::Paused)
    }
}

/// A board that answered a scan probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredBoard {
    pub address: String,
    pub info: BoardInfo,
    /// Command timeout to use when talking to this board.
    pub timeout: Duration,
}

impl DiscoveredBoard {
    /// Board configuration with the scan's board timeout and stock
    /// retry and watch settings.
    pub fn board_config(&self) -> BoardConfig {
        let mut config = BoardConfig::new(&self.address);
        config.command.timeout = self.timeout;
        config
    }

    pub fn into_board<T: Transport>(self, transport: Arc<T>) -> Result<Board<T>, CoreError> {
        Board::new(self.board_config(), transport)
    }
}

#[derive(Debug, Default)]
struct ScanJob {
    queue: VecDeque<String>,
    status: ScanStatus,
    scanned: usize,
    found: usize,
    total: usize,
    discovered: IndexMap<String, DiscoveredBoard>,
}

impl ScanJob {
    fn new(addresses: Vec<String>) -> Self {
        Self {
            total: addresses.len(),
            queue: addresses.into(),
            status: ScanStatus::Scanning,
            ..Self::default()
        }
    }

    fn progress(&self) -> ScanProgress {
        ScanProgress {
            status: self.status,
            scanned: self.scanned,
            found: self.found,
            total: self.total,
        }
    }
}

struct ScanState {
    input: Option<ScanInput>,
    config: ScanConfig,
    job: ScanJob,
    /// Bumped on every `start()`.
    generation: u64,
    /// Generation of the chain currently running, if any.
    running: Option<u64>,
}

enum Step {
    Probe {
        address: String,
        timeout: Duration,
        board_timeout: Duration,
    },
    Halt,
}

// ── Scanner ──────────────────────────────────────────────────────────

struct ScannerInner<T: Transport> {
    pipeline: CommandPipeline<T>,
    state: Mutex<ScanState>,
    events: broadcast::Sender<Arc<ScanEvent>>,
    lifetime: CancellationToken,
}

impl<T: Transport> Drop for ScannerInner<T> {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

impl<T: Transport> ScannerInner<T> {
    fn lock(&self) -> MutexGuard<'_, ScanState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, kind: ScanEventKind, job: &ScanJob, board: Option<DiscoveredBoard>) {
        let event = ScanEvent {
            kind,
            progress: job.progress(),
            board,
            time: Utc::now(),
        };
        let _ = self.events.send(Arc::new(event));
    }

    /// Take the next address off the queue, or halt the chain.
    fn next_step(&self, generation: u64) -> Step {
        let mut state = self.lock();
        if state.generation != generation || state.job.status != ScanStatus::Scanning {
            if state.running == Some(generation) {
                state.running = None;
            }
            return Step::Halt;
        }

        let Some(address) = state.job.queue.pop_front() else {
            state.job.status = ScanStatus::Idle;
            state.running = None;
            info!(
                scanned = state.job.scanned,
                found = state.job.found,
                "scan finished"
            );
            self.emit(ScanEventKind::End, &state.job, None);
            return Step::Halt;
        };

        state.job.scanned += 1;
        Step::Probe {
            address,
            timeout: state.config.timeout,
            board_timeout: state.config.board_timeout,
        }
    }

    fn record(&self, generation: u64, address: String, info: Option<BoardInfo>, timeout: Duration) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        if let Some(info) = info {
            let board = DiscoveredBoard {
                address: address.clone(),
                info,
                timeout,
            };
            info!(address = %address, mcu = %board.info.mcu, "board found");
            state.job.found += 1;
            state.job.discovered.insert(address, board.clone());
            self.emit(ScanEventKind::Board, &state.job, Some(board));
        }
        self.emit(ScanEventKind::Progress, &state.job, None);
    }

    /// Start a chain for the current generation unless one is running.
    fn spawn_chain(self: &Arc<Self>, state: &mut ScanState) {
        if state.running == Some(state.generation) {
            return;
        }
        state.running = Some(state.generation);
        tokio::spawn(scan_loop(Arc::downgrade(self), state.generation));
    }
}

/// Sequential network scanner. Clones share the same job.
pub struct Scanner<T: Transport = HttpTransport> {
    inner: Arc<ScannerInner<T>>,
}

impl<T: Transport> Clone for Scanner<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Scanner<HttpTransport> {
    pub fn http(config: ScanConfig) -> Result<Self, CoreError> {
        let transport = HttpTransport::new(&TransportConfig::default())?;
        Self::new(Arc::new(transport), config)
    }
}

impl<T: Transport> Scanner<T> {
    /// Fails if `config.timeout` is outside the accepted probe range.
    pub fn new(transport: Arc<T>, config: ScanConfig) -> Result<Self, CoreError> {
        check_timeout(millis(config.timeout))?;
        let lifetime = CancellationToken::new();
        let (events, _) = broadcast::channel(SCAN_EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(ScannerInner {
                pipeline: CommandPipeline::new(transport).with_cancel(lifetime.child_token()),
                state: Mutex::new(ScanState {
                    input: None,
                    config,
                    job: ScanJob::default(),
                    generation: 0,
                    running: None,
                }),
                events,
                lifetime,
            }),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ScanEvent>> {
        self.inner.events.subscribe()
    }

    pub fn status(&self) -> ScanStatus {
        self.inner.lock().job.status
    }

    pub fn progress(&self) -> ScanProgress {
        self.inner.lock().job.progress()
    }

    /// Boards found by the current or last job, in discovery order.
    pub fn discovered(&self) -> Vec<DiscoveredBoard> {
        self.inner.lock().job.discovered.values().cloned().collect()
    }

    /// Addresses still waiting to be probed.
    pub fn pending(&self) -> Vec<String> {
        self.inner.lock().job.queue.iter().cloned().collect()
    }

    pub fn input(&self) -> Option<ScanInput> {
        self.inner.lock().input.clone()
    }

    pub fn config(&self) -> ScanConfig {
        self.inner.lock().config
    }

    // ── Configuration ────────────────────────────────────────────────

    /// Parse and store the targets for the next `start()`.
    pub fn set_input(&self, input: &str) -> Result<(), CoreError> {
        self.set_targets(ScanInput::parse(input)?)
    }

    pub fn set_targets(&self, input: ScanInput) -> Result<(), CoreError> {
        let mut state = self.inner.lock();
        if state.job.status.is_active() {
            return Err(CoreError::AlreadyScanning);
        }
        state.input = Some(input);
        Ok(())
    }

    /// Probe timeout in milliseconds; applies from the next probe on.
    pub fn set_timeout(&self, timeout_ms: u64) -> Result<(), CoreError> {
        let timeout = check_timeout(timeout_ms)?;
        self.inner.lock().config.timeout = timeout;
        Ok(())
    }

    /// Command timeout handed to boards found from now on.
    pub fn set_board_timeout(&self, timeout: Duration) {
        self.inner.lock().config.board_timeout = timeout;
    }

    // ── Job control ──────────────────────────────────────────────────

    /// Start a new job, optionally replacing the input and probe timeout.
    /// Nothing changes if either is invalid.
    pub fn start(&self, input: Option<&str>, timeout_ms: Option<u64>) -> Result<(), CoreError> {
        let input = input.map(ScanInput::parse).transpose()?;
        let timeout = timeout_ms.map(check_timeout).transpose()?;

        let mut state = self.inner.lock();
        if state.job.status.is_active() {
            return Err(CoreError::AlreadyScanning);
        }
        if let Some(input) = input {
            state.input = Some(input);
        }
        if let Some(timeout) = timeout {
            state.config.timeout = timeout;
        }
        let addresses = state
            .input
            .as_ref()
            .map(ScanInput::addresses)
            .ok_or_else(|| CoreError::invalid_input("", "no scan targets given"))?;

        state.job = ScanJob::new(addresses);
        state.generation += 1;
        info!(
            total = state.job.total,
            timeout = ?state.config.timeout,
            "scan started"
        );
        self.inner.emit(ScanEventKind::Start, &state.job, None);
        self.inner.spawn_chain(&mut state);
        Ok(())
    }

    pub fn pause(&self) -> Result<(), CoreError> {
        let mut state = self.inner.lock();
        if state.job.status != ScanStatus::Scanning {
            return Err(CoreError::InvalidState {
                operation: "pause",
                status: state.job.status,
            });
        }
        state.job.status = ScanStatus::Paused;
        debug!(scanned = state.job.scanned, "scan paused");
        self.inner.emit(ScanEventKind::Pause, &state.job, None);
        Ok(())
    }

    pub fn resume(&self) -> Result<(), CoreError> {
        let mut state = self.inner.lock();
        if state.job.status != ScanStatus::Paused {
            return Err(CoreError::InvalidState {
                operation: "resume",
                status: state.job.status,
            });
        }
        state.job.status = ScanStatus::Scanning;
        debug!(remaining = state.job.queue.len(), "scan resumed");
        self.inner.emit(ScanEventKind::Resume, &state.job, None);
        self.inner.spawn_chain(&mut state);
        Ok(())
    }

    /// Abandon the current job. Boards found so far stay available.
    pub fn stop(&self) -> Result<(), CoreError> {
        let mut state = self.inner.lock();
        if !state.job.status.is_active() {
            return Err(CoreError::InvalidState {
                operation: "stop",
                status: state.job.status,
            });
        }
        state.job.status = ScanStatus::Stopped;
        state.job.queue.clear();
        info!(scanned = state.job.scanned, found = state.job.found, "scan stopped");
        self.inner.emit(ScanEventKind::Stop, &state.job, None);
        Ok(())
    }
}

fn check_timeout(timeout_ms: u64) -> Result<Duration, CoreError> {
    if (MIN_SCAN_TIMEOUT_MS..=MAX_SCAN_TIMEOUT_MS).contains(&timeout_ms) {
        Ok(Duration::from_millis(timeout_ms))
    } else {
        Err(CoreError::OutOfRange {
            field: "scan timeout (ms)",
            value: timeout_ms,
            min: MIN_SCAN_TIMEOUT_MS,
            max: MAX_SCAN_TIMEOUT_MS,
        })
    }
}

// ── Scan loop ────────────────────────────────────────────────────────

async fn scan_loop<T: Transport>(scanner: Weak<ScannerInner<T>>, generation: u64) {
    loop {
        let Some((step, pipeline)) = scanner
            .upgrade()
            .map(|inner| (inner.next_step(generation), inner.pipeline.clone()))
        else {
            break;
        };

        let Step::Probe {
            address,
            timeout,
            board_timeout,
        } = step
        else {
            break;
        };

        let info = probe(&pipeline, &address, timeout).await;
        drop(pipeline);

        let Some(inner) = scanner.upgrade() else { break };
        inner.record(generation, address, info, board_timeout);
    }
    debug!(generation, "scan chain halted");
}

/// One liveness probe. Every failure means "no board here".
async fn probe<T: Transport>(
    pipeline: &CommandPipeline<T>,
    address: &str,
    timeout: Duration,
) -> Option<BoardInfo> {
    let mut command = Command::probe(PROBE_COMMAND, timeout);
    match pipeline.submit(&mut command, address).await {
        Ok(CommandOutcome::Success(response)) => match parse_version(&response.body) {
            Ok(info) => Some(info),
            Err(err) => {
                debug!(address, error = %err, "answer is not a board");
                None
            }
        },
        Ok(CommandOutcome::UnsupportedCommand { detail, .. }) => {
            debug!(address, %detail, "answer is not a board");
            None
        }
        Ok(CommandOutcome::TransportFailure { failure, .. }) => {
            debug!(address, kind = %failure.kind, "no answer");
            None
        }
        Err(err) => {
            debug!(address, error = %err, "probe skipped");
            None
        }
    }
}
