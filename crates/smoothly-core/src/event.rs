// ── Event types ──
//
// Boards and scanners publish what happens to them over broadcast
// channels. Subscribers get `Arc`ed events so a slow consumer only costs
// a pointer per event; a consumer that falls too far behind sees
// `RecvError::Lagged` and skips ahead.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use smoothly_api::{BoardInfo, ParsedResponse, TransportFailure, WireResponse};
use tokio::sync::broadcast;

use crate::command::RequestInfo;
use crate::scanner::{DiscoveredBoard, ScanStatus};

/// Capacity of a board's event channel.
pub(crate) const BOARD_EVENT_CAPACITY: usize = 256;
/// Capacity of a scanner's event channel; one scan emits two events per address.
pub(crate) const SCAN_EVENT_CAPACITY: usize = 1024;

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ── Board events ─────────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum BoardEventKind {
    /// A command attempt is about to go on the wire.
    Request,
    /// The board answered a command attempt.
    Response,
    /// A parsed response is available.
    Data,
    /// A failed attempt will be resubmitted.
    Retry,
    Error,
    Connect,
    Disconnect,
    Reconnect,
    /// The board went offline again after having reconnected.
    Redisconnect,
    ReconnectAttempt,
    /// A watch cycle finished while connected.
    Watch,
}

/// Payload of a [`BoardEvent`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EventData {
    None,
    Request(RequestInfo),
    /// Raw response body.
    Response(String),
    Parsed {
        request: RequestInfo,
        response: ParsedResponse,
    },
    Info(BoardInfo),
    Error(String),
    /// Consecutive failed watch probes while offline.
    Attempts(u32),
}

/// The transport-level record an event was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransportEvent {
    Response(WireResponse),
    Failure(TransportFailure),
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardEvent {
    pub address: String,
    pub kind: BoardEventKind,
    pub data: EventData,
    pub transport: Option<TransportEvent>,
    pub time: DateTime<Utc>,
}

/// Publishing half of a board's event channel.
#[derive(Debug, Clone)]
pub(crate) struct BoardEmitter {
    address: Arc<str>,
    tx: broadcast::Sender<Arc<BoardEvent>>,
}

impl BoardEmitter {
    pub(crate) fn new(address: &str) -> Self {
        let (tx, _) = broadcast::channel(BOARD_EVENT_CAPACITY);
        Self {
            address: Arc::from(address),
            tx,
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Arc<BoardEvent>> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(
        &self,
        kind: BoardEventKind,
        data: EventData,
        transport: Option<TransportEvent>,
    ) {
        let event = BoardEvent {
            address: self.address.to_string(),
            kind,
            data,
            transport,
            time: Utc::now(),
        };
        // No subscribers is fine.
        let _ = self.tx.send(Arc::new(event));
    }
}

// ── Scan events ──────────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ScanEventKind {
    Start,
    Pause,
    Resume,
    Stop,
    /// One address has been probed.
    Progress,
    /// A board answered a probe.
    Board,
    /// The queue is exhausted.
    End,
}

/// Counters of the current scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanProgress {
    pub status: ScanStatus,
    pub scanned: usize,
    pub found: usize,
    pub total: usize,
}

impl ScanProgress {
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.scanned as f64 / self.total as f64 * 100.0
        }
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.scanned)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanEvent {
    pub kind: ScanEventKind,
    pub progress: ScanProgress,
    /// Set on [`ScanEventKind::Board`].
    pub board: Option<DiscoveredBoard>,
    pub time: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn board_event_names() {
        let names: Vec<String> = BoardEventKind::iter().map(|k| k.to_string()).collect();
        assert_eq!(
            names,
            [
                "request",
                "response",
                "data",
                "retry",
                "error",
                "connect",
                "disconnect",
                "reconnect",
                "redisconnect",
                "reconnectAttempt",
                "watch",
            ]
        );
    }

    #[test]
    fn scan_progress_percent() {
        let progress = ScanProgress {
            status: ScanStatus::Scanning,
            scanned: 64,
            found: 1,
            total: 256,
        };
        assert!((progress.percent() - 25.0).abs() < f64::EPSILON);
        assert_eq!(progress.remaining(), 192);
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let emitter = BoardEmitter::new("10.0.0.5");
        emitter.emit(BoardEventKind::Watch, EventData::None, None);

        let mut rx = emitter.subscribe();
        emitter.emit(BoardEventKind::Connect, EventData::None, None);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, BoardEventKind::Connect);
        assert_eq!(event.address, "10.0.0.5");
    }
}
