// smoothly-core: command pipeline, connection watch and network scanner
// for Smoothieboard controllers.
//
// `Board` and `Scanner` are the two entry points. Both are cheap-to-clone
// handles generic over the `Transport` that carries their requests, and
// both publish what happens to them over broadcast channels.

pub mod board;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod scanner;

pub use board::{Board, ConnectionStatus};
pub use command::{Command, CommandOutcome, CommandReply, PROBE_COMMAND, RequestInfo};
pub use config::{BoardConfig, CommandDefaults, ScanConfig, WatchConfig};
pub use error::CoreError;
pub use event::{
    BoardEvent, BoardEventKind, EventData, ScanEvent, ScanEventKind, ScanProgress, TransportEvent,
};
pub use pipeline::CommandPipeline;
pub use scanner::{DiscoveredBoard, ScanInput, ScanStatus, ScanTarget, Scanner};

// Re-export the transport layer so callers need only one dependency.
pub use smoothly_api::Error as ApiError;
pub use smoothly_api::{
    BoardInfo, FailureKind, HttpTransport, ParsedResponse, Transport, TransportConfig,
    TransportFailure, WireRequest, WireResponse,
};
