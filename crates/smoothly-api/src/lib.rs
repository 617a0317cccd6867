// smoothly-api: HTTP transport, wire format and response parsers for
// Smoothieboard controllers.

pub mod error;
pub mod parse;
pub mod transport;
pub mod wire;

pub use error::Error;
pub use parse::{BoardInfo, ParsedResponse, parse_response};
pub use transport::{
    FailureKind, HttpTransport, ProgressEvent, ProgressSender, Transport, TransportConfig,
    TransportFailure, WireRequest, WireResponse,
};
