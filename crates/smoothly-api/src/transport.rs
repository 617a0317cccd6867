// HTTP transport for board commands.
//
// One `execute()` call performs exactly one request and resolves with a
// classified outcome. Retrying, event publication and device state all
// live a layer up in `smoothly-core`; this module only knows how to talk
// HTTP and how to name what went wrong.

use std::future::Future;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::wire;

/// Sender half for download progress notifications.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

const USER_AGENT: &str = concat!("smoothly/", env!("CARGO_PKG_VERSION"));

// ── Failure classification ───────────────────────────────────────────

/// Why a request failed.
///
/// Failures that happen before the response headers arrive belong to
/// the upload phase (`upload.*`); failures while the body is streaming
/// are reported without the prefix. A non-2xx answer is a `load`
/// failure carrying the status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    #[strum(serialize = "timeout")]
    Timeout,
    #[strum(serialize = "abort")]
    Abort,
    #[strum(serialize = "error")]
    NetworkError,
    #[strum(serialize = "upload.timeout")]
    UploadTimeout,
    #[strum(serialize = "upload.abort")]
    UploadAbort,
    #[strum(serialize = "upload.error")]
    UploadError,
    #[strum(serialize = "load")]
    Status(u16),
}

impl FailureKind {
    pub fn is_upload(self) -> bool {
        matches!(
            self,
            Self::UploadTimeout | Self::UploadAbort | Self::UploadError
        )
    }

    pub fn is_timeout(self) -> bool {
        matches!(self, Self::Timeout | Self::UploadTimeout)
    }

    pub fn is_abort(self) -> bool {
        matches!(self, Self::Abort | Self::UploadAbort)
    }
}

/// A request that went out and did not come back with a 2xx answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{kind}: {url}")]
pub struct TransportFailure {
    pub kind: FailureKind,
    pub url: Url,
    /// Underlying error text or a body preview for status failures.
    pub message: Option<String>,
}

impl TransportFailure {
    pub fn new(kind: FailureKind, url: Url) -> Self {
        Self {
            kind,
            url,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ── Request / response ───────────────────────────────────────────────

/// Download progress of a response body with a known length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub loaded: u64,
    pub total: u64,
    pub percent: f64,
}

impl ProgressEvent {
    #[allow(clippy::cast_precision_loss)]
    pub fn new(loaded: u64, total: u64) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            loaded as f64 / total as f64 * 100.0
        };
        Self {
            loaded,
            total,
            percent,
        }
    }
}

/// A single outbound request.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub url: Url,
    pub body: String,
    pub timeout: Duration,
    pub progress: Option<ProgressSender>,
    pub cancel: Option<CancellationToken>,
}

impl WireRequest {
    /// Build the POST for a command sent to a board.
    pub fn command(address: &str, text: &str, timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            url: wire::command_url(address)?,
            body: wire::command_body(text),
            timeout,
            progress: None,
            cancel: None,
        })
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Abort the request when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// A 2xx answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireResponse {
    pub status: u16,
    pub url: Url,
    pub body: String,
}

// ── Transport seam ───────────────────────────────────────────────────

/// Performs one request and classifies the outcome.
///
/// Implemented by [`HttpTransport`] for real boards; tests substitute
/// scripted transports.
pub trait Transport: Send + Sync + 'static {
    fn execute(
        &self,
        request: WireRequest,
    ) -> impl Future<Output = Result<WireResponse, TransportFailure>> + Send;
}

// ── TransportConfig ──────────────────────────────────────────────────

/// Shared settings for building the underlying `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound for any request. Per-request timeouts are normally
    /// shorter and take precedence.
    pub timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: None,
            user_agent: USER_AGENT.into(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str());

        if let Some(connect_timeout) = self.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }

        Ok(builder.build()?)
    }
}

// ── HttpTransport ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Phase {
    Upload,
    Download,
}

/// `reqwest`-backed [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: config.build_client()?,
        })
    }

    /// Wrap a pre-built client.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn run(
        &self,
        request: WireRequest,
        cancel: &CancellationToken,
    ) -> Result<WireResponse, TransportFailure> {
        let WireRequest {
            url,
            body,
            timeout,
            progress,
            ..
        } = request;

        debug!(url = %url, ?timeout, "POST");

        let send = self
            .http
            .post(url.clone())
            .timeout(timeout)
            .header(CONTENT_TYPE, "text/plain")
            .body(body)
            .send();

        let mut response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(TransportFailure::new(FailureKind::UploadAbort, url));
            }
            result = send => result.map_err(|e| classify(&e, Phase::Upload, &url))?,
        };

        let status = response.status();
        let final_url = response.url().clone();
        let total = response.content_length();
        let mut bytes: Vec<u8> = Vec::new();

        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(TransportFailure::new(FailureKind::Abort, final_url));
                }
                chunk = response.chunk() => chunk.map_err(|e| classify(&e, Phase::Download, &final_url))?,
            };
            let Some(chunk) = chunk else { break };
            bytes.extend_from_slice(&chunk);

            if let (Some(tx), Some(total)) = (progress.as_ref(), total) {
                let loaded = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
                // Receiver may have gone away; progress is best-effort.
                let _ = tx.send(ProgressEvent::new(loaded, total));
            }
        }

        let body = String::from_utf8_lossy(&bytes).into_owned();
        trace!(status = status.as_u16(), len = body.len(), "response received");

        if !status.is_success() {
            let preview: String = body.chars().take(200).collect();
            return Err(
                TransportFailure::new(FailureKind::Status(status.as_u16()), final_url)
                    .with_message(format!("HTTP {status}: {preview}")),
            );
        }

        Ok(WireResponse {
            status: status.as_u16(),
            url: final_url,
            body,
        })
    }
}

impl Transport for HttpTransport {
    async fn execute(&self, request: WireRequest) -> Result<WireResponse, TransportFailure> {
        let cancel = request.cancel.clone().unwrap_or_default();
        self.run(request, &cancel).await
    }
}

fn classify(err: &reqwest::Error, phase: Phase, url: &Url) -> TransportFailure {
    let kind = match (phase, err.is_timeout()) {
        (Phase::Upload, true) => FailureKind::UploadTimeout,
        (Phase::Upload, false) => FailureKind::UploadError,
        (Phase::Download, true) => FailureKind::Timeout,
        (Phase::Download, false) => FailureKind::NetworkError,
    };
    TransportFailure::new(kind, url.clone()).with_message(err.to_string())
}
