// ── Command pipeline ──
//
// Runs one `Command` to completion against one address: builds the wire
// request, classifies the answer, and resubmits after `retry_interval`
// until `retry_limit` is spent. Transport calls for a device are
// serialized through `gate`; the retry delay is spent outside it so
// other commands to the same device can go through meanwhile.

use std::sync::Arc;
use std::time::Duration;

use smoothly_api::{Transport, WireRequest, wire};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::{Command, CommandOutcome};
use crate::error::CoreError;
use crate::event::{BoardEmitter, BoardEventKind, EventData, TransportEvent};

pub struct CommandPipeline<T: Transport> {
    transport: Arc<T>,
    gate: Arc<Mutex<()>>,
    events: Option<BoardEmitter>,
    cancel: CancellationToken,
}

impl<T: Transport> Clone for CommandPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            gate: Arc::clone(&self.gate),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T: Transport> CommandPipeline<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            gate: Arc::new(Mutex::new(())),
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Publish request/response/retry/error events through `events`.
    pub(crate) fn with_events(mut self, events: BoardEmitter) -> Self {
        self.events = Some(events);
        self
    }

    /// Abort in-flight requests and pending retries when `cancel` fires.
    pub(crate) fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Same device gate and cancellation, but publishes nothing.
    pub(crate) fn silent(&self) -> Self {
        Self {
            events: None,
            ..self.clone()
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Run `command` against `address` until it succeeds, is rejected by
    /// the board, or runs out of attempts.
    ///
    /// Only an unusable address is an `Err`; every other result is a
    /// [`CommandOutcome`].
    pub async fn submit(
        &self,
        command: &mut Command,
        address: &str,
    ) -> Result<CommandOutcome, CoreError> {
        loop {
            let mut request = WireRequest::command(address, command.text(), command.timeout)?
                .with_cancel(self.cancel.clone());
            if let Some(progress) = command.progress() {
                request = request.with_progress(progress.clone());
            }

            self.emit(
                BoardEventKind::Request,
                EventData::Request(command.request_info()),
                None,
            );

            let result = {
                let _gate = self.gate.lock().await;
                self.transport.execute(request).await
            };

            let failure = match result {
                Ok(response) => {
                    if let Some(detail) = wire::unsupported_detail(&response.body) {
                        let detail = detail.trim().to_owned();
                        debug!(address, command = command.text(), %detail, "command rejected");
                        self.emit(
                            BoardEventKind::Error,
                            EventData::Error(format!("Unsupported command: {detail}")),
                            Some(TransportEvent::Response(response.clone())),
                        );
                        return Ok(CommandOutcome::UnsupportedCommand { response, detail });
                    }
                    self.emit(
                        BoardEventKind::Response,
                        EventData::Response(response.body.clone()),
                        Some(TransportEvent::Response(response.clone())),
                    );
                    return Ok(CommandOutcome::Success(response));
                }
                Err(failure) => failure,
            };

            let reason = format!("{}: {}", failure.kind, command.text());
            self.emit(
                BoardEventKind::Error,
                EventData::Error(reason),
                Some(TransportEvent::Failure(failure.clone())),
            );

            match command.retry_delay() {
                Some(delay) if !self.cancel.is_cancelled() => {
                    warn!(
                        address,
                        command = command.text(),
                        attempt = command.attempts(),
                        kind = %failure.kind,
                        ?delay,
                        "command failed, retrying"
                    );
                    self.emit(
                        BoardEventKind::Retry,
                        EventData::Request(command.request_info()),
                        Some(TransportEvent::Failure(failure.clone())),
                    );
                    if self.wait(delay).await {
                        command.advance();
                        continue;
                    }
                }
                _ => {}
            }

            debug!(
                address,
                command = command.text(),
                attempts = command.attempts(),
                kind = %failure.kind,
                "command failed"
            );
            return Ok(CommandOutcome::TransportFailure {
                failure,
                attempts: command.attempts(),
            });
        }
    }

    /// Sleep for `delay`; `false` if cancelled first.
    async fn wait(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    fn emit(&self, kind: BoardEventKind, data: EventData, transport: Option<TransportEvent>) {
        if let Some(events) = &self.events {
            events.emit(kind, data, transport);
        }
    }
}
