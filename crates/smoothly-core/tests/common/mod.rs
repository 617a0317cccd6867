// Scripted transport shared by the core integration tests.
//
// Each address gets a queue of steps; when the queue is empty the
// fallback step answers. Steps honour the request timeout and the
// cancellation token the way the HTTP transport does, on tokio's clock.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use smoothly_core::{FailureKind, Transport, TransportFailure, WireRequest, WireResponse};
use tokio::time::Instant;

pub const VERSION_LINE: &str = "Build version: edge-9ab4538, Build date: Oct 10 2016 04:09:42, MCU: LPC1769, System Clock: 120MHz\r\n";

// ── Steps ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Step {
    delay: Duration,
    result: Result<String, FailureKind>,
}

impl Step {
    pub fn reply(body: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(body.into()),
        }
    }

    pub fn version() -> Self {
        Self::reply(VERSION_LINE)
    }

    pub fn fail(kind: FailureKind) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(kind),
        }
    }

    /// A board that is not there: the request runs into its timeout.
    pub fn offline() -> Self {
        Self::fail(FailureKind::UploadTimeout)
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub address: String,
    pub body: String,
    pub at: Instant,
}

// ── Transport ───────────────────────────────────────────────────────

pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    fallback: Mutex<Step>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new(fallback: Step) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: Mutex::new(fallback),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Every address answers like a missing board unless scripted.
    pub fn offline() -> Arc<Self> {
        Self::new(Step::offline())
    }

    pub fn script(&self, address: &str, steps: impl IntoIterator<Item = Step>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(address.to_owned())
            .or_default()
            .extend(steps);
    }

    pub fn set_fallback(&self, step: Step) {
        *self.fallback.lock().unwrap() = step;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.address).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_step(&self, address: &str) -> Step {
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(address)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }
}

impl Transport for ScriptedTransport {
    async fn execute(&self, request: WireRequest) -> Result<WireResponse, TransportFailure> {
        let address = request.url.host_str().unwrap_or_default().to_owned();
        self.calls.lock().unwrap().push(Call {
            address: address.clone(),
            body: request.body.clone(),
            at: Instant::now(),
        });

        let step = self.next_step(&address);
        let cancel = request.cancel.clone().unwrap_or_default();
        let url = request.url.clone();

        if step.delay > Duration::ZERO {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(TransportFailure::new(FailureKind::UploadAbort, url));
                }
                () = tokio::time::sleep(request.timeout), if step.delay > request.timeout => {
                    return Err(TransportFailure::new(FailureKind::UploadTimeout, url));
                }
                () = tokio::time::sleep(step.delay) => {}
            }
        } else if cancel.is_cancelled() {
            return Err(TransportFailure::new(FailureKind::UploadAbort, url));
        }

        match step.result {
            Ok(body) => Ok(WireResponse {
                status: 200,
                url,
                body,
            }),
            Err(kind) => Err(TransportFailure::new(kind, url)),
        }
    }
}
