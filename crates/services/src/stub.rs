//! Scriptable in-process [`ServiceClient`].
//!
//! Replies are looked up per `(service, scenario_id)` script first, then the
//! per-service default, then an echo of the request payload. Every call is
//! recorded with a global sequence number at start and finish so tests can
//! assert on ordering without depending on wall-clock time.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use orch_core::compute::ServiceKind;
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};

use crate::client::ServiceClient;
use crate::error::ServiceCallError;

/// What a stubbed call does.
#[derive(Debug, Clone)]
pub enum StubReply {
    Ok(Value),
    Transient(String),
    Permanent(String),
    /// Never returns; only a timeout or cancellation ends the call.
    Hang,
    /// Panics inside the call.
    Panic(String),
}

/// One observed call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub service: ServiceKind,
    pub payload: Value,
    pub started_seq: u64,
    /// `None` while the call is still running or if it never returned.
    pub finished_seq: Option<u64>,
}

impl RecordedCall {
    pub fn scenario_id(&self) -> Option<&str> {
        self.payload.get("scenario_id").and_then(Value::as_str)
    }

    pub fn business_type_id(&self) -> Option<&str> {
        self.payload.get("business_type_id").and_then(Value::as_str)
    }
}

pub struct StubServiceClient {
    delay: Duration,
    scripts: Mutex<HashMap<(ServiceKind, String), VecDeque<StubReply>>>,
    defaults: Mutex<HashMap<ServiceKind, StubReply>>,
    calls: Mutex<Vec<RecordedCall>>,
    seq: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gate: watch::Sender<bool>,
}

impl Default for StubServiceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StubServiceClient {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            delay: Duration::ZERO,
            scripts: Mutex::new(HashMap::new()),
            defaults: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            gate,
        }
    }

    /// Every call sleeps for `delay` before replying.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue replies for calls to `service` whose payload has `scenario_id`.
    /// Once the queue is drained, the default applies again.
    pub async fn script(
        &self,
        service: ServiceKind,
        scenario_id: &str,
        replies: impl IntoIterator<Item = StubReply>,
    ) {
        self.scripts
            .lock()
            .await
            .entry((service, scenario_id.to_string()))
            .or_default()
            .extend(replies);
    }

    /// Reply used for `service` when no script matches.
    pub async fn set_default(&self, service: ServiceKind, reply: StubReply) {
        self.defaults.lock().await.insert(service, reply);
    }

    /// Hold every call (new and already waiting) until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.gate.send_replace(false);
    }

    pub fn resume(&self) {
        self.gate.send_replace(true);
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// Highest number of calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn next_reply(&self, service: ServiceKind, payload: &Value) -> StubReply {
        let scenario_id = payload
            .get("scenario_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if let Some(reply) = self
            .scripts
            .lock()
            .await
            .get_mut(&(service, scenario_id))
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }
        if let Some(reply) = self.defaults.lock().await.get(&service) {
            return reply.clone();
        }
        StubReply::Ok(json!({ "service": service.as_str(), "echo": payload }))
    }
}

/// Decrements the in-flight counter even when the call future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ServiceClient for StubServiceClient {
    async fn call(&self, service: ServiceKind, payload: &Value) -> Result<Value, ServiceCallError> {
        let started_seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let index = {
            let mut calls = self.calls.lock().await;
            calls.push(RecordedCall {
                service,
                payload: payload.clone(),
                started_seq,
                finished_seq: None,
            });
            calls.len() - 1
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reply = self.next_reply(service, payload).await;
        let result = match reply {
            StubReply::Ok(value) => Ok(value),
            StubReply::Transient(message) => Err(ServiceCallError::transient(service, message)),
            StubReply::Permanent(message) => Err(ServiceCallError::permanent(service, message)),
            StubReply::Hang => std::future::pending().await,
            StubReply::Panic(message) => panic!("{message}"),
        };

        let finished_seq = self.seq.fetch_add(1, Ordering::SeqCst);
        if let Some(call) = self.calls.lock().await.get_mut(index) {
            call.finished_seq = Some(finished_seq);
        }
        result
    }
}
