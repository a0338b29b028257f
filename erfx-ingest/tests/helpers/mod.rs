//! Shared fakes for erfx-ingest integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use erfx_common::{ErfxEvent, InspectionResult, StoredInspection};
use erfx_ingest::broadcaster::RealtimeBroadcaster;
use erfx_ingest::connection::{BrokerSession, BrokerTransport, ConnectOptions, InboundMessage, Publisher};
use erfx_ingest::persistence::PersistenceGateway;
use erfx_ingest::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Barrier};

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// In-memory gateway with a correlation id uniqueness constraint
#[derive(Default)]
pub struct MemoryGateway {
    rows: Mutex<HashMap<String, StoredInspection>>,
    next_id: AtomicUsize,
    saves: AtomicUsize,
    /// Report `false` from `exists` regardless of contents
    blind_check: AtomicBool,
    /// Fail every `save` with a non-duplicate error
    fail_saves: AtomicBool,
    /// Rendezvous between `exists` and `save` to force two callers past the pre-check
    check_barrier: Option<Barrier>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway whose `exists` waits for `parties` callers before answering
    pub fn with_check_barrier(parties: usize) -> Self {
        Self {
            check_barrier: Some(Barrier::new(parties)),
            ..Self::default()
        }
    }

    pub fn set_blind_check(&self, blind: bool) {
        self.blind_check.store(blind, Ordering::SeqCst);
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn stored_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Number of `save` calls that reached the store (including rejected ones)
    pub fn save_attempts(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn get(&self, correlation_id: &str) -> Option<StoredInspection> {
        self.rows.lock().unwrap().get(correlation_id).cloned()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn exists(&self, correlation_id: &str) -> Result<bool> {
        if let Some(barrier) = &self.check_barrier {
            barrier.wait().await;
        }
        if self.blind_check.load(Ordering::SeqCst) || correlation_id.is_empty() {
            return Ok(false);
        }
        Ok(self.rows.lock().unwrap().contains_key(correlation_id))
    }

    async fn save(&self, record: &InspectionResult) -> Result<StoredInspection> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Internal("disk full".to_string()));
        }

        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&record.correlation_id) {
            return Err(Error::DuplicateCorrelationId(record.correlation_id.clone()));
        }
        let stored = StoredInspection {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1,
            record: record.clone(),
        };
        rows.insert(record.correlation_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn find_by_correlation_id(&self, correlation_id: &str) -> Result<Option<StoredInspection>> {
        Ok(self.get(correlation_id))
    }
}

// ---------------------------------------------------------------------------
// Broadcasting
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingBroadcaster {
    events: Mutex<Vec<ErfxEvent>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ErfxEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn inspection_ids(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ErfxEvent::InspectionResult(record) => Some(record.correlation_id),
                _ => None,
            })
            .collect()
    }

    pub fn connectivity(&self) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ErfxEvent::MqttConnected(connected) => Some(connected),
                _ => None,
            })
            .collect()
    }
}

impl RealtimeBroadcaster for RecordingBroadcaster {
    fn broadcast(&self, event: ErfxEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------------
// Broker transport
// ---------------------------------------------------------------------------

enum SessionInput {
    Message(InboundMessage),
    Drop,
}

#[derive(Default)]
struct TransportLog {
    client_ids: Vec<String>,
    subscriptions: Vec<String>,
    publishes: Vec<(String, Vec<u8>)>,
    disconnects: usize,
    live_session: Option<mpsc::UnboundedSender<SessionInput>>,
}

/// Scripted broker: connects succeed unless told to fail
#[derive(Default, Clone)]
pub struct FakeTransport {
    log: Arc<Mutex<TransportLog>>,
    failing: Arc<AtomicBool>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let transport = Self::default();
        transport.set_failing(true);
        transport
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Client ids of every connect attempt, failed ones included
    pub fn client_ids(&self) -> Vec<String> {
        self.log.lock().unwrap().client_ids.clone()
    }

    pub fn attempts(&self) -> usize {
        self.log.lock().unwrap().client_ids.len()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.log.lock().unwrap().subscriptions.clone()
    }

    pub fn publishes(&self) -> Vec<(String, Vec<u8>)> {
        self.log.lock().unwrap().publishes.clone()
    }

    pub fn publish_count(&self) -> usize {
        self.log.lock().unwrap().publishes.len()
    }

    pub fn disconnects(&self) -> usize {
        self.log.lock().unwrap().disconnects
    }

    /// Deliver a message on the current session; false if none is live
    pub fn deliver(&self, topic: &str, payload: &[u8]) -> bool {
        let log = self.log.lock().unwrap();
        match &log.live_session {
            Some(tx) => tx
                .send(SessionInput::Message(InboundMessage {
                    topic: topic.to_string(),
                    payload: payload.to_vec(),
                }))
                .is_ok(),
            None => false,
        }
    }

    /// Simulate the broker dropping the current session
    pub fn drop_session(&self) {
        if let Some(tx) = self.log.lock().unwrap().live_session.take() {
            let _ = tx.send(SessionInput::Drop);
        }
    }
}

#[async_trait]
impl BrokerTransport for FakeTransport {
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn BrokerSession>> {
        let mut log = self.log.lock().unwrap();
        log.client_ids.push(options.client_id.clone());

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Transport("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        log.live_session = Some(tx);
        Ok(Box::new(FakeSession {
            log: self.log.clone(),
            inbound: rx,
        }))
    }
}

struct FakeSession {
    log: Arc<Mutex<TransportLog>>,
    inbound: mpsc::UnboundedReceiver<SessionInput>,
}

#[async_trait]
impl BrokerSession for FakeSession {
    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        self.log.lock().unwrap().subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn next_message(&mut self) -> Result<InboundMessage> {
        match self.inbound.recv().await {
            Some(SessionInput::Message(message)) => Ok(message),
            Some(SessionInput::Drop) | None => Err(Error::Transport("connection lost".to_string())),
        }
    }

    fn publisher(&self) -> Arc<dyn Publisher> {
        Arc::new(FakePublisher { log: self.log.clone() })
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.disconnects += 1;
        log.live_session = None;
        Ok(())
    }
}

struct FakePublisher {
    log: Arc<Mutex<TransportLog>>,
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.log.lock().unwrap().publishes.push((topic.to_string(), payload));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

pub fn record(correlation_id: &str) -> InspectionResult {
    InspectionResult {
        correlation_id: correlation_id.to_string(),
        store_code: Some("S001".to_string()),
        inspected_at_utc: Utc::now(),
        is_ok: true,
        expected_total: 2,
        actual_total: 2,
        ..Default::default()
    }
}

pub fn payload(correlation_id: &str) -> Vec<u8> {
    format!(
        r#"{{"CorrelationId":"{}","StoreCode":"S001","InspectedAtUtc":"2025-01-31T08:15:00Z","IsOk":true,"ExpectedTotal":2,"ActualTotal":2}}"#,
        correlation_id
    )
    .into_bytes()
}
