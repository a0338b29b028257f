//! Connection manager
//!
//! A single supervisor task owns the broker session and runs the
//! connect / serve / retry cycle until `stop()`:
//!
//! 1. Generate a fresh client id and connect.
//! 2. On success: subscribe to the result topic, announce connectivity,
//!    start the heartbeat, then serve inbound messages (each dispatched on
//!    its own task).
//! 3. On connect failure or session drop: stop the heartbeat, announce loss
//!    of connectivity, wait the reconnect delay, go to 1.
//!
//! Lifecycle fields (state, heartbeat handle, attempt bookkeeping) sit behind
//! one mutex, so a heartbeat can never be started after `stop()` has begun
//! and never twice for one session. The shutdown token interrupts every wait
//! in the supervisor, including the reconnect delay.

use erfx_common::config::{HeartbeatConfig, MqttConfig};
use erfx_common::time::millis_to_duration;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::state::{ConnectionEvent, ConnectionState};
use super::transport::{BrokerSession, BrokerTransport, ConnectOptions};
use crate::broadcaster::RealtimeBroadcaster;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::heartbeat::{HeartbeatHandle, HeartbeatPublisher};

/// Point-in-time view of the connection for health reporting
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub connected: bool,
    /// Connect attempts since start
    pub attempts: u64,
    pub last_client_id: Option<String>,
}

#[derive(Default)]
struct Lifecycle {
    state: ConnectionState,
    heartbeat: Option<HeartbeatHandle>,
    attempts: u64,
    last_client_id: Option<String>,
}

/// Why a session loop returned
enum SessionEnd {
    Lost(String),
    Stopped,
}

pub struct ConnectionManager {
    mqtt: MqttConfig,
    heartbeat: HeartbeatConfig,
    transport: Arc<dyn BrokerTransport>,
    dispatcher: Arc<Dispatcher>,
    broadcaster: Arc<dyn RealtimeBroadcaster>,
    started_at: Instant,
    connected: Arc<AtomicBool>,
    lifecycle: Mutex<Lifecycle>,
    shutdown: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    in_flight: TaskTracker,
}

impl ConnectionManager {
    pub fn new(
        mqtt: MqttConfig,
        heartbeat: HeartbeatConfig,
        transport: Arc<dyn BrokerTransport>,
        dispatcher: Arc<Dispatcher>,
        broadcaster: Arc<dyn RealtimeBroadcaster>,
    ) -> Arc<Self> {
        Arc::new(Self {
            mqtt,
            heartbeat,
            transport,
            dispatcher,
            broadcaster,
            started_at: Instant::now(),
            connected: Arc::new(AtomicBool::new(false)),
            lifecycle: Mutex::new(Lifecycle::default()),
            shutdown: CancellationToken::new(),
            supervisor: Mutex::new(None),
            in_flight: TaskTracker::new(),
        })
    }

    /// Spawn the supervisor; connection failures never surface here
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut supervisor = self.supervisor.lock().await;
        if supervisor.is_some() {
            return Err(Error::InvalidState("connection manager already started".to_string()));
        }
        if self.lifecycle.lock().await.state.is_terminal() {
            return Err(Error::InvalidState("connection manager is shutting down".to_string()));
        }

        info!(
            host = %self.mqtt.broker_host,
            port = self.mqtt.broker_port,
            topic = %self.mqtt.result_topic,
            "Starting MQTT connection manager"
        );
        *supervisor = Some(tokio::spawn(self.clone().supervise()));
        Ok(())
    }

    /// Stop retrying, tear down the heartbeat and disconnect if connected
    ///
    /// Returns once the supervisor has exited and in-flight messages have
    /// been processed.
    pub async fn stop(&self) {
        {
            let mut lifecycle = self.lifecycle.lock().await;
            lifecycle.state = lifecycle.state.transition(ConnectionEvent::StopRequested);
            if let Some(heartbeat) = lifecycle.heartbeat.take() {
                heartbeat.stop();
            }
        }

        info!("Stopping MQTT connection manager");
        self.shutdown.cancel();

        let supervisor = self.supervisor.lock().await.take();
        if let Some(handle) = supervisor {
            if let Err(e) = handle.await {
                warn!("Connection supervisor ended abnormally: {}", e);
            }
        }

        self.in_flight.close();
        self.in_flight.wait().await;
        info!("MQTT connection manager stopped");
    }

    pub async fn snapshot(&self) -> ConnectionSnapshot {
        let lifecycle = self.lifecycle.lock().await;
        ConnectionSnapshot {
            state: lifecycle.state,
            connected: lifecycle.state.is_connected(),
            attempts: lifecycle.attempts,
            last_client_id: lifecycle.last_client_id.clone(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn uptime_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    async fn supervise(self: Arc<Self>) {
        loop {
            let Some(options) = self.begin_attempt().await else {
                break;
            };

            info!(
                host = %options.host,
                port = options.port,
                client_id = %options.client_id,
                "Connecting to MQTT broker"
            );

            let connected = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = self.transport.connect(&options) => result,
            };

            let end = match connected {
                Ok(session) => self.serve(session).await,
                Err(e) => {
                    warn!(client_id = %options.client_id, error = %e, "MQTT connect failed");
                    SessionEnd::Lost(e.to_string())
                }
            };

            let reason = match end {
                SessionEnd::Stopped => {
                    self.handle_disconnect("shutdown").await;
                    break;
                }
                SessionEnd::Lost(reason) => reason,
            };

            if !self.handle_disconnect(&reason).await {
                break;
            }

            let delay = millis_to_duration(self.mqtt.reconnect_delay_ms);
            info!(delay_ms = self.mqtt.reconnect_delay_ms, "Reconnecting to MQTT broker after delay");
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Shutdown during reconnect wait");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!("Connection supervisor exited");
    }

    /// Enter `Connecting` with a fresh client id, or `None` once shutting down
    async fn begin_attempt(&self) -> Option<ConnectOptions> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state.is_terminal() {
            return None;
        }

        let client_id = self.mqtt.new_client_id();
        lifecycle.state = lifecycle.state.transition(ConnectionEvent::ConnectRequested);
        lifecycle.attempts += 1;
        lifecycle.last_client_id = Some(client_id.clone());
        Some(ConnectOptions::from_config(&self.mqtt, client_id))
    }

    /// Run one established session until it drops or shutdown is requested
    async fn serve(&self, mut session: Box<dyn BrokerSession>) -> SessionEnd {
        {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.state.is_terminal() {
                drop(lifecycle);
                self.disconnect_gracefully(session.as_mut()).await;
                return SessionEnd::Stopped;
            }
            lifecycle.state = lifecycle.state.transition(ConnectionEvent::ConnectSucceeded);
            self.connected.store(true, Ordering::SeqCst);
        }
        info!("Connected to MQTT broker");

        if let Err(e) = session.subscribe(&self.mqtt.result_topic).await {
            warn!(topic = %self.mqtt.result_topic, error = %e, "Subscribe failed");
            return SessionEnd::Lost(e.to_string());
        }
        info!(topic = %self.mqtt.result_topic, "Subscribed to inspection results");

        self.broadcaster.broadcast_connectivity(true);

        if self.heartbeat.enabled {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.state.is_connected() && lifecycle.heartbeat.is_none() {
                lifecycle.heartbeat = Some(HeartbeatPublisher::start(
                    session.publisher(),
                    self.heartbeat.clone(),
                    self.started_at,
                    self.connected.clone(),
                ));
            }
        }

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.disconnect_gracefully(session.as_mut()).await;
                    return SessionEnd::Stopped;
                }
                next = session.next_message() => match next {
                    Ok(message) => {
                        let dispatcher = self.dispatcher.clone();
                        self.in_flight.spawn(async move {
                            dispatcher.dispatch(&message.topic, &message.payload).await;
                        });
                    }
                    Err(e) => return SessionEnd::Lost(e.to_string()),
                },
            }
        }
    }

    async fn disconnect_gracefully(&self, session: &mut dyn BrokerSession) {
        info!("Disconnecting from MQTT broker");
        if let Err(e) = session.disconnect().await {
            warn!("Graceful disconnect failed: {}", e);
        }
    }

    /// Apply a disconnect; returns whether the supervisor should retry
    async fn handle_disconnect(&self, reason: &str) -> bool {
        let retry = {
            let mut lifecycle = self.lifecycle.lock().await;
            if let Some(heartbeat) = lifecycle.heartbeat.take() {
                heartbeat.stop();
            }
            lifecycle.state = lifecycle.state.transition(ConnectionEvent::ConnectionLost);
            self.connected.store(false, Ordering::SeqCst);
            !lifecycle.state.is_terminal()
        };

        if retry {
            warn!(reason, "Disconnected from MQTT broker");
        } else {
            info!(reason, "MQTT connection closed");
        }
        self.broadcaster.broadcast_connectivity(false);
        retry
    }
}
