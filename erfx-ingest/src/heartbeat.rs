//! Heartbeat publisher
//!
//! Announces liveness on the status topic while connected. A heartbeat task
//! lives exactly as long as one broker session: the connection manager starts
//! it after a successful connect and stops it on disconnect or shutdown, so a
//! reconnect always begins a fresh schedule.

use erfx_common::config::HeartbeatConfig;
use erfx_common::time::{millis_to_duration, now, to_millis_string};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::Publisher;

/// Message type tag carried by every heartbeat
pub const STATUS_MESSAGE_TYPE: &str = "webserver_status";

/// Outbound status message
#[derive(Debug, Clone, Serialize)]
pub struct StatusMessage {
    pub source: String,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    /// UTC, millisecond precision
    pub timestamp: String,
    pub payload: StatusPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusPayload {
    pub running: bool,
    pub connected: bool,
    pub version: String,
    /// Process uptime in seconds
    pub uptime: f64,
}

impl StatusMessage {
    pub fn new(config: &HeartbeatConfig, connected: bool, uptime_secs: f64) -> Self {
        Self {
            source: config.source.clone(),
            message_type: STATUS_MESSAGE_TYPE,
            timestamp: to_millis_string(&now()),
            payload: StatusPayload {
                running: true,
                connected,
                version: config.version.clone(),
                uptime: uptime_secs,
            },
        }
    }
}

/// Running heartbeat schedule; stopping is immediate and idempotent
pub struct HeartbeatHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
        self.task.abort();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.task.is_finished()
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct HeartbeatPublisher;

impl HeartbeatPublisher {
    /// Start a schedule: first tick after `initial_delay_ms`, then every `interval_ms`
    ///
    /// `started_at` is the process start used for the uptime field;
    /// `connected` is read at each tick.
    pub fn start(
        publisher: Arc<dyn Publisher>,
        config: HeartbeatConfig,
        started_at: Instant,
        connected: Arc<AtomicBool>,
    ) -> HeartbeatHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        debug!(
            interval_ms = config.interval_ms,
            initial_delay_ms = config.initial_delay_ms,
            "Starting heartbeat"
        );

        let task = tokio::spawn(async move {
            let first = Instant::now() + millis_to_duration(config.initial_delay_ms);
            let mut timer = interval_at(first, millis_to_duration(config.interval_ms));
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = timer.tick() => {}
                }

                let message = StatusMessage::new(
                    &config,
                    connected.load(Ordering::SeqCst),
                    started_at.elapsed().as_secs_f64(),
                );
                let payload = match serde_json::to_vec(&message) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Failed to encode heartbeat: {}", e);
                        continue;
                    }
                };

                if let Err(e) = publisher.publish(&config.topic, payload).await {
                    warn!(topic = %config.topic, error = %e, "Heartbeat publish failed");
                } else {
                    debug!(topic = %config.topic, "Heartbeat published");
                }
            }
        });

        HeartbeatHandle { cancel, task }
    }
}
