//! Broker transport seam
//!
//! The connection manager drives a session through these traits; the MQTT
//! client lives behind them in [`super::mqtt`].

use async_trait::async_trait;
use erfx_common::config::MqttConfig;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Parameters for one connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    pub clean_session: bool,
    /// Applies to both directions
    pub max_packet_size: usize,
}

impl ConnectOptions {
    pub fn from_config(config: &MqttConfig, client_id: String) -> Self {
        Self {
            host: config.broker_host.clone(),
            port: config.broker_port,
            client_id,
            keep_alive: Duration::from_secs(config.keep_alive_secs),
            clean_session: config.clean_session,
            max_packet_size: config.max_packet_bytes,
        }
    }
}

/// One message received on a subscribed topic
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Outbound publishing handle, usable from other tasks while the session runs
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;
}

/// An established broker session
#[async_trait]
pub trait BrokerSession: Send {
    /// Subscribe with at-least-once delivery
    async fn subscribe(&mut self, topic: &str) -> Result<()>;

    /// Wait for the next inbound message
    ///
    /// An error means the session is gone; the caller reconnects with a new
    /// session. Must be safe to drop mid-wait.
    async fn next_message(&mut self) -> Result<InboundMessage>;

    fn publisher(&self) -> Arc<dyn Publisher>;

    /// Graceful disconnect
    async fn disconnect(&mut self) -> Result<()>;
}

#[async_trait]
pub trait BrokerTransport: Send + Sync {
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn BrokerSession>>;
}
