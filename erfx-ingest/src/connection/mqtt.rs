//! MQTT transport (rumqttc)
//!
//! rumqttc splits a connection into an `AsyncClient` (request handle) and an
//! `EventLoop` that must be polled to make progress. The session owns the
//! event loop and polls it from `next_message`; requests queued through the
//! client (subscribe, heartbeat publishes) are flushed by that polling.

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::transport::{BrokerSession, BrokerTransport, ConnectOptions, InboundMessage, Publisher};
use crate::error::{Error, Result};

/// Request queue depth between client handles and the event loop
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Upper bound on waiting for CONNACK
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed to flush DISCONNECT before the socket is dropped
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Default, Clone)]
pub struct RumqttTransport;

impl RumqttTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrokerTransport for RumqttTransport {
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn BrokerSession>> {
        let mut mqtt_options = MqttOptions::new(options.client_id.clone(), options.host.clone(), options.port);
        mqtt_options.set_keep_alive(options.keep_alive);
        mqtt_options.set_clean_session(options.clean_session);
        mqtt_options.set_max_packet_size(options.max_packet_size, options.max_packet_size);

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| Error::Transport(format!("no CONNACK within {:?}", CONNECT_TIMEOUT)))??;

        Ok(Box::new(RumqttSession { client, eventloop }))
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                debug!(code = ?ack.code, "CONNACK received");
                return Ok(());
            }
            Ok(other) => trace!(event = ?other, "Event before CONNACK"),
            Err(e) => return Err(Error::Transport(e.to_string())),
        }
    }
}

pub struct RumqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
}

#[async_trait]
impl BrokerSession for RumqttSession {
    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| Error::Transport(format!("subscribe {}: {}", topic, e)))
    }

    async fn next_message(&mut self) -> Result<InboundMessage> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(InboundMessage {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    });
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    return Err(Error::Transport("broker sent DISCONNECT".to_string()));
                }
                Ok(other) => trace!(event = ?other, "MQTT event"),
                Err(e) => return Err(Error::Transport(e.to_string())),
            }
        }
    }

    fn publisher(&self) -> Arc<dyn Publisher> {
        Arc::new(RumqttPublisher {
            client: self.client.clone(),
        })
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| Error::Transport(format!("disconnect: {}", e)))?;

        // Drive the loop until DISCONNECT is written and the client closes it
        let flush = async {
            while self.eventloop.poll().await.is_ok() {}
        };
        let _ = tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, flush).await;
        Ok(())
    }
}

struct RumqttPublisher {
    client: AsyncClient,
}

#[async_trait]
impl Publisher for RumqttPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| Error::Transport(format!("publish {}: {}", topic, e)))
    }
}
