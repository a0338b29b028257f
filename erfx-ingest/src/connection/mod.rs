//! Broker connection: lifecycle state machine, transport seam, MQTT
//! transport and the supervising connection manager.

pub mod manager;
pub mod mqtt;
pub mod state;
pub mod transport;

pub use manager::{ConnectionManager, ConnectionSnapshot};
pub use mqtt::RumqttTransport;
pub use state::{ConnectionEvent, ConnectionState};
pub use transport::{BrokerSession, BrokerTransport, ConnectOptions, InboundMessage, Publisher};
