//! # ERFX inspection result ingester
//!
//! Subscribes to inspection results published by scanning stations over
//! MQTT, stores each correlation id exactly once despite at-least-once
//! delivery, and fans every decoded result out to realtime observers.
//!
//! Pipeline per inbound message:
//! [`codec::decode`] → [`coordinator::DedupCoordinator::process`] →
//! [`broadcaster::RealtimeBroadcaster`].
//!
//! The [`connection::ConnectionManager`] keeps the broker session alive with
//! an unbounded fixed-delay retry loop and runs the [`heartbeat`] publisher
//! while connected.

pub mod api;
pub mod broadcaster;
pub mod codec;
pub mod connection;
pub mod coordinator;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod persistence;

pub use error::{Error, Result};
