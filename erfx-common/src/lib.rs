//! # ERFX Common Library
//!
//! Shared code for the ERFX inspection services including:
//! - Inspection result data model with derived difference fields
//! - Realtime event types (ErfxEvent enum) and the EventBus
//! - Configuration loading (TOML file, environment, compiled defaults)
//! - Database initialization for the inspections store
//! - SSE stream helpers and timestamp utilities

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod inspection;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
pub use events::{ErfxEvent, EventBus};
pub use inspection::{DifferenceKind, EpcSkuPair, InspectionResult, SkuDifference, StoredInspection};
