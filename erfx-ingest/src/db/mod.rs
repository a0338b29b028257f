//! Database access layer

pub mod inspections;

pub use inspections::SqliteInspectionStore;
