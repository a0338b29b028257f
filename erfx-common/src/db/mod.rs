//! Database initialization for the inspections store

pub mod init;

pub use init::{create_inspections_table, init_database, init_memory_database};
