//! GPS Telemetry Collector Library
//!
//! Scheduled collection of vehicle telemetry from a GPS provider: fetch,
//! normalize and store per-vehicle reports on cron schedules.

pub mod background_jobs;
pub mod collection;
pub mod config;
pub mod error;
pub mod normalization;
pub mod provider;
pub mod sqlite_persistence;
pub mod telemetry;
pub mod telemetry_store;

// Re-export commonly used types for convenience
pub use error::{TelemetryError, TelemetryResult};
pub use provider::{create_provider, GpsProvider};
pub use telemetry_store::{SqliteTelemetryStore, TelemetryStore, VehicleDirectory};
