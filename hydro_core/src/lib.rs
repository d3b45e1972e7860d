#![forbid(unsafe_code)]

//! Core domain model and ingestion pipeline for the Hydration Hero bottle.
//!
//! This crate provides:
//! - Domain types (readings, connection state, profile, daily buckets)
//! - Intake decoding of bottle notifications
//! - The device link state machine over a pluggable BLE transport
//! - A mock intake generator for running without hardware
//! - The in-memory intake ledger and goal arithmetic
//! - The tracker that owns both sources and applies their events
//! - Snapshot export (CSV, JSON)

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod decoder;
pub mod transport;
pub mod link;
pub mod mock;
pub mod ledger;
pub mod goal;
pub mod tracker;
pub mod export;

// Re-export commonly used types
pub use error::{Error, LinkError, Result};
pub use types::*;
pub use config::Config;
pub use decoder::{decode, MalformedPayload};
pub use transport::{
    BleTransport, CancelSelection, CharacteristicHandle, DeviceCandidate, DeviceChooser,
    FirstDevice, NamedDevice, Notification, NotificationStream, UnavailableTransport,
    INTAKE_CHARACTERISTIC_UUID, HYDRATION_SERVICE_UUID,
};
#[cfg(feature = "bluetooth")]
pub use transport::btle::BtleTransport;
pub use link::DeviceLink;
pub use mock::MockGenerator;
pub use ledger::{HistoryStats, Ledger, WEEK_DAYS};
pub use goal::{
    daily_goal_ml, prediction, progress_percent, remaining_ml, GoalSummary, Prediction,
    GOAL_REACHED_BADGE, IN_PROGRESS_BADGE,
};
pub use tracker::{Dashboard, Tracker};
