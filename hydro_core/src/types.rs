//! Core domain types for the hydration tracker.
//!
//! This module defines the fundamental types used throughout the system:
//! - Intake readings and the daily buckets derived from them
//! - Device connection state
//! - The user profile feeding the goal calculator
//! - Events flowing from intake sources to the tracker

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Readings
// ============================================================================

/// One observation of cumulative intake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeReading {
    pub timestamp: DateTime<Utc>,
    pub intake_ml: u32,
}

impl IntakeReading {
    pub fn new(timestamp: DateTime<Utc>, intake_ml: u32) -> Self {
        Self {
            timestamp,
            intake_ml,
        }
    }

    /// Reading stamped with the current wall-clock time
    pub fn now(intake_ml: u32) -> Self {
        Self::new(Utc::now(), intake_ml)
    }
}

/// Highest cumulative reading seen on one calendar day
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyBucket {
    pub day: NaiveDate,
    pub ml: u32,
}

impl DailyBucket {
    /// Calendar-date key, `YYYY-MM-DD`
    pub fn day_key(&self) -> String {
        self.day.format("%Y-%m-%d").to_string()
    }
}

// ============================================================================
// Connection State
// ============================================================================

/// State of the device link.
///
/// `Error` is reported through the event stream when a connect attempt
/// fails; the link itself always settles back in `Disconnected`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribing,
    Streaming,
    Error(String),
}

impl ConnectionState {
    /// True for the states in which a peer link exists or is being set up
    pub fn is_linked(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Subscribing | ConnectionState::Streaming
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Subscribing => write!(f, "subscribing"),
            ConnectionState::Streaming => write!(f, "streaming"),
            ConnectionState::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

// ============================================================================
// Profile
// ============================================================================

/// Self-reported activity level
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Low,
    #[default]
    Moderate,
    High,
}

impl std::str::FromStr for ActivityLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(ActivityLevel::Low),
            "moderate" => Ok(ActivityLevel::Moderate),
            "high" => Ok(ActivityLevel::High),
            other => Err(crate::Error::Other(format!(
                "Unknown activity level: {} (expected low, moderate or high)",
                other
            ))),
        }
    }
}

/// User profile. Only the weight feeds the goal; age and activity are
/// recorded as entered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default = "default_weight_kg")]
    pub weight_kg: f64,

    #[serde(default)]
    pub age_years: Option<u32>,

    #[serde(default)]
    pub activity: ActivityLevel,
}

fn default_weight_kg() -> f64 {
    70.0
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            weight_kg: default_weight_kg(),
            age_years: None,
            activity: ActivityLevel::default(),
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Which source produced a reading.
///
/// The numbers identify one link session or one mock run, so readings that
/// arrive after their source was shut down can be recognised and dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum IntakeSource {
    Device(u64),
    Mock(u64),
}

/// Everything intake sources push onto the tracker's event queue
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IntakeEvent {
    /// The device link changed state (or reported a failure)
    Connection { state: ConnectionState },
    /// A decoded or synthetic reading
    Reading {
        source: IntakeSource,
        reading: IntakeReading,
    },
    /// The peer dropped the link of the given session
    LinkLost { session: u64 },
}
