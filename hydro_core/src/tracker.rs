//! Tracker: owns the intake sources, the ledger and the profile.
//!
//! Both sources push onto one event queue. The tracker consumes it in
//! arrival order, keeps the status line current and appends readings from
//! whichever source is active. At most one source is active at a time:
//! mock mode cannot start while the link is up, and the link cannot connect
//! while mock mode is on.

use crate::config::Config;
use crate::goal::GoalSummary;
use crate::ledger::{HistoryStats, Ledger};
use crate::link::DeviceLink;
use crate::mock::MockGenerator;
use crate::transport::BleTransport;
use crate::{
    ActivityLevel, ConnectionState, DailyBucket, Error, IntakeEvent, IntakeReading, IntakeSource,
    LinkError, Result, UserProfile,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Status line while the mock generator runs
pub const MOCK_STATUS: &str = "Mocking intake...";

/// Readings included in a dashboard snapshot
pub const RECENT_LIMIT: usize = 20;

/// Status line for a link state
pub fn status_for(state: &ConnectionState) -> String {
    match state {
        ConnectionState::Disconnected => "Disconnected".to_string(),
        ConnectionState::Connecting => "Requesting device...".to_string(),
        ConnectionState::Connected | ConnectionState::Subscribing => {
            "Connected. Subscribing to notifications...".to_string()
        }
        ConnectionState::Streaming => "Receiving updates...".to_string(),
        ConnectionState::Error(reason) => reason.clone(),
    }
}

/// Everything a front end shows, in one snapshot
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dashboard {
    pub state: ConnectionState,
    pub status: String,
    pub mock_active: bool,
    pub intake_ml: u32,
    pub goal: GoalSummary,
    pub last_synced: Option<DateTime<Utc>>,
    pub readings: usize,
    pub recent: Vec<IntakeReading>,
    pub daily: Vec<DailyBucket>,
    pub history: HistoryStats,
}

pub struct Tracker<T: BleTransport> {
    link: DeviceLink<T>,
    mock: MockGenerator,
    ledger: Ledger,
    profile: UserProfile,
    status: String,
    events_tx: UnboundedSender<IntakeEvent>,
    events_rx: UnboundedReceiver<IntakeEvent>,
}

impl<T: BleTransport> Tracker<T> {
    pub fn new(transport: T, config: &Config) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            link: DeviceLink::new(transport, events_tx.clone(), &config.link),
            mock: MockGenerator::new(&config.mock),
            ledger: Ledger::new(),
            profile: config.profile.clone(),
            status: status_for(&ConnectionState::Disconnected),
            events_tx,
            events_rx,
        }
    }

    /// Start from an existing ledger
    pub fn with_ledger(mut self, ledger: Ledger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Replace the mock generator (period or seed overrides)
    pub fn with_mock_generator(mut self, mock: MockGenerator) -> Self {
        self.mock = mock;
        self
    }

    pub fn connection_state(&self) -> &ConnectionState {
        self.link.state()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn set_weight_kg(&mut self, weight_kg: f64) {
        self.profile.weight_kg = weight_kg;
    }

    pub fn set_age(&mut self, age_years: Option<u32>) {
        self.profile.age_years = age_years;
    }

    pub fn set_activity(&mut self, activity: ActivityLevel) {
        self.profile.activity = activity;
    }

    pub fn is_mock_active(&self) -> bool {
        self.mock.is_active()
    }

    /// The source whose readings are currently accepted
    pub fn active_source(&self) -> Option<IntakeSource> {
        if let Some(run) = self.mock.run_id() {
            return Some(IntakeSource::Mock(run));
        }
        self.link.streaming_session().map(IntakeSource::Device)
    }

    /// Connect to a bottle. Refused while mock mode is on.
    pub async fn connect(&mut self) -> Result<()> {
        if self.mock.is_active() {
            return Err(Error::SourceBusy(
                "Mock mode is on. Turn it off before connecting to a bottle.".into(),
            ));
        }
        self.link.connect().await?;
        Ok(())
    }

    /// Connect, unless `abort` completes first.
    ///
    /// An aborted attempt is torn down before this returns, and nothing it
    /// started is delivered afterwards.
    pub async fn connect_or_abort<F>(&mut self, abort: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let outcome = tokio::select! {
            result = self.connect() => Some(result),
            _ = abort => None,
        };

        match outcome {
            Some(result) => result,
            None => {
                tracing::info!("Connect aborted by user");
                self.link.disconnect().await;
                Err(LinkError::Aborted.into())
            }
        }
    }

    /// Disconnect the bottle.
    ///
    /// Readings already queued from the session are applied first, so
    /// nothing delivered before the disconnect is lost.
    pub async fn disconnect(&mut self) {
        self.drain().await;
        self.link.disconnect().await;
    }

    /// Turn mock mode on or off. Returns whether anything changed.
    ///
    /// Enabling continues from the ledger's latest total and is refused
    /// unless the link is disconnected. Disabling applies queued mock
    /// readings before the run ends.
    pub async fn set_mock_mode(&mut self, enabled: bool) -> Result<bool> {
        if !enabled {
            if !self.mock.is_active() {
                return Ok(false);
            }
            self.drain().await;
            self.mock.stop();
            self.status = status_for(self.link.state());
            return Ok(true);
        }

        if self.mock.is_active() {
            return Ok(false);
        }
        if *self.link.state() != ConnectionState::Disconnected {
            return Err(Error::SourceBusy(format!(
                "Bottle link is {}. Disconnect before enabling mock mode.",
                self.link.state()
            )));
        }

        self.mock
            .start(self.ledger.latest_total(), self.events_tx.clone());
        self.status = MOCK_STATUS.to_string();
        Ok(true)
    }

    /// Wait for the next event from either source
    pub async fn next_event(&mut self) -> Option<IntakeEvent> {
        self.events_rx.recv().await
    }

    /// Next already-queued event, without waiting
    pub fn try_next_event(&mut self) -> Option<IntakeEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Apply one event. Returns the reading if one was appended.
    pub async fn apply(&mut self, event: IntakeEvent) -> Option<IntakeReading> {
        match event {
            IntakeEvent::Connection { state } => {
                // Link idling underneath mock mode is not news
                if !(self.mock.is_active() && state == ConnectionState::Disconnected) {
                    self.status = status_for(&state);
                }
                None
            }
            IntakeEvent::Reading { source, reading } => {
                if self.active_source() != Some(source) {
                    tracing::debug!("Discarding reading from inactive source {:?}", source);
                    return None;
                }
                self.ledger.append(reading);
                Some(reading)
            }
            IntakeEvent::LinkLost { session } => {
                self.link.handle_link_lost(session).await;
                None
            }
        }
    }

    /// Apply everything already queued. Returns the number of events.
    pub async fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.try_next_event() {
            self.apply(event).await;
            applied += 1;
        }
        applied
    }

    pub fn goal_summary(&self) -> GoalSummary {
        GoalSummary::compute(&self.profile, self.ledger.latest_total())
    }

    pub fn dashboard(&self) -> Dashboard {
        Dashboard {
            state: self.link.state().clone(),
            status: self.status.clone(),
            mock_active: self.mock.is_active(),
            intake_ml: self.ledger.latest_total(),
            goal: self.goal_summary(),
            last_synced: self.ledger.last_synced(),
            readings: self.ledger.len(),
            recent: self.ledger.recent(RECENT_LIMIT),
            daily: self.ledger.daily_buckets(),
            history: self.ledger.stats(),
        }
    }
}
