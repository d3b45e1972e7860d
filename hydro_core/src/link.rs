//! Device link: the connection state machine for one bottle.
//!
//! ```text
//!  Disconnected ──connect()──▶ Connecting ──chosen──▶ Connected
//!        ▲                                               │ service + characteristic
//!        │                                               ▼
//!        └──── disconnect() / link loss / failure ── Subscribing ──▶ Streaming
//! ```
//!
//! Every transition and every decoded reading is pushed onto the caller's
//! event queue as an [`IntakeEvent`]. Failures other than a dismissed
//! chooser additionally push a `Connection { state: Error(reason) }` event
//! after the link has settled back in `Disconnected`.
//!
//! Cancelling a connect is done by dropping the `connect()` future and then
//! calling [`DeviceLink::disconnect`], which tears down whatever the attempt
//! had opened. Nothing from the abandoned attempt is delivered afterwards.

use crate::config::LinkConfig;
use crate::decoder::decode;
use crate::transport::{
    BleTransport, CharacteristicHandle, Notification, NotificationStream,
    HYDRATION_SERVICE_UUID, INTAKE_CHARACTERISTIC_UUID,
};
use crate::{ConnectionState, IntakeEvent, IntakeReading, IntakeSource, LinkError};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Handles owned by one connect attempt
struct GattSession<P> {
    id: u64,
    peripheral: P,
    characteristic: Option<CharacteristicHandle>,
}

/// Connection to exactly one bottle
pub struct DeviceLink<T: BleTransport> {
    transport: T,
    state: ConnectionState,
    events: UnboundedSender<IntakeEvent>,
    discovery_timeout: Duration,
    gatt_timeout: Duration,
    session: Option<GattSession<T::Peripheral>>,
    pump: Option<JoinHandle<()>>,
    next_session: u64,
}

impl<T: BleTransport> DeviceLink<T> {
    pub fn new(transport: T, events: UnboundedSender<IntakeEvent>, config: &LinkConfig) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            events,
            discovery_timeout: config.discovery_timeout(),
            gatt_timeout: config.gatt_timeout(),
            session: None,
            pump: None,
            next_session: 1,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Id of the session currently streaming readings
    pub fn streaming_session(&self) -> Option<u64> {
        match (&self.state, &self.session) {
            (ConnectionState::Streaming, Some(session)) => Some(session.id),
            _ => None,
        }
    }

    /// Run discovery, GATT lookup and subscription.
    ///
    /// Only valid from `Disconnected`; otherwise fails with `Busy` and leaves
    /// everything untouched. On failure the link is back in `Disconnected`.
    pub async fn connect(&mut self) -> Result<(), LinkError> {
        if self.state != ConnectionState::Disconnected {
            tracing::warn!("Ignoring connect request while {}", self.state);
            return Err(LinkError::Busy(self.state.clone()));
        }

        if !self.transport.is_supported() {
            let err = LinkError::UnsupportedTransport;
            self.report_failure(&err);
            return Err(err);
        }

        match self.establish().await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.teardown().await;
                self.report_failure(&err);
                Err(err)
            }
        }
    }

    /// Tear the link down from any state. No-op when already disconnected.
    pub async fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        tracing::info!("Disconnecting bottle (was {})", self.state);
        self.teardown().await;
    }

    /// The peer dropped session `session`.
    ///
    /// Signals for any other session are stale and ignored. Otherwise the
    /// session is closed best-effort and the link settles in `Disconnected`.
    /// Returns whether the link was torn down.
    pub async fn handle_link_lost(&mut self, session: u64) -> bool {
        let current = self.session.as_ref().map(|s| s.id);
        if current != Some(session) || !self.state.is_linked() {
            tracing::debug!("Ignoring link loss for stale session {}", session);
            return false;
        }

        tracing::warn!("Bottle dropped the link (session {})", session);
        // No subscription survives a dropped link
        if let Some(lost) = self.session.as_mut() {
            lost.characteristic = None;
        }
        self.teardown().await;
        true
    }

    async fn establish(&mut self) -> Result<(), LinkError> {
        let id = self.next_session;
        self.next_session += 1;

        self.set_state(ConnectionState::Connecting);
        let peripheral = bounded(
            "device discovery",
            self.discovery_timeout,
            self.transport.request_device(HYDRATION_SERVICE_UUID),
        )
        .await?;

        self.session = Some(GattSession {
            id,
            peripheral: peripheral.clone(),
            characteristic: None,
        });
        self.set_state(ConnectionState::Connected);

        bounded(
            "session open",
            self.gatt_timeout,
            self.transport.open_session(&peripheral),
        )
        .await?;

        let characteristic = bounded(
            "service lookup",
            self.gatt_timeout,
            self.transport.characteristic(
                &peripheral,
                HYDRATION_SERVICE_UUID,
                INTAKE_CHARACTERISTIC_UUID,
            ),
        )
        .await?;

        if let Some(session) = self.session.as_mut() {
            session.characteristic = Some(characteristic);
        }
        self.set_state(ConnectionState::Subscribing);

        let notifications = bounded(
            "subscription",
            self.gatt_timeout,
            self.transport.subscribe(&peripheral, &characteristic),
        )
        .await?;

        self.set_state(ConnectionState::Streaming);
        self.pump = Some(tokio::spawn(pump_notifications(
            id,
            notifications,
            self.events.clone(),
        )));

        tracing::info!("Streaming intake from bottle (session {})", id);
        Ok(())
    }

    /// Unsubscribe and close best-effort, then settle in `Disconnected`
    async fn teardown(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        if let Some(session) = self.session.take() {
            if let Some(characteristic) = session.characteristic.as_ref() {
                let unsubscribe = bounded(
                    "unsubscribe",
                    self.gatt_timeout,
                    self.transport.unsubscribe(&session.peripheral, characteristic),
                )
                .await;
                if let Err(e) = unsubscribe {
                    tracing::debug!("Unsubscribe failed, continuing teardown: {}", e);
                }
            }

            let close = bounded(
                "session close",
                self.gatt_timeout,
                self.transport.close_session(&session.peripheral),
            )
            .await;
            if let Err(e) = close {
                tracing::debug!("Closing session failed: {}", e);
            }
        }

        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        tracing::debug!("Link state {} -> {}", self.state, state);
        self.state = state.clone();
        // A dropped receiver means the tracker is gone; nothing to notify
        let _ = self.events.send(IntakeEvent::Connection { state });
    }

    fn report_failure(&self, err: &LinkError) {
        // Dismissing the chooser is a plain return to idle
        if *err == LinkError::UserCancelled {
            tracing::info!("Device selection cancelled");
            return;
        }
        tracing::warn!("Connect failed: {}", err);
        let _ = self.events.send(IntakeEvent::Connection {
            state: ConnectionState::Error(err.to_string()),
        });
    }
}

impl<T: BleTransport> Drop for DeviceLink<T> {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

async fn bounded<R>(
    step: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<R, LinkError>>,
) -> Result<R, LinkError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| LinkError::TimedOut(step))?
}

/// Forward decoded notifications of one session until the link goes away
async fn pump_notifications(
    session: u64,
    mut notifications: NotificationStream,
    events: UnboundedSender<IntakeEvent>,
) {
    while let Some(notification) = notifications.recv().await {
        match notification {
            Notification::Value(payload) => match decode(&payload) {
                Ok(intake_ml) => {
                    let event = IntakeEvent::Reading {
                        source: IntakeSource::Device(session),
                        reading: IntakeReading::now(intake_ml),
                    };
                    if events.send(event).is_err() {
                        return;
                    }
                }
                Err(e) => tracing::debug!("Dropping notification: {}", e),
            },
            Notification::LinkLost => break,
        }
    }
    let _ = events.send(IntakeEvent::LinkLost { session });
}
