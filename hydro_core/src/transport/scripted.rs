//! In-memory bottle transport.
//!
//! Plays the part of the host Bluetooth stack for tests and demos: bottles
//! are listed up front, each can lack the service or the characteristic,
//! any step can be made to stall forever, and a [`ScriptedPeer`] handle lets
//! the caller push notifications or drop the link after subscription.

use super::{
    BleTransport, CharacteristicHandle, DeviceCandidate, DeviceChooser, FirstDevice, Notification,
    NotificationStream,
};
use crate::LinkError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use uuid::Uuid;

/// One simulated bottle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptedBottle {
    pub name: String,
    pub has_service: bool,
    pub has_characteristic: bool,
}

impl ScriptedBottle {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            has_service: true,
            has_characteristic: true,
        }
    }

    pub fn without_service(mut self) -> Self {
        self.has_service = false;
        self
    }

    pub fn without_characteristic(mut self) -> Self {
        self.has_characteristic = false;
        self
    }
}

/// Step at which the transport never answers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stall {
    Discovery,
    Session,
    Subscription,
}

#[derive(Default)]
struct Shared {
    calls: Vec<String>,
    notifier: Option<mpsc::UnboundedSender<Notification>>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scripted stand-in for a Bluetooth LE stack
pub struct ScriptedTransport {
    supported: bool,
    bottles: Vec<ScriptedBottle>,
    chooser: Box<dyn DeviceChooser>,
    stall: Option<Stall>,
    fail_unsubscribe: bool,
    shared: Arc<Mutex<Shared>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// One healthy bottle, picked automatically
    pub fn new() -> Self {
        Self {
            supported: true,
            bottles: vec![ScriptedBottle::new("HydroHero")],
            chooser: Box::new(FirstDevice),
            stall: None,
            fail_unsubscribe: false,
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Host without Bluetooth LE
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub fn with_bottles(mut self, bottles: Vec<ScriptedBottle>) -> Self {
        self.bottles = bottles;
        self
    }

    pub fn with_chooser(mut self, chooser: impl DeviceChooser + 'static) -> Self {
        self.chooser = Box::new(chooser);
        self
    }

    pub fn stall_at(mut self, stall: Stall) -> Self {
        self.stall = Some(stall);
        self
    }

    pub fn failing_unsubscribe(mut self) -> Self {
        self.fail_unsubscribe = true;
        self
    }

    /// Handle for driving the bottle side
    pub fn peer(&self) -> ScriptedPeer {
        ScriptedPeer {
            shared: Arc::clone(&self.shared),
        }
    }

    fn record(&self, call: String) {
        lock(&self.shared).calls.push(call);
    }

    async fn maybe_stall(&self, step: Stall) {
        if self.stall == Some(step) {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl BleTransport for ScriptedTransport {
    type Peripheral = ScriptedBottle;

    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn request_device(&mut self, _service: Uuid) -> Result<ScriptedBottle, LinkError> {
        self.record("request_device".into());
        self.maybe_stall(Stall::Discovery).await;

        let candidates: Vec<DeviceCandidate> = self
            .bottles
            .iter()
            .enumerate()
            .map(|(idx, bottle)| DeviceCandidate {
                id: format!("scripted-{}", idx),
                name: Some(bottle.name.clone()),
                rssi: Some(-50),
            })
            .collect();

        let choice = self
            .chooser
            .choose(&candidates)
            .await
            .ok_or(LinkError::UserCancelled)?;
        self.bottles
            .get(choice)
            .cloned()
            .ok_or(LinkError::UserCancelled)
    }

    async fn open_session(&mut self, peripheral: &ScriptedBottle) -> Result<(), LinkError> {
        self.record(format!("open_session:{}", peripheral.name));
        self.maybe_stall(Stall::Session).await;
        Ok(())
    }

    async fn characteristic(
        &mut self,
        peripheral: &ScriptedBottle,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<CharacteristicHandle, LinkError> {
        self.record("characteristic".into());
        if !peripheral.has_service {
            return Err(LinkError::ServiceNotFound);
        }
        if !peripheral.has_characteristic {
            return Err(LinkError::CharacteristicNotFound);
        }
        Ok(CharacteristicHandle {
            service,
            uuid: characteristic,
        })
    }

    async fn subscribe(
        &mut self,
        _peripheral: &ScriptedBottle,
        _characteristic: &CharacteristicHandle,
    ) -> Result<NotificationStream, LinkError> {
        self.record("subscribe".into());
        self.maybe_stall(Stall::Subscription).await;
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.shared).notifier = Some(tx);
        Ok(rx)
    }

    async fn unsubscribe(
        &mut self,
        _peripheral: &ScriptedBottle,
        _characteristic: &CharacteristicHandle,
    ) -> Result<(), LinkError> {
        self.record("unsubscribe".into());
        if self.fail_unsubscribe {
            return Err(LinkError::Transport("GATT operation failed".into()));
        }
        Ok(())
    }

    async fn close_session(&mut self, peripheral: &ScriptedBottle) -> Result<(), LinkError> {
        self.record(format!("close_session:{}", peripheral.name));
        lock(&self.shared).notifier = None;
        Ok(())
    }
}

/// The bottle's side of a [`ScriptedTransport`]
#[derive(Clone)]
pub struct ScriptedPeer {
    shared: Arc<Mutex<Shared>>,
}

impl ScriptedPeer {
    /// Send a raw notification; false when nothing is subscribed
    pub fn notify(&self, payload: &[u8]) -> bool {
        self.send(Notification::Value(payload.to_vec()))
    }

    /// Send a cumulative total the way the bottle encodes it
    pub fn notify_total(&self, intake_ml: u32) -> bool {
        self.notify(&intake_ml.to_le_bytes())
    }

    /// Simulate the bottle going out of range
    pub fn drop_link(&self) -> bool {
        let sent = self.send(Notification::LinkLost);
        lock(&self.shared).notifier = None;
        sent
    }

    /// Transport calls made so far, in order
    pub fn calls(&self) -> Vec<String> {
        lock(&self.shared).calls.clone()
    }

    fn send(&self, notification: Notification) -> bool {
        lock(&self.shared)
            .notifier
            .as_ref()
            .is_some_and(|tx| tx.send(notification).is_ok())
    }
}
