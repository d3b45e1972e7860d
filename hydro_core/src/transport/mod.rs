//! Bluetooth LE transport port.
//!
//! The [`DeviceLink`](crate::link::DeviceLink) drives the bottle through the
//! [`BleTransport`] trait and never touches a Bluetooth stack directly.
//!
//! ## Implementations
//!
//! - [`UnavailableTransport`]: hosts without Bluetooth LE, every attempt
//!   fails with `UnsupportedTransport`.
//! - [`scripted::ScriptedTransport`]: in-memory bottle for tests and demos.
//! - `btle::BtleTransport` (feature `bluetooth`): real adapter via btleplug.
//!
//! ## GATT layout
//!
//! | Item                  | UUID                                   |
//! |-----------------------|----------------------------------------|
//! | Hydration service     | `8b9e0001-3c1d-4d8a-9f7e-2a1b1c0d0e0f` |
//! | Intake characteristic | `8b9e0002-3c1d-4d8a-9f7e-2a1b1c0d0e0f` |

use crate::LinkError;
use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

pub mod scripted;

#[cfg(feature = "bluetooth")]
pub mod btle;

pub const HYDRATION_SERVICE_UUID: Uuid = Uuid::from_u128(0x8b9e0001_3c1d_4d8a_9f7e_2a1b1c0d0e0f);
pub const INTAKE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x8b9e0002_3c1d_4d8a_9f7e_2a1b1c0d0e0f);

/// Located characteristic on an open session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CharacteristicHandle {
    pub service: Uuid,
    pub uuid: Uuid,
}

/// What a subscription delivers
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// Raw characteristic value
    Value(Vec<u8>),
    /// The peer dropped the link
    LinkLost,
}

/// Notifications in arrival order. A closed channel counts as link loss.
pub type NotificationStream = mpsc::UnboundedReceiver<Notification>;

/// Port to the host Bluetooth LE stack.
///
/// Each step is one asynchronous boundary; the link applies its own
/// timeouts around them, so implementations may block as long as the stack
/// does.
#[async_trait]
pub trait BleTransport: Send + 'static {
    /// Handle to a discovered peripheral
    type Peripheral: Clone + Send + Sync + 'static;

    /// Whether the host can do Bluetooth LE at all
    fn is_supported(&self) -> bool;

    /// Discover peripherals advertising `service` and let the user pick one.
    ///
    /// Fails with `UserCancelled` when the chooser is dismissed.
    async fn request_device(&mut self, service: Uuid) -> Result<Self::Peripheral, LinkError>;

    /// Open a GATT session to the peripheral
    async fn open_session(&mut self, peripheral: &Self::Peripheral) -> Result<(), LinkError>;

    /// Locate `characteristic` inside `service`
    async fn characteristic(
        &mut self,
        peripheral: &Self::Peripheral,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<CharacteristicHandle, LinkError>;

    /// Enable value-change notifications; returns once subscribed
    async fn subscribe(
        &mut self,
        peripheral: &Self::Peripheral,
        characteristic: &CharacteristicHandle,
    ) -> Result<NotificationStream, LinkError>;

    async fn unsubscribe(
        &mut self,
        peripheral: &Self::Peripheral,
        characteristic: &CharacteristicHandle,
    ) -> Result<(), LinkError>;

    /// Close the session. Called even if opening never completed.
    async fn close_session(&mut self, peripheral: &Self::Peripheral) -> Result<(), LinkError>;
}

// ============================================================================
// Device chooser
// ============================================================================

/// A peripheral offered to the user during discovery
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceCandidate {
    pub id: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

impl DeviceCandidate {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// User-facing picker shown during discovery.
///
/// Returns the index of the chosen candidate, or `None` when dismissed.
#[async_trait]
pub trait DeviceChooser: Send + Sync {
    async fn choose(&self, candidates: &[DeviceCandidate]) -> Option<usize>;
}

/// Picks the first candidate, cancels when there is none
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstDevice;

#[async_trait]
impl DeviceChooser for FirstDevice {
    async fn choose(&self, candidates: &[DeviceCandidate]) -> Option<usize> {
        if candidates.is_empty() {
            None
        } else {
            Some(0)
        }
    }
}

/// Picks the candidate whose name or id matches, case-insensitively
#[derive(Clone, Debug)]
pub struct NamedDevice(pub String);

#[async_trait]
impl DeviceChooser for NamedDevice {
    async fn choose(&self, candidates: &[DeviceCandidate]) -> Option<usize> {
        candidates.iter().position(|c| {
            c.id.eq_ignore_ascii_case(&self.0)
                || c.name
                    .as_deref()
                    .is_some_and(|name| name.eq_ignore_ascii_case(&self.0))
        })
    }
}

/// Always dismisses the chooser
#[derive(Clone, Copy, Debug, Default)]
pub struct CancelSelection;

#[async_trait]
impl DeviceChooser for CancelSelection {
    async fn choose(&self, _candidates: &[DeviceCandidate]) -> Option<usize> {
        None
    }
}

// ============================================================================
// Unavailable transport
// ============================================================================

/// Transport for hosts without a Bluetooth LE stack
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableTransport;

#[async_trait]
impl BleTransport for UnavailableTransport {
    type Peripheral = ();

    fn is_supported(&self) -> bool {
        false
    }

    async fn request_device(&mut self, _service: Uuid) -> Result<(), LinkError> {
        Err(LinkError::UnsupportedTransport)
    }

    async fn open_session(&mut self, _peripheral: &()) -> Result<(), LinkError> {
        Err(LinkError::UnsupportedTransport)
    }

    async fn characteristic(
        &mut self,
        _peripheral: &(),
        _service: Uuid,
        _characteristic: Uuid,
    ) -> Result<CharacteristicHandle, LinkError> {
        Err(LinkError::UnsupportedTransport)
    }

    async fn subscribe(
        &mut self,
        _peripheral: &(),
        _characteristic: &CharacteristicHandle,
    ) -> Result<NotificationStream, LinkError> {
        Err(LinkError::UnsupportedTransport)
    }

    async fn unsubscribe(
        &mut self,
        _peripheral: &(),
        _characteristic: &CharacteristicHandle,
    ) -> Result<(), LinkError> {
        Ok(())
    }

    async fn close_session(&mut self, _peripheral: &()) -> Result<(), LinkError> {
        Ok(())
    }
}
