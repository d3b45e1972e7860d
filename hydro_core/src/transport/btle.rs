//! Host Bluetooth LE adapter via btleplug.
//!
//! Only compiled with the `bluetooth` feature. Discovery scans for a fixed
//! window, filters on the advertised hydration service and hands the
//! candidates to a [`DeviceChooser`].

use super::{
    BleTransport, CharacteristicHandle, DeviceCandidate, DeviceChooser, Notification,
    NotificationStream,
};
use crate::LinkError;
use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

fn transport_err(e: btleplug::Error) -> LinkError {
    LinkError::Transport(e.to_string())
}

pub struct BtleTransport {
    adapter: Option<Adapter>,
    chooser: Box<dyn DeviceChooser>,
    scan_window: Duration,
    forwarders: Vec<JoinHandle<()>>,
}

impl BtleTransport {
    /// Bind to the first adapter the host reports.
    ///
    /// A host without adapters yields a transport whose `is_supported()` is
    /// false rather than an error.
    pub async fn new(chooser: impl DeviceChooser + 'static, scan_window: Duration) -> Self {
        let adapter = match Manager::new().await {
            Ok(manager) => match manager.adapters().await {
                Ok(adapters) => adapters.into_iter().next(),
                Err(e) => {
                    tracing::warn!("Listing Bluetooth adapters failed: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Bluetooth manager unavailable: {}", e);
                None
            }
        };

        if adapter.is_none() {
            tracing::info!("No Bluetooth LE adapter found");
        }

        Self {
            adapter,
            chooser: Box::new(chooser),
            scan_window,
            forwarders: Vec::new(),
        }
    }

    fn adapter(&self) -> Result<&Adapter, LinkError> {
        self.adapter.as_ref().ok_or(LinkError::UnsupportedTransport)
    }

    fn stop_forwarders(&mut self) {
        for handle in self.forwarders.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for BtleTransport {
    fn drop(&mut self) {
        self.stop_forwarders();
    }
}

fn find_characteristic(
    peripheral: &Peripheral,
    handle: &CharacteristicHandle,
) -> Result<Characteristic, LinkError> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.service_uuid == handle.service && c.uuid == handle.uuid)
        .ok_or(LinkError::CharacteristicNotFound)
}

#[async_trait]
impl BleTransport for BtleTransport {
    type Peripheral = Peripheral;

    fn is_supported(&self) -> bool {
        self.adapter.is_some()
    }

    async fn request_device(&mut self, service: Uuid) -> Result<Peripheral, LinkError> {
        let adapter = self.adapter()?;
        adapter
            .start_scan(ScanFilter {
                services: vec![service],
            })
            .await
            .map_err(transport_err)?;
        tokio::time::sleep(self.scan_window).await;
        let peripherals = adapter.peripherals().await.map_err(transport_err)?;
        if let Err(e) = adapter.stop_scan().await {
            tracing::debug!("Stopping scan failed: {}", e);
        }

        let mut candidates = Vec::new();
        let mut matching = Vec::new();
        for peripheral in peripherals {
            let Some(properties) = peripheral.properties().await.map_err(transport_err)? else {
                continue;
            };
            if !properties.services.contains(&service) {
                continue;
            }
            candidates.push(DeviceCandidate {
                id: peripheral.address().to_string(),
                name: properties.local_name,
                rssi: properties.rssi,
            });
            matching.push(peripheral);
        }
        tracing::info!("Found {} bottle(s) advertising the service", candidates.len());

        let choice = self
            .chooser
            .choose(&candidates)
            .await
            .ok_or(LinkError::UserCancelled)?;
        matching.get(choice).cloned().ok_or(LinkError::UserCancelled)
    }

    async fn open_session(&mut self, peripheral: &Peripheral) -> Result<(), LinkError> {
        peripheral.connect().await.map_err(transport_err)?;
        peripheral.discover_services().await.map_err(transport_err)
    }

    async fn characteristic(
        &mut self,
        peripheral: &Peripheral,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<CharacteristicHandle, LinkError> {
        if !peripheral.services().iter().any(|s| s.uuid == service) {
            return Err(LinkError::ServiceNotFound);
        }
        let handle = CharacteristicHandle {
            service,
            uuid: characteristic,
        };
        find_characteristic(peripheral, &handle)?;
        Ok(handle)
    }

    async fn subscribe(
        &mut self,
        peripheral: &Peripheral,
        characteristic: &CharacteristicHandle,
    ) -> Result<NotificationStream, LinkError> {
        let target = find_characteristic(peripheral, characteristic)?;
        let mut values = peripheral.notifications().await.map_err(transport_err)?;
        let mut central = self.adapter()?.events().await.map_err(transport_err)?;
        peripheral.subscribe(&target).await.map_err(transport_err)?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.stop_forwarders();

        let value_tx = tx.clone();
        let wanted = target.uuid;
        self.forwarders.push(tokio::spawn(async move {
            while let Some(notification) = values.next().await {
                if notification.uuid != wanted {
                    continue;
                }
                if value_tx.send(Notification::Value(notification.value)).is_err() {
                    return;
                }
            }
            let _ = value_tx.send(Notification::LinkLost);
        }));

        let id = peripheral.id();
        self.forwarders.push(tokio::spawn(async move {
            while let Some(event) = central.next().await {
                if let CentralEvent::DeviceDisconnected(gone) = event {
                    if gone == id {
                        let _ = tx.send(Notification::LinkLost);
                        return;
                    }
                }
            }
        }));

        Ok(rx)
    }

    async fn unsubscribe(
        &mut self,
        peripheral: &Peripheral,
        characteristic: &CharacteristicHandle,
    ) -> Result<(), LinkError> {
        let target = find_characteristic(peripheral, characteristic)?;
        peripheral.unsubscribe(&target).await.map_err(transport_err)
    }

    async fn close_session(&mut self, peripheral: &Peripheral) -> Result<(), LinkError> {
        self.stop_forwarders();
        if peripheral.is_connected().await.unwrap_or(false) {
            peripheral.disconnect().await.map_err(transport_err)?;
        }
        Ok(())
    }
}
