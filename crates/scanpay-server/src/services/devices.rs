//! Device registry and the device command channel.

use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::device::is_valid_device_id;
use crate::models::{Device, DeviceCommand, NewDevice};
use crate::store::StoreRef;

/// A freshly registered device and the secret it polls with.
///
/// The secret is only ever returned here; the store keeps its hash.
#[derive(Debug, Clone)]
pub struct RegisteredDevice {
    pub device: Device,
    pub secret: String,
}

pub struct DeviceRegistry {
    store: StoreRef,
    clock: Arc<dyn Clock>,
}

impl DeviceRegistry {
    pub fn new(store: StoreRef, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Registers a device for `account_id`.
    pub async fn register(
        &self,
        account_id: Uuid,
        device_id: &str,
    ) -> Result<RegisteredDevice, AppError> {
        let device_id = device_id.trim();
        if !is_valid_device_id(device_id) {
            return Err(AppError::InvalidInput(format!(
                "Invalid device id '{}': use 1-64 characters of A-Z, a-z, 0-9, '-' or '_'",
                device_id
            )));
        }

        let secret = scanpay_crypto::generate_device_secret();
        let device = self
            .store
            .insert_device(NewDevice {
                device_id: device_id.to_string(),
                owner_id: account_id,
                secret_hash: scanpay_crypto::hash_secret(&secret),
                created_at: self.clock.now(),
            })
            .await?;

        tracing::info!(
            device_id = %device.device_id,
            owner_id = %account_id,
            "Device registered"
        );

        Ok(RegisteredDevice { device, secret })
    }

    /// Devices owned by `account_id`.
    pub async fn list(&self, account_id: Uuid) -> Result<Vec<Device>, AppError> {
        self.store.list_devices(account_id).await
    }

    /// Removes a device owned by `account_id`. Its invoices are kept.
    pub async fn delete(&self, account_id: Uuid, device_id: &str) -> Result<(), AppError> {
        let device = self.find(device_id).await?;
        if !device.is_owned_by(account_id) {
            return Err(AppError::Forbidden(format!(
                "Device {} belongs to another account",
                device_id
            )));
        }

        if !self.store.delete_device(device_id).await? {
            return Err(AppError::NotFound(format!("Device not found: {}", device_id)));
        }

        tracing::info!(device_id = %device_id, owner_id = %account_id, "Device deleted");
        Ok(())
    }

    /// Hands the device its oldest queued command, if any.
    pub async fn next_command(
        &self,
        device_id: &str,
        secret: &str,
    ) -> Result<Option<DeviceCommand>, AppError> {
        self.authenticate(device_id, secret).await?;
        self.store
            .take_next_command(device_id, self.clock.now())
            .await
    }

    /// Acknowledges a command the device has carried out.
    pub async fn ack_command(
        &self,
        device_id: &str,
        secret: &str,
        command_id: i64,
    ) -> Result<(), AppError> {
        self.authenticate(device_id, secret).await?;
        if !self
            .store
            .ack_command(device_id, command_id, self.clock.now())
            .await?
        {
            return Err(AppError::NotFound(format!(
                "Command {} not found for device {}",
                command_id, device_id
            )));
        }

        tracing::debug!(device_id = %device_id, command_id, "Device command acknowledged");
        Ok(())
    }

    async fn find(&self, device_id: &str) -> Result<Device, AppError> {
        self.store
            .find_device(device_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Device not found: {}", device_id)))
    }

    async fn authenticate(&self, device_id: &str, secret: &str) -> Result<Device, AppError> {
        let device = self.find(device_id).await?;
        if !device.is_active || !scanpay_crypto::secret_matches(secret, &device.secret_hash) {
            tracing::warn!(device_id = %device_id, "Rejected device credentials");
            return Err(AppError::Unauthorized("Invalid device credentials".to_string()));
        }
        Ok(device)
    }
}
