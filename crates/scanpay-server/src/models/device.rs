//! Merchant device registry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Longest accepted device identifier.
pub const MAX_DEVICE_ID_CHARS: usize = 64;

/// A merchant-side device that originates invoices and polls for commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Device {
    /// Caller-chosen identifier, unique across the registry.
    pub device_id: String,
    /// Account that registered the device.
    #[serde(skip)]
    pub owner_id: Uuid,
    /// SHA-256 of the secret handed out at registration.
    #[serde(skip)]
    pub secret_hash: String,
    pub is_active: bool,
    /// Last time the device polled for commands.
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Data required to register a device.
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub device_id: String,
    pub owner_id: Uuid,
    pub secret_hash: String,
    pub created_at: DateTime<Utc>,
}

impl NewDevice {
    /// Materializes the active, never-seen device.
    pub fn into_device(self) -> Device {
        Device {
            device_id: self.device_id,
            owner_id: self.owner_id,
            secret_hash: self.secret_hash,
            is_active: true,
            last_seen: None,
            created_at: self.created_at,
        }
    }
}

impl Device {
    /// Returns true if the device belongs to `account_id`.
    pub fn is_owned_by(&self, account_id: Uuid) -> bool {
        self.owner_id == account_id
    }
}

/// Checks a device id is 1..=64 characters of `[A-Za-z0-9_-]`.
pub fn is_valid_device_id(device_id: &str) -> bool {
    !device_id.is_empty()
        && device_id.len() <= MAX_DEVICE_ID_CHARS
        && device_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
