//! Commands queued for devices when their invoices settle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

/// Action code telling a device to start for `duration_sec` seconds.
pub const ACTION_START: i16 = 1;

/// Delivery state of a device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "command_state", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandState {
    /// Waiting for the device to poll.
    Queued,
    /// Handed to the device, not yet acknowledged.
    Sent,
    /// Acknowledged by the device.
    Acked,
}

/// A command for a device, emitted once per settled invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DeviceCommand {
    pub id: i64,
    pub device_id: String,
    pub invoice_public_id: Option<String>,
    pub action: i16,
    pub duration_sec: i32,
    pub state: CommandState,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub acked_at: Option<DateTime<Utc>>,
}

impl DeviceCommand {
    /// The START command signalling that `invoice_public_id` was paid.
    pub fn start_for_invoice(
        id: i64,
        device_id: &str,
        invoice_public_id: &str,
        duration_sec: i32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            device_id: device_id.to_string(),
            invoice_public_id: Some(invoice_public_id.to_string()),
            action: ACTION_START,
            duration_sec,
            state: CommandState::Queued,
            created_at,
            sent_at: None,
            acked_at: None,
        }
    }
}
