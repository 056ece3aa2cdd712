//! Database models for the scan-to-pay server.

pub mod device;
pub mod device_command;
pub mod invoice;
pub mod payment;
pub mod wallet;
pub mod wallet_transaction;

pub use device::{Device, NewDevice};
pub use device_command::{CommandState, DeviceCommand, ACTION_START};
pub use invoice::{Invoice, InvoiceStatus, NewInvoice, MAX_DESCRIPTION_CHARS, MAX_DURATION_SECS};
pub use payment::{PaymentMethod, PaymentRecord};
pub use wallet::Wallet;
pub use wallet_transaction::{NewWalletTransaction, TransactionType, WalletTransaction};
