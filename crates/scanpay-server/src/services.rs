//! Business operations over the stores.

pub mod devices;
pub mod payments;
pub mod topup;

pub use devices::{DeviceRegistry, RegisteredDevice};
pub use payments::{CreateInvoice, PaymentOrchestrator, WalletPayment};
pub use topup::{TopUpAmount, TopUpPolicy, TopUpProcessor, TopUpReceipt, WalletSummary, PRESET_AMOUNTS};
