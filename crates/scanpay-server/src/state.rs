//! Shared handler state.

use std::sync::Arc;

use crate::auth::TokenIssuer;
use crate::clock::Clock;
use crate::services::{DeviceRegistry, PaymentOrchestrator, TopUpPolicy, TopUpProcessor};
use crate::store::StoreRef;

/// Services handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub payments: Arc<PaymentOrchestrator>,
    pub topups: Arc<TopUpProcessor>,
    pub devices: Arc<DeviceRegistry>,
    pub tokens: Arc<TokenIssuer>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wires the services over one store and clock.
    pub fn new(
        store: StoreRef,
        clock: Arc<dyn Clock>,
        tokens: TokenIssuer,
        policy: TopUpPolicy,
    ) -> Self {
        Self {
            payments: Arc::new(PaymentOrchestrator::new(store.clone(), clock.clone())),
            topups: Arc::new(TopUpProcessor::new(store.clone(), clock.clone(), policy)),
            devices: Arc::new(DeviceRegistry::new(store, clock.clone())),
            tokens: Arc::new(tokens),
            clock,
        }
    }
}
