//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::delivery::DeliveryPipeline;
use marketplace_core::ports::{
    CartStore, DatasetCatalog, Packager, PurchaseLedger, UserStore,
};
use marketplace_core::AccessGuard;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub catalog: Arc<dyn DatasetCatalog>,
    pub carts: Arc<dyn CartStore>,
    pub ledger: Arc<dyn PurchaseLedger>,
    pub guard: AccessGuard,
    pub delivery: DeliveryPipeline,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires every storage port to one backing store.
    pub fn new<S>(store: Arc<S>, packager: Arc<dyn Packager>, config: Arc<Config>) -> Self
    where
        S: UserStore + DatasetCatalog + CartStore + PurchaseLedger + 'static,
    {
        let ledger: Arc<dyn PurchaseLedger> = store.clone();
        let delivery = DeliveryPipeline::new(
            packager,
            config.dataset_root.clone(),
            config.archive_temp_dir.clone(),
            config.packaging_timeout,
        );
        Self {
            users: store.clone(),
            catalog: store.clone(),
            carts: store,
            guard: AccessGuard::new(ledger.clone()),
            ledger,
            delivery,
            config,
        }
    }
}
