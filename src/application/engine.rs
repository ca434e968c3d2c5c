use crate::application::inventory::InventoryLedger;
use crate::application::orders::OrderService;
use crate::application::remittances::RemittanceService;
use crate::application::reporting::ReportingService;
use crate::application::rotation::AccountRotation;
use crate::config::EngineConfig;
use crate::domain::ports::Collaborators;
use std::sync::Arc;

/// The main entry point for the fulfillment application.
///
/// `FulfillmentEngine` wires the services over one set of collaborators.
/// Services hold no state of their own beyond `Arc` handles; every
/// consistency guarantee comes from the stores' compare-and-set methods, so
/// one engine can be shared across tasks.
pub struct FulfillmentEngine {
    orders: OrderService,
    remittances: RemittanceService,
    reporting: ReportingService,
    ledger: Arc<InventoryLedger>,
    rotation: Arc<AccountRotation>,
    config: Arc<EngineConfig>,
}

impl FulfillmentEngine {
    /// Creates a new `FulfillmentEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `collaborators` - Stores and external services.
    /// * `config` - Engine settings, fixed for the engine's lifetime.
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Self {
        let config = Arc::new(config);
        let ledger = Arc::new(InventoryLedger::new(
            collaborators.inventory.clone(),
            collaborators.catalog.clone(),
            collaborators.clock.clone(),
            &config,
        ));
        let rotation = Arc::new(AccountRotation::new(
            collaborators.accounts.clone(),
            collaborators.clock.clone(),
            &config,
        ));

        Self {
            orders: OrderService::new(&collaborators, ledger.clone(), rotation.clone(), config.clone()),
            remittances: RemittanceService::new(&collaborators, rotation.clone(), config.clone()),
            reporting: ReportingService::new(&collaborators),
            ledger,
            rotation,
            config,
        }
    }

    pub fn orders(&self) -> &OrderService {
        &self.orders
    }

    pub fn remittances(&self) -> &RemittanceService {
        &self.remittances
    }

    pub fn reporting(&self) -> &ReportingService {
        &self.reporting
    }

    pub fn inventory(&self) -> &InventoryLedger {
        &self.ledger
    }

    pub fn accounts(&self) -> &AccountRotation {
        &self.rotation
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
