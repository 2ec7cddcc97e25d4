use std::sync::Arc;

use inzozi_db::LedgerStore;

use crate::config::PanelConfig;
use crate::workflow::Workflow;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PanelConfig>,
    pub workflow: Workflow,
    /// `postgres` or `memory`, reported by the health check.
    pub storage: &'static str,
}

impl AppState {
    pub fn new(config: PanelConfig, store: Arc<dyn LedgerStore>, storage: &'static str) -> Self {
        let workflow = Workflow::new(store, &config);
        Self {
            config: Arc::new(config),
            workflow,
            storage,
        }
    }
}
