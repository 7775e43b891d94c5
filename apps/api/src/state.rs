use std::sync::Arc;

use crate::config::{Config, DiscoveryMode};
use crate::documents::store::SessionStore;
use crate::llm_client::CompletionService;
use crate::placeholders::discovery::{LlmDiscovery, PlaceholderDiscovery};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub llm: Arc<dyn CompletionService>,
    pub store: Arc<dyn SessionStore>,
    /// Tried before regex extraction at upload. `None` in regex-only mode.
    pub classifier: Option<Arc<dyn PlaceholderDiscovery>>,
}

impl AppState {
    pub fn new(
        config: Config,
        llm: Arc<dyn CompletionService>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let classifier: Option<Arc<dyn PlaceholderDiscovery>> = match config.discovery_mode {
            DiscoveryMode::Llm => Some(Arc::new(LlmDiscovery {
                llm: llm.clone(),
                char_budget: config.classifier_char_budget,
            })),
            DiscoveryMode::Regex => None,
        };
        Self {
            config,
            llm,
            store,
            classifier,
        }
    }
}
