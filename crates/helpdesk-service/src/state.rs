use std::sync::Arc;

use axum::http::HeaderMap;
use helpdesk_core::{Principal, CLIENT_PRINCIPAL_HEADER};
use helpdesk_store_sqlite::{StoreError, TicketStore};

use crate::config::ServiceConfig;
use crate::cors::cors_headers;
use crate::error::EndpointError;

#[derive(Clone)]
pub struct AppState {
    store: TicketStore,
    config: Arc<ServiceConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(store: TicketStore, config: ServiceConfig) -> Self {
        Self { store, config: Arc::new(config) }
    }

    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    #[must_use]
    pub fn cors(&self, request: &HeaderMap, methods: &'static str) -> HeaderMap {
        cors_headers(&self.config.allowed_origins, request, methods)
    }

    /// Enforces the agent role when the service is configured to.
    ///
    /// # Errors
    /// Returns [`EndpointError::Forbidden`] when the gate is on and the caller
    /// lacks the role.
    pub fn authorize_agent(&self, request: &HeaderMap) -> Result<(), EndpointError> {
        if !self.config.require_agent_role {
            return Ok(());
        }
        let raw = request.get(CLIENT_PRINCIPAL_HEADER).and_then(|value| value.to_str().ok());
        Principal::from_client_principal(raw).require_agent()?;
        Ok(())
    }

    /// Runs a store call on the blocking pool. The pooled connection it takes
    /// is released when `work` returns or unwinds.
    ///
    /// # Errors
    /// Returns the store error, or [`EndpointError::Worker`] if the task panicked.
    pub async fn run_blocking<T, F>(&self, work: F) -> Result<T, EndpointError>
    where
        T: Send + 'static,
        F: FnOnce(&TicketStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.store.clone();
        let outcome = tokio::task::spawn_blocking(move || work(&store))
            .await
            .map_err(|err| EndpointError::Worker(err.to_string()))?;
        Ok(outcome?)
    }
}
