use std::sync::Arc;
use std::time::Instant;

use crate::auth::{JwtValidator, TokenVerifier};
use crate::config::{RelayConfig, Settings};
use crate::connection_manager::ConnectionRegistry;
use crate::conversation::ConversationStore;
use crate::postgres::PostgresPool;
use crate::websocket::{MessageRelay, SessionContext};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub registry: Arc<ConnectionRegistry>,
    pub store: Arc<dyn ConversationStore>,
    pub relay: Arc<MessageRelay>,
    pub relay_config: RelayConfig,
    pub postgres_pool: Option<PostgresPool>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        store: Arc<dyn ConversationStore>,
        postgres_pool: Option<PostgresPool>,
    ) -> Self {
        let verifier: Arc<dyn TokenVerifier> = Arc::new(JwtValidator::new(&settings.jwt));
        let mut state = Self::with_verifier(settings, verifier, store);
        state.postgres_pool = postgres_pool;
        state
    }

    /// Build state around an explicit token verifier.
    pub fn with_verifier(
        settings: Settings,
        verifier: Arc<dyn TokenVerifier>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        let relay_config = RelayConfig::from(&settings.websocket);
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Arc::new(MessageRelay::new(
            registry.clone(),
            store.clone(),
            relay_config.send_timeout,
        ));

        Self {
            settings: Arc::new(settings),
            verifier,
            registry,
            store,
            relay,
            relay_config,
            postgres_pool: None,
            start_time: Instant::now(),
        }
    }

    pub fn session_context(&self) -> SessionContext {
        SessionContext {
            registry: self.registry.clone(),
            relay: self.relay.clone(),
            verifier: self.verifier.clone(),
            config: self.relay_config,
        }
    }
}
