//! Shared application state: session registry, connections, and timers.

pub mod connections;
pub mod session;
pub mod store;
pub mod timers;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    state::{connections::ConnectionRegistry, store::SessionStore, timers::TimerRegistry},
};

/// Cheap-to-clone handle on the process-wide state.
pub type SharedState = Arc<AppState>;

/// Central application state owning the session store, the connection
/// registry, and the per-session timer registry.
///
/// The store is an owned, injectable object rather than a global so the
/// router and timer logic only depend on its create/resolve/apply contract.
pub struct AppState {
    config: AppConfig,
    store: SessionStore,
    connections: ConnectionRegistry,
    timers: TimerRegistry,
}

impl AppState {
    /// Construct the state wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig) -> SharedState {
        let store = SessionStore::new(config.short_code_len());
        Arc::new(Self {
            config,
            store,
            connections: ConnectionRegistry::new(),
            timers: TimerRegistry::new(),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The session registry.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Live connection bindings keyed by connection id.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Per-session countdown timer slots.
    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }
}
