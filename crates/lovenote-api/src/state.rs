//! Application state management
//!
//! Author: hephaex@gmail.com

use crate::auth::{AuthService, JwtConfig, PasswordError, Passwords, TokenService};
use crate::middleware::ApiMetrics;
use lovenote_core::{AppConfig, Store};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Failures while assembling [`AppState`]
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Invalid password hashing parameters: {0}")]
    Password(#[from] PasswordError),

    #[error("Failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Application state shared across handlers
///
/// Built once at startup and never mutated afterwards.
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Persistence backend
    pub store: Arc<dyn Store>,
    /// Registration and login
    pub auth: AuthService,
    /// Session tokens
    pub tokens: TokenService,
    /// Prometheus registry
    pub metrics: ApiMetrics,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Wire services over one store
    pub fn new<S: Store + 'static>(config: AppConfig, store: Arc<S>) -> Result<Self, StateError> {
        let sessions: Arc<dyn lovenote_core::SessionStore> = store.clone();
        let store: Arc<dyn Store> = store;

        let tokens = TokenService::new(JwtConfig::from_auth_config(&config.auth), sessions);
        let passwords = Passwords::new(config.auth.password.clone())?;
        let auth = AuthService::new(
            store.clone(),
            passwords,
            tokens.clone(),
            config.auth.default_profile_picture.clone(),
        );

        Ok(Self {
            config,
            store,
            auth,
            tokens,
            metrics: ApiMetrics::new()?,
            start_time: Instant::now(),
        })
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
