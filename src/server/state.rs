//! Application state shared across handlers.

use crate::auth::AuthService;
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::identity::WebhookVerifier;
use crate::payment::PaymentGateway;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Authentication service.
    pub auth: Arc<AuthService>,
    /// Payment processor.
    pub payments: Arc<dyn PaymentGateway>,
    /// Webhook signature verifier, absent without a signing secret.
    pub webhook: Option<WebhookVerifier>,
}

impl AppState {
    /// Create application state from configuration, database and payment gateway.
    pub fn new(config: Config, db: Database, payments: Arc<dyn PaymentGateway>) -> Result<Self> {
        let auth = AuthService::new(db.clone(), &config.auth)?;

        let webhook = match &config.webhook.signing_secret {
            Some(secret) => Some(WebhookVerifier::new(
                secret,
                config.webhook.tolerance_seconds,
            )?),
            None => {
                tracing::warn!("No webhook signing secret configured, identity events will be rejected");
                None
            }
        };

        Ok(Self {
            config: Arc::new(config),
            db,
            auth: Arc::new(auth),
            payments,
            webhook,
        })
    }
}
