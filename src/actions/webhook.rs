//! Identity-provider event handling.

use super::users::{create_user_from_identity, delete_user_by_external_id, update_user_from_identity};
use crate::db::{Database, User};
use crate::error::{AppError, Result};
use crate::identity::IdentityEvent;
use serde::Serialize;

/// Body returned to the identity provider.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookOutcome {
    /// What happened.
    pub message: String,
    /// Affected user, if any.
    pub user: Option<User>,
}

impl WebhookOutcome {
    fn new(message: impl Into<String>, user: Option<User>) -> Self {
        Self {
            message: message.into(),
            user,
        }
    }
}

/// Apply an identity event to the local user records.
///
/// Redelivered creations and deletions of unknown users are acknowledged without
/// changing anything.
pub fn handle_identity_event(db: &Database, event: Option<IdentityEvent>) -> Result<WebhookOutcome> {
    let Some(event) = event else {
        return Ok(WebhookOutcome::new("Event ignored", None));
    };

    match event {
        IdentityEvent::UserCreated(identity) => match create_user_from_identity(db, &identity) {
            Ok(user) => Ok(WebhookOutcome::new("User created", Some(user))),
            Err(AppError::Conflict(_)) => {
                tracing::info!(external_id = %identity.external_id, "Duplicate user.created delivery");
                Ok(WebhookOutcome::new("User already exists", None))
            }
            Err(e) => Err(e),
        },
        IdentityEvent::UserUpdated(identity) => {
            let user = update_user_from_identity(db, &identity)?;
            Ok(WebhookOutcome::new("User updated", Some(user)))
        }
        IdentityEvent::UserDeleted { id } => match delete_user_by_external_id(db, &id) {
            Ok(user) => Ok(WebhookOutcome::new("User deleted", Some(user))),
            Err(AppError::NotFound(message)) => {
                tracing::warn!(external_id = %id, "user.deleted for unknown user");
                Ok(WebhookOutcome::new(message, None))
            }
            Err(e) => Err(e),
        },
    }
}
