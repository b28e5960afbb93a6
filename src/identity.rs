//! Identity-provider webhooks.
//!
//! Deliveries are signed Svix-style: `svix-id`, `svix-timestamp` and
//! `svix-signature` headers, HMAC-SHA256 over `"{id}.{timestamp}.{body}"` keyed with
//! the base64 part of a `whsec_` secret.

use crate::db::now_timestamp;
use crate::error::{AppError, Result};
use axum::http::HeaderMap;
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SECRET_PREFIX: &str = "whsec_";

/// Verifies webhook signatures.
#[derive(Clone)]
pub struct WebhookVerifier {
    key: Vec<u8>,
    tolerance_seconds: i64,
}

impl WebhookVerifier {
    /// Build a verifier from a `whsec_<base64>` secret.
    pub fn new(secret: &str, tolerance_seconds: i64) -> Result<Self> {
        let encoded = secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret);
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| AppError::Config(format!("Invalid webhook signing secret: {}", e)))?;

        if key.is_empty() {
            return Err(AppError::Config("Webhook signing secret is empty".into()));
        }

        Ok(Self {
            key,
            tolerance_seconds,
        })
    }

    /// Verify a delivery from its HTTP headers.
    pub fn verify_headers(&self, headers: &HeaderMap, body: &[u8]) -> Result<()> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| AppError::Identity(format!("Missing {} header", name)))
        };

        self.verify(
            header("svix-id")?,
            header("svix-timestamp")?,
            header("svix-signature")?,
            body,
            now_timestamp(),
        )
    }

    /// Verify a delivery against the given clock.
    pub fn verify(
        &self,
        msg_id: &str,
        timestamp: &str,
        signatures: &str,
        body: &[u8],
        now: i64,
    ) -> Result<()> {
        let ts: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| AppError::Identity("Invalid timestamp header".into()))?;

        if now.abs_diff(ts) > self.tolerance_seconds.max(0).unsigned_abs() {
            return Err(AppError::Identity("Timestamp outside tolerance".into()));
        }

        let mac = self.mac(msg_id, ts, body)?;

        // Header holds space-separated "v1,<base64>" entries; any match is accepted.
        let matched = signatures
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == "v1")
            .filter_map(|(_, sig)| STANDARD.decode(sig).ok())
            .any(|sig| mac.clone().verify_slice(&sig).is_ok());

        if matched {
            Ok(())
        } else {
            Err(AppError::Identity("Signature mismatch".into()))
        }
    }

    /// Signature header value for a payload, as the provider would send it.
    pub fn sign(&self, msg_id: &str, timestamp: i64, body: &[u8]) -> Result<String> {
        let mac = self.mac(msg_id, timestamp, body)?;
        Ok(format!("v1,{}", STANDARD.encode(mac.finalize().into_bytes())))
    }

    fn mac(&self, msg_id: &str, timestamp: i64, body: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|_| AppError::Internal("HMAC key error".into()))?;
        mac.update(msg_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac)
    }
}

/// User profile carried by identity events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityUser {
    /// Identity-provider user ID.
    pub external_id: String,
    /// Display name.
    pub name: String,
    /// Primary email.
    pub email: String,
    /// Avatar URL.
    pub picture: Option<String>,
    /// Whether the provider marks the user as admin.
    pub admin: bool,
}

/// Supported identity events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    /// New account.
    UserCreated(IdentityUser),
    /// Profile change.
    UserUpdated(IdentityUser),
    /// Account removed.
    UserDeleted {
        /// Identity-provider user ID.
        id: String,
    },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EmailAddress {
    id: Option<String>,
    email_address: String,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    email_addresses: Vec<EmailAddress>,
    #[serde(default)]
    primary_email_address_id: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    public_metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct DeletedData {
    id: Option<String>,
}

impl TryFrom<UserData> for IdentityUser {
    type Error = AppError;

    fn try_from(data: UserData) -> Result<Self> {
        let primary = data.primary_email_address_id.as_deref();
        let email = data
            .email_addresses
            .iter()
            .find(|e| primary.is_some() && e.id.as_deref() == primary)
            .or_else(|| data.email_addresses.first())
            .map(|e| e.email_address.trim().to_string())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AppError::Identity(format!("User {} has no email address", data.id)))?;

        let name = [data.first_name.as_deref(), data.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let name = if name.is_empty() {
            email.split('@').next().unwrap_or_default().to_string()
        } else {
            name
        };

        let admin = data
            .public_metadata
            .get("role")
            .and_then(|r| r.as_str())
            .is_some_and(|r| r.eq_ignore_ascii_case("admin"));

        Ok(Self {
            external_id: data.id,
            name,
            email,
            picture: data.image_url.filter(|u| !u.trim().is_empty()),
            admin,
        })
    }
}

impl IdentityEvent {
    /// Parse a webhook body. Unsupported event types yield `None`.
    pub fn parse(body: &[u8]) -> Result<Option<Self>> {
        let envelope: Envelope = serde_json::from_slice(body)
            .map_err(|e| AppError::Identity(format!("Malformed event: {}", e)))?;

        let user = |data: serde_json::Value| -> Result<IdentityUser> {
            let data: UserData = serde_json::from_value(data)
                .map_err(|e| AppError::Identity(format!("Malformed user data: {}", e)))?;
            IdentityUser::try_from(data)
        };

        let event = match envelope.event_type.as_str() {
            "user.created" => IdentityEvent::UserCreated(user(envelope.data)?),
            "user.updated" => IdentityEvent::UserUpdated(user(envelope.data)?),
            "user.deleted" => {
                let data: DeletedData = serde_json::from_value(envelope.data)
                    .map_err(|e| AppError::Identity(format!("Malformed user data: {}", e)))?;
                let id = data
                    .id
                    .ok_or_else(|| AppError::Identity("Deleted event without user id".into()))?;
                IdentityEvent::UserDeleted { id }
            }
            other => {
                tracing::debug!(event_type = %other, "Ignoring identity event");
                return Ok(None);
            }
        };

        Ok(Some(event))
    }
}
