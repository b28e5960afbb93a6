//! Authentication module.
//!
//! Sessions are issued by the external identity provider as signed JWTs. The
//! `sub` claim is the provider's user ID and maps to `users.external_id`.

use crate::config::AuthConfig;
use crate::db::{AccountStatus, Database, User};
use crate::error::{AppError, Result};
use axum::http::{HeaderMap, header};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

/// Name of the cookie carrying the session token in browsers.
pub const SESSION_COOKIE: &str = "__session";

/// Claims read from a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Identity-provider user ID.
    pub sub: String,
    /// Expiry timestamp.
    pub exp: i64,
    /// Issued-at timestamp.
    #[serde(default)]
    pub iat: Option<i64>,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
}

/// Authentication service.
pub struct AuthService {
    db: Database,
    verifier: Option<(DecodingKey, Validation)>,
    enforce_admin_role: bool,
}

impl AuthService {
    /// Create a new auth service from the `[auth]` section.
    ///
    /// Without a secret or public key every session is rejected.
    pub fn new(db: Database, config: &AuthConfig) -> Result<Self> {
        let verifier = match (&config.jwt_public_key, &config.jwt_secret) {
            (Some(pem), _) => {
                let key = DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
                    AppError::Config(format!("Invalid session public key: {}", e))
                })?;
                Some((key, Self::validation(Algorithm::RS256, config)))
            }
            (None, Some(secret)) => Some((
                DecodingKey::from_secret(secret.as_bytes()),
                Self::validation(Algorithm::HS256, config),
            )),
            (None, None) => {
                tracing::warn!("No session key configured, all signed-in routes will reject");
                None
            }
        };

        Ok(Self {
            db,
            verifier,
            enforce_admin_role: config.enforce_admin_role,
        })
    }

    fn validation(algorithm: Algorithm, config: &AuthConfig) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["sub", "exp"]);
        validation.validate_aud = false;
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation
    }

    /// Decode and verify a session token.
    pub fn decode_claims(&self, token: &str) -> Result<SessionClaims> {
        let (key, validation) = self
            .verifier
            .as_ref()
            .ok_or_else(|| AppError::Unauthorized("Session verification is not configured".into()))?;

        decode::<SessionClaims>(token, key, validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::Unauthorized("Session expired".into()),
                ErrorKind::InvalidSignature => {
                    AppError::Unauthorized("Invalid session signature".into())
                }
                _ => AppError::Unauthorized(format!("Invalid session token: {}", e)),
            })
    }

    /// Validate a session token and return the local user.
    pub fn verify_token(&self, token: &str) -> Result<User> {
        let claims = self.decode_claims(token)?;

        let user = self
            .db
            .get_user_by_external_id(&claims.sub)?
            .ok_or_else(|| AppError::Unauthorized("Unknown user".into()))?;

        if user.status == AccountStatus::Suspended {
            return Err(AppError::Forbidden("Account is suspended".into()));
        }

        Ok(user)
    }

    /// Resolve the signed-in user from request headers.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<User> {
        let token = extract_token(headers)
            .ok_or_else(|| AppError::Unauthorized("Missing session token".into()))?;
        self.verify_token(&token)
    }

    /// Guard for admin-only actions.
    pub fn require_admin(&self, user: &User) -> Result<()> {
        if user.is_admin() {
            return Ok(());
        }

        if self.enforce_admin_role {
            return Err(AppError::Forbidden("Admin role required".into()));
        }

        tracing::warn!(
            user_id = %user.id,
            "Admin route accessed without admin role (enforce_admin_role = false)"
        );
        Ok(())
    }
}

/// Token from `Authorization: Bearer` or the session cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string());

    bearer.or_else(|| {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Role, new_id, now_timestamp};
    use axum::http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::collections::BTreeSet;

    const SECRET: &str = "test-session-secret-with-enough-bytes";

    fn config(enforce: bool) -> AuthConfig {
        AuthConfig {
            jwt_secret: Some(SECRET.into()),
            jwt_public_key: None,
            issuer: Some("https://id.example.com".into()),
            enforce_admin_role: enforce,
        }
    }

    fn token(sub: &str, exp: i64, iss: &str) -> String {
        let claims = SessionClaims {
            sub: sub.into(),
            exp,
            iat: Some(now_timestamp()),
            iss: Some(iss.into()),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn user(external_id: &str, status: AccountStatus, roles: &[Role]) -> User {
        let now = now_timestamp();
        User {
            id: new_id(),
            external_id: external_id.into(),
            name: "Ada".into(),
            email: format!("{}@example.com", external_id),
            picture: None,
            roles: roles.iter().copied().collect::<BTreeSet<_>>(),
            cart: Vec::new(),
            wishlist: Vec::new(),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    fn service(enforce: bool) -> (Database, AuthService) {
        let db = Database::open_memory().unwrap();
        let auth = AuthService::new(db.clone(), &config(enforce)).unwrap();
        (db, auth)
    }

    #[test]
    fn test_valid_token_resolves_user() {
        let (db, auth) = service(true);
        db.create_user(&user("user_1", AccountStatus::Active, &[Role::User]))
            .unwrap();

        let t = token("user_1", now_timestamp() + 3600, "https://id.example.com");
        let resolved = auth.verify_token(&t).unwrap();
        assert_eq!(resolved.external_id, "user_1");
    }

    #[test]
    fn test_expired_token_rejected() {
        let (db, auth) = service(true);
        db.create_user(&user("user_1", AccountStatus::Active, &[Role::User]))
            .unwrap();

        let t = token("user_1", now_timestamp() - 3600, "https://id.example.com");
        assert!(matches!(auth.verify_token(&t), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let (db, auth) = service(true);
        db.create_user(&user("user_1", AccountStatus::Active, &[Role::User]))
            .unwrap();

        let t = token("user_1", now_timestamp() + 3600, "https://evil.example.com");
        assert!(matches!(auth.verify_token(&t), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_unknown_subject_and_suspended_user() {
        let (db, auth) = service(true);
        db.create_user(&user("user_s", AccountStatus::Suspended, &[Role::User]))
            .unwrap();

        let unknown = token("nobody", now_timestamp() + 3600, "https://id.example.com");
        assert!(matches!(
            auth.verify_token(&unknown),
            Err(AppError::Unauthorized(_))
        ));

        let suspended = token("user_s", now_timestamp() + 3600, "https://id.example.com");
        assert!(matches!(
            auth.verify_token(&suspended),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_unconfigured_service_rejects() {
        let db = Database::open_memory().unwrap();
        let auth = AuthService::new(db, &AuthConfig::default()).unwrap();
        let t = token("user_1", now_timestamp() + 3600, "https://id.example.com");
        assert!(matches!(auth.verify_token(&t), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_rs256_public_key_verifies_sessions() {
        let private_pem = include_str!("../testdata/session_rsa_private.pem");
        let public_pem = include_str!("../testdata/session_rsa_public.pem");

        let db = Database::open_memory().unwrap();
        db.create_user(&user("user_1", AccountStatus::Active, &[Role::User]))
            .unwrap();
        let config = AuthConfig {
            jwt_secret: Some(SECRET.into()),
            jwt_public_key: Some(public_pem.into()),
            issuer: None,
            enforce_admin_role: true,
        };
        let auth = AuthService::new(db, &config).unwrap();

        let claims = SessionClaims {
            sub: "user_1".into(),
            exp: now_timestamp() + 3600,
            iat: Some(now_timestamp()),
            iss: None,
        };
        let signed = encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap(),
        )
        .unwrap();
        assert_eq!(auth.verify_token(&signed).unwrap().external_id, "user_1");

        // The public key takes precedence, so HS256 tokens no longer verify.
        let hs256 = token("user_1", now_timestamp() + 3600, "https://id.example.com");
        assert!(matches!(auth.verify_token(&hs256), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_malformed_public_key_is_config_error() {
        let config = AuthConfig {
            jwt_public_key: Some("-----BEGIN PUBLIC KEY-----\nnope\n-----END PUBLIC KEY-----".into()),
            ..AuthConfig::default()
        };
        let result = AuthService::new(Database::open_memory().unwrap(), &config);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_require_admin_enforcement() {
        let (_, enforcing) = service(true);
        let (_, relaxed) = service(false);
        let customer = user("user_1", AccountStatus::Active, &[Role::User]);
        let admin = user("user_2", AccountStatus::Active, &[Role::User, Role::Admin]);

        assert!(matches!(
            enforcing.require_admin(&customer),
            Err(AppError::Forbidden(_))
        ));
        assert!(enforcing.require_admin(&admin).is_ok());
        assert!(relaxed.require_admin(&customer).is_ok());
    }

    #[test]
    fn test_extract_token_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; __session=cookie-token"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("cookie-token"));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header-token"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("header-token"));
    }
}
