use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Online bookstore backend: catalog, cart, checkout and admin API.
#[derive(Parser, Debug, Clone)]
#[command(name = "bookstore-rs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "BOOKSTORE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// User management commands.
    User {
        /// User subcommand action.
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Initialize database and create default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// User management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum UserCommand {
    /// List all users.
    List,

    /// Grant or revoke the admin role.
    Role {
        /// User ID (local or identity-provider ID).
        id: String,
        /// Role: "user" or "admin".
        role: String,
    },

    /// Set account status.
    Status {
        /// User ID (local or identity-provider ID).
        id: String,
        /// Status: "active" or "suspended".
        status: String,
    },

    /// Delete a user.
    Del {
        /// User ID (local or identity-provider ID).
        id: String,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Session verification configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Identity-provider webhook configuration.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Payment processor configuration.
    #[serde(default)]
    pub payment: PaymentConfig,

    /// Pricing and catalog configuration.
    #[serde(default)]
    pub store: StoreConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Store name.
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            title: default_title(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        8080,
    )
}

fn default_title() -> String {
    "Bookstore".to_string()
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/bookstore.db")
}

/// Session token verification.
///
/// Exactly one of `jwt_secret` (HS256) or `jwt_public_key` (RS256, PEM) should be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret for HS256 session tokens.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// PEM public key for RS256 session tokens.
    #[serde(default)]
    pub jwt_public_key: Option<String>,

    /// Expected `iss` claim.
    #[serde(default)]
    pub issuer: Option<String>,

    /// Require the admin role on admin routes.
    #[serde(default = "default_enforce_admin_role")]
    pub enforce_admin_role: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_public_key: None,
            issuer: None,
            enforce_admin_role: default_enforce_admin_role(),
        }
    }
}

fn default_enforce_admin_role() -> bool {
    true
}

/// Identity-provider webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Signing secret (`whsec_...`).
    #[serde(default)]
    pub signing_secret: Option<String>,

    /// Maximum accepted clock skew for signed events, in seconds.
    #[serde(default = "default_tolerance_seconds")]
    pub tolerance_seconds: i64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            signing_secret: None,
            tolerance_seconds: default_tolerance_seconds(),
        }
    }
}

fn default_tolerance_seconds() -> i64 {
    300
}

/// Payment processor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// Secret API key.
    #[serde(default)]
    pub secret_key: Option<String>,

    /// API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// ISO currency code, lowercase.
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            api_base: default_api_base(),
            currency: default_currency(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

/// Pricing and listing configuration. Amounts are in minor currency units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Flat shipping fee.
    #[serde(default = "default_shipping_fee")]
    pub shipping_fee: i64,

    /// Subtotals strictly above this ship free.
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: i64,

    /// Tax rate applied to the subtotal (0.08 = 8%).
    #[serde(default = "default_tax_rate")]
    pub tax_rate: f64,

    /// Default page size for listings.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Upper bound for a requested page size.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    /// Default number of featured items.
    #[serde(default = "default_featured_limit")]
    pub featured_limit: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            shipping_fee: default_shipping_fee(),
            free_shipping_threshold: default_free_shipping_threshold(),
            tax_rate: default_tax_rate(),
            page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            featured_limit: default_featured_limit(),
        }
    }
}

fn default_shipping_fee() -> i64 {
    599
}

fn default_free_shipping_threshold() -> i64 {
    5000
}

fn default_tax_rate() -> f64 {
    0.08
}

fn default_page_size() -> u32 {
    12
}

fn default_max_page_size() -> u32 {
    100
}

fn default_featured_limit() -> u32 {
    8
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("bookstore-rs.toml"),
            dirs::config_dir()
                .map(|p| p.join("bookstore-rs").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/bookstore-rs/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Apply secrets and paths from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a key lookup (the environment in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("BOOKSTORE_DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(secret) = lookup("BOOKSTORE_JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(key) = lookup("BOOKSTORE_JWT_PUBLIC_KEY") {
            self.auth.jwt_public_key = Some(key);
        }
        if let Some(secret) = lookup("BOOKSTORE_WEBHOOK_SECRET") {
            self.webhook.signing_secret = Some(secret);
        }
        if let Some(key) = lookup("BOOKSTORE_PAYMENT_SECRET_KEY") {
            self.payment.secret_key = Some(key);
        }
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# bookstore-rs configuration

[server]
bind = "0.0.0.0:8080"
title = "Bookstore"

[database]
# path = "/var/lib/bookstore-rs/bookstore.db"

[auth]
# Session tokens issued by the identity provider.
# Set one of jwt_secret (HS256) or jwt_public_key (RS256 PEM),
# or use BOOKSTORE_JWT_SECRET / BOOKSTORE_JWT_PUBLIC_KEY.
# jwt_public_key = """
# -----BEGIN PUBLIC KEY-----
# ...
# -----END PUBLIC KEY-----
# """
# issuer = "https://clerk.example.com"
# Require the admin role on /api/admin routes
enforce_admin_role = true

[webhook]
# signing_secret = "whsec_..."  (or BOOKSTORE_WEBHOOK_SECRET)
tolerance_seconds = 300

[payment]
# secret_key = "sk_test_..."  (or BOOKSTORE_PAYMENT_SECRET_KEY)
currency = "usd"

[store]
# Amounts in cents
shipping_fee = 599
free_shipping_threshold = 5000
tax_rate = 0.08
page_size = 12
max_page_size = 100
featured_limit = 8
"#
        .to_string()
    }
}
