//! bookstore-rs server entry point.

use bookstore_rs::{
    actions,
    config::{Cli, Command, Config, UserCommand},
    db::{AccountStatus, Database, Role, timestamp_to_datetime},
    payment::StripeGateway,
    server,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let mut config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };
    config.apply_env();

    // Handle command
    match cli.command {
        Some(Command::Init { force }) => cmd_init(force).await,
        Some(Command::User { action }) => cmd_user(action, &config).await,
        Some(Command::Serve { bind }) => cmd_serve(config, bind).await,
        None => {
            // Default: start server
            cmd_serve(config, None).await
        }
    }
}

/// Initialize config and database.
async fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    let db = Database::open(&config.database.path)?;
    db.close()?;
    println!("Initialized database: {}", config.database.path.display());

    println!("\nEdit config.toml to set the session key, webhook secret and payment key.");
    println!("Users are created by the identity provider's webhook.");
    println!("Then grant admin access with: bookstore-rs user role <id> admin");

    Ok(())
}

/// User management commands.
async fn cmd_user(action: UserCommand, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;

    match action {
        UserCommand::List => {
            let (users, _) = db.list_users(None, u32::MAX, 0)?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!(
                    "{:<36} {:<28} {:<30} {:<10} {:<10} CREATED",
                    "ID", "EXTERNAL ID", "EMAIL", "ROLE", "STATUS"
                );
                println!("{}", "-".repeat(132));
                for user in users {
                    let role = if user.is_admin() { "admin" } else { "user" };
                    println!(
                        "{:<36} {:<28} {:<30} {:<10} {:<10} {}",
                        user.id,
                        user.external_id,
                        user.email,
                        role,
                        user.status.as_str(),
                        timestamp_to_datetime(user.created_at).format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }

        UserCommand::Role { id, role } => {
            let roles = match role.parse::<Role>()? {
                Role::Admin => vec![Role::User, Role::Admin],
                Role::User => vec![Role::User],
            };
            match db.find_user(&id)? {
                Some(user) => {
                    let user = actions::users::set_roles(&db, &user.id, &roles)?;
                    println!("Updated roles for {} ({}): {}", user.email, user.id, role);
                }
                None => println!("User not found: {}", id),
            }
        }

        UserCommand::Status { id, status } => {
            let status = status.parse::<AccountStatus>()?;
            match db.find_user(&id)? {
                Some(user) => {
                    let user = actions::users::set_status(&db, &user.id, status)?;
                    println!("User {} ({}) is now {}", user.email, user.id, status.as_str());
                }
                None => println!("User not found: {}", id),
            }
        }

        UserCommand::Del { id } => match db.find_user(&id)? {
            Some(user) => {
                let user = actions::users::delete_user(&db, &user.id)?;
                println!("Deleted user: {} ({})", user.email, user.id);
            }
            None => println!("User not found: {}", id),
        },
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(mut config: Config, bind: Option<std::net::SocketAddr>) -> anyhow::Result<()> {
    // Override bind address if specified
    if let Some(addr) = bind {
        config.server.bind = addr;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookstore_rs=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = Database::open(&config.database.path)?;

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        "Starting bookstore-rs server"
    );

    let payments = Arc::new(StripeGateway::new(&config.payment));
    let bind_addr = config.server.bind;
    let state = server::AppState::new(config, db.clone(), payments)?;
    let app = server::create_router(state);

    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(address = %bind_addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
        })
        .await?;

    db.close()?;
    Ok(())
}
