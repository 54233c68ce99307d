use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("parley=info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    ensure_data_dirs(&config);

    let pg_options = parley_db::PgConnectOptions {
        statement_timeout_secs: config.database.statement_timeout_secs,
        idle_in_transaction_timeout_secs: config.database.idle_in_transaction_timeout_secs,
    };
    let db = parley_db::create_pool_with_pg_options(
        &config.database.url,
        config.database.max_connections,
        Some(pg_options),
    )
    .await?;
    parley_db::run_migrations(&db).await?;

    if args.seed_demo {
        seed_demo_data(&db).await?;
    }

    let shutdown_notify = Arc::new(tokio::sync::Notify::new());
    let event_bus = parley_core::events::EventBus::default();

    let state = parley_core::AppState {
        db,
        event_bus: event_bus.clone(),
        presence: parley_core::presence::PresenceRegistry::new(event_bus),
        shutdown: shutdown_notify.clone(),
        config: parley_core::AppConfig {
            database_url: config.database.url.clone(),
            worker_id: config.ids.worker_id,
            public_url: config.server.public_url.clone(),
        },
    };

    let app = parley_api::build_router()
        .merge(parley_ws::gateway_router())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;

    print_startup_banner(
        &config.server.bind_address,
        &config.server.public_url,
        &config.database.url,
    );

    let shutdown_signal = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                tracing::info!("Shutting down (ctrl-c)...");
            }
            _ = shutdown_notify.notified() => {
                tracing::info!("Shutting down (requested)...");
            }
        }
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

/// Ensure the SQLite database's parent directory exists before connecting.
fn ensure_data_dirs(config: &config::Config) {
    if let Some(db_path) = config
        .database
        .url
        .strip_prefix("sqlite://")
        .and_then(|s| s.split('?').next())
    {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
    }
}

/// A handful of users, listings and commissions for local development. The
/// live system mirrors these tables from the marketplace instead.
async fn seed_demo_data(db: &parley_db::DbPool) -> Result<()> {
    use parley_db::{commissions, listings, users};

    if users::get_user(db, 1).await?.is_some() {
        tracing::info!("Demo data already present, skipping seed");
        return Ok(());
    }

    users::create_user(db, 1, Some("Nadia Client"), Some("nadia.png"), "client").await?;
    users::create_user(db, 2, Some("Omar Broker"), Some("omar.png"), "broker").await?;
    users::create_user(db, 3, Some("Lina Owner"), None, "owner").await?;

    listings::create_listing(db, 100, "property", "Sunny flat downtown", 3, Some(2)).await?;
    listings::create_listing(db, 101, "vehicle", "2019 hatchback, low mileage", 3, None).await?;

    commissions::create_commission(db, 200, 100, Some(2), None, "pending", "pending", "open")
        .await?;

    tracing::info!("Seeded demo users, listings and commissions");
    Ok(())
}

fn print_startup_banner(bind_address: &str, public_url: &Option<String>, db_url: &str) {
    println!();
    println!("  ____            _");
    println!(" |  _ \\ __ _ _ __| | ___ _   _");
    println!(" | |_) / _` | '__| |/ _ \\ | | |");
    println!(" |  __/ (_| | |  | |  __/ |_| |");
    println!(" |_|   \\__,_|_|  |_|\\___|\\__, |");
    println!("                         |___/");
    println!();
    println!("  Listening:   http://{}", bind_address);
    if let Some(url) = public_url {
        println!("  Public URL:  {}", url);
    }
    println!("  Gateway:     ws://{}/gateway", bind_address);
    println!("  Database:    {}", db_url);
    println!();
}
