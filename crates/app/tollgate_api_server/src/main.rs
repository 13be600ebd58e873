//! Tollgate API server binary.
//!
//! Loads configuration once, builds the services over PostgreSQL and serves
//! the auth routes until interrupted.

use std::time::Duration;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tollgate_api::config::ApiConfig;
use tracing::info;

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "tollgate_api_server", about = "Tollgate API server")]
struct Args {
    /// Port to listen on (0 = ephemeral).
    #[arg(long, env = "PORT", default_value_t = 3100)]
    port: u16,

    /// Interface to bind.
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/tollgate"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Skip running embedded migrations at startup.
    #[arg(long, default_value_t = false)]
    skip_migrations: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| {
                    tracing_subscriber::EnvFilter::try_new(
                        "info,tollgate_api=debug,tollgate_core=debug",
                    )
                })?,
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env()?;
    config.bind_addr = format!("{}:{}", args.host, args.port);
    config.pg_connection_url = args.database_url.clone();

    info!(
        bind_addr = %config.bind_addr,
        max_connections = args.max_connections,
        algorithm = ?config.token.algorithm,
        access_ttl_minutes = config.token.access_ttl_minutes,
        refresh_ttl_minutes = config.token.refresh_ttl_minutes,
        "starting tollgate_api_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&args.database_url)
        .await?;

    if !args.skip_migrations {
        info!("running database migrations");
        tollgate_api::migrate(&pool).await?;
    }

    let state = tollgate_api::AppState::postgres(config.clone(), pool);
    let app = tollgate_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
