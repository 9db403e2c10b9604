use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

mod bot;
mod handlers;
mod routes;
mod services;
mod state;

use crate::services::generation::ReplicateGateway;
use crate::state::{AppConfig, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Address the HTTP server binds on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    bind_addr: String,

    /// Public base URL of this deployment, used to build provider callback
    /// URLs (e.g. https://panel.example.com)
    #[arg(long, env = "APP_URL")]
    app_url: String,

    /// Replicate API token for the image-generation gateway
    #[arg(long, env = "REPLICATE_API_TOKEN")]
    replicate_token: String,

    /// Shared secret required by the internal admin API
    #[arg(long, env = "ADMIN_TOKEN")]
    admin_token: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut app_url = args.app_url.trim().to_string();
    if app_url.ends_with('/') {
        app_url.pop();
    }

    info!("Connecting to PostgreSQL...");
    let pool = artbox_db::connect(&args.database_url).await?;

    let gateway = Arc::new(ReplicateGateway::new(args.replicate_token));
    let config = AppConfig {
        app_url,
        admin_token: args.admin_token,
    };
    let state = AppState::new(pool, gateway, config);

    let app = routes::router(state);

    let addr: SocketAddr = args.bind_addr.parse()?;
    info!("Artbox panel listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
