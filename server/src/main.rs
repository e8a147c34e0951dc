use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use clap::Parser;
use server::{build_app, AppSettings};
use storefront_core::search::AlgoliaClient;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Host to bind
    #[arg(long, env = "STOREFRONT_HOST", default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, env = "STOREFRONT_PORT", default_value_t = 8080)]
    port: u16,
    /// Search application id
    #[arg(long, env = "ALGOLIA_APP_ID", default_value = "latency")]
    app_id: String,
    /// Search-only API key
    #[arg(long, env = "ALGOLIA_API_KEY", default_value = "6be0576ff61c053d5f9a3225e2a90f76")]
    api_key: String,
    /// Primary index; price replicas are `<index>_price_asc` and `<index>_price_desc`
    #[arg(long, env = "ALGOLIA_INDEX_NAME", default_value = storefront_core::MAIN_INDEX)]
    index_name: String,
    /// Host for canonical URLs when a request has no `host` header
    #[arg(long, env = "STOREFRONT_FALLBACK_HOST", default_value = storefront_core::canonical::DEFAULT_HOST)]
    fallback_host: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let client = AlgoliaClient::new(&args.app_id, &args.api_key)?;
    let settings = AppSettings { index_name: args.index_name, fallback_host: args.fallback_host };
    let app: Router = build_app(settings, Arc::new(client))?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, app_id = %args.app_id, "storefront listening");
    axum::serve(listener, app).await?;
    Ok(())
}
