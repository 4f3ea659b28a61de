mod cli;
mod config;
mod oauth;
mod session;
mod spotify;
mod store;
mod suggest;
mod web;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("crossfade=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();
    cli::main().await
}
