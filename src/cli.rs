use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use crate::config::{self, Config};
use crate::{spotify, store, web};

#[derive(Parser)]
#[command(name = "crossfade", version)]
enum Cli {
    /// Run the web app
    Serve(ServeArgs),
    /// Inspect or edit stored per-track overrides
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(clap::Args)]
struct ServeArgs {
    /// Address to listen on (overrides BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,
    /// Settings database path (overrides DB_PATH)
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[derive(clap::Subcommand)]
enum SettingsCommand {
    /// Print the stored tempo/speed for a track
    Get {
        track_id: String,
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Store tempo/speed for a track; omitted values are stored as null
    Set {
        track_id: String,
        #[arg(long)]
        tempo: Option<f64>,
        #[arg(long)]
        speed: Option<f64>,
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse() {
        Cli::Serve(args) => serve(args).await,
        Cli::Settings(command) => settings(command),
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(db_path) = args.db_path {
        config.db_path = db_path;
    }

    // Create the schema up front so a bad path fails at startup.
    store::open(&config.db_path)?;
    tracing::info!("settings store at {}", config.db_path.display());

    let http = spotify::build_http_client()?;
    let bind_addr = config.bind_addr.clone();
    let app = web::router(web::AppState::new(config, http));

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

fn settings(command: SettingsCommand) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        SettingsCommand::Get { track_id, db_path } => {
            let conn = store::open(&db_path.unwrap_or_else(config::db_path_from_env))?;
            let entry = store::get_track_override(&conn, &track_id)?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        SettingsCommand::Set {
            track_id,
            tempo,
            speed,
            db_path,
        } => {
            let conn = store::open(&db_path.unwrap_or_else(config::db_path_from_env))?;
            store::set_track_override(&conn, &track_id, tempo, speed)?;
            eprintln!("Saved settings for {track_id}");
            let entry = store::get_track_override(&conn, &track_id)?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
    }
    Ok(())
}
