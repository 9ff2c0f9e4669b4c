use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use iiif_server::{config, logger, server};

#[derive(Parser)]
#[command(name = "iiif-server")]
#[command(about = "IIIF Image API 2.1 and 3.0 server")]
#[command(version)]
struct Cli {
    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding `server.bind`
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logger::init();

    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
        config.validate()?;
    }

    let bind = config.server.bind.clone();
    let app = server::router(server::AppState::new(config)?);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(%bind, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
