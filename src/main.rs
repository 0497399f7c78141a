use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use assemble_server::config::Config;
use assemble_server::server::{ServerConfig, start_server};

#[derive(Parser)]
#[command(name = "assemble-server")]
#[command(version, about = "Turn notebook code cells into GitHub pull requests")]
struct Cli {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 3131)]
    port: u16,

    /// Directory the notebook frontend serves from; used for project
    /// detection when no explicit project config is given.
    #[arg(long)]
    notebook_dir: Option<PathBuf>,

    /// Path to the project descriptor (file or directory).
    #[arg(long)]
    project_config: Option<PathBuf>,

    /// Dry-run mode: never fork, push, or open real pull requests.
    #[arg(long)]
    debug: bool,

    /// OAuth gateway base URL.
    #[arg(long)]
    gateway_url: Option<String>,

    /// Token polling ceiling in seconds.
    #[arg(long)]
    poll_timeout: Option<u64>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "assemble_server=debug,info"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = Config::from_env();
    if cli.debug {
        config.debug = true;
    }
    if let Some(path) = &cli.project_config {
        config.set_project_config_path(&path.to_string_lossy());
    }
    if let Some(url) = cli.gateway_url {
        config.oauth_gateway_url = url;
    }
    if let Some(timeout) = cli.poll_timeout {
        config.access_token_poll_timeout = timeout;
    }

    let server = ServerConfig {
        host: cli.host,
        port: cli.port,
        notebook_dir: cli.notebook_dir,
    };
    start_server(server, config).await
}
