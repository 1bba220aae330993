use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use movie_catalog_server::config::{AppConfig, CliConfig, FileConfig};
use movie_catalog_server::query::GenreMatch;
use movie_catalog_server::server::config::DEFAULT_MAX_UPLOAD_BYTES;
use movie_catalog_server::{build_services, run_server, RequestsLoggingLevel};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };

    if original_path.is_absolute() {
        return Ok(original_path);
    }

    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(version, about = "Movie catalog server")]
struct CliArgs {
    /// Path to a TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the catalog database. Without it the catalog lives in memory.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Directory for uploaded files, defaults to <db-dir>/blobs.
    #[clap(long, value_parser = parse_path)]
    pub blob_dir: Option<PathBuf>,

    /// The address to bind.
    #[clap(long, default_value = "127.0.0.1")]
    pub host: String,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// The maximum age of downloaded files in the cache in seconds.
    #[clap(long, default_value_t = 3600)]
    pub content_cache_age_sec: usize,

    /// Key required by every mutating request. Without it writes are open.
    #[clap(long, env = "CATALOG_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// How genre filters compare genre names.
    #[clap(long, value_enum, default_value_t = GenreMatch::Exact)]
    pub genre_match: GenreMatch,

    /// Largest accepted upload in bytes.
    #[clap(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: u64,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            blob_dir: self.blob_dir.clone(),
            host: self.host.clone(),
            port: self.port,
            logging_level: self.logging_level.clone(),
            content_cache_age_sec: self.content_cache_age_sec,
            api_key: self.api_key.clone(),
            genre_match: self.genre_match,
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;
    info!(
        "Starting movie catalog server {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );
    if config.api_key.is_none() {
        info!("No API key configured, mutating routes are open");
    }

    let services = build_services(&config).await?;
    run_server(config.server_config(), services).await
}
