mod file_config;

pub use file_config::FileConfig;

use crate::query::GenreMatch;
use crate::server::{RequestsLoggingLevel, ServerConfig};
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub blob_dir: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub content_cache_age_sec: usize,
    pub api_key: Option<String>,
    pub genre_match: GenreMatch,
    pub max_upload_bytes: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        let server = ServerConfig::default();
        CliConfig {
            db_dir: None,
            blob_dir: None,
            host: server.host,
            port: server.port,
            logging_level: server.requests_logging_level,
            content_cache_age_sec: server.content_cache_age_sec,
            api_key: None,
            genre_match: GenreMatch::default(),
            max_upload_bytes: server.max_upload_bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory of the catalog database, `None` keeps the catalog in memory.
    pub db_dir: Option<PathBuf>,
    pub blob_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub content_cache_age_sec: usize,
    pub api_key: Option<String>,
    pub genre_match: GenreMatch,
    pub max_upload_bytes: u64,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file.db_dir.map(PathBuf::from).or_else(|| cli.db_dir.clone());
        if let Some(db_dir) = &db_dir {
            if !db_dir.exists() {
                bail!("Database directory does not exist: {:?}", db_dir);
            }
            if !db_dir.is_dir() {
                bail!("db_dir is not a directory: {:?}", db_dir);
            }
        }

        let blob_dir = match (
            file.blob_dir.map(PathBuf::from).or_else(|| cli.blob_dir.clone()),
            &db_dir,
        ) {
            (Some(blob_dir), _) => blob_dir,
            (None, Some(db_dir)) => db_dir.join("blobs"),
            (None, None) => {
                bail!("blob_dir must be specified via --blob-dir or in config file when no db_dir is set")
            }
        };

        let host = file.host.unwrap_or_else(|| cli.host.clone());
        let port = file.port.unwrap_or(cli.port);

        let logging_level = match file.logging_level {
            Some(s) => parse_logging_level(&s)
                .ok_or_else(|| anyhow::anyhow!("Invalid logging_level in config file: {:?}", s))?,
            None => cli.logging_level.clone(),
        };

        let content_cache_age_sec = file
            .content_cache_age_sec
            .unwrap_or(cli.content_cache_age_sec);

        let api_key = file.api_key.or_else(|| cli.api_key.clone());
        if api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            bail!("api_key must not be empty");
        }

        let genre_match = match file.genre_match {
            Some(s) => GenreMatch::from_str(&s, true)
                .map_err(|_| anyhow::anyhow!("Invalid genre_match in config file: {:?}", s))?,
            None => cli.genre_match,
        };

        let max_upload_bytes = file.max_upload_bytes.unwrap_or(cli.max_upload_bytes);
        if max_upload_bytes == 0 {
            bail!("max_upload_bytes must be greater than 0");
        }

        Ok(Self {
            db_dir,
            blob_dir,
            host,
            port,
            logging_level,
            content_cache_age_sec,
            api_key,
            genre_match,
            max_upload_bytes,
        })
    }

    pub fn catalog_db_path(&self) -> Option<PathBuf> {
        self.db_dir.as_ref().map(|dir| dir.join("catalog.db"))
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            requests_logging_level: self.logging_level.clone(),
            host: self.host.clone(),
            port: self.port,
            content_cache_age_sec: self.content_cache_age_sec,
            api_key: self.api_key.clone(),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
