use super::RequestsLoggingLevel;

/// Default cap for one uploaded file, 512 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub host: String,
    pub port: u16,
    /// `max-age` of the `Cache-Control` header on file downloads, 0 disables it.
    pub content_cache_age_sec: usize,
    /// When set, every mutating route requires this key.
    pub api_key: Option<String>,
    pub max_upload_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            host: "127.0.0.1".to_string(),
            port: 3001,
            content_cache_age_sec: 3600,
            api_key: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}
