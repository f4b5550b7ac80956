//! digitserve configuration: built-in defaults, then an optional TOML file,
//! then `DIGITSERVE__*` environment variables

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Config file read when none is given on the command line
pub const DEFAULT_CONFIG_FILE: &str = "digitserve.toml";

/// The TorchScript export of the digit classifier
pub const DEFAULT_MODEL_PATH: &str = "digit_classifier.pt";

pub const DEFAULT_PORT: u16 = 8000;

/// Canvas data URLs are well over actix's 32 KiB default
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4 * 1024 * 1024;

/// Default `tracing` filter, overridden by `RUST_LOG`
pub const DEFAULT_LOG_FILTER: &str = "info";

const ENV_PREFIX: &str = "DIGITSERVE";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub model: ModelSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,

    /// Number of HTTP workers; actix picks one per core when unset
    pub workers: Option<usize>,

    /// Largest JSON body accepted by `/predict`
    pub max_payload_bytes: usize,

    /// Origins allowed by CORS
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub filter: String,
}

impl Settings {
    /// Load settings, layering `file` (if it exists) and the environment on
    /// top of the defaults
    pub fn load(file: &str) -> Result<Self> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", i64::from(DEFAULT_PORT))?
            .set_default("server.max_payload_bytes", DEFAULT_MAX_PAYLOAD_BYTES as i64)?
            .set_default(
                "server.allowed_origins",
                vec!["http://localhost:3000", "http://127.0.0.1:3000"],
            )?
            .set_default("model.path", DEFAULT_MODEL_PATH)?
            .set_default("log.filter", DEFAULT_LOG_FILTER)?
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.allowed_origins")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read configuration from {file}"))?
            .try_deserialize()
            .context("invalid configuration")
    }

    /// The socket address to bind, as `host:port`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
