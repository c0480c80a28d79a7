//! CLI argument definitions for the broker binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Broker - a conversational real-estate assistant served over HTTP.
#[derive(Parser, Debug)]
#[command(name = "broker", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Property catalog JSON (with precomputed embeddings).
    #[arg(long = "catalog")]
    pub catalog: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Priority: --config flag > BROKER_CONFIG env var > ~/.broker/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("BROKER_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Priority: --port flag > BROKER_PORT env var > config file value > 8000.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Some(p) = env_parse::<u16>("BROKER_PORT") {
            return p;
        }
        if config_port != 0 {
            return config_port;
        }
        8000
    }

    /// Priority: --catalog flag > BROKER_CATALOG env var > config file value.
    pub fn resolve_catalog_path(&self, config_path: &str) -> PathBuf {
        if let Some(ref p) = self.catalog {
            return p.clone();
        }
        if let Ok(p) = std::env::var("BROKER_CATALOG") {
            return PathBuf::from(p);
        }
        PathBuf::from(config_path)
    }

    /// Priority: --log-level flag > BROKER_LOG_LEVEL env var > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .or_else(|| std::env::var("BROKER_LOG_LEVEL").ok())
            .unwrap_or_else(|| config_level.to_string())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".broker").join("config.toml");
    }
    PathBuf::from("config.toml")
}
