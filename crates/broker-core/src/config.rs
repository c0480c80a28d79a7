use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BrokerError, Result};

/// Top-level configuration for the broker service.
///
/// Loaded from `~/.broker/config.toml` by default. Each section corresponds
/// to one collaborator of the dialogue core. Secrets are never stored here:
/// sections name the environment variables that hold them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

impl BrokerConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BrokerConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| BrokerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Address the HTTP server binds to.
    pub bind_address: String,
    /// HTTP server port.
    pub port: u16,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Path to the property catalog JSON (with embeddings).
    pub catalog_path: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            catalog_path: "data_with_embeddings.json".to_string(),
        }
    }
}

/// Chat-completion model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    /// Per-call timeout; expiry counts as a failed call.
    pub timeout_secs: u64,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.0,
            timeout_secs: 30,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Query embedding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_base: String,
    pub model: String,
    /// Dimensionality of catalog vectors.
    pub dimensions: usize,
    /// Maximum number of cached query embeddings.
    pub cache_capacity: usize,
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-ada-002".to_string(),
            dimensions: 1536,
            cache_capacity: 1000,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Property search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of ranked results returned per search.
    pub top_k: usize,
    /// Maximum results shown after relaxing a constraint.
    pub relaxed_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            relaxed_limit: 3,
        }
    }
}

/// Where conversation state lives between turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Server-side map keyed by session id.
    #[default]
    InMemory,
    /// State is returned in every reply and echoed back by the client.
    ClientEcho,
}

/// Dialogue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub session_mode: SessionMode,
    /// History turns included in the classification context.
    pub context_turns: usize,
    /// History turns sent along with preference extraction.
    pub extraction_turns: usize,
    /// Maximum accepted message length in characters.
    pub max_message_length: usize,
    /// Chat requests accepted per second across all clients.
    pub rate_limit_per_sec: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            session_mode: SessionMode::InMemory,
            context_turns: 5,
            extraction_turns: 3,
            max_message_length: 2000,
            rate_limit_per_sec: 20,
        }
    }
}

/// Geocoding and points-of-interest settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub nominatim_url: String,
    pub overpass_url: String,
    /// User agent sent to the map services (required by Nominatim).
    pub user_agent: String,
    /// Wall-clock timeout for each map-service request.
    pub timeout_secs: u64,
    /// Search radius for schools and general POIs, in metres.
    pub radius_meters: u32,
    /// Search radius for attractions, in metres.
    pub attraction_radius_meters: u32,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            nominatim_url: "https://nominatim.openstreetmap.org/search".to_string(),
            overpass_url: "http://overpass-api.de/api/interpreter".to_string(),
            user_agent: "ai-broker-app".to_string(),
            timeout_secs: 15,
            radius_meters: 3000,
            attraction_radius_meters: 2000,
        }
    }
}

/// Tour confirmation email settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub sender: String,
    /// Environment variable holding the SMTP password.
    pub password_env: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            sender: String::new(),
            password_env: "EMAIL_PASSWORD".to_string(),
        }
    }
}
