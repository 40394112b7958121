use resumer_session::ResumerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Contents of `resumer.toml`. Every section may be omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub resumer: ResumerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub api_keys: Vec<String>,
}

/// Settings for the built-in echo generator behind the chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_token_delay_ms")]
    pub token_delay_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            token_delay_ms: default_token_delay_ms(),
        }
    }
}

impl GeneratorConfig {
    pub fn token_delay(&self) -> Duration {
        Duration::from_millis(self.token_delay_ms)
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_token_delay_ms() -> u64 {
    40
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            resumer: ResumerConfig::default(),
            security: SecurityConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads and validates the config at `path`. A missing file yields the
    /// defaults, with `false` returned alongside so the caller can say so.
    pub async fn load(path: &Path) -> anyhow::Result<(Self, bool)> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((Self::default(), false));
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to read config file '{}': {e}",
                    path.display()
                ))
            }
        };
        let config = Self::parse(&text)?;
        Ok((config, true))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        config.resumer.validate()?;
        Ok(config)
    }

    /// Copy safe to print: API keys are masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for key in &mut copy.security.api_keys {
            *key = "***".to_string();
        }
        copy
    }
}
