use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

const CONFIG_PATH_REL_HOME: &str = ".config/chitterbot/config.toml";

/// Bot configuration
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub general: General,
    pub history: History,
    #[serde(default)]
    pub proxy: Proxy,
    pub records: RecordChannels,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct General {
    pub discord_token: String,
    pub command_prefix: String,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct History {
    pub channel_backfill_message_count: u8,
    pub channel_max_message_count: usize,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct Proxy {
    /// How long to wait for a ghost-post before dispatching the original.
    #[serde(default = "default_proxy_wait_ms")]
    pub wait_ms: u64,
    /// How many recent cached messages to search for a ghost-post's
    /// original.
    #[serde(default = "default_proxy_lookback")]
    pub lookback: usize,
}

impl Default for Proxy {
    fn default() -> Self {
        Self {
            wait_ms: default_proxy_wait_ms(),
            lookback: default_proxy_lookback(),
        }
    }
}

fn default_proxy_wait_ms() -> u64 {
    1000
}

fn default_proxy_lookback() -> usize {
    16
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct RecordChannels {
    /// Backing channel for member timezone records.
    pub timezone_channel: u64,
}

impl Config {
    fn config_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|p| p.join(CONFIG_PATH_REL_HOME))
            .ok_or(anyhow!("Could not find home directory"))
    }

    pub async fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
            anyhow!(
                "Could not open configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).await.map_err(|e| {
            anyhow!(
                "Could not read configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| {
            anyhow!(
                "Could not parse configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_section_is_optional_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [general]
            discord_token = "token"
            command_prefix = ";"

            [history]
            channel_backfill_message_count = 50
            channel_max_message_count = 50

            [records]
            timezone_channel = 1394562583348121620
            "#,
        )
        .unwrap();
        assert_eq!(config.proxy.wait_ms, 1000);
        assert_eq!(config.proxy.lookback, 16);
        assert_eq!(config.records.timezone_channel, 1394562583348121620);
    }
}
