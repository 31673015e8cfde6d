use std::path::PathBuf;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::vulkan::window_settings::PresentMode;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub window_width: u32,
    pub window_height: u32,
    pub present_mode: PresentMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_width: 1280,
            window_height: 720,
            present_mode: PresentMode::Fifo,
        }
    }
}

pub struct ConfigFileLoader {
    pub path: PathBuf,
    config: Option<Config>,
}

impl ConfigFileLoader {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.into(),
            config: None,
        }
    }

    /// Loads the config file, falling back to (and writing back) defaults
    /// when it is missing or unparsable.
    pub fn load_config(&mut self) -> &Config {
        let config = match self.try_load() {
            Ok(config) => config,
            Err(e) => {
                log::warn!(
                    "Could not load config from {:?} ({:#}), using defaults",
                    self.path,
                    e
                );
                let config = Config::default();
                self.config = Some(config.clone());
                self.save_config();
                config
            }
        };
        self.config = Some(config);
        self.config.as_ref().unwrap()
    }

    fn try_load(&self) -> anyhow::Result<Config> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {:?}", self.path))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {:?}", self.path))
    }

    pub fn save_config(&self) {
        if let Some(config) = &self.config {
            let result = serde_json::to_string_pretty(config)
                .map_err(anyhow::Error::from)
                .and_then(|content| {
                    std::fs::write(&self.path, content).map_err(anyhow::Error::from)
                });
            if let Err(e) = result {
                log::warn!("Could not save config to {:?}: {:#}", self.path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.window_width, config.window_width);
        assert_eq!(parsed.present_mode, config.present_mode);
    }
}
