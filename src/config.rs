use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;
use tracing::warn;

use crate::cli::OutputFormat;

#[derive(Debug, Deserialize, Default, PartialEq)]
pub struct Config {
    pub pricing_file: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub breakdown: Option<bool>,
}

pub fn load_config() -> Config {
    let Some(dirs) = ProjectDirs::from("", "", "tkb") else {
        return Config::default();
    };

    let path = dirs.config_dir().join("config.toml");
    let Ok(data) = fs::read_to_string(&path) else {
        return Config::default();
    };

    parse_config(&data).unwrap_or_else(|e| {
        warn!("invalid config at {}: {}", path.display(), e);
        Config::default()
    })
}

fn parse_config(data: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(data)
}
