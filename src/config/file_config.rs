use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub data_dir: Option<String>,
    pub music_dir: Option<String>,
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub workers: Option<usize>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,

    pub library: Option<LibraryConfig>,
    pub ai: Option<AiConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct LibraryConfig {
    pub scan_batch_size: Option<usize>,
    pub fuzzy_threshold: Option<u8>,
    pub ai_batch_size: Option<usize>,
    pub ai_batch_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AiConfig {
    pub gemini_base_url: Option<String>,
    pub request_timeout_sec: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
