mod file_config;

pub use file_config::{AiConfig, FileConfig, LibraryConfig};

use crate::ai::DEFAULT_GEMINI_BASE_URL;
use crate::dedupe::DEFAULT_FUZZY_THRESHOLD;
use crate::server::RequestsLoggingLevel;
use crate::service::ServiceOptions;
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub music_dir: Option<PathBuf>,
    pub port: u16,
    pub bind: String,
    pub workers: usize,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub music_dir: PathBuf,
    pub port: u16,
    pub bind: String,
    pub workers: usize,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,

    pub library: LibrarySettings,
    pub ai: AiClientSettings,
}

#[derive(Debug, Clone)]
pub struct LibrarySettings {
    pub scan_batch_size: usize,
    pub fuzzy_threshold: u8,
    pub ai_batch_size: usize,
    pub ai_batch_delay: Duration,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            scan_batch_size: 100,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            ai_batch_size: 3,
            ai_batch_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiClientSettings {
    pub gemini_base_url: String,
    pub request_timeout: Duration,
}

impl Default for AiClientSettings {
    fn default() -> Self {
        Self {
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .or_else(|| cli.data_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("data_dir must be specified via --data-dir or in config file")
            })?;

        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir)
                .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;
        }
        if !data_dir.is_dir() {
            bail!("data_dir is not a directory: {:?}", data_dir);
        }

        let music_dir = file
            .music_dir
            .map(PathBuf::from)
            .or_else(|| cli.music_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("music_dir must be specified via --music-dir or in config file")
            })?;

        let port = file.port.unwrap_or(cli.port);
        let bind = file.bind.unwrap_or_else(|| cli.bind.clone());
        let workers = file.workers.unwrap_or(cli.workers);
        if workers == 0 {
            bail!("workers must be at least 1");
        }

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let library_file = file.library.unwrap_or_default();
        let defaults = LibrarySettings::default();
        let library = LibrarySettings {
            scan_batch_size: library_file
                .scan_batch_size
                .unwrap_or(defaults.scan_batch_size)
                .max(1),
            fuzzy_threshold: library_file
                .fuzzy_threshold
                .unwrap_or(defaults.fuzzy_threshold)
                .min(100),
            ai_batch_size: library_file
                .ai_batch_size
                .unwrap_or(defaults.ai_batch_size)
                .max(1),
            ai_batch_delay: library_file
                .ai_batch_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.ai_batch_delay),
        };

        let ai_file = file.ai.unwrap_or_default();
        let ai_defaults = AiClientSettings::default();
        let ai = AiClientSettings {
            gemini_base_url: ai_file
                .gemini_base_url
                .unwrap_or(ai_defaults.gemini_base_url),
            request_timeout: ai_file
                .request_timeout_sec
                .map(Duration::from_secs)
                .unwrap_or(ai_defaults.request_timeout),
        };

        Ok(Self {
            data_dir,
            music_dir,
            port,
            bind,
            workers,
            logging_level,
            frontend_dir_path,
            library,
            ai,
        })
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn metadata_db_path(&self) -> PathBuf {
        self.data_dir.join("metadata.db")
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            scan_batch_size: self.library.scan_batch_size,
            fuzzy_threshold: self.library.fuzzy_threshold,
            ai_batch_size: self.library.ai_batch_size,
            ai_batch_delay: self.library.ai_batch_delay,
            ai_timeout: self.ai.request_timeout,
        }
    }
}

fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
