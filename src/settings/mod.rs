//! User-editable settings persisted as JSON in the data directory.
//!
//! Settings hold the model credentials, the library locations used by the
//! maintenance jobs and per-job schedules. They are edited through the HTTP API
//! and read by the scheduler on every reschedule.

use crate::ai::AiSettings;
use crate::background_jobs::CronSchedule;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};

pub const DEFAULT_MODEL_NAME: &str = "gemini-1.5-flash";
pub const DEFAULT_MIN_DURATION_SECS: u32 = 60;

pub const TASK_DEDUPE_QUALITY: &str = "dedupe_quality";
pub const TASK_CLEAN_SHORT: &str = "clean_short";
pub const TASK_EXTRACT_META: &str = "extract_meta";
pub const TASK_CLEAN_JUNK: &str = "clean_junk";

/// Schedule and state of a single maintenance job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub enabled: bool,
    pub cron: String,
    pub last_run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_duration: Option<u32>,
}

impl TaskConfig {
    fn disabled(cron: &str) -> Self {
        Self {
            enabled: false,
            cron: cron.to_string(),
            last_run: None,
            min_duration: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub api_key: String,
    pub model_name: String,
    pub proxy_url: String,
    pub music_dir: String,
    pub task_target_path: String,
    pub tasks_config: BTreeMap<String, TaskConfig>,
}

impl Settings {
    pub fn defaults(music_dir: &str) -> Self {
        let mut tasks_config = BTreeMap::new();
        tasks_config.insert(
            TASK_DEDUPE_QUALITY.to_string(),
            TaskConfig::disabled("0 2 * * *"),
        );
        tasks_config.insert(
            TASK_CLEAN_SHORT.to_string(),
            TaskConfig {
                min_duration: Some(DEFAULT_MIN_DURATION_SECS),
                ..TaskConfig::disabled("0 3 * * *")
            },
        );
        tasks_config.insert(
            TASK_EXTRACT_META.to_string(),
            TaskConfig::disabled("0 4 * * *"),
        );
        tasks_config.insert(
            TASK_CLEAN_JUNK.to_string(),
            TaskConfig::disabled("0 5 * * *"),
        );

        Self {
            api_key: String::new(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            proxy_url: String::new(),
            music_dir: music_dir.to_string(),
            task_target_path: music_dir.to_string(),
            tasks_config,
        }
    }

    pub fn ai(&self) -> AiSettings {
        AiSettings {
            api_key: self.api_key.clone(),
            model_name: self.model_name.clone(),
            proxy_url: self.proxy_url.clone(),
        }
    }

    pub fn has_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Directory the maintenance jobs work on: the task target when it exists,
    /// otherwise the music directory.
    pub fn job_target_dir(&self) -> PathBuf {
        let target = PathBuf::from(&self.task_target_path);
        if !self.task_target_path.is_empty() && target.is_dir() {
            target
        } else {
            PathBuf::from(&self.music_dir)
        }
    }

    pub fn min_duration(&self) -> u32 {
        self.tasks_config
            .get(TASK_CLEAN_SHORT)
            .and_then(|t| t.min_duration)
            .unwrap_or(DEFAULT_MIN_DURATION_SECS)
    }

    /// API key with everything but the last four characters hidden.
    pub fn masked_api_key(&self) -> String {
        mask_secret(&self.api_key)
    }

    pub fn validate(&self) -> Result<()> {
        for (task_id, task) in &self.tasks_config {
            CronSchedule::parse(&task.cron)
                .with_context(|| format!("Invalid schedule for task {}", task_id))?;
        }
        Ok(())
    }

    /// Merges a saved file on top of the defaults. Unknown tasks are ignored.
    fn merge(&mut self, stored: StoredSettings) {
        fn trimmed(value: Option<String>) -> Option<String> {
            value.map(|v| v.trim().to_string())
        }

        if let Some(api_key) = trimmed(stored.api_key) {
            self.api_key = api_key;
        }
        if let Some(model_name) = trimmed(stored.model_name).filter(|m| !m.is_empty()) {
            self.model_name = model_name;
        }
        if let Some(proxy_url) = trimmed(stored.proxy_url) {
            self.proxy_url = proxy_url;
        }
        if let Some(music_dir) = trimmed(stored.music_dir).filter(|m| !m.is_empty()) {
            self.music_dir = music_dir;
        }
        self.task_target_path = trimmed(stored.task_target_path)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.music_dir.clone());

        for (task_id, saved) in stored.tasks_config {
            let Some(task) = self.tasks_config.get_mut(&task_id) else {
                warn!("Ignoring unknown task '{}' in settings", task_id);
                continue;
            };
            if let Some(enabled) = saved.enabled {
                task.enabled = enabled;
            }
            if let Some(cron) = saved.cron {
                task.cron = cron.trim().to_string();
            }
            if saved.last_run.is_some() {
                task.last_run = saved.last_run;
            }
            if saved.min_duration.is_some() {
                task.min_duration = saved.min_duration;
            }
        }
    }
}

pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

/// Shape of the settings file on disk; every field is optional so that files
/// written by older versions still load.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoredSettings {
    api_key: Option<String>,
    model_name: Option<String>,
    proxy_url: Option<String>,
    music_dir: Option<String>,
    task_target_path: Option<String>,
    tasks_config: HashMap<String, StoredTaskConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoredTaskConfig {
    enabled: Option<bool>,
    cron: Option<String>,
    last_run: Option<String>,
    min_duration: Option<u32>,
}

/// Thread-safe owner of the settings file.
pub struct SettingsStore {
    path: PathBuf,
    settings: RwLock<Settings>,
}

impl SettingsStore {
    /// Loads the settings at `path`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load(path: impl Into<PathBuf>, default_music_dir: &str) -> Self {
        let path = path.into();
        let mut settings = Settings::defaults(default_music_dir);

        if path.exists() {
            match Self::read_file(&path) {
                Ok(stored) => {
                    settings.merge(stored);
                    info!("Loaded settings from {:?}", path);
                }
                Err(e) => warn!("Failed to load settings from {:?}, using defaults: {:#}", path, e),
            }
        }

        Self {
            path,
            settings: RwLock::new(settings),
        }
    }

    fn read_file(path: &Path) -> Result<StoredSettings> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {:?}", path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Settings {
        match self.settings.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Applies `change` to a copy of the settings, validates and persists it.
    /// The in-memory settings are only replaced when the save succeeds.
    pub fn update<F>(&self, change: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self
            .settings
            .write()
            .map_err(|_| anyhow::anyhow!("Settings lock poisoned"))?;
        let mut updated = guard.clone();
        change(&mut updated);
        updated.validate()?;
        Self::write_file(&self.path, &updated)?;
        *guard = updated.clone();
        Ok(updated)
    }

    pub fn save(&self) -> Result<()> {
        let settings = self.get();
        Self::write_file(&self.path, &settings)
    }

    fn write_file(path: &Path, settings: &Settings) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory {:?}", parent))?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write settings file: {:?}", path))
    }

    pub fn set_last_run(&self, task_id: &str, when: &str) -> Result<()> {
        self.update(|settings| {
            if let Some(task) = settings.tasks_config.get_mut(task_id) {
                task.last_run = Some(when.to_string());
            }
        })
        .map(|_| ())
    }
}
