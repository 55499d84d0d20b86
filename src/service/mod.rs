//! The library service: in-memory scan results, the scan and analysis
//! pipelines and every user operation on files.
//!
//! `LibraryService` is cheap to clone; clones share the same state.

mod activity_log;
mod analyze;
mod dirs;
mod error;
mod files;
mod report;
mod scan;
mod state;

pub use activity_log::{ActivityLog, ACTIVITY_LOG_CAPACITY};
pub use analyze::confirmed_group;
pub use dirs::{DirEntry, DirListing};
pub use error::ServiceError;
pub use files::{parse_pattern, resolve_library_path, DeleteOutcome, RenamePattern};
pub use report::render_report;
pub use state::{DuplicateGroup, LibraryState, LibraryStatus, StatusSnapshot};

use crate::ai::ProviderFactory;
use crate::dedupe::DEFAULT_FUZZY_THRESHOLD;
use crate::library::{MetadataStore, TrackMetadata};
use crate::settings::SettingsStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::error;

/// Tunables of the scan and analysis pipelines.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Files read before each store write and progress update.
    pub scan_batch_size: usize,
    pub fuzzy_threshold: u8,
    /// Candidate groups sent to the model per request.
    pub ai_batch_size: usize,
    pub ai_batch_delay: Duration,
    pub ai_timeout: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            scan_batch_size: 100,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            ai_batch_size: 3,
            ai_batch_delay: Duration::from_secs(1),
            ai_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryPage {
    pub total: usize,
    pub items: Vec<TrackMetadata>,
}

#[derive(Clone)]
pub struct LibraryService {
    options: ServiceOptions,
    store: Arc<dyn MetadataStore>,
    settings: Arc<SettingsStore>,
    providers: Arc<dyn ProviderFactory>,
    state: Arc<Mutex<LibraryState>>,
    activity_log: Arc<ActivityLog>,
}

impl LibraryService {
    pub fn new(
        options: ServiceOptions,
        store: Arc<dyn MetadataStore>,
        settings: Arc<SettingsStore>,
        providers: Arc<dyn ProviderFactory>,
        activity_log: Arc<ActivityLog>,
    ) -> Self {
        Self {
            options,
            store,
            settings,
            providers,
            state: Arc::new(Mutex::new(LibraryState::default())),
            activity_log,
        }
    }

    fn state(&self) -> MutexGuard<'_, LibraryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Puts the library in the error state when the run behind `handle`
    /// dies without reporting, so that later scans are not refused as busy.
    fn supervise(&self, label: &'static str, handle: JoinHandle<()>) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = handle.await {
                error!("{} task aborted: {}", label, e);
                service
                    .activity_log
                    .add(format!("{} failed: task aborted", label));
                service
                    .state()
                    .fail(format!("{} failed unexpectedly", label));
            }
        });
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    pub fn activity_log(&self) -> &Arc<ActivityLog> {
        &self.activity_log
    }

    fn music_dir(&self) -> PathBuf {
        PathBuf::from(self.settings.get().music_dir)
    }

    pub fn status(&self) -> StatusSnapshot {
        let has_key = self.settings.get().has_key();
        let state = self.state();
        StatusSnapshot {
            status: state.status,
            progress: state.progress,
            total: state.total,
            message: state.message.clone(),
            candidates_count: state.candidates.len(),
            results_count: state.results.len(),
            files_count: state.files.len(),
            has_key,
        }
    }

    pub fn candidates(&self) -> Vec<Vec<TrackMetadata>> {
        self.state().candidates.clone()
    }

    pub fn results(&self) -> Vec<DuplicateGroup> {
        self.state().results.clone()
    }

    pub fn library_page(&self, limit: usize, offset: usize) -> anyhow::Result<LibraryPage> {
        Ok(LibraryPage {
            total: self.store.count()?,
            items: self.store.get_all(Some(limit), offset)?,
        })
    }

    pub fn search_library(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> anyhow::Result<Vec<TrackMetadata>> {
        self.store.search(query, limit, offset)
    }

    pub fn optimize_store(&self) -> anyhow::Result<()> {
        self.store.optimize()?;
        self.activity_log.add("Metadata database optimized");
        Ok(())
    }

    /// Models usable with the current key; empty without a key.
    pub async fn list_models(&self) -> Result<Vec<String>, ServiceError> {
        let settings = self.settings.get();
        if !settings.has_key() {
            return Ok(Vec::new());
        }
        let provider = self.providers.create(&settings.ai())?;
        Ok(provider.list_models().await?)
    }

    pub fn duplicate_report_html(&self) -> String {
        render_report(&self.state().results)
    }
}
