use crate::library::MetadataStore;
use crate::service::ActivityLog;
use crate::settings::SettingsStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    pub settings: Arc<SettingsStore>,

    /// Rows of deleted or rewritten files are kept in sync here.
    pub store: Arc<dyn MetadataStore>,

    pub activity_log: Arc<ActivityLog>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        settings: Arc<SettingsStore>,
        store: Arc<dyn MetadataStore>,
        activity_log: Arc<ActivityLog>,
    ) -> Self {
        Self {
            cancellation_token,
            settings,
            store,
            activity_log,
        }
    }

    /// Same resources, different cancellation token.
    pub fn with_token(&self, cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            ..self.clone()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Directory the job should work on, as currently configured.
    pub fn target_dir(&self) -> PathBuf {
        self.settings.get().job_target_dir()
    }

    /// Removes the store row of a deleted file, logging failures.
    pub fn forget_file(&self, path: &std::path::Path) {
        let path = path.to_string_lossy();
        if let Err(e) = self.store.delete_by_path(&path) {
            tracing::warn!("Failed to remove {} from the metadata store: {:#}", path, e);
        }
    }
}
