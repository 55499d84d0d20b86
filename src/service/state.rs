use crate::library::TrackMetadata;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryStatus {
    #[default]
    Idle,
    Scanning,
    Analyzing,
    Done,
    Error,
}

impl LibraryStatus {
    /// Whether a new scan may start from this status.
    pub fn can_scan(&self) -> bool {
        matches!(
            self,
            LibraryStatus::Idle | LibraryStatus::Done | LibraryStatus::Error
        )
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, LibraryStatus::Scanning | LibraryStatus::Analyzing)
    }
}

/// A candidate group confirmed as duplicates by the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub files: Vec<TrackMetadata>,
    pub reason: String,
    /// Path of the copy worth keeping, when the model suggested one.
    pub recommended_keep: Option<String>,
}

#[derive(Debug, Default)]
pub struct LibraryState {
    pub status: LibraryStatus,
    pub progress: usize,
    pub total: usize,
    pub message: String,
    pub files: Vec<TrackMetadata>,
    pub candidates: Vec<Vec<TrackMetadata>>,
    pub results: Vec<DuplicateGroup>,
}

impl LibraryState {
    pub fn set_progress(&mut self, progress: usize, total: usize, message: impl Into<String>) {
        self.progress = progress;
        self.total = total;
        self.message = message.into();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = LibraryStatus::Error;
        self.message = message.into();
    }

    /// Drops every in-memory reference to `path`.
    pub fn forget_path(&mut self, path: &str) {
        self.files.retain(|f| f.path != path);
        for group in &mut self.results {
            group.files.retain(|f| f.path != path);
        }
        for group in &mut self.candidates {
            group.retain(|f| f.path != path);
        }
    }

    /// Replaces the in-memory entry for `old_path` with `meta`.
    pub fn replace_track(&mut self, old_path: &str, meta: &TrackMetadata) {
        let replace = |track: &mut TrackMetadata| {
            if track.path == old_path {
                *track = meta.clone();
            }
        };
        self.files.iter_mut().for_each(replace);
        self.candidates
            .iter_mut()
            .flat_map(|g| g.iter_mut())
            .for_each(replace);
        self.results
            .iter_mut()
            .flat_map(|g| g.files.iter_mut())
            .for_each(replace);
    }
}

/// What `/api/status` reports.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub status: LibraryStatus,
    pub progress: usize,
    pub total: usize,
    pub message: String,
    pub candidates_count: usize,
    pub results_count: usize,
    pub files_count: usize,
    pub has_key: bool,
}
