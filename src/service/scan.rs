use super::files::resolve_library_path;
use super::state::LibraryStatus;
use super::{LibraryService, ServiceError};
use crate::dedupe::{group_tracks, GroupingStrategy};
use crate::library::{read_track_metadata, scan_audio_files, TrackMetadata};
use crate::server::metrics;
use anyhow::{bail, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Grouping progress is published every this many items.
const GROUPING_PROGRESS_STEP: usize = 100;

impl LibraryService {
    /// Starts indexing `target` (a folder inside the library) or the whole
    /// library, then groups likely duplicates.
    pub fn start_scan(
        &self,
        target: Option<&str>,
        strategy: GroupingStrategy,
    ) -> Result<(), ServiceError> {
        let music_dir = self.music_dir();
        let target = target.map(str::trim).filter(|t| !t.is_empty());
        let (scan_root, partial) = match target {
            Some(target) => {
                let root = resolve_library_path(&music_dir, target)?;
                let partial = root != music_dir;
                (root, partial)
            }
            None => (music_dir, false),
        };

        {
            let mut state = self.state();
            if !state.status.can_scan() {
                return Err(ServiceError::Busy);
            }
            state.status = LibraryStatus::Scanning;
            state.set_progress(0, 0, format!("Scanning {}", scan_root.display()));
        }

        let service = self.clone();
        let handle = tokio::task::spawn_blocking(move || {
            if let Err(e) = service.run_scan(&scan_root, partial, strategy) {
                error!("Scan of {:?} failed: {:#}", scan_root, e);
                service.activity_log.add(format!("Scan failed: {:#}", e));
                service.state().fail(format!("Scan failed: {:#}", e));
            }
        });
        self.supervise("Scan", handle);
        Ok(())
    }

    fn run_scan(&self, root: &Path, partial: bool, strategy: GroupingStrategy) -> Result<()> {
        if !root.is_dir() {
            bail!("Directory not found: {}", root.display());
        }

        {
            let mut state = self.state();
            if partial {
                state.files.retain(|f| !Path::new(&f.path).starts_with(root));
            } else {
                state.files.clear();
            }
            state.candidates.clear();
            state.results.clear();
        }
        if partial {
            let removed = self.store.delete_under(&root.to_string_lossy())?;
            info!("Dropped {} stored tracks under {:?}", removed, root);
        } else {
            self.store.clear_all()?;
        }

        self.activity_log
            .add(format!("Scan started: {}", root.display()));

        let batch_size = self.options.scan_batch_size.max(1);
        let mut pending: Vec<PathBuf> = Vec::with_capacity(batch_size);
        let mut scanned = 0;
        for path in scan_audio_files(root) {
            pending.push(path);
            if pending.len() >= batch_size {
                scanned += self.read_and_flush(&mut pending);
            }
        }
        scanned += self.read_and_flush(&mut pending);
        metrics::record_files_scanned(scanned);

        let files = self.state().files.clone();
        let total = files.len();
        self.state()
            .set_progress(0, total, "Grouping candidates...");

        let candidates = group_tracks(
            files,
            strategy,
            self.options.fuzzy_threshold,
            |done, total| {
                if done % GROUPING_PROGRESS_STEP == 0 || done == total {
                    self.state().set_progress(
                        done,
                        total,
                        format!("Grouping candidates {}/{}", done, total),
                    );
                }
            },
        );
        metrics::record_duplicate_groups("candidate", candidates.len());
        if let Ok(count) = self.store.count() {
            metrics::set_library_size(count);
        }

        let message = format!(
            "Scan complete: {} candidate groups from {} files",
            candidates.len(),
            total
        );
        {
            let mut state = self.state();
            state.candidates = candidates;
            state.status = LibraryStatus::Idle;
            state.set_progress(total, total, message.clone());
        }
        self.activity_log.add(message);
        Ok(())
    }

    /// Reads tags of the pending paths in parallel, keeping walk order.
    fn read_and_flush(&self, pending: &mut Vec<PathBuf>) -> usize {
        let mut batch: Vec<TrackMetadata> = pending
            .par_iter()
            .map(|path| read_track_metadata(path))
            .collect();
        pending.clear();
        self.flush_batch(&mut batch)
    }

    /// Persists and publishes a batch of scanned tracks. Returns the batch size.
    fn flush_batch(&self, batch: &mut Vec<TrackMetadata>) -> usize {
        if batch.is_empty() {
            return 0;
        }
        if let Err(e) = self.store.save_batch(batch) {
            error!("Failed to store {} scanned tracks: {:#}", batch.len(), e);
        }
        let count = batch.len();
        let mut state = self.state();
        state.files.append(batch);
        let scanned = state.files.len();
        state.set_progress(scanned, scanned, format!("Scanned {} files", scanned));
        count
    }
}
