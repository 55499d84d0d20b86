use super::files::resolve_library_path;
use super::LibraryService;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirEntry {
    pub path: String,
    pub name: String,
}

/// One level of the folder browser.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirListing {
    pub current_path: String,
    pub is_root: bool,
    pub parent_path: Option<String>,
    pub subdirs: Vec<DirEntry>,
}

fn list_subdirs(dir: &Path) -> Vec<DirEntry> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to list {:?}: {}", dir, e);
            return Vec::new();
        }
    };

    let mut subdirs: Vec<DirEntry> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                return None;
            }
            Some(DirEntry {
                path: entry.path().to_string_lossy().to_string(),
                name,
            })
        })
        .collect();
    subdirs.sort_by_key(|entry| entry.name.to_lowercase());
    subdirs
}

impl LibraryService {
    /// Lists the folders of `path`, or of the music directory when `path` is
    /// missing or points outside of it.
    pub fn browse_dirs(&self, path: Option<&str>) -> DirListing {
        let root = self.music_dir();
        let current: PathBuf = path
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .and_then(|p| resolve_library_path(&root, p).ok())
            .filter(|p| p.is_dir())
            .unwrap_or_else(|| root.clone());

        let is_root = current == root || !current.starts_with(&root);
        let parent_path = if is_root {
            None
        } else {
            current
                .parent()
                .map(|parent| parent.to_string_lossy().to_string())
        };

        DirListing {
            current_path: current.to_string_lossy().to_string(),
            is_root,
            parent_path,
            subdirs: list_subdirs(&current),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;

    #[tokio::test]
    async fn browse_root_and_subfolders() {
        let env = service_with(vec![]);
        let music = env.music.path();
        for dir in ["beta", "Alpha", ".hidden", "beta/inner"] {
            std::fs::create_dir_all(music.join(dir)).unwrap();
        }
        std::fs::write(music.join("file.mp3"), b"x").unwrap();

        let listing = env.service.browse_dirs(None);
        assert!(listing.is_root);
        assert!(listing.parent_path.is_none());
        let names: Vec<&str> = listing.subdirs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "beta"]);

        let beta = music.join("beta").to_string_lossy().to_string();
        let listing = env.service.browse_dirs(Some(&beta));
        assert!(!listing.is_root);
        assert_eq!(listing.current_path, beta);
        assert_eq!(
            listing.parent_path.as_deref(),
            Some(music.to_string_lossy().as_ref())
        );
        assert_eq!(listing.subdirs.len(), 1);
        assert_eq!(listing.subdirs[0].name, "inner");
    }

    #[tokio::test]
    async fn outside_paths_fall_back_to_root() {
        let env = service_with(vec![]);
        let listing = env.service.browse_dirs(Some("/etc"));
        assert!(listing.is_root);
        assert_eq!(listing.current_path, env.music.path().to_string_lossy());
    }
}
