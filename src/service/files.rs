//! Operations on the audio files themselves: deletion, tag edits and renames.

use super::{LibraryService, ServiceError};
use crate::ai::{metadata_fix_prompt, parse_metadata_suggestion, CompletionOptions, MetadataSuggestion};
use crate::library::{read_track_metadata, write_tags, TagUpdate, TrackMetadata};
use crate::server::metrics;
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, warn};

const FORBIDDEN_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Lexically normalises `candidate` and checks that it lies inside `root`.
/// Relative paths and `..` components are rejected.
pub fn resolve_library_path(root: &Path, candidate: &str) -> Result<PathBuf, ServiceError> {
    let outside = || ServiceError::OutsideLibrary(candidate.to_string());

    let normalize = |path: &Path| -> Option<PathBuf> {
        let mut normalized = PathBuf::new();
        for component in path.components() {
            match component {
                Component::ParentDir => return None,
                Component::CurDir => {}
                other => normalized.push(other),
            }
        }
        Some(normalized)
    };

    let path = Path::new(candidate);
    if !path.is_absolute() {
        return Err(outside());
    }
    let path = normalize(path).ok_or_else(outside)?;
    let root = normalize(root).ok_or_else(outside)?;
    if path.starts_with(&root) {
        Ok(path)
    } else {
        Err(outside())
    }
}

fn is_same_dir(a: &Path, b: &Path) -> bool {
    let plain = |p: &Path| -> PathBuf {
        p.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    };
    plain(a) == plain(b)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeleteOutcome {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Artist,
    Title,
    Album,
    AlbumArtist,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A parsed rename pattern such as `{artist} - {title}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePattern {
    segments: Vec<Segment>,
}

/// Parses a rename pattern. `{{` and `}}` stand for literal braces.
pub fn parse_pattern(pattern: &str) -> Result<RenamePattern, String> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => return Err(format!("Unclosed placeholder '{{{}'", name)),
                    }
                }
                let field = match name.as_str() {
                    "artist" => Field::Artist,
                    "title" => Field::Title,
                    "album" => Field::Album,
                    "album_artist" => Field::AlbumArtist,
                    other => return Err(format!("Unknown placeholder '{{{}}}'", other)),
                };
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(field));
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '}' => return Err("Single '}' in pattern".to_string()),
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(RenamePattern { segments })
}

/// Multi-value separators become " & " so they can't act as path separators.
fn clean_tag_value(value: &str) -> String {
    value
        .replace(" / ", " & ")
        .replace('/', " & ")
        .replace(';', " & ")
}

fn or_default(value: &str, default: &str) -> String {
    let cleaned = clean_tag_value(value);
    if cleaned.trim().is_empty() {
        default.to_string()
    } else {
        cleaned
    }
}

impl RenamePattern {
    /// File name (without extension) for `meta`, or `None` when nothing usable remains.
    pub fn render(&self, meta: &TrackMetadata) -> Option<String> {
        let stem = Path::new(&meta.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| meta.filename.clone());

        let mut name = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => name.push_str(text),
                Segment::Field(Field::Artist) => {
                    name.push_str(&or_default(&meta.artist, "Unknown Artist"))
                }
                Segment::Field(Field::Title) => name.push_str(&or_default(&meta.title, &stem)),
                Segment::Field(Field::Album) => {
                    name.push_str(&or_default(&meta.album, "Unknown Album"))
                }
                Segment::Field(Field::AlbumArtist) => {
                    name.push_str(&or_default(&meta.album_artist, "Unknown Artist"))
                }
            }
        }

        let name: String = name
            .chars()
            .filter(|c| !FORBIDDEN_FILENAME_CHARS.contains(c))
            .collect();
        let name = name.trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }
}

/// First free path for `base` + `extension` in `dir`, adding " (n)" on collisions.
/// `current` is considered free.
fn available_path(dir: &Path, base: &str, extension: &str, current: &Path) -> PathBuf {
    let file_name = |suffix: String| {
        if extension.is_empty() {
            format!("{}{}", base, suffix)
        } else {
            format!("{}{}.{}", base, suffix, extension)
        }
    };

    let mut candidate = dir.join(file_name(String::new()));
    let mut counter = 1;
    while candidate.exists() && candidate != current {
        candidate = dir.join(file_name(format!(" ({})", counter)));
        counter += 1;
    }
    candidate
}

impl LibraryService {
    /// Re-reads `path` and replaces the entry previously known as `old_key`.
    fn refresh_entry(&self, old_key: &str, path: &Path) -> TrackMetadata {
        let meta = read_track_metadata(path);
        if meta.path != old_key {
            if let Err(e) = self.store.delete_by_path(old_key) {
                warn!("Failed to drop stored entry {}: {:#}", old_key, e);
            }
        }
        if let Err(e) = self.store.save(&meta) {
            warn!("Failed to store {}: {:#}", meta.path, e);
        }
        self.state().replace_track(old_key, &meta);
        meta
    }

    /// Deletes files inside the music directory along with their index entries.
    pub fn delete_files(&self, paths: &[String]) -> DeleteOutcome {
        let music_dir = self.music_dir();
        let mut outcome = DeleteOutcome::default();

        for raw in paths {
            let path = match resolve_library_path(&music_dir, raw) {
                Ok(path) if !is_same_dir(&path, &music_dir) => path,
                Ok(_) | Err(_) => {
                    warn!("Refusing to delete {}: outside the music library", raw);
                    outcome.failed.push(raw.clone());
                    continue;
                }
            };

            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    error!("Failed to delete {:?}: {}", path, e);
                    self.activity_log.add(format!("Delete error {}: {}", raw, e));
                    outcome.failed.push(raw.clone());
                    continue;
                }
            }
            let key = path.to_string_lossy();
            if let Err(e) = self.store.delete_by_path(&key) {
                warn!("Failed to drop stored entry {}: {:#}", key, e);
            }
            self.state().forget_path(&key);
            self.activity_log.add(format!("Deleted {}", raw));
            outcome.deleted.push(raw.clone());
        }
        outcome
    }

    /// Writes the given tags to every existing mp3/flac file. Returns how many were written.
    pub fn update_tags(&self, paths: &[String], update: &TagUpdate) -> usize {
        let music_dir = self.music_dir();
        let mut updated = 0;

        for raw in paths {
            let Ok(path) = resolve_library_path(&music_dir, raw) else {
                warn!("Skipping tag update of {}: outside the music library", raw);
                continue;
            };
            if !path.is_file() {
                debug!("Skipping tag update of missing file {}", raw);
                continue;
            }
            match write_tags(&path, update) {
                Ok(true) => {
                    self.refresh_entry(&path.to_string_lossy(), &path);
                    updated += 1;
                }
                Ok(false) => debug!("Tags of {} not writable", raw),
                Err(e) => self
                    .activity_log
                    .add(format!("Error updating {}: {:#}", raw, e)),
            }
        }

        if updated > 0 {
            self.activity_log
                .add(format!("Updated tags of {} files", updated));
        }
        updated
    }

    /// Renames files after their tags. Returns how many files were renamed.
    pub fn rename_files(&self, paths: &[String], pattern: &str) -> Result<usize, ServiceError> {
        if pattern.trim().is_empty() {
            return Err(ServiceError::Invalid("Rename pattern is empty".to_string()));
        }
        let pattern = match parse_pattern(pattern) {
            Ok(pattern) => pattern,
            Err(e) => {
                self.activity_log.add(format!("Rename pattern error: {}", e));
                return Ok(0);
            }
        };

        let music_dir = self.music_dir();
        let mut renamed = 0;
        for raw in paths {
            let Ok(path) = resolve_library_path(&music_dir, raw) else {
                warn!("Skipping rename of {}: outside the music library", raw);
                continue;
            };
            if !path.is_file() {
                continue;
            }
            let Some(parent) = path.parent() else {
                continue;
            };

            let meta = read_track_metadata(&path);
            let Some(base) = pattern.render(&meta) else {
                debug!("Pattern produced an empty name for {}", raw);
                continue;
            };
            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            let new_path = available_path(parent, &base, &extension, &path);
            if new_path == path {
                continue;
            }

            if let Err(e) = fs::rename(&path, &new_path) {
                self.activity_log
                    .add(format!("Rename error {}: {}", raw, e));
                continue;
            }
            self.refresh_entry(&path.to_string_lossy(), &new_path);
            debug!("Renamed {:?} to {:?}", path, new_path);
            renamed += 1;
        }

        if renamed > 0 {
            self.activity_log.add(format!("Renamed {} files", renamed));
        }
        Ok(renamed)
    }

    /// Asks the model for corrected tags of a single file and writes them.
    pub async fn fix_metadata_with_ai(&self, raw: &str) -> Result<MetadataSuggestion, ServiceError> {
        let settings = self.settings.get();
        if !settings.has_key() {
            return Err(ServiceError::NoApiKey);
        }
        let path = resolve_library_path(&self.music_dir(), raw)?;
        if !path.is_file() {
            return Err(ServiceError::NotFound(raw.to_string()));
        }

        let provider = self.providers.create(&settings.ai())?;
        let current = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || read_track_metadata(&path))
                .await
                .map_err(|e| ServiceError::Internal(e.into()))?
        };

        let options = CompletionOptions::with_timeout(self.options.ai_timeout);
        let answer = provider
            .complete_json(&metadata_fix_prompt(&current), &options)
            .await
            .and_then(|text| parse_metadata_suggestion(&text));
        let suggestion = match answer {
            Ok(suggestion) => {
                metrics::record_ai_request("metadata_fix", "success");
                suggestion
            }
            Err(e) => {
                metrics::record_ai_request("metadata_fix", e.kind());
                return Err(e.into());
            }
        };

        let update = TagUpdate {
            artist: Some(suggestion.artist.clone()),
            title: Some(suggestion.title.clone()),
            album: suggestion.album.clone(),
            album_artist: suggestion.album_artist.clone(),
        };
        let service = self.clone();
        let key = path.to_string_lossy().to_string();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            if write_tags(&path, &update)? {
                service.refresh_entry(&key, &path);
            }
            Ok(())
        })
        .await
        .map_err(|e| ServiceError::Internal(e.into()))??;

        self.activity_log.add(format!(
            "AI fixed metadata of {}: {} - {}",
            raw, suggestion.artist, suggestion.title
        ));
        Ok(suggestion)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::ai::LlmError;

    #[test]
    fn resolves_paths_inside_the_library_only() {
        let root = Path::new("/music");
        assert_eq!(
            resolve_library_path(root, "/music/a/./b.mp3").unwrap(),
            PathBuf::from("/music/a/b.mp3")
        );
        assert!(resolve_library_path(root, "/music/../etc/passwd").is_err());
        assert!(resolve_library_path(root, "/music/a/../b.mp3").is_err());
        assert!(resolve_library_path(root, "/musical/b.mp3").is_err());
        assert!(resolve_library_path(root, "relative/b.mp3").is_err());
        assert!(resolve_library_path(root, "/etc/passwd").is_err());
    }

    #[test]
    fn pattern_parsing() {
        assert!(parse_pattern("{artist} - {title}").is_ok());
        assert!(parse_pattern("{{literal}} {album_artist}").is_ok());
        assert_eq!(
            parse_pattern("{artist} - {year}").unwrap_err(),
            "Unknown placeholder '{year}'"
        );
        assert!(parse_pattern("{artist").is_err());
        assert!(parse_pattern("artist}").is_err());
    }

    #[test]
    fn pattern_rendering_cleans_values() {
        let mut meta = track("/m/x.mp3", "AC/DC; Foo / Bar", "What?: Live");
        meta.album = String::new();

        let pattern = parse_pattern("{artist} - {title} [{album}] {{x}}").unwrap();
        assert_eq!(
            pattern.render(&meta).unwrap(),
            "AC & DC &  Foo & Bar - What Live [Unknown Album] {x}"
        );

        meta.title = String::new();
        meta.artist = String::new();
        let pattern = parse_pattern("{artist} - {title}").unwrap();
        assert_eq!(pattern.render(&meta).unwrap(), "Unknown Artist - x");

        let only_forbidden = parse_pattern("???").unwrap();
        assert!(only_forbidden.render(&meta).is_none());
    }

    #[test]
    fn collisions_get_numbered() {
        let dir = tempfile::TempDir::new().unwrap();
        let current = dir.path().join("old.mp3");
        fs::write(&current, b"x").unwrap();
        fs::write(dir.path().join("New.mp3"), b"x").unwrap();
        fs::write(dir.path().join("New (1).mp3"), b"x").unwrap();

        assert_eq!(
            available_path(dir.path(), "New", "mp3", &current),
            dir.path().join("New (2).mp3")
        );
        assert_eq!(
            available_path(dir.path(), "old", "mp3", &current),
            current
        );
    }

    #[tokio::test]
    async fn delete_refuses_outside_paths() {
        let env = service_with(vec![]);
        let inside = env.music.path().join("a.mp3");
        fs::write(&inside, b"x").unwrap();
        let inside = inside.to_string_lossy().to_string();
        env.service.state().files.push(track(&inside, "A", "B"));
        env.service.store().save(&track(&inside, "A", "B")).unwrap();

        let escape = format!("{}/../etc/passwd", env.music.path().display());
        let outcome = env.service.delete_files(&[
            inside.clone(),
            "/etc/passwd".to_string(),
            escape.clone(),
        ]);

        assert_eq!(outcome.deleted, vec![inside.clone()]);
        assert_eq!(outcome.failed, vec!["/etc/passwd".to_string(), escape]);
        assert!(!Path::new(&inside).exists());
        assert_eq!(env.service.status().files_count, 0);
        assert_eq!(env.service.store().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_through_unnormalized_path_drops_index_entry() {
        let env = service_with(vec![]);
        let file = env.music.path().join("a.mp3");
        fs::write(&file, b"x").unwrap();
        let key = file.to_string_lossy().to_string();
        env.service.state().files.push(track(&key, "A", "B"));
        env.service.store().save(&track(&key, "A", "B")).unwrap();

        let dotted = format!("{}/./a.mp3", env.music.path().display());
        let doubled = format!("{}//a.mp3", env.music.path().display());
        let outcome = env.service.delete_files(&[dotted.clone(), doubled]);

        assert_eq!(outcome.deleted.len(), 2);
        assert!(!file.exists());
        assert_eq!(env.service.store().count().unwrap(), 0);
        assert_eq!(env.service.status().files_count, 0);

        let root = format!("{}/.", env.music.path().display());
        let outcome = env.service.delete_files(&[root.clone()]);
        assert_eq!(outcome.failed, vec![root]);
        assert!(env.music.path().exists());
    }

    #[tokio::test]
    async fn rename_through_unnormalized_path_replaces_index_entry() {
        let env = service_with(vec![]);
        let original = env.music.path().join("Queen - Innuendo.mp3");
        fs::write(&original, b"not audio").unwrap();
        let key = original.to_string_lossy().to_string();
        env.service.state().files.push(track(&key, "Queen", "Innuendo"));
        env.service.store().save(&track(&key, "Queen", "Innuendo")).unwrap();

        let dotted = format!("{}/./Queen - Innuendo.mp3", env.music.path().display());
        let renamed = env
            .service
            .rename_files(&[dotted], "{title} by {artist}")
            .unwrap();
        assert_eq!(renamed, 1);

        let expected = env.music.path().join("Innuendo by Queen.mp3");
        let stored = env.service.store().get_all(None, 0).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].path, expected.to_string_lossy());
        assert_eq!(
            env.service.state().files[0].path,
            expected.to_string_lossy()
        );
    }

    #[tokio::test]
    async fn delete_of_missing_file_drops_stale_entry() {
        let env = service_with(vec![]);
        let ghost = env.music.path().join("ghost.mp3").to_string_lossy().to_string();
        env.service.store().save(&track(&ghost, "A", "B")).unwrap();

        let outcome = env.service.delete_files(&[ghost.clone()]);
        assert_eq!(outcome.deleted, vec![ghost]);
        assert_eq!(env.service.store().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn rename_uses_tags_and_updates_index() {
        let env = service_with(vec![]);
        let original = env.music.path().join("Queen - Innuendo.mp3");
        fs::write(&original, b"not audio").unwrap();
        fs::write(env.music.path().join("Innuendo by Queen.mp3"), b"taken").unwrap();
        let original = original.to_string_lossy().to_string();
        env.service.state().files.push(track(&original, "Queen", "Innuendo"));

        let renamed = env
            .service
            .rename_files(&[original.clone()], "{title} by {artist}")
            .unwrap();
        assert_eq!(renamed, 1);

        let expected = env.music.path().join("Innuendo by Queen (1).mp3");
        assert!(expected.exists());
        assert!(!Path::new(&original).exists());

        let files = env.service.state().files.clone();
        assert_eq!(files[0].path, expected.to_string_lossy());
        let stored = env.service.store().get_all(None, 0).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].path, expected.to_string_lossy());
    }

    #[tokio::test]
    async fn rename_with_unknown_placeholder_skips() {
        let env = service_with(vec![]);
        let original = env.music.path().join("a.mp3");
        fs::write(&original, b"x").unwrap();

        let renamed = env
            .service
            .rename_files(&[original.to_string_lossy().to_string()], "{year}")
            .unwrap();
        assert_eq!(renamed, 0);
        assert!(original.exists());
        assert!(matches!(
            env.service.rename_files(&[], "  "),
            Err(ServiceError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn update_tags_skips_missing_and_unsupported() {
        let env = service_with(vec![]);
        let wma = env.music.path().join("a.wma");
        fs::write(&wma, b"x").unwrap();
        let update = TagUpdate {
            artist: Some("New".to_string()),
            ..Default::default()
        };

        let updated = env.service.update_tags(
            &[
                wma.to_string_lossy().to_string(),
                env.music.path().join("missing.mp3").to_string_lossy().to_string(),
            ],
            &update,
        );
        assert_eq!(updated, 0);
    }

    #[tokio::test]
    async fn fix_metadata_errors() {
        let env = service_with(vec![Err(LlmError::Timeout)]);
        let path = env.music.path().join("a.mp3");
        fs::write(&path, b"x").unwrap();
        let path = path.to_string_lossy().to_string();

        assert!(matches!(
            env.service.fix_metadata_with_ai(&path).await,
            Err(ServiceError::NoApiKey)
        ));

        env.service
            .settings()
            .update(|s| s.api_key = "key".to_string())
            .unwrap();
        let missing = env.music.path().join("missing.mp3");
        assert!(matches!(
            env.service
                .fix_metadata_with_ai(&missing.to_string_lossy())
                .await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            env.service.fix_metadata_with_ai(&path).await,
            Err(ServiceError::Internal(_))
        ));
    }
}
