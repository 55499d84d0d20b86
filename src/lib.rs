//! Music Librarian
//!
//! Indexes a music directory, finds likely duplicate tracks, confirms them
//! with a generative model, edits tags and runs scheduled maintenance jobs.
//! This library exposes the internal modules for the binary and for testing.

pub mod ai;
pub mod background_jobs;
pub mod config;
pub mod dedupe;
pub mod library;
pub mod server;
pub mod service;
pub mod settings;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use library::{MetadataStore, SqliteMetadataStore};
pub use server::{run_server, RequestsLoggingLevel};
pub use service::{LibraryService, ServiceOptions};
pub use settings::SettingsStore;
