//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own music library, settings
//! file and metadata database.

use super::constants::*;
use super::fixtures::{create_test_data_dir, create_test_library};
use music_librarian::ai::GeminiProviderFactory;
use music_librarian::background_jobs::jobs::all_jobs;
use music_librarian::background_jobs::{create_scheduler, JobContext};
use music_librarian::library::{MetadataStore, SqliteMetadataStore};
use music_librarian::server::{make_app, RequestsLoggingLevel, ServerConfig};
use music_librarian::service::{ActivityLog, LibraryService, ServiceOptions};
use music_librarian::settings::SettingsStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Nothing listens here; model requests fail fast.
const UNREACHABLE_MODEL_URL: &str = "http://127.0.0.1:9";

/// Test server instance with an isolated library
///
/// When dropped, the server and its scheduler shut down and temp resources
/// are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Direct access to the metadata database
    pub store: Arc<dyn MetadataStore>,

    music_dir: TempDir,
    _data_dir: TempDir,
    shutdown_token: CancellationToken,
}

impl TestServer {
    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if the fixtures cannot be created, the port cannot be bound or
    /// the server doesn't become ready within timeout.
    pub async fn spawn() -> Self {
        let music_dir = create_test_library().expect("Failed to create test library");
        let data_dir = create_test_data_dir().expect("Failed to create data directory");

        let settings = Arc::new(SettingsStore::load(
            data_dir.path().join("config.json"),
            &music_dir.path().to_string_lossy(),
        ));
        let store: Arc<dyn MetadataStore> = Arc::new(
            SqliteMetadataStore::new(data_dir.path().join("metadata.db"))
                .expect("Failed to open metadata store"),
        );
        let activity_log = Arc::new(ActivityLog::default());

        let options = ServiceOptions {
            ai_batch_delay: Duration::from_millis(1),
            ai_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let service = LibraryService::new(
            options,
            store.clone(),
            settings.clone(),
            Arc::new(GeminiProviderFactory::new(
                UNREACHABLE_MODEL_URL,
                Duration::from_secs(2),
            )),
            activity_log.clone(),
        );

        let shutdown_token = CancellationToken::new();
        let job_context = JobContext::new(
            shutdown_token.child_token(),
            settings,
            store.clone(),
            activity_log,
        );
        let (mut scheduler, scheduler_handle) =
            create_scheduler(shutdown_token.clone(), job_context);
        for job in all_jobs() {
            scheduler.register_job(job).await;
        }
        tokio::spawn(async move { scheduler.run().await });

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            port,
            bind_address: "127.0.0.1".to_string(),
            requests_logging_level: RequestsLoggingLevel::None,
            frontend_dir_path: None,
        };
        let app = make_app(config, service, scheduler_handle);

        let server_token = shutdown_token.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(server_token.cancelled_owned())
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            store,
            music_dir,
            _data_dir: data_dir,
            shutdown_token,
        };

        server.wait_for_ready().await;

        server
    }

    /// Root of the fixture library
    pub fn music_dir(&self) -> &Path {
        self.music_dir.path()
    }

    /// Absolute path of a fixture file, as the API reports it
    pub fn library_path(&self, relative: &str) -> PathBuf {
        self.music_dir.path().join(relative)
    }

    /// Waits for the server to become ready by polling the health endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client
                .get(format!("{}/api/health", self.base_url))
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
