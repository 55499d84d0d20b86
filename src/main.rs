use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use music_librarian::ai::GeminiProviderFactory;
use music_librarian::background_jobs::jobs::all_jobs;
use music_librarian::background_jobs::{create_scheduler, JobContext};
use music_librarian::config::{self, AppConfig, FileConfig};
use music_librarian::library::{MetadataStore, SqliteMetadataStore};
use music_librarian::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig};
use music_librarian::service::{ActivityLog, LibraryService};
use music_librarian::settings::SettingsStore;

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
#[clap(version, about)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory for persistent state (settings file and metadata database).
    #[clap(long, value_parser = parse_path, default_value = "/data")]
    pub data_dir: PathBuf,

    /// Root of the music library.
    #[clap(long, value_parser = parse_path, default_value = "/music")]
    pub music_dir: PathBuf,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8000)]
    pub port: u16,

    /// The address to bind to.
    #[clap(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Number of async runtime worker threads.
    #[clap(long, default_value_t = 2)]
    pub workers: usize,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            data_dir: Some(args.data_dir.clone()),
            music_dir: Some(args.music_dir.clone()),
            port: args.port,
            bind: args.bind.clone(),
            workers: args.workers,
            logging_level: args.logging_level.clone(),
            frontend_dir_path: args.frontend_dir_path.clone(),
        }
    }
}

/// Resolves when the process receives Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = AppConfig::resolve(&(&cli_args).into(), file_config)?;

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(app_config.workers)
        .enable_all()
        .build()
        .context("Failed to build the async runtime")?
        .block_on(serve(app_config))
}

async fn serve(app_config: AppConfig) -> Result<()> {
    info!(
        "Starting with data dir {:?}, music dir {:?}, {} workers",
        app_config.data_dir, app_config.music_dir, app_config.workers
    );
    if !app_config.music_dir.is_dir() {
        warn!(
            "Music directory {:?} does not exist yet",
            app_config.music_dir
        );
    }

    info!("Initializing metrics...");
    metrics::init_metrics();

    let settings = Arc::new(SettingsStore::load(
        app_config.settings_path(),
        &app_config.music_dir.to_string_lossy(),
    ));

    info!(
        "Opening metadata database at {:?}...",
        app_config.metadata_db_path()
    );
    let store: Arc<dyn MetadataStore> =
        Arc::new(SqliteMetadataStore::new(app_config.metadata_db_path())?);
    metrics::set_library_size(store.count()?);

    let activity_log = Arc::new(ActivityLog::default());
    let providers = Arc::new(GeminiProviderFactory::new(
        app_config.ai.gemini_base_url.clone(),
        app_config.ai.request_timeout,
    ));
    let service = LibraryService::new(
        app_config.service_options(),
        store.clone(),
        settings.clone(),
        providers,
        activity_log.clone(),
    );

    // Set up background job scheduler
    let shutdown_token = CancellationToken::new();
    let job_context = JobContext::new(
        shutdown_token.child_token(),
        settings,
        store,
        activity_log.clone(),
    );
    let (mut scheduler, scheduler_handle) = create_scheduler(shutdown_token.clone(), job_context);
    for job in all_jobs() {
        scheduler.register_job(job).await;
    }

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
        bind_address: app_config.bind.clone(),
        frontend_dir_path: app_config.frontend_dir_path.clone(),
    };

    activity_log.add("Server started");
    info!("Ready to serve at {}:{}!", app_config.bind, app_config.port);

    // Run HTTP server and job scheduler concurrently
    let server_token = shutdown_token.clone();
    let server = async move {
        let result = run_server(server_config, service, scheduler_handle, server_token.clone()).await;
        info!("HTTP server stopped: {:?}", result);
        server_token.cancel();
        result
    };
    let (result, ()) = tokio::join!(server, scheduler.run());
    info!("Scheduler stopped");
    result
}
