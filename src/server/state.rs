use axum::extract::FromRef;

use crate::background_jobs::SchedulerHandle;
use crate::service::LibraryService;
use std::time::Instant;

use super::ServerConfig;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub service: LibraryService,
    pub scheduler_handle: SchedulerHandle,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for LibraryService {
    fn from_ref(input: &ServerState) -> Self {
        input.service.clone()
    }
}

impl FromRef<ServerState> for SchedulerHandle {
    fn from_ref(input: &ServerState) -> Self {
        input.scheduler_handle.clone()
    }
}
