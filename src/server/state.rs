use axum::extract::FromRef;

use crate::orchestrator::RequestOrchestrator;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedOrchestrator = Arc<RequestOrchestrator>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub orchestrator: GuardedOrchestrator,
    pub hash: String,
}

impl ServerState {
    pub fn new(config: ServerConfig, orchestrator: GuardedOrchestrator) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            orchestrator,
            hash: env!("GIT_HASH").to_string(),
        }
    }
}

impl FromRef<ServerState> for GuardedOrchestrator {
    fn from_ref(input: &ServerState) -> Self {
        input.orchestrator.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
