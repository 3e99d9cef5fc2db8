// lib.rs - ArchFlow: massing model to renders and cinematic sequences
pub mod config;
pub mod error;
pub mod gateway;
pub mod gemini_client;
pub mod handlers;
pub mod middleware;
pub mod settings;
pub mod types;
pub mod workflow;

use std::sync::Arc;

pub use config::ArchConfig;
pub use error::{GatewayError, SlotError, WorkflowError};
pub use gateway::{GenerationGateway, PollPolicy, SharedGateway};
pub use handlers::app_router;
pub use settings::Settings;
pub use types::*;

/// Shared state handed to every handler through an `Extension` layer
pub struct AppState {
    pub gateway: SharedGateway,
    pub sessions: workflow::SessionStore,
    pub settings: Settings,
}

impl AppState {
    pub fn new(gateway: SharedGateway, settings: Settings) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            sessions: workflow::SessionStore::with_max_age(settings.run_ttl),
            settings,
        })
    }
}
