pub mod chat;
pub mod error;
pub mod events;
pub mod masking;
pub mod presence;
pub mod rooms;

use parley_db::DbPool;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub event_bus: events::EventBus,
    /// Process-wide presence registry; rebuilt empty on restart.
    pub presence: presence::PresenceRegistry,
    pub config: AppConfig,
    pub shutdown: Arc<Notify>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    /// Worker id mixed into generated snowflake ids.
    pub worker_id: u16,
    /// Public URL of this server (e.g., https://chat.example.com).
    pub public_url: Option<String>,
}

impl AppState {
    /// Generate an id in this process's snowflake space.
    pub fn next_id(&self) -> i64 {
        parley_util::snowflake::generate(self.config.worker_id)
    }
}
