//! SQLite document store.
//!
//! Campaigns, prompt configuration, and knowledge documents are stored
//! as JSON text columns keyed by ID, so the open-ended schemas (game
//! state, character sheets) never force a migration. Counters live in
//! plain columns so increments stay atomic.

pub mod campaign_store;
pub mod knowledge_store;
pub mod prompt_store;
pub mod usage_store;

pub use campaign_store::SqliteCampaignRepo;
pub use knowledge_store::SqliteKnowledgeRepo;
pub use prompt_store::SqlitePromptConfigRepo;
pub use usage_store::SqliteUsageRepo;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Open (creating if missing) the engine database at `path`.
pub async fn connect(path: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}
