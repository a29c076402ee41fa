//! Prompt configuration store: one global document, one per world module.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::infrastructure::ports::{
    GlobalPromptConfig, PromptConfigRepo, PromptOverrides, RepoError,
};
use loreforge_domain::WorldModule;

const GLOBAL_KEY: &str = "global";

pub struct SqlitePromptConfigRepo {
    pool: SqlitePool,
}

impl SqlitePromptConfigRepo {
    pub async fn new(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS prompt_config (
                scope TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
        "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    async fn fetch(&self, scope: &str) -> Result<Option<String>, RepoError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM prompt_config WHERE scope = ?")
                .bind(scope)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepoError::database("get prompt config", e))?;
        Ok(row.map(|(data,)| data))
    }

    async fn store(&self, scope: &str, data: String) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT OR REPLACE INTO prompt_config (scope, data, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)",
        )
        .bind(scope)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("save prompt config", e))?;
        Ok(())
    }
}

#[async_trait]
impl PromptConfigRepo for SqlitePromptConfigRepo {
    async fn get_global(&self) -> Result<Option<GlobalPromptConfig>, RepoError> {
        self.fetch(GLOBAL_KEY)
            .await?
            .map(|data| {
                serde_json::from_str(&data).map_err(|e| RepoError::Serialization(e.to_string()))
            })
            .transpose()
    }

    async fn get_world(&self, world: WorldModule) -> Result<Option<PromptOverrides>, RepoError> {
        self.fetch(world.as_str())
            .await?
            .map(|data| {
                serde_json::from_str(&data).map_err(|e| RepoError::Serialization(e.to_string()))
            })
            .transpose()
    }

    async fn save_global(&self, config: &GlobalPromptConfig) -> Result<(), RepoError> {
        let data =
            serde_json::to_string(config).map_err(|e| RepoError::Serialization(e.to_string()))?;
        self.store(GLOBAL_KEY, data).await
    }

    async fn save_world(
        &self,
        world: WorldModule,
        overrides: &PromptOverrides,
    ) -> Result<(), RepoError> {
        let data = serde_json::to_string(overrides)
            .map_err(|e| RepoError::Serialization(e.to_string()))?;
        self.store(world.as_str(), data).await
    }
}
