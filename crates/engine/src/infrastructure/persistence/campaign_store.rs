//! Campaign + message log store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::str::FromStr;
use uuid::Uuid;

use crate::infrastructure::ports::{CampaignRepo, RepoError};
use loreforge_domain::{
    Campaign, CampaignId, MessageId, MessageRole, StoredMessage, TokenUsage,
};

pub struct SqliteCampaignRepo {
    pool: SqlitePool,
}

impl SqliteCampaignRepo {
    pub async fn new(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS campaigns (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
        "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                campaign_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                prompt_tokens INTEGER,
                completion_tokens INTEGER,
                total_tokens INTEGER
            )
        "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_campaign ON messages (campaign_id, seq)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl CampaignRepo for SqliteCampaignRepo {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>, RepoError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM campaigns WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("get campaign", e))?;

        row.map(|(data,)| {
            serde_json::from_str(&data).map_err(|e| RepoError::Serialization(e.to_string()))
        })
        .transpose()
    }

    async fn save(&self, campaign: &Campaign) -> Result<(), RepoError> {
        let data = serde_json::to_string(campaign)
            .map_err(|e| RepoError::Serialization(e.to_string()))?;

        sqlx::query(
            "INSERT OR REPLACE INTO campaigns (id, data, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)",
        )
        .bind(campaign.id.to_string())
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("save campaign", e))?;

        Ok(())
    }

    async fn delete(&self, id: CampaignId) -> Result<(), RepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("delete campaign", e))?;

        sqlx::query("DELETE FROM messages WHERE campaign_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepoError::database("delete campaign messages", e))?;

        sqlx::query("DELETE FROM campaigns WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepoError::database("delete campaign", e))?;

        tx.commit()
            .await
            .map_err(|e| RepoError::database("delete campaign", e))?;

        Ok(())
    }

    async fn append_message(&self, message: &StoredMessage) -> Result<(), RepoError> {
        let usage = message.token_usage.unwrap_or_default();
        let (prompt, completion, total) = if message.token_usage.is_some() {
            (
                Some(usage.prompt_tokens as i64),
                Some(usage.completion_tokens as i64),
                Some(usage.total_tokens as i64),
            )
        } else {
            (None, None, None)
        };

        sqlx::query(
            r#"
            INSERT INTO messages
                (id, campaign_id, seq, role, content, created_at,
                 prompt_tokens, completion_tokens, total_tokens)
            VALUES
                (?, ?,
                 (SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE campaign_id = ?),
                 ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(message.id.to_string())
        .bind(message.campaign_id.to_string())
        .bind(message.campaign_id.to_string())
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.created_at.to_rfc3339())
        .bind(prompt)
        .bind(completion)
        .bind(total)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("append message", e))?;

        Ok(())
    }

    async fn list_messages(
        &self,
        campaign_id: CampaignId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, RepoError> {
        type MessageRow = (
            String,
            String,
            String,
            String,
            Option<i64>,
            Option<i64>,
            Option<i64>,
        );

        // Take the newest `limit` rows, then restore narrative order.
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, role, content, created_at,
                   prompt_tokens, completion_tokens, total_tokens
            FROM (
                SELECT * FROM messages WHERE campaign_id = ?
                ORDER BY seq DESC LIMIT ?
            )
            ORDER BY seq ASC
        "#,
        )
        .bind(campaign_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("list messages", e))?;

        rows.into_iter()
            .map(|(id, role, content, created_at, prompt, completion, total)| {
                let id = Uuid::parse_str(&id)
                    .map(MessageId::from)
                    .map_err(|e| RepoError::Serialization(e.to_string()))?;
                let role = MessageRole::from_str(&role)
                    .map_err(|e| RepoError::Serialization(e.to_string()))?;
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| RepoError::Serialization(e.to_string()))?
                    .with_timezone(&Utc);
                let token_usage = total.map(|t| TokenUsage {
                    prompt_tokens: prompt.unwrap_or(0) as u32,
                    completion_tokens: completion.unwrap_or(0) as u32,
                    total_tokens: t as u32,
                });

                Ok(StoredMessage {
                    id,
                    campaign_id,
                    role,
                    content,
                    created_at,
                    token_usage,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::connect;
    use loreforge_domain::WorldModule;
    use serde_json::json;

    async fn test_repo() -> (SqliteCampaignRepo, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("test.db");
        let pool = connect(path.to_str().expect("utf8 path"))
            .await
            .expect("pool");
        let repo = SqliteCampaignRepo::new(pool).await.expect("repo");
        (repo, dir)
    }

    fn sample_campaign() -> Campaign {
        Campaign::new(
            "The Ashen Vale",
            WorldModule::Classic,
            json!({"name": "Kara", "class": "Ranger"}),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_save_and_get_round_trips_state() {
        let (repo, _dir) = test_repo().await;
        let campaign = sample_campaign();

        repo.save(&campaign).await.expect("save");
        let loaded = repo.get(campaign.id).await.expect("get").expect("exists");

        assert_eq!(loaded, campaign);
        assert_eq!(loaded.state.world_module(), WorldModule::Classic);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let (repo, _dir) = test_repo().await;
        let found = repo.get(CampaignId::new()).await.expect("get");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_messages_keep_insertion_order() {
        let (repo, _dir) = test_repo().await;
        let campaign = sample_campaign();
        repo.save(&campaign).await.expect("save");

        for (role, content) in [
            (MessageRole::User, "I enter the cave"),
            (MessageRole::Narrator, "Darkness swallows the torchlight."),
            (MessageRole::User, "I light a second torch"),
        ] {
            let msg = StoredMessage::new(campaign.id, role, content, Utc::now());
            repo.append_message(&msg).await.expect("append");
        }

        let messages = repo.list_messages(campaign.id, 50).await.expect("list");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "I enter the cave");
        assert_eq!(messages[2].content, "I light a second torch");

        // Limit takes the newest, still oldest-first.
        let recent = repo.list_messages(campaign.id, 2).await.expect("list");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "Darkness swallows the torchlight.");
    }

    #[tokio::test]
    async fn test_usage_columns_round_trip() {
        let (repo, _dir) = test_repo().await;
        let campaign = sample_campaign();
        repo.save(&campaign).await.expect("save");

        let msg = StoredMessage::new(campaign.id, MessageRole::Narrator, "text", Utc::now())
            .with_usage(TokenUsage {
                prompt_tokens: 1200,
                completion_tokens: 350,
                total_tokens: 1550,
            });
        repo.append_message(&msg).await.expect("append");

        let messages = repo.list_messages(campaign.id, 10).await.expect("list");
        assert_eq!(messages[0].token_usage.expect("usage").total_tokens, 1550);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_messages() {
        let (repo, _dir) = test_repo().await;
        let campaign = sample_campaign();
        repo.save(&campaign).await.expect("save");

        let msg = StoredMessage::new(campaign.id, MessageRole::User, "hello", Utc::now());
        repo.append_message(&msg).await.expect("append");

        repo.delete(campaign.id).await.expect("delete");

        assert!(repo.get(campaign.id).await.expect("get").is_none());
        assert!(repo
            .list_messages(campaign.id, 10)
            .await
            .expect("list")
            .is_empty());
    }
}
