//! Knowledge-base document store (lore, rules, style guides).

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::infrastructure::ports::{KnowledgeDoc, KnowledgeRepo, RepoError};
use loreforge_domain::DocumentId;

pub struct SqliteKnowledgeRepo {
    pool: SqlitePool,
}

impl SqliteKnowledgeRepo {
    pub async fn new(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS knowledge_docs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                world_module TEXT NOT NULL,
                category TEXT NOT NULL,
                content TEXT NOT NULL,
                target_model TEXT,
                enabled INTEGER NOT NULL DEFAULT 1
            )
        "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

type DocRow = (String, String, String, String, String, Option<String>, i64);

fn row_to_doc(row: DocRow) -> Result<KnowledgeDoc, RepoError> {
    let (id, name, world_module, category, content, target_model, enabled) = row;
    let id = Uuid::parse_str(&id)
        .map(DocumentId::from)
        .map_err(|e| RepoError::Serialization(e.to_string()))?;

    Ok(KnowledgeDoc {
        id,
        name,
        world_module,
        category,
        content,
        target_model,
        enabled: enabled != 0,
    })
}

#[async_trait]
impl KnowledgeRepo for SqliteKnowledgeRepo {
    async fn list_enabled(&self) -> Result<Vec<KnowledgeDoc>, RepoError> {
        let rows: Vec<DocRow> = sqlx::query_as(
            r#"
            SELECT id, name, world_module, category, content, target_model, enabled
            FROM knowledge_docs WHERE enabled = 1
        "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("list knowledge docs", e))?;

        rows.into_iter().map(row_to_doc).collect()
    }

    async fn save(&self, doc: &KnowledgeDoc) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO knowledge_docs
                (id, name, world_module, category, content, target_model, enabled)
            VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(doc.id.to_string())
        .bind(&doc.name)
        .bind(&doc.world_module)
        .bind(&doc.category)
        .bind(&doc.content)
        .bind(&doc.target_model)
        .bind(doc.enabled as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("save knowledge doc", e))?;

        Ok(())
    }
}
