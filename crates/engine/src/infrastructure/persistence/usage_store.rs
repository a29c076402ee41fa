//! Usage metering: per-user cumulative counters and a global daily
//! aggregate, both incremented atomically when a turn completes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::infrastructure::ports::{ClockPort, RepoError, UsageRepo};
use loreforge_domain::{DailyUsage, TokenUsage, UsageCounters};

pub struct SqliteUsageRepo {
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
}

impl SqliteUsageRepo {
    pub async fn new(pool: SqlitePool, clock: Arc<dyn ClockPort>) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_usage (
                user_id TEXT PRIMARY KEY,
                turns_used INTEGER NOT NULL DEFAULT 0,
                prompt_tokens INTEGER NOT NULL DEFAULT 0,
                completion_tokens INTEGER NOT NULL DEFAULT 0,
                total_tokens INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_usage (
                date TEXT PRIMARY KEY,
                turns INTEGER NOT NULL DEFAULT 0,
                total_tokens INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool, clock })
    }

    fn today(&self, now: DateTime<Utc>) -> String {
        now.format("%Y-%m-%d").to_string()
    }
}

#[async_trait]
impl UsageRepo for SqliteUsageRepo {
    async fn record_turn(&self, user_id: &str, usage: TokenUsage) -> Result<(), RepoError> {
        let date = self.today(self.clock.now());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("record turn", e))?;

        sqlx::query(
            r#"
            INSERT INTO user_usage (user_id, turns_used, prompt_tokens, completion_tokens, total_tokens)
            VALUES (?, 1, ?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET
                turns_used = turns_used + 1,
                prompt_tokens = prompt_tokens + excluded.prompt_tokens,
                completion_tokens = completion_tokens + excluded.completion_tokens,
                total_tokens = total_tokens + excluded.total_tokens
        "#,
        )
        .bind(user_id)
        .bind(usage.prompt_tokens as i64)
        .bind(usage.completion_tokens as i64)
        .bind(usage.total_tokens as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepoError::database("record user usage", e))?;

        sqlx::query(
            r#"
            INSERT INTO daily_usage (date, turns, total_tokens)
            VALUES (?, 1, ?)
            ON CONFLICT (date) DO UPDATE SET
                turns = turns + 1,
                total_tokens = total_tokens + excluded.total_tokens
        "#,
        )
        .bind(date)
        .bind(usage.total_tokens as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepoError::database("record daily usage", e))?;

        tx.commit()
            .await
            .map_err(|e| RepoError::database("record turn", e))?;

        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<UsageCounters, RepoError> {
        let row: Option<(i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT turns_used, prompt_tokens, completion_tokens, total_tokens FROM user_usage WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::database("get user usage", e))?;

        Ok(row
            .map(
                |(turns_used, prompt_tokens, completion_tokens, total_tokens)| UsageCounters {
                    turns_used: turns_used as u64,
                    prompt_tokens: prompt_tokens as u64,
                    completion_tokens: completion_tokens as u64,
                    total_tokens: total_tokens as u64,
                },
            )
            .unwrap_or_default())
    }

    async fn get_daily(&self, date: &str) -> Result<Option<DailyUsage>, RepoError> {
        let row: Option<(i64, i64)> =
            sqlx::query_as("SELECT turns, total_tokens FROM daily_usage WHERE date = ?")
                .bind(date)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepoError::database("get daily usage", e))?;

        Ok(row.map(|(turns, total_tokens)| DailyUsage {
            date: date.to_string(),
            turns: turns as u64,
            total_tokens: total_tokens as u64,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::persistence::connect;
    use chrono::TimeZone;

    async fn test_repo(now: DateTime<Utc>) -> (SqliteUsageRepo, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("test.db");
        let pool = connect(path.to_str().expect("utf8 path"))
            .await
            .expect("pool");
        let repo = SqliteUsageRepo::new(pool, Arc::new(FixedClock(now)))
            .await
            .expect("repo");
        (repo, dir)
    }

    fn usage(total: u32) -> TokenUsage {
        TokenUsage {
            prompt_tokens: total / 2,
            completion_tokens: total - total / 2,
            total_tokens: total,
        }
    }

    #[tokio::test]
    async fn test_record_turn_increments_user_and_day() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).single().expect("ts");
        let (repo, _dir) = test_repo(now).await;

        repo.record_turn("user-1", usage(1000)).await.expect("record");
        repo.record_turn("user-1", usage(500)).await.expect("record");
        repo.record_turn("user-2", usage(200)).await.expect("record");

        let user = repo.get_user("user-1").await.expect("get");
        assert_eq!(user.turns_used, 2);
        assert_eq!(user.total_tokens, 1500);

        let day = repo
            .get_daily("2026-03-14")
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(day.turns, 3);
        assert_eq!(day.total_tokens, 1700);
    }

    #[tokio::test]
    async fn test_unknown_user_reads_zero() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).single().expect("ts");
        let (repo, _dir) = test_repo(now).await;

        let user = repo.get_user("nobody").await.expect("get");
        assert_eq!(user, UsageCounters::default());
        assert!(repo.get_daily("2026-03-14").await.expect("get").is_none());
    }
}
