use anyhow::Result;
use async_trait::async_trait;
use game_core::{EngineError, EngineResult, SessionStore};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use std::time::Duration;
use tracing::debug;

use crate::entities::{prelude::*, session_entries};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn store_error(err: anyhow::Error) -> EngineError {
    EngineError::Store(format!("{:#}", err))
}

fn live(now_ms: i64) -> Condition {
    Condition::any()
        .add(session_entries::Column::ExpiresAt.is_null())
        .add(session_entries::Column::ExpiresAt.gt(now_ms))
}

/// Session store backed by a SQL table, so rooms survive a server restart
#[derive(Clone)]
pub struct SqlSessionStore {
    db: DatabaseConnection,
}

impl SqlSessionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_live(&self, key: &str) -> Result<Option<session_entries::Model>> {
        let entry = SessionEntries::find_by_id(key.to_string())
            .one(&self.db)
            .await?;
        Ok(entry.filter(|entry| entry.is_live(now_ms())))
    }

    async fn upsert(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| now_ms() + ttl.as_millis() as i64);
        let entry = session_entries::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value),
            expires_at: Set(expires_at),
            updated_at: Set(chrono::Utc::now().into()),
        };

        SessionEntries::insert(entry)
            .on_conflict(
                OnConflict::column(session_entries::Column::Key)
                    .update_columns([
                        session_entries::Column::Value,
                        session_entries::Column::ExpiresAt,
                        session_entries::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let was_live = self.find_live(key).await?.is_some();
        SessionEntries::delete_by_id(key.to_string())
            .exec(&self.db)
            .await?;
        Ok(was_live)
    }

    async fn live_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = SessionEntries::find()
            .filter(session_entries::Column::Key.starts_with(prefix))
            .filter(live(now_ms()))
            .order_by_asc(session_entries::Column::Key)
            .all(&self.db)
            .await?;

        // LIKE ignores ASCII case and treats `_` as a wildcard, so recheck exactly
        Ok(entries
            .into_iter()
            .map(|entry| entry.key)
            .filter(|key| key.starts_with(prefix))
            .collect())
    }

    async fn remove_all(&self) -> Result<()> {
        let result = SessionEntries::delete_many().exec(&self.db).await?;
        debug!("Flushed {} session entries", result.rows_affected);
        Ok(())
    }

    async fn remove_expired(&self) -> Result<usize> {
        let result = SessionEntries::delete_many()
            .filter(session_entries::Column::ExpiresAt.lte(now_ms()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected as usize)
    }
}

#[async_trait]
impl SessionStore for SqlSessionStore {
    async fn get(&self, key: &str) -> EngineResult<Option<String>> {
        Ok(self
            .find_live(key)
            .await
            .map_err(store_error)?
            .map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> EngineResult<()> {
        self.upsert(key, value, ttl).await.map_err(store_error)
    }

    async fn del(&self, key: &str) -> EngineResult<bool> {
        self.remove(key).await.map_err(store_error)
    }

    async fn keys(&self, prefix: &str) -> EngineResult<Vec<String>> {
        self.live_keys(prefix).await.map_err(store_error)
    }

    async fn flush(&self) -> EngineResult<()> {
        self.remove_all().await.map_err(store_error)
    }

    async fn purge_expired(&self) -> EngineResult<usize> {
        self.remove_expired().await.map_err(store_error)
    }
}
