//! 设置Repository实现

use crate::db::repositories::map_sqlx_err;
use crate::db::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    entities::setting::ClientSetting, errors::DomainResult, repositories::SettingsRepository,
};
use sqlx::{query, query_as, FromRow};
use std::sync::Arc;
use uuid::Uuid;

/// 数据库设置模型
#[derive(Debug, Clone, FromRow)]
struct DbClientSetting {
    pub id: Uuid,
    pub key: String,
    pub value: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbClientSetting> for ClientSetting {
    fn from(row: DbClientSetting) -> Self {
        ClientSetting {
            id: row.id,
            key: row.key,
            value: row.value,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// 设置Repository实现
pub struct PostgresSettingsRepository {
    pool: Arc<DbPool>,
}

impl PostgresSettingsRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for PostgresSettingsRepository {
    async fn get(&self, key: &str) -> DomainResult<Option<ClientSetting>> {
        let row = query_as::<_, DbClientSetting>(
            r#"
            SELECT id, key, value, description, created_at, updated_at
            FROM client_settings
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(row.map(|r| r.into()))
    }

    async fn get_or_init(
        &self,
        key: &str,
        default_value: &str,
        description: &str,
    ) -> DomainResult<ClientSetting> {
        // upsert-select：已存在时不覆盖 value，只把现值查回来
        let row = query_as::<_, DbClientSetting>(
            r#"
            INSERT INTO client_settings (key, value, description)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET key = EXCLUDED.key
            RETURNING id, key, value, description, created_at, updated_at
            "#,
        )
        .bind(key)
        .bind(default_value)
        .bind(description)
        .fetch_one(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(row.into())
    }

    async fn set(&self, key: &str, value: &str, description: &str) -> DomainResult<()> {
        query(
            r#"
            INSERT INTO client_settings (key, value, description)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, description = EXCLUDED.description, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(description)
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }
}
