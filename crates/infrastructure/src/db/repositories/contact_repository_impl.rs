//! 私信台账Repository实现

use crate::db::repositories::map_sqlx_err;
use crate::db::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    entities::contact::ContactedChat, errors::DomainResult, repositories::ContactRepository,
};
use sqlx::{query, query_as, query_scalar, FromRow};
use std::sync::Arc;
use uuid::Uuid;

/// 数据库台账模型
#[derive(Debug, Clone, FromRow)]
struct DbContactedChat {
    pub id: Uuid,
    pub account_id: Uuid,
    pub username: String,
    pub chat_id: i64,
    pub created_at: DateTime<Utc>,
}

impl From<DbContactedChat> for ContactedChat {
    fn from(row: DbContactedChat) -> Self {
        ContactedChat {
            id: row.id,
            account_id: row.account_id,
            username: row.username,
            chat_id: row.chat_id,
            created_at: row.created_at,
        }
    }
}

/// 私信台账Repository实现
pub struct PostgresContactRepository {
    pool: Arc<DbPool>,
}

impl PostgresContactRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactRepository for PostgresContactRepository {
    async fn find_by_username(&self, username: &str) -> DomainResult<Option<ContactedChat>> {
        let row = query_as::<_, DbContactedChat>(
            r#"
            SELECT id, account_id, username, chat_id, created_at
            FROM contacted_chats
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_existing(&self, usernames: &[String]) -> DomainResult<Vec<String>> {
        let existing: Vec<String> =
            query_scalar("SELECT username FROM contacted_chats WHERE username = ANY($1)")
                .bind(usernames)
                .fetch_all(&*self.pool)
                .await
                .map_err(map_sqlx_err)?;

        Ok(existing)
    }

    async fn commit_dispatch(
        &self,
        account_id: Uuid,
        phone: &str,
        username: &str,
        chat_id: i64,
        cap: i32,
    ) -> DomainResult<bool> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        // 条件递增：没抢到配额就整体放弃
        let updated = query(
            r#"
            UPDATE telegram_accounts
            SET private_count = private_count + 1, updated_at = NOW()
            WHERE phone = $1 AND private_count < $2
            "#,
        )
        .bind(phone)
        .bind(cap)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(map_sqlx_err)?;
            return Ok(false);
        }

        query(
            r#"
            INSERT INTO contacted_chats (account_id, username, chat_id)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(account_id)
        .bind(username)
        .bind(chat_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(true)
    }
}
