//! 账号Repository实现

use crate::db::repositories::map_sqlx_err;
use crate::db::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use domain::{
    entities::account::{AccountProfile, AccountStatus, TelegramAccount},
    errors::DomainResult,
    repositories::AccountRepository,
};
use sqlx::{query, query_as, query_scalar, FromRow};
use std::sync::Arc;
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str = "id, phone, app_id, app_hash, database_path, first_name, last_name, \
     username, tg_user_id, is_premium, is_active, status, is_password_changed, private_count, \
     last_reset_at, last_login_at, created_at, updated_at";

/// 数据库账号模型
#[derive(Debug, Clone, FromRow)]
struct DbTelegramAccount {
    pub id: Uuid,
    pub phone: String,
    pub app_id: String,
    pub app_hash: String,
    pub database_path: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub tg_user_id: i64,
    pub is_premium: bool,
    pub is_active: bool,
    pub status: i32,
    pub is_password_changed: bool,
    pub private_count: i32,
    pub last_reset_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbTelegramAccount {
    fn into_domain(self) -> DomainResult<TelegramAccount> {
        Ok(TelegramAccount {
            id: self.id,
            phone: self.phone,
            app_id: self.app_id,
            app_hash: self.app_hash,
            database_path: self.database_path,
            first_name: self.first_name,
            last_name: self.last_name,
            username: self.username,
            tg_user_id: self.tg_user_id,
            is_premium: self.is_premium,
            is_active: self.is_active,
            status: AccountStatus::from_i32(self.status)?,
            is_password_changed: self.is_password_changed,
            private_count: self.private_count,
            last_reset_at: self.last_reset_at,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// 账号Repository实现
pub struct PostgresAccountRepository {
    pool: Arc<DbPool>,
}

impl PostgresAccountRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn get_or_create(
        &self,
        phone: &str,
        app_id: &str,
        app_hash: &str,
        database_path: &str,
    ) -> DomainResult<TelegramAccount> {
        // upsert-select：冲突时不改已有记录，只把它查回来
        let row = query_as::<_, DbTelegramAccount>(&format!(
            r#"
            INSERT INTO telegram_accounts (phone, app_id, app_hash, database_path)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (phone) DO UPDATE SET phone = EXCLUDED.phone
            RETURNING {ACCOUNT_COLUMNS}
            "#,
        ))
        .bind(phone)
        .bind(app_id)
        .bind(app_hash)
        .bind(database_path)
        .fetch_one(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        row.into_domain()
    }

    async fn find_by_phone(&self, phone: &str) -> DomainResult<Option<TelegramAccount>> {
        let row = query_as::<_, DbTelegramAccount>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM telegram_accounts WHERE phone = $1",
        ))
        .bind(phone)
        .fetch_optional(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        row.map(DbTelegramAccount::into_domain).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<TelegramAccount>> {
        let row = query_as::<_, DbTelegramAccount>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM telegram_accounts WHERE id = $1",
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        row.map(DbTelegramAccount::into_domain).transpose()
    }

    async fn update_profile(&self, phone: &str, profile: &AccountProfile) -> DomainResult<()> {
        query(
            r#"
            UPDATE telegram_accounts
            SET first_name = $2, last_name = $3, username = $4, tg_user_id = $5,
                is_premium = $6, is_active = TRUE, status = $7, last_login_at = NOW(),
                updated_at = NOW()
            WHERE phone = $1
            "#,
        )
        .bind(phone)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.username)
        .bind(profile.tg_user_id)
        .bind(profile.is_premium)
        .bind(AccountStatus::Ready.as_i32())
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn set_status(&self, phone: &str, status: AccountStatus) -> DomainResult<()> {
        query("UPDATE telegram_accounts SET status = $2, updated_at = NOW() WHERE phone = $1")
            .bind(phone)
            .bind(status.as_i32())
            .execute(&*self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn deactivate(&self, phone: &str) -> DomainResult<()> {
        query(
            "UPDATE telegram_accounts SET is_active = FALSE, status = $2, updated_at = NOW() \
             WHERE phone = $1",
        )
        .bind(phone)
        .bind(AccountStatus::Banned.as_i32())
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn mark_password_changed(&self, phone: &str) -> DomainResult<()> {
        query(
            "UPDATE telegram_accounts SET is_password_changed = TRUE, updated_at = NOW() \
             WHERE phone = $1",
        )
        .bind(phone)
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn list_sendable(&self, cap: i32) -> DomainResult<Vec<TelegramAccount>> {
        let rows = query_as::<_, DbTelegramAccount>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM telegram_accounts
            WHERE is_active = TRUE AND private_count < $1
            ORDER BY created_at
            "#,
        ))
        .bind(cap)
        .fetch_all(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        rows.into_iter()
            .map(DbTelegramAccount::into_domain)
            .collect()
    }

    async fn list_page(&self, page: u32, page_size: u32) -> DomainResult<Vec<TelegramAccount>> {
        let limit = page_size as i64;
        let offset = (page.max(1) - 1) as i64 * page_size as i64;
        let rows = query_as::<_, DbTelegramAccount>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM telegram_accounts
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        rows.into_iter()
            .map(DbTelegramAccount::into_domain)
            .collect()
    }

    async fn search_by_phone(&self, phone: &str) -> DomainResult<Vec<TelegramAccount>> {
        let rows = query_as::<_, DbTelegramAccount>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM telegram_accounts
            WHERE phone LIKE '%' || $1 || '%'
            ORDER BY created_at DESC
            "#,
        ))
        .bind(phone)
        .fetch_all(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        rows.into_iter()
            .map(DbTelegramAccount::into_domain)
            .collect()
    }

    async fn delete_by_id(&self, id: Uuid) -> DomainResult<()> {
        query("DELETE FROM telegram_accounts WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn remaining_capacity(&self, cap: i32) -> DomainResult<i64> {
        let remaining: i64 = query_scalar(
            r#"
            SELECT COALESCE(SUM(GREATEST($1 - private_count, 0)), 0)
            FROM telegram_accounts
            WHERE is_active = TRUE
            "#,
        )
        .bind(cap)
        .fetch_one(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(remaining)
    }

    async fn reset_stale_counters(&self, older_than: Duration) -> DomainResult<u64> {
        let result = query(
            r#"
            UPDATE telegram_accounts
            SET private_count = 0, last_reset_at = NOW(), updated_at = NOW()
            WHERE private_count > 0
              AND (last_reset_at IS NULL OR last_reset_at < NOW() - make_interval(secs => $1))
            "#,
        )
        .bind(older_than.num_seconds() as f64)
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}
