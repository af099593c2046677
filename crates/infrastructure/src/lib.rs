//! 基础设施层实现
//!
//! 提供持久化相关的具体实现：PostgreSQL 连接池与建表、各 Repository
//! 的 sqlx 实现、私信计数的周期重置任务。

pub mod db;
pub mod tasks;

pub use db::repositories::{
    PostgresAccountRepository, PostgresContactRepository, PostgresSettingsRepository,
};
pub use db::{Db, DbPool};
pub use tasks::start_counter_reset_task;
