//! Repository sqlx 实现

pub mod account_repository_impl;
pub mod contact_repository_impl;
pub mod settings_repository_impl;

pub use account_repository_impl::PostgresAccountRepository;
pub use contact_repository_impl::PostgresContactRepository;
pub use settings_repository_impl::PostgresSettingsRepository;

use domain::errors::DomainError;

/// sqlx 错误统一转领域错误
pub(crate) fn map_sqlx_err(err: sqlx::Error) -> DomainError {
    DomainError::database_error(err.to_string())
}
