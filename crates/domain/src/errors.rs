//! 领域模型错误定义
//!
//! 定义了系统中所有可能的错误类型，提供清晰的错误上下文。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 账号不存在
    #[error("账号不存在: {phone}")]
    AccountNotFound { phone: String },

    /// 设置项缺失
    #[error("设置项缺失: {key}，请先在后台配置")]
    SettingMissing { key: String },

    /// 资源已存在错误
    #[error("资源已存在: {resource_type} {identifier}")]
    ResourceAlreadyExists {
        resource_type: String,
        identifier: String,
    },

    /// 验证错误
    #[error("验证失败: {field}: {message}")]
    ValidationError { field: String, message: String },

    /// 数据库错误
    #[error("数据库错误: {message}")]
    DatabaseError { message: String },
}

impl DomainError {
    /// 创建账号不存在错误
    pub fn account_not_found(phone: impl Into<String>) -> Self {
        Self::AccountNotFound {
            phone: phone.into(),
        }
    }

    /// 创建设置项缺失错误
    pub fn setting_missing(key: impl Into<String>) -> Self {
        Self::SettingMissing { key: key.into() }
    }

    /// 创建资源已存在错误
    pub fn resource_already_exists(
        resource_type: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self::ResourceAlreadyExists {
            resource_type: resource_type.into(),
            identifier: identifier.into(),
        }
    }

    /// 创建验证错误
    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建数据库错误
    pub fn database_error(message: impl Into<String>) -> Self {
        Self::DatabaseError {
            message: message.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
