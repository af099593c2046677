//! 应用层错误定义
//!
//! 按 "输入错误 / 超时 / 传输错误 / 封禁 / 配额" 划分错误类别。
//! 配额被并发抢光不是错误（见 `ContactRepository::commit_dispatch`）。

use crate::telegram::TelegramError;
use domain::errors::DomainError;
use thiserror::Error;

/// 应用层错误类型
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 会话相关错误
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),

    /// 批量私信相关错误
    #[error("私信任务错误: {0}")]
    Dispatch(#[from] DispatchError),

    /// 领域层错误
    #[error("领域错误: {0}")]
    Domain(#[from] DomainError),

    /// 未找到资源
    #[error("资源未找到: {0}")]
    NotFound(String),

    /// 验证错误
    #[error("验证失败: {0}")]
    Validation(String),
}

/// 应用层结果类型
pub type ApplicationResult<T> = Result<T, ApplicationError>;

/// 会话错误
#[derive(Debug, Error)]
pub enum SessionError {
    /// 会话尚未初始化或输入通道已失效
    #[error("客户端 Phone:{phone} 未初始化")]
    NotInitialized { phone: String },

    /// 提交验证码/二步密码超时；调用方需要重新提交
    #[error("客户端 Phone:{phone} 提交{input}超时")]
    SubmitTimeout { phone: String, input: String },

    /// 风控探测判定账号已被封禁（账号已被停用）
    #[error("客户端 Phone:{phone} 账户已被封禁")]
    AccountBanned { phone: String },

    /// 外部客户端调用失败
    #[error("客户端 Phone:{phone} {op}错误: {source}")]
    Transport {
        phone: String,
        op: String,
        #[source]
        source: TelegramError,
    },

    /// 持久化失败
    #[error("领域错误: {0}")]
    Store(#[from] DomainError),
}

/// 批量私信错误
#[derive(Debug, Error)]
pub enum DispatchError {
    /// 已有一次批量私信在进行中
    #[error("正在发送，请等待本次发送结束")]
    Busy,

    /// 消息内容里找不到要加链接的关键字
    #[error("消息内容中未找到关键字: {0}")]
    KeywordNotFound(String),

    /// 没有启用且次数未满的账号
    #[error("没有可私信的账号，请新增账号或等待次数刷新")]
    NoAccountsAvailable,

    /// 持久化失败
    #[error("领域错误: {0}")]
    Store(#[from] DomainError),
}
