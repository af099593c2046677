//! 应用层实现。
//!
//! 这里是系统的核心：单账号会话的认证状态机、进程内会话注册表、
//! 带抖动的限流器，以及驱动批量私信的调度器。对外部协议客户端
//! （tdlib 之类）只依赖 `telegram` 模块定义的端口。

pub mod dispatcher;
pub mod errors;
pub mod limiter;
pub mod registry;
pub mod services;
pub mod session;
pub mod task;
pub mod telegram;

pub use dispatcher::{BulkDispatcher, DispatchRequest, DispatcherDependencies};
pub use errors::{ApplicationError, ApplicationResult, DispatchError, SessionError};
pub use limiter::JitterLimiter;
pub use registry::SessionRegistry;
pub use services::{AccountItem, AccountService, AccountServiceDependencies};
pub use session::{AccountSession, AuthPhase, SessionDependencies};
pub use task::spawn_named;
pub use telegram::{
    AuthHandshake, AuthParams, AuthorizationUpdate, InboundMessage, LogConfig, SelfProfile,
    TelegramConnection, TelegramConnector, TelegramError, TelegramResult, TextLinkSpan,
};
