//! 电报协议客户端端口定义
//!
//! 系统不直接依赖任何具体的协议客户端库（tdlib 绑定等），而是通过
//! 这里的能力集与之解耦：认证握手以自有的值对象暴露四条类型化通道，
//! 连接则以 trait 对象的形式注入。

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// 协议客户端错误
#[derive(Debug, Error, Clone)]
pub enum TelegramError {
    /// 认证握手失败
    #[error("认证失败: {0}")]
    Authorization(String),

    /// 远端调用失败（网络、协议层）
    #[error("传输错误: {0}")]
    Transport(String),

    /// 用户名无法解析为会话
    #[error("无法解析用户名: {0}")]
    ChatNotFound(String),
}

/// 协议客户端结果类型
pub type TelegramResult<T> = Result<T, TelegramError>;

/// 发起认证握手所需的参数
#[derive(Debug, Clone)]
pub struct AuthParams {
    pub phone: String,
    pub api_id: String,
    pub api_hash: String,
    pub database_directory: String,
    pub files_directory: String,
    pub system_language_code: String,
    pub device_model: String,
    pub system_version: String,
    pub application_version: String,
}

/// 客户端日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub path: String,
    pub max_file_size: i64,
    pub verbosity: i32,
}

/// 认证状态通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationUpdate {
    /// 需要手机号
    WaitPhoneNumber,
    /// 需要验证码
    WaitCode,
    /// 需要二步验证密码
    WaitPassword,
    /// 登录成功
    Ready,
    /// 连接已关闭，之后不再有任何通知
    Closed,
    /// 其他暂不处理的状态
    Other(String),
}

/// 认证握手值对象
///
/// 会话从创建起就完整持有四条通道；输入通道仅在会话创建到
/// `Closed` 通知之间有效。
pub struct AuthHandshake {
    /// 手机号通道
    pub phone_input: mpsc::Sender<String>,
    /// 验证码通道
    pub code_input: mpsc::Sender<String>,
    /// 二步密码通道
    pub password_input: mpsc::Sender<String>,
    /// 状态通道
    pub state_events: mpsc::Receiver<AuthorizationUpdate>,
}

/// 登录账号自己的资料
#[derive(Debug, Clone)]
pub struct SelfProfile {
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub is_premium: bool,
}

/// 从会话历史里读到的一条消息
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: i64,
    pub text: String,
    /// 消息携带的回复键盘行数（没有键盘则为 None）
    pub reply_keyboard_rows: Option<usize>,
}

/// 超链接实体的位置，按 UTF-16 码元计数（电报的实体偏移约定）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLinkSpan {
    pub offset: i32,
    pub length: i32,
}

/// 协议客户端工厂：发起握手、建立连接
#[async_trait]
pub trait TelegramConnector: Send + Sync {
    /// 发起认证握手，返回会话自持的握手值对象
    async fn begin_authorization(&self, params: AuthParams) -> TelegramResult<AuthHandshake>;

    /// 建立连接；在对应握手进入 Ready 状态前不会返回
    async fn connect(
        &self,
        phone: &str,
        log: LogConfig,
    ) -> TelegramResult<Arc<dyn TelegramConnection>>;
}

/// 一条已建立的协议客户端连接
#[async_trait]
pub trait TelegramConnection: Send + Sync {
    /// 按公开用户名解析 ChatID
    async fn resolve_public_chat(&self, username: &str) -> TelegramResult<i64>;

    /// 发送带超链接实体的文本消息
    async fn send_formatted_message(
        &self,
        chat_id: i64,
        text: &str,
        span: TextLinkSpan,
        url: &str,
    ) -> TelegramResult<()>;

    /// 发送纯文本命令（例如 /start）
    async fn send_plain_command(&self, chat_id: i64, text: &str) -> TelegramResult<()>;

    /// 读取会话最近的若干条消息
    async fn fetch_recent_messages(
        &self,
        chat_id: i64,
        limit: i32,
    ) -> TelegramResult<Vec<InboundMessage>>;

    /// 更改二步验证密码
    async fn change_credential(&self, old_password: &str, new_password: &str)
        -> TelegramResult<()>;

    /// 拉取登录账号自己的资料
    async fn fetch_self_profile(&self) -> TelegramResult<SelfProfile>;

    /// 远端登出（同时作废本地会话数据）
    async fn log_out(&self) -> TelegramResult<()>;

    /// 关闭连接
    async fn close(&self) -> TelegramResult<()>;
}
