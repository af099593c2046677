//! 账号会话
//!
//! 一个 `AccountSession` 对应一个手机号到外部协议客户端的一条认证
//! （或认证中）连接。外部客户端通过状态通道异步驱动认证状态机，
//! 会话把它桥接成可同步提交的输入：验证码、二步密码由外部调用方
//! 通过 `submit_code` / `submit_password` 写入，手机号这一步则由会话
//! 自动回填，不需要外部输入。
//!
//! 连接建立是一次性的就绪信号（watch 通道）：`Ready` 状态触发后台
//! 建连，所有需要连接的操作都等待该信号，而不是轮询判空。

use chrono::{DateTime, Utc};
use config::{AppConfig, DispatchConfig, SessionConfig, TelegramConfig};
use domain::{setting_keys, AccountProfile, AccountRepository, AccountStatus, ContactRepository,
    DomainError, SettingsRepository};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::errors::SessionError;
use crate::task::spawn_named;
use crate::telegram::{
    AuthParams, AuthorizationUpdate, LogConfig, SelfProfile, TelegramConnection,
    TelegramConnector, TelegramError, TextLinkSpan,
};

/// 认证阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// 已创建，尚未发起握手
    Created,
    /// 等待手机号（会话自动回填）
    AwaitingPhone,
    /// 等待验证码
    AwaitingCode,
    /// 等待二步密码
    AwaitingPassword,
    /// 登录成功
    Ready,
    /// 已关闭，终态
    Closed,
}

/// 握手输入端口；仅在会话创建到 Closed 通知之间有效
struct HandshakeInputs {
    phone: mpsc::Sender<String>,
    code: mpsc::Sender<String>,
    password: mpsc::Sender<String>,
}

/// 会话可变状态，统一由会话内部锁保护
struct SessionShared {
    phase: AuthPhase,
    authenticated: bool,
    last_access: DateTime<Utc>,
    inputs: Option<HandshakeInputs>,
}

/// 会话的外部依赖
#[derive(Clone)]
pub struct SessionDependencies {
    pub connector: Arc<dyn TelegramConnector>,
    pub accounts: Arc<dyn AccountRepository>,
    pub contacts: Arc<dyn ContactRepository>,
    pub settings: Arc<dyn SettingsRepository>,
}

/// 账号会话
pub struct AccountSession {
    phone: String,
    created_at: DateTime<Utc>,
    shared: RwLock<SessionShared>,
    /// 连接就绪信号；建连任务恰好写入一次，Close 时清空
    connection: watch::Sender<Option<Arc<dyn TelegramConnection>>>,
    /// 关闭完成信号，供被替换的旧会话的清理方观测
    closed: watch::Sender<bool>,
    close_once: AtomicBool,
    deps: SessionDependencies,
    session_cfg: SessionConfig,
    telegram_cfg: TelegramConfig,
    dispatch_cfg: DispatchConfig,
}

impl AccountSession {
    /// 创建会话（未初始化，尚未发起握手）
    pub fn new(phone: impl Into<String>, deps: SessionDependencies, config: &AppConfig) -> Arc<Self> {
        let (connection, _) = watch::channel(None);
        let (closed, _) = watch::channel(false);
        Arc::new(Self {
            phone: phone.into(),
            created_at: Utc::now(),
            shared: RwLock::new(SessionShared {
                phase: AuthPhase::Created,
                authenticated: false,
                last_access: Utc::now(),
                inputs: None,
            }),
            connection,
            closed,
            close_once: AtomicBool::new(false),
            deps,
            session_cfg: config.session.clone(),
            telegram_cfg: config.telegram.clone(),
            dispatch_cfg: config.dispatch.clone(),
        })
    }

    /// 初始化会话：读取 App 凭据、落库账号记录、发起握手并启动状态监听
    pub async fn initialize(self: &Arc<Self>) -> Result<(), SessionError> {
        let app_id = self.require_setting(setting_keys::APP_ID).await?;
        let app_hash = self.require_setting(setting_keys::APP_HASH).await?;
        let path = self.storage_path();

        self.deps
            .accounts
            .get_or_create(&self.phone, &app_id, &app_hash, &path)
            .await?;

        let params = AuthParams {
            phone: self.phone.clone(),
            api_id: app_id,
            api_hash: app_hash,
            database_directory: format!("{}/database", path),
            files_directory: format!("{}/files", path),
            system_language_code: self.telegram_cfg.system_language_code.clone(),
            device_model: self.telegram_cfg.device_model.clone(),
            system_version: self.telegram_cfg.system_version.clone(),
            application_version: self.telegram_cfg.application_version.clone(),
        };
        let handshake = self
            .deps
            .connector
            .begin_authorization(params)
            .await
            .map_err(|err| self.transport("发起认证", err))?;

        {
            let mut shared = self.shared.write().await;
            shared.inputs = Some(HandshakeInputs {
                phone: handshake.phone_input,
                code: handshake.code_input,
                password: handshake.password_input,
            });
            shared.phase = AuthPhase::AwaitingPhone;
        }

        let this = Arc::clone(self);
        spawn_named(format!("Phone:{} 认证状态监听", self.phone), async move {
            this.watch_auth_states(handshake.state_events).await;
        });
        Ok(())
    }

    /// 状态监听任务：消费外部客户端的认证状态通知
    async fn watch_auth_states(self: Arc<Self>, mut events: mpsc::Receiver<AuthorizationUpdate>) {
        info!(phone = %self.phone, "开始监听认证状态");
        while let Some(update) = events.recv().await {
            debug!(phone = %self.phone, state = ?update, "收到认证状态");
            match update {
                AuthorizationUpdate::WaitPhoneNumber => {
                    // 自动回填手机号，这一步不需要外部输入
                    let sender = {
                        let shared = self.shared.read().await;
                        shared.inputs.as_ref().map(|inputs| inputs.phone.clone())
                    };
                    match sender {
                        Some(sender) => {
                            if sender.send(self.phone.clone()).await.is_err() {
                                warn!(phone = %self.phone, "手机号通道已关闭");
                            }
                        }
                        None => warn!(phone = %self.phone, "输入端口已失效，无法回填手机号"),
                    }
                }
                AuthorizationUpdate::WaitCode => {
                    // 不做任何事，等待外部调用 submit_code
                    self.set_phase(AuthPhase::AwaitingCode).await;
                    self.persist_status(AccountStatus::AwaitingCode).await;
                }
                AuthorizationUpdate::WaitPassword => {
                    // 不做任何事，等待外部调用 submit_password
                    self.set_phase(AuthPhase::AwaitingPassword).await;
                    self.persist_status(AccountStatus::AwaitingPassword).await;
                }
                AuthorizationUpdate::Ready => {
                    self.set_phase(AuthPhase::Ready).await;
                    let this = Arc::clone(&self);
                    spawn_named(format!("Phone:{} 创建客户端", self.phone), async move {
                        this.materialize_connection().await;
                    });
                    return;
                }
                AuthorizationUpdate::Closed => {
                    info!(phone = %self.phone, "客户端已关闭");
                    let mut shared = self.shared.write().await;
                    shared.phase = AuthPhase::Closed;
                    shared.inputs = None;
                    return;
                }
                AuthorizationUpdate::Other(state) => {
                    debug!(phone = %self.phone, state, "未处理的认证状态");
                }
            }
        }
        info!(phone = %self.phone, "状态通道已关闭");
    }

    /// 建连任务：建立连接、拉取并落库个人资料
    async fn materialize_connection(self: Arc<Self>) {
        let log = LogConfig {
            path: format!("{}/tdlib.log", self.storage_path()),
            max_file_size: 10 * 1024 * 1024,
            verbosity: 1,
        };
        let conn = match self.deps.connector.connect(&self.phone, log).await {
            Ok(conn) => conn,
            Err(err) => {
                error!(phone = %self.phone, error = %err, "创建客户端失败");
                return;
            }
        };

        // 建连期间会话可能已被关闭：此时不发布连接，补一次关闭
        if self.close_once.load(Ordering::SeqCst) {
            info!(phone = %self.phone, "会话已关闭，丢弃迟到的连接");
            if let Err(err) = conn.close().await {
                warn!(phone = %self.phone, error = %err, "关闭客户端失败");
            }
            return;
        }

        {
            let mut shared = self.shared.write().await;
            shared.authenticated = true;
            shared.last_access = Utc::now();
        }
        let _ = self.connection.send(Some(Arc::clone(&conn)));

        let profile = match conn.fetch_self_profile().await {
            Ok(profile) => profile,
            Err(err) => {
                error!(phone = %self.phone, error = %err, "获取账户信息失败");
                return;
            }
        };
        if let Err(err) = self
            .deps
            .accounts
            .update_profile(&self.phone, &to_account_profile(&profile))
            .await
        {
            error!(phone = %self.phone, error = %err, "更新账户信息失败");
            return;
        }
        info!(phone = %self.phone, "客户端创建完成");
    }

    /// 提交验证码；等待超过配置的上限返回超时错误，调用方需重新提交
    pub async fn submit_code(&self, code: &str) -> Result<(), SessionError> {
        let sender = self.input_sender(|inputs| inputs.code.clone()).await?;
        debug!(phone = %self.phone, "提交验证码");
        self.submit_input(sender, code, "验证码").await
    }

    /// 提交二步验证密码
    pub async fn submit_password(&self, password: &str) -> Result<(), SessionError> {
        let sender = self.input_sender(|inputs| inputs.password.clone()).await?;
        debug!(phone = %self.phone, "提交二步密码");
        self.submit_input(sender, password, "二步密码").await
    }

    async fn submit_input(
        &self,
        sender: mpsc::Sender<String>,
        value: &str,
        input: &str,
    ) -> Result<(), SessionError> {
        match timeout(self.session_cfg.submit_timeout(), sender.send(value.to_string())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SessionError::NotInitialized {
                phone: self.phone.clone(),
            }),
            Err(_) => Err(SessionError::SubmitTimeout {
                phone: self.phone.clone(),
                input: input.to_string(),
            }),
        }
    }

    /// 根据用户名解析 ChatID
    ///
    /// 风控机器人固定直查外部客户端；其余用户名优先查台账缓存，
    /// 缓存未命中再查外部客户端（由调用方负责在落库时写入缓存）。
    pub async fn resolve_chat_id(&self, username: &str) -> Result<i64, SessionError> {
        self.touch().await;

        if username == self.dispatch_cfg.control_bot {
            let conn = self.wait_connection().await?;
            return conn
                .resolve_public_chat(username)
                .await
                .map_err(|err| self.transport("搜索SpamBot机器人", err));
        }

        if let Some(contact) = self.deps.contacts.find_by_username(username).await? {
            return Ok(contact.chat_id);
        }

        let conn = self.wait_connection().await?;
        conn.resolve_public_chat(username)
            .await
            .map_err(|err| self.transport(&format!("搜索公众聊天:{}", username), err))
    }

    /// 发送带超链接的文本私信；等待连接就绪后转发给外部客户端，不重试
    pub async fn send_text_with_link(
        &self,
        chat_id: i64,
        full_text: &str,
        span: TextLinkSpan,
        url: &str,
    ) -> Result<(), SessionError> {
        self.touch().await;
        let conn = self.wait_connection().await?;
        conn.send_formatted_message(chat_id, full_text, span, url)
            .await
            .map_err(|err| self.transport(&format!("向ChatID:{} 发送消息", chat_id), err))
    }

    /// 风控探测：向控制机器人发两次 /start，再读最近几条消息。
    /// 若任何一条携带恰好 4 行的回复键盘，判定账号已被封禁：
    /// 停用账号并返回封禁错误。没有该信号则视为未封禁。
    pub async fn probe_anti_abuse(&self, control_chat_id: i64) -> Result<(), SessionError> {
        let conn = self.wait_connection().await?;

        for _ in 0..2 {
            conn.send_plain_command(control_chat_id, "/start")
                .await
                .map_err(|err| self.transport("向机器人发送信息", err))?;
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        let history = conn
            .fetch_recent_messages(control_chat_id, self.dispatch_cfg.probe_history_limit)
            .await
            .map_err(|err| self.transport("获取机器人历史消息", err))?;

        for message in &history {
            if message.reply_keyboard_rows == Some(4) {
                self.deps.accounts.deactivate(&self.phone).await?;
                return Err(SessionError::AccountBanned {
                    phone: self.phone.clone(),
                });
            }
        }
        Ok(())
    }

    /// 更改二步验证密码
    pub async fn change_credential(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), SessionError> {
        let conn = self.wait_connection().await?;
        conn.change_credential(old_password, new_password)
            .await
            .map_err(|err| self.transport("更改二步密码", err))?;
        self.deps.accounts.mark_password_changed(&self.phone).await?;
        Ok(())
    }

    /// 远端登出并作废本地会话数据
    pub async fn log_out_and_invalidate(&self) -> Result<(), SessionError> {
        self.touch().await;
        let conn = self.wait_connection().await?;
        conn.log_out()
            .await
            .map_err(|err| self.transport("登出", err))
    }

    /// 关闭会话；幂等，从未建立连接时为空操作
    pub async fn close(&self) -> Result<(), SessionError> {
        if self.close_once.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let conn = self.connection.borrow().clone();
        let result = match conn {
            None => Ok(()),
            Some(conn) => conn
                .close()
                .await
                .map_err(|err| self.transport("关闭客户端", err)),
        };

        let _ = self.connection.send(None);
        {
            let mut shared = self.shared.write().await;
            shared.phase = AuthPhase::Closed;
            shared.authenticated = false;
            shared.inputs = None;
        }
        let _ = self.closed.send(true);
        result
    }

    /// 是否已登录成功
    pub async fn is_ready(&self) -> bool {
        self.shared.read().await.authenticated
    }

    /// 当前认证阶段
    pub async fn phase(&self) -> AuthPhase {
        self.shared.read().await.phase
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn last_access(&self) -> DateTime<Utc> {
        self.shared.read().await.last_access
    }

    /// 关闭完成信号；替换场景下由清理方等待
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// 等待连接就绪（一次性信号，不轮询）
    async fn wait_connection(&self) -> Result<Arc<dyn TelegramConnection>, SessionError> {
        let mut rx = self.connection.subscribe();
        loop {
            if let Some(conn) = rx.borrow_and_update().clone() {
                return Ok(conn);
            }
            rx.changed().await.map_err(|_| SessionError::NotInitialized {
                phone: self.phone.clone(),
            })?;
        }
    }

    async fn input_sender<F>(&self, pick: F) -> Result<mpsc::Sender<String>, SessionError>
    where
        F: FnOnce(&HandshakeInputs) -> mpsc::Sender<String>,
    {
        let shared = self.shared.read().await;
        shared
            .inputs
            .as_ref()
            .map(pick)
            .ok_or_else(|| SessionError::NotInitialized {
                phone: self.phone.clone(),
            })
    }

    async fn require_setting(&self, key: &str) -> Result<String, SessionError> {
        let setting = self
            .deps
            .settings
            .get(key)
            .await?
            .ok_or_else(|| DomainError::setting_missing(key))?;
        Ok(setting.value)
    }

    async fn set_phase(&self, phase: AuthPhase) {
        self.shared.write().await.phase = phase;
    }

    /// 认证阶段变化同步到账号记录，尽力而为
    async fn persist_status(&self, status: AccountStatus) {
        if let Err(err) = self.deps.accounts.set_status(&self.phone, status).await {
            warn!(phone = %self.phone, error = %err, "更新账号状态失败");
        }
    }

    async fn touch(&self) {
        self.shared.write().await.last_access = Utc::now();
    }

    fn storage_path(&self) -> String {
        format!(
            "{}/{}",
            self.telegram_cfg.base_dir,
            self.phone.replace('+', "")
        )
    }

    fn transport(&self, op: &str, source: TelegramError) -> SessionError {
        SessionError::Transport {
            phone: self.phone.clone(),
            op: op.to_string(),
            source,
        }
    }
}

fn to_account_profile(profile: &SelfProfile) -> AccountProfile {
    AccountProfile {
        first_name: profile.first_name.clone(),
        last_name: profile.last_name.clone(),
        username: profile.username.clone(),
        tg_user_id: profile.user_id,
        is_premium: profile.is_premium,
    }
}
