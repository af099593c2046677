//! 测试替身：内存 Repository 与假协议客户端

#![allow(dead_code)]

use application::telegram::{
    AuthHandshake, AuthParams, AuthorizationUpdate, InboundMessage, LogConfig, SelfProfile,
    TelegramConnection, TelegramConnector, TelegramError, TelegramResult, TextLinkSpan,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use domain::{
    AccountProfile, AccountRepository, AccountStatus, ClientSetting, ContactRepository,
    ContactedChat, DomainError, DomainResult, SettingsRepository, TelegramAccount,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

/// 测试日志输出；级别由 RUST_LOG 控制，重复初始化静默忽略
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// 假协议客户端

/// 测试侧持有的握手对端：读会话提交的输入、发认证状态
pub struct AuthDriver {
    pub phone_rx: mpsc::Receiver<String>,
    pub code_rx: mpsc::Receiver<String>,
    pub password_rx: mpsc::Receiver<String>,
    pub state_tx: mpsc::Sender<AuthorizationUpdate>,
}

pub struct FakeConnector {
    auto_ready: bool,
    drivers: Mutex<HashMap<String, AuthDriver>>,
    connections: Mutex<HashMap<String, Arc<FakeConnection>>>,
    auth_params: Mutex<Vec<AuthParams>>,
}

impl FakeConnector {
    /// 握手一发起就直接进入 Ready，适合只关心登录后行为的测试
    pub fn auto_ready() -> Arc<Self> {
        Arc::new(Self {
            auto_ready: true,
            drivers: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            auth_params: Mutex::new(Vec::new()),
        })
    }

    /// 认证状态完全由测试驱动
    pub fn manual() -> Arc<Self> {
        Arc::new(Self {
            auto_ready: false,
            drivers: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            auth_params: Mutex::new(Vec::new()),
        })
    }

    /// 取走某手机号的握手对端
    pub fn take_driver(&self, phone: &str) -> AuthDriver {
        self.drivers
            .lock()
            .unwrap()
            .remove(phone)
            .expect("握手尚未发起")
    }

    /// 该手机号的连接（不存在则创建），测试用它预置行为、检查调用
    pub fn connection(&self, phone: &str) -> Arc<FakeConnection> {
        self.connections
            .lock()
            .unwrap()
            .entry(phone.to_string())
            .or_insert_with(|| Arc::new(FakeConnection::new()))
            .clone()
    }

    pub fn last_auth_params(&self) -> Option<AuthParams> {
        self.auth_params.lock().unwrap().last().cloned()
    }

    /// 发起过的握手次数
    pub fn auth_count(&self) -> usize {
        self.auth_params.lock().unwrap().len()
    }
}

#[async_trait]
impl TelegramConnector for FakeConnector {
    async fn begin_authorization(&self, params: AuthParams) -> TelegramResult<AuthHandshake> {
        let (phone_tx, phone_rx) = mpsc::channel(4);
        let (code_tx, code_rx) = mpsc::channel(1);
        let (password_tx, password_rx) = mpsc::channel(1);
        let (state_tx, state_rx) = mpsc::channel(8);

        if self.auto_ready {
            let _ = state_tx.send(AuthorizationUpdate::Ready).await;
        }
        self.drivers.lock().unwrap().insert(
            params.phone.clone(),
            AuthDriver {
                phone_rx,
                code_rx,
                password_rx,
                state_tx,
            },
        );
        self.auth_params.lock().unwrap().push(params);

        Ok(AuthHandshake {
            phone_input: phone_tx,
            code_input: code_tx,
            password_input: password_tx,
            state_events: state_rx,
        })
    }

    async fn connect(
        &self,
        phone: &str,
        _log: LogConfig,
    ) -> TelegramResult<Arc<dyn TelegramConnection>> {
        Ok(self.connection(phone))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub text: String,
    pub span: TextLinkSpan,
    pub url: String,
}

pub struct FakeConnection {
    chat_ids: Mutex<HashMap<String, i64>>,
    next_chat_id: AtomicI64,
    /// 置位后风控探测会读到 4 行回复键盘
    pub banned: AtomicBool,
    fail_resolve: Mutex<HashSet<String>>,
    fail_send: Mutex<HashSet<i64>>,
    pub sent: Mutex<Vec<SentMessage>>,
    pub commands: Mutex<Vec<(i64, String)>>,
    pub credential_changes: Mutex<Vec<(String, String)>>,
    pub closed: AtomicBool,
    pub logged_out: AtomicBool,
}

impl FakeConnection {
    pub fn new() -> Self {
        Self {
            chat_ids: Mutex::new(HashMap::new()),
            next_chat_id: AtomicI64::new(1000),
            banned: AtomicBool::new(false),
            fail_resolve: Mutex::new(HashSet::new()),
            fail_send: Mutex::new(HashSet::new()),
            sent: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            credential_changes: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            logged_out: AtomicBool::new(false),
        }
    }

    /// 指定用户名解析失败
    pub fn fail_resolve(&self, username: &str) {
        self.fail_resolve.lock().unwrap().insert(username.to_string());
    }

    /// 指定会话发送失败
    pub fn fail_send_to(&self, chat_id: i64) {
        self.fail_send.lock().unwrap().insert(chat_id);
    }

    /// 预置用户名到 ChatID 的映射
    pub fn register_chat(&self, username: &str, chat_id: i64) {
        self.chat_ids
            .lock()
            .unwrap()
            .insert(username.to_string(), chat_id);
    }

    pub fn sent_usernames_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl TelegramConnection for FakeConnection {
    async fn resolve_public_chat(&self, username: &str) -> TelegramResult<i64> {
        if self.fail_resolve.lock().unwrap().contains(username) {
            return Err(TelegramError::ChatNotFound(username.to_string()));
        }
        let mut chat_ids = self.chat_ids.lock().unwrap();
        let chat_id = *chat_ids
            .entry(username.to_string())
            .or_insert_with(|| self.next_chat_id.fetch_add(1, Ordering::SeqCst));
        Ok(chat_id)
    }

    async fn send_formatted_message(
        &self,
        chat_id: i64,
        text: &str,
        span: TextLinkSpan,
        url: &str,
    ) -> TelegramResult<()> {
        if self.fail_send.lock().unwrap().contains(&chat_id) {
            return Err(TelegramError::Transport("发送被拒绝".to_string()));
        }
        self.sent.lock().unwrap().push(SentMessage {
            chat_id,
            text: text.to_string(),
            span,
            url: url.to_string(),
        });
        Ok(())
    }

    async fn send_plain_command(&self, chat_id: i64, text: &str) -> TelegramResult<()> {
        self.commands
            .lock()
            .unwrap()
            .push((chat_id, text.to_string()));
        Ok(())
    }

    async fn fetch_recent_messages(
        &self,
        _chat_id: i64,
        limit: i32,
    ) -> TelegramResult<Vec<InboundMessage>> {
        let keyboard_rows = if self.banned.load(Ordering::SeqCst) {
            Some(4)
        } else {
            None
        };
        Ok(vec![
            InboundMessage {
                id: 1,
                text: "Good news, no limits are currently applied to your account.".to_string(),
                reply_keyboard_rows: keyboard_rows,
            },
            InboundMessage {
                id: 2,
                text: "/start".to_string(),
                reply_keyboard_rows: None,
            },
        ]
        .into_iter()
        .take(limit.max(0) as usize)
        .collect())
    }

    async fn change_credential(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> TelegramResult<()> {
        self.credential_changes
            .lock()
            .unwrap()
            .push((old_password.to_string(), new_password.to_string()));
        Ok(())
    }

    async fn fetch_self_profile(&self) -> TelegramResult<SelfProfile> {
        Ok(SelfProfile {
            user_id: 77,
            first_name: "测试".to_string(),
            last_name: "账号".to_string(),
            username: "test_account".to_string(),
            is_premium: false,
        })
    }

    async fn log_out(&self) -> TelegramResult<()> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> TelegramResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 内存 Repository

pub fn make_account(phone: &str) -> TelegramAccount {
    TelegramAccount {
        id: Uuid::new_v4(),
        phone: phone.to_string(),
        app_id: "12345".to_string(),
        app_hash: "hash".to_string(),
        database_path: format!(".tdlibs/{}", phone.trim_start_matches('+')),
        first_name: String::new(),
        last_name: String::new(),
        username: String::new(),
        tg_user_id: 0,
        is_premium: false,
        is_active: true,
        status: AccountStatus::Created,
        is_password_changed: false,
        private_count: 0,
        last_reset_at: None,
        last_login_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct InMemoryAccounts {
    accounts: Mutex<Vec<TelegramAccount>>,
}

impl InMemoryAccounts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(accounts: Vec<TelegramAccount>) -> Arc<Self> {
        Arc::new(Self {
            accounts: Mutex::new(accounts),
        })
    }

    pub fn insert(&self, account: TelegramAccount) {
        self.accounts.lock().unwrap().push(account);
    }

    pub fn get(&self, phone: &str) -> Option<TelegramAccount> {
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|account| account.phone == phone)
            .cloned()
    }

    /// 条件递增，返回是否抢到配额
    pub fn try_increment(&self, phone: &str, cap: i32) -> bool {
        let mut accounts = self.accounts.lock().unwrap();
        match accounts.iter_mut().find(|account| account.phone == phone) {
            Some(account) if account.private_count < cap => {
                account.private_count += 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccounts {
    async fn get_or_create(
        &self,
        phone: &str,
        app_id: &str,
        app_hash: &str,
        database_path: &str,
    ) -> DomainResult<TelegramAccount> {
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(existing) = accounts.iter().find(|account| account.phone == phone) {
            return Ok(existing.clone());
        }
        let mut account = make_account(phone);
        account.app_id = app_id.to_string();
        account.app_hash = app_hash.to_string();
        account.database_path = database_path.to_string();
        accounts.push(account.clone());
        Ok(account)
    }

    async fn find_by_phone(&self, phone: &str) -> DomainResult<Option<TelegramAccount>> {
        Ok(self.get(phone))
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<TelegramAccount>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|account| account.id == id)
            .cloned())
    }

    async fn update_profile(&self, phone: &str, profile: &AccountProfile) -> DomainResult<()> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .iter_mut()
            .find(|account| account.phone == phone)
            .ok_or_else(|| DomainError::account_not_found(phone))?;
        account.first_name = profile.first_name.clone();
        account.last_name = profile.last_name.clone();
        account.username = profile.username.clone();
        account.tg_user_id = profile.tg_user_id;
        account.is_premium = profile.is_premium;
        account.is_active = true;
        account.status = AccountStatus::Ready;
        account.last_login_at = Some(Utc::now());
        Ok(())
    }

    async fn set_status(&self, phone: &str, status: AccountStatus) -> DomainResult<()> {
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(account) = accounts.iter_mut().find(|account| account.phone == phone) {
            account.status = status;
        }
        Ok(())
    }

    async fn deactivate(&self, phone: &str) -> DomainResult<()> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .iter_mut()
            .find(|account| account.phone == phone)
            .ok_or_else(|| DomainError::account_not_found(phone))?;
        account.is_active = false;
        account.status = AccountStatus::Banned;
        Ok(())
    }

    async fn mark_password_changed(&self, phone: &str) -> DomainResult<()> {
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(account) = accounts.iter_mut().find(|account| account.phone == phone) {
            account.is_password_changed = true;
        }
        Ok(())
    }

    async fn list_sendable(&self, cap: i32) -> DomainResult<Vec<TelegramAccount>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .filter(|account| account.is_active && account.private_count < cap)
            .cloned()
            .collect())
    }

    async fn list_page(&self, page: u32, page_size: u32) -> DomainResult<Vec<TelegramAccount>> {
        let accounts = self.accounts.lock().unwrap();
        let offset = (page.max(1) - 1) as usize * page_size as usize;
        Ok(accounts
            .iter()
            .skip(offset)
            .take(page_size as usize)
            .cloned()
            .collect())
    }

    async fn search_by_phone(&self, phone: &str) -> DomainResult<Vec<TelegramAccount>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .filter(|account| account.phone.contains(phone))
            .cloned()
            .collect())
    }

    async fn delete_by_id(&self, id: Uuid) -> DomainResult<()> {
        self.accounts
            .lock()
            .unwrap()
            .retain(|account| account.id != id);
        Ok(())
    }

    async fn remaining_capacity(&self, cap: i32) -> DomainResult<i64> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .filter(|account| account.is_active)
            .map(|account| i64::from((cap - account.private_count).max(0)))
            .sum())
    }

    async fn reset_stale_counters(&self, older_than: Duration) -> DomainResult<u64> {
        let mut accounts = self.accounts.lock().unwrap();
        let now = Utc::now();
        let mut reset = 0;
        for account in accounts.iter_mut() {
            let stale = account
                .last_reset_at
                .map(|at| now - at > older_than)
                .unwrap_or(true);
            if account.private_count > 0 && stale {
                account.private_count = 0;
                account.last_reset_at = Some(now);
                reset += 1;
            }
        }
        Ok(reset)
    }
}

pub struct InMemoryContacts {
    accounts: Arc<InMemoryAccounts>,
    rows: Mutex<Vec<ContactedChat>>,
}

impl InMemoryContacts {
    pub fn new(accounts: Arc<InMemoryAccounts>) -> Arc<Self> {
        Arc::new(Self {
            accounts,
            rows: Mutex::new(Vec::new()),
        })
    }

    pub fn insert(&self, account_id: Uuid, username: &str, chat_id: i64) {
        self.rows.lock().unwrap().push(ContactedChat {
            id: Uuid::new_v4(),
            account_id,
            username: username.to_string(),
            chat_id,
            created_at: Utc::now(),
        });
    }

    pub fn usernames(&self) -> Vec<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|row| row.username.clone())
            .collect()
    }
}

#[async_trait]
impl ContactRepository for InMemoryContacts {
    async fn find_by_username(&self, username: &str) -> DomainResult<Option<ContactedChat>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.username == username)
            .cloned())
    }

    async fn list_existing(&self, usernames: &[String]) -> DomainResult<Vec<String>> {
        let rows = self.rows.lock().unwrap();
        Ok(usernames
            .iter()
            .filter(|username| rows.iter().any(|row| &row.username == *username))
            .cloned()
            .collect())
    }

    async fn commit_dispatch(
        &self,
        account_id: Uuid,
        phone: &str,
        username: &str,
        chat_id: i64,
        cap: i32,
    ) -> DomainResult<bool> {
        if !self.accounts.try_increment(phone, cap) {
            return Ok(false);
        }
        self.insert(account_id, username, chat_id);
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemorySettings {
    map: Mutex<HashMap<String, ClientSetting>>,
}

impl InMemorySettings {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 预置 App 凭据与私信上限
    pub fn with_defaults(daily_cap: &str) -> Arc<Self> {
        let settings = Self::new();
        settings.put(domain::setting_keys::APP_ID, "12345");
        settings.put(domain::setting_keys::APP_HASH, "hash");
        settings.put(domain::setting_keys::DAILY_CAP, daily_cap);
        settings
    }

    pub fn put(&self, key: &str, value: &str) {
        let now = Utc::now();
        self.map.lock().unwrap().insert(
            key.to_string(),
            ClientSetting {
                id: Uuid::new_v4(),
                key: key.to_string(),
                value: value.to_string(),
                description: String::new(),
                created_at: now,
                updated_at: now,
            },
        );
    }
}

#[async_trait]
impl SettingsRepository for InMemorySettings {
    async fn get(&self, key: &str) -> DomainResult<Option<ClientSetting>> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }

    async fn get_or_init(
        &self,
        key: &str,
        default_value: &str,
        _description: &str,
    ) -> DomainResult<ClientSetting> {
        if let Some(existing) = self.map.lock().unwrap().get(key) {
            return Ok(existing.clone());
        }
        self.put(key, default_value);
        Ok(self
            .map
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .expect("刚写入的设置"))
    }

    async fn set(&self, key: &str, value: &str, _description: &str) -> DomainResult<()> {
        self.put(key, value);
        Ok(())
    }
}
