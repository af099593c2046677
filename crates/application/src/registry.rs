//! 会话注册表
//!
//! 以手机号为键集中管理所有 `AccountSession`。同一手机号同一时刻最多
//! 一个在册会话：注册时如已有旧会话，旧会话被换出并异步关闭（不等待
//! 关闭完成，需要确定性的等待可以用旧会话的 `closed_signal`）。
//! 后台清理任务定期回收两类会话：
//! - 僵尸会话：创建后一直没有登录成功的（验证码没填、填错后放弃等）
//! - 闲置会话：登录成功但长时间没有任何操作的

use chrono::Utc;
use config::AppConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::errors::SessionError;
use crate::session::{AccountSession, AuthPhase, SessionDependencies};
use crate::task::spawn_named;

/// 会话注册表
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<AccountSession>>>,
    deps: SessionDependencies,
    config: AppConfig,
}

impl SessionRegistry {
    pub fn new(deps: SessionDependencies, config: AppConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            deps,
            config,
        })
    }

    /// 获取已存在的会话，不创建
    pub async fn get(&self, phone: &str) -> Option<Arc<AccountSession>> {
        self.sessions.read().await.get(phone).cloned()
    }

    /// 注册会话；同键旧会话被换出并异步关闭
    pub async fn register(&self, session: Arc<AccountSession>) {
        let phone = session.phone().to_string();
        let replaced = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(phone.clone(), session)
        };
        if let Some(old) = replaced {
            info!(phone = %phone, "会话被替换，异步关闭旧会话");
            Self::close_in_background(old);
        }
    }

    /// 摘除会话但不关闭；调用方已自行关闭（登出流程）
    pub async fn remove(&self, phone: &str) -> Option<Arc<AccountSession>> {
        self.sessions.write().await.remove(phone)
    }

    /// 创建并注册新会话；已有旧会话时无条件替换（重新登录）
    pub async fn create_and_register(
        &self,
        phone: &str,
    ) -> Result<Arc<AccountSession>, SessionError> {
        let session = AccountSession::new(phone, self.deps.clone(), &self.config);
        session.initialize().await?;
        self.register(Arc::clone(&session)).await;
        Ok(session)
    }

    /// 获取或创建会话（创建去重）
    ///
    /// 已存在且未进入终态的会话直接复用；不存在或已关闭时创建新会话。
    /// 整个过程持有写锁，同一手机号的并发调用只会发起一次握手。
    pub async fn get_or_init(&self, phone: &str) -> Result<Arc<AccountSession>, SessionError> {
        let mut sessions = self.sessions.write().await;

        if let Some(existing) = sessions.get(phone) {
            if existing.phase().await != AuthPhase::Closed {
                return Ok(Arc::clone(existing));
            }
        }

        let session = AccountSession::new(phone, self.deps.clone(), &self.config);
        session.initialize().await?;
        if let Some(old) = sessions.insert(phone.to_string(), Arc::clone(&session)) {
            Self::close_in_background(old);
        }
        info!(phone, total = sessions.len(), "会话已注册");
        Ok(session)
    }

    pub async fn contains(&self, phone: &str) -> bool {
        self.sessions.read().await.contains_key(phone)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// 启动后台清理任务
    pub fn start_eviction(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let interval = self.config.session.eviction_interval();
        spawn_named("会话注册表清理", async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                this.evict_expired().await;
            }
        });
    }

    /// 单轮清理；清理期间持有写锁，新会话的注册会等本轮结束
    pub async fn evict_expired(&self) {
        let pending_timeout = chrono::Duration::from_std(self.config.session.pending_timeout())
            .unwrap_or_else(|_| chrono::Duration::minutes(15));
        let idle_timeout = chrono::Duration::from_std(self.config.session.idle_timeout())
            .unwrap_or_else(|_| chrono::Duration::minutes(30));
        let now = Utc::now();

        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();
        for (phone, session) in sessions.iter() {
            let reason = if !session.is_ready().await {
                if now - session.created_at() > pending_timeout {
                    Some("僵尸会话")
                } else {
                    None
                }
            } else if now - session.last_access().await > idle_timeout {
                Some("闲置会话")
            } else {
                None
            };
            if let Some(reason) = reason {
                info!(phone = %phone, reason, "回收会话");
                expired.push(phone.clone());
            }
        }
        for phone in expired {
            if let Some(session) = sessions.remove(&phone) {
                // 关闭失败只记日志，条目照常摘除
                Self::close_in_background(session);
            }
        }
    }

    fn close_in_background(session: Arc<AccountSession>) {
        let phone = session.phone().to_string();
        spawn_named(format!("Phone:{} 关闭会话", phone), async move {
            if let Err(err) = session.close().await {
                warn!(phone = %session.phone(), error = %err, "关闭会话失败");
            }
        });
    }
}
