//! 批量私信调度
//!
//! 一次批量私信 = 一个后台任务跑完整个目标列表：随机选号、先探测
//! 风控再发送、每次远端调用前过限流器、发送成功后条件落库计数，
//! 配额抢光或账号封禁时轮换下一个账号。全程通过事件通道向外推送
//! 人类可读的进度文案。
//!
//! 进程级同一时刻只允许一次批量私信（single-flight）。

use config::DispatchConfig;
use domain::{setting_keys, AccountRepository, ContactRepository, DomainError, SettingsRepository,
    TelegramAccount};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::errors::{DispatchError, SessionError};
use crate::limiter::JitterLimiter;
use crate::registry::SessionRegistry;
use crate::session::AccountSession;
use crate::task::spawn_named;
use crate::telegram::TextLinkSpan;

/// 一次批量私信请求
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// 消息正文
    pub text: String,
    /// 正文中要渲染为超链接的关键字（取第一次出现）
    pub keyword: String,
    /// 超链接地址
    pub url: String,
    /// 目标用户名列表，按给定顺序处理
    pub usernames: Vec<String>,
}

/// 调度器的外部依赖
#[derive(Clone)]
pub struct DispatcherDependencies {
    pub registry: Arc<SessionRegistry>,
    pub accounts: Arc<dyn AccountRepository>,
    pub contacts: Arc<dyn ContactRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub limiter: Arc<JitterLimiter>,
}

/// 批量私信调度器
pub struct BulkDispatcher {
    deps: DispatcherDependencies,
    config: DispatchConfig,
    running: AtomicBool,
    events: mpsc::Sender<String>,
}

/// 运行期选中的账号
struct SelectedAccount {
    account: TelegramAccount,
    session: Arc<AccountSession>,
    /// 本周期已私信次数（落库计数的内存快照，发送成功后同步递增）
    count: i32,
    /// 风控探测在本轮是否已通过
    probed: bool,
}

/// single-flight 守卫；Drop 时释放，保证任何退出路径都不会卡死后续请求
struct RunGuard {
    dispatcher: Arc<BulkDispatcher>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.dispatcher.running.store(false, Ordering::SeqCst);
    }
}

impl BulkDispatcher {
    pub fn new(
        deps: DispatcherDependencies,
        config: DispatchConfig,
        events: mpsc::Sender<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            deps,
            config,
            running: AtomicBool::new(false),
            events,
        })
    }

    /// 是否有批量私信正在进行
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 发起一次批量私信
    ///
    /// 同步完成入参校验与账号池装载，失败时立即返回错误；通过后
    /// 转入后台任务执行，进度通过事件通道推送。
    pub async fn start(self: &Arc<Self>, request: DispatchRequest) -> Result<(), DispatchError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DispatchError::Busy);
        }
        let guard = RunGuard {
            dispatcher: Arc::clone(self),
        };

        let prepared = match self.prepare(&request).await {
            Ok(prepared) => prepared,
            Err(err) => {
                drop(guard);
                return Err(err);
            }
        };

        let this = Arc::clone(self);
        spawn_named("批量私信", async move {
            let _guard = guard;
            this.run(request, prepared).await;
        });
        Ok(())
    }

    /// 入参校验 + 账号池装载
    async fn prepare(&self, request: &DispatchRequest) -> Result<PreparedRun, DispatchError> {
        let span = link_span(&request.text, &request.keyword)
            .ok_or_else(|| DispatchError::KeywordNotFound(request.keyword.clone()))?;

        let cap = self.load_daily_cap().await?;
        let pool = self.deps.accounts.list_sendable(cap).await?;
        if pool.is_empty() {
            return Err(DispatchError::NoAccountsAvailable);
        }

        let contacted = self.deps.contacts.list_existing(&request.usernames).await?;
        Ok(PreparedRun {
            span,
            cap,
            pool,
            contacted,
        })
    }

    /// 后台执行整个目标列表
    async fn run(self: Arc<Self>, request: DispatchRequest, prepared: PreparedRun) {
        let PreparedRun {
            span,
            cap,
            mut pool,
            contacted,
        } = prepared;
        info!(
            targets = request.usernames.len(),
            accounts = pool.len(),
            cap,
            "开始批量私信"
        );

        let mut current: Option<SelectedAccount> = None;

        'targets: for username in &request.usernames {
            if contacted.iter().any(|existing| existing == username) {
                self.emit(format!("用户名:{} 已被私信过，跳过", username)).await;
                continue;
            }

            // 账号封禁轮换后会回到这里，用新账号重发同一个目标
            loop {
                if current.is_none() {
                    match self.pick_account(&mut pool).await {
                        Some(selected) => current = Some(selected),
                        None => {
                            self.emit("账号已用尽⚠️".to_string()).await;
                            self.finish(current).await;
                            return;
                        }
                    }
                }
                let Some(selected) = current.as_mut() else {
                    continue;
                };

                if !selected.probed {
                    match self.probe(selected).await {
                        Ok(()) => selected.probed = true,
                        Err(SessionError::AccountBanned { phone }) => {
                            self.emit(format!("账号 Phone:{} 已被封禁 ❌", phone)).await;
                            self.rotate(&mut current).await;
                            continue;
                        }
                        Err(err) => {
                            // 探测本身失败不轮换，下一个目标用同一账号重试
                            self.emit(format!("风控探测失败: {} ❌", err)).await;
                            continue 'targets;
                        }
                    }
                }

                self.deps.limiter.wait().await;

                let chat_id = match selected.session.resolve_chat_id(username).await {
                    Ok(chat_id) => chat_id,
                    Err(err) => {
                        self.emit(format!("用户名:{} 解析失败: {} ❌", username, err)).await;
                        continue 'targets;
                    }
                };
                if let Err(err) = selected
                    .session
                    .send_text_with_link(chat_id, &request.text, span, &request.url)
                    .await
                {
                    self.emit(format!("用户名:{} 私信失败: {} ❌", username, err)).await;
                    continue 'targets;
                }
                self.emit(format!("用户名:{} 私信成功 ✅", username)).await;

                let mut must_rotate = false;
                match self
                    .deps
                    .contacts
                    .commit_dispatch(
                        selected.account.id,
                        &selected.account.phone,
                        username,
                        chat_id,
                        cap,
                    )
                    .await
                {
                    Ok(true) => selected.count += 1,
                    Ok(false) => {
                        // 配额被并发抢光，换号但不重发这个目标
                        warn!(phone = %selected.account.phone, "配额已被并发占满，轮换账号");
                        must_rotate = true;
                    }
                    Err(err) => {
                        error!(phone = %selected.account.phone, error = %err, "私信落库失败");
                        must_rotate = true;
                    }
                }

                if must_rotate || selected.count >= cap {
                    self.rotate(&mut current).await;
                }
                continue 'targets;
            }
        }

        self.finish(current).await;
    }

    /// 从池中随机抽一个账号（不放回）并拿到它的会话
    async fn pick_account(&self, pool: &mut Vec<TelegramAccount>) -> Option<SelectedAccount> {
        while !pool.is_empty() {
            let index = {
                let mut rng = rand::rng();
                rng.random_range(0..pool.len())
            };
            let account = pool.swap_remove(index);
            match self.deps.registry.get_or_init(&account.phone).await {
                Ok(session) => {
                    info!(phone = %account.phone, "选中账号");
                    let count = account.private_count;
                    return Some(SelectedAccount {
                        account,
                        session,
                        count,
                        probed: false,
                    });
                }
                Err(err) => {
                    self.emit(format!("账号 Phone:{} 会话创建失败: {} ❌", account.phone, err))
                        .await;
                }
            }
        }
        None
    }

    async fn probe(&self, selected: &SelectedAccount) -> Result<(), SessionError> {
        let control_chat_id = selected
            .session
            .resolve_chat_id(&self.config.control_bot)
            .await?;
        selected.session.probe_anti_abuse(control_chat_id).await
    }

    /// 轮换：摘除并关闭当前账号的会话
    async fn rotate(&self, current: &mut Option<SelectedAccount>) {
        if let Some(selected) = current.take() {
            info!(phone = %selected.account.phone, "账号退出本轮私信");
            self.deps.registry.remove(&selected.account.phone).await;
            if let Err(err) = selected.session.close().await {
                warn!(phone = %selected.account.phone, error = %err, "关闭会话失败");
            }
        }
    }

    async fn finish(&self, current: Option<SelectedAccount>) {
        let mut current = current;
        self.rotate(&mut current).await;
        self.emit("私信完毕".to_string()).await;
        info!("批量私信结束");
    }

    async fn load_daily_cap(&self) -> Result<i32, DispatchError> {
        let setting = self
            .deps
            .settings
            .get_or_init(
                setting_keys::DAILY_CAP,
                &self.config.default_daily_cap,
                "账号每日最大私信数量",
            )
            .await?;
        let cap = setting.value.parse::<i32>().map_err(|_| {
            DomainError::validation_error(
                setting_keys::DAILY_CAP,
                format!("无法解析为数字: {}", setting.value),
            )
        })?;
        Ok(cap)
    }

    async fn emit(&self, message: String) {
        if self.events.send(message).await.is_err() {
            warn!("事件通道已关闭，进度丢弃");
        }
    }
}

/// 准备好的运行参数
struct PreparedRun {
    span: TextLinkSpan,
    cap: i32,
    pool: Vec<TelegramAccount>,
    contacted: Vec<String>,
}

/// 计算关键字第一次出现的位置，按 UTF-16 码元计数（电报的实体约定）
fn link_span(text: &str, keyword: &str) -> Option<TextLinkSpan> {
    if keyword.is_empty() {
        return None;
    }
    let byte_offset = text.find(keyword)?;
    let offset = text[..byte_offset].encode_utf16().count() as i32;
    let length = keyword.encode_utf16().count() as i32;
    Some(TextLinkSpan { offset, length })
}
