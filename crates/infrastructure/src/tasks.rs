//! 持久层后台任务

use chrono::Duration;
use domain::repositories::AccountRepository;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// 私信计数周期重置任务
///
/// 每隔 `interval` 扫一次：把距上次重置超过 `cycle` 的账号计数清零。
/// 任务随进程存活，返回的句柄仅用于测试中提前终止。
pub fn start_counter_reset_task(
    accounts: Arc<dyn AccountRepository>,
    interval: std::time::Duration,
    cycle: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match accounts.reset_stale_counters(cycle).await {
                Ok(0) => {}
                Ok(reset) => info!(reset, "私信计数已重置"),
                Err(err) => error!(error = %err, "私信计数重置失败"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::repositories::MockAccountRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn ticks_periodically_and_survives_repository_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);

        let mut accounts = MockAccountRepository::new();
        accounts.expect_reset_stale_counters().returning(move |_| {
            match seen.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(3),
                1 => Err(domain::DomainError::database_error("连接中断")),
                _ => Ok(0),
            }
        });

        let handle = start_counter_reset_task(
            Arc::new(accounts),
            std::time::Duration::from_secs(600),
            Duration::hours(24),
        );

        // 首个 tick 立即完成但不触发扫描，之后每个周期扫一次；出错不终止任务
        tokio::time::sleep(std::time::Duration::from_secs(1850)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!handle.is_finished());
        handle.abort();
    }
}
