//! 后台任务工具
//!
//! 后台任务（状态监听、注册表清理、批量私信）从不向调用方传播错误：
//! 可恢复的错误各自记录日志后继续；未捕获的 panic 视为不可恢复的
//! 缺陷，直接终止整个进程，避免留下半损坏的状态。

use std::future::Future;
use tracing::error;

/// 启动一个命名后台任务，panic 时记录日志并退出进程
pub fn spawn_named<F>(name: impl Into<String>, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let name = name.into();
    let handle = tokio::spawn(fut);
    tokio::spawn(async move {
        if let Err(err) = handle.await {
            if err.is_panic() {
                error!(task = %name, error = %err, "后台任务 Panic ❌");
                std::process::exit(1);
            }
        }
    });
}
