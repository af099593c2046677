//! 带抖动的限流器
//!
//! 固定间隔的发送节奏很容易被风控指纹识别，所以每次放行前先随机
//! sleep 一段时间，再等待令牌桶放行：随机间隔模拟人工节奏，令牌桶
//! 保证最坏情况下的速率上限。

use config::LimiterConfig;
use rand::Rng;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// 令牌桶内部状态
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// 带抖动的令牌桶限流器
///
/// 桶容量 = burst，补充速率 = permits_per_minute / 60 每秒。
/// 取消语义：丢弃 `wait` 返回的 future 即取消等待。
pub struct JitterLimiter {
    rate_per_sec: f64,
    burst: f64,
    min_jitter: Duration,
    max_jitter: Duration,
    bucket: Mutex<Bucket>,
}

impl JitterLimiter {
    pub fn new(
        permits_per_minute: u32,
        burst: u32,
        min_jitter: Duration,
        max_jitter: Duration,
    ) -> Self {
        Self {
            // 速率与桶容量都至少为 1，0 配置会让补充间隔退化成无穷大
            rate_per_sec: f64::from(permits_per_minute.max(1)) / 60.0,
            burst: f64::from(burst.max(1)),
            min_jitter,
            max_jitter,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst.max(1)),
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn from_config(config: &LimiterConfig) -> Self {
        Self::new(
            config.permits_per_minute,
            config.burst,
            config.min_jitter(),
            config.max_jitter(),
        )
    }

    /// 先随机抖动，再阻塞到令牌桶放行
    pub async fn wait(&self) {
        tokio::time::sleep(self.pick_jitter()).await;

        loop {
            let wait = {
                let mut bucket = match self.bucket.lock() {
                    Ok(bucket) => bucket,
                    // 持锁线程 panic 过，桶状态仍是合法的 f64，继续用
                    Err(poisoned) => poisoned.into_inner(),
                };
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.burst);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }

    fn pick_jitter(&self) -> Duration {
        if self.max_jitter <= self.min_jitter {
            return self.min_jitter;
        }
        let spread = (self.max_jitter - self.min_jitter).as_millis() as u64;
        let extra = {
            let mut rng = rand::rng();
            rng.random_range(0..spread)
        };
        self.min_jitter + Duration::from_millis(extra)
    }
}
