use std::time::Duration;

use rand::Rng;

use crate::policy::{WaitContext, WaitDecision, WaitStrategy};

/// 空闲指数退避策略
///
/// - 连续拉空次数越多，两次 pull 之间等得越久，封顶于 `max`。
/// - 拉到消息后 (`idle_count == 0`) 立即继续拉取。
/// - 等待期间允许被 Source 的新消息通知提前唤醒。
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min: Duration,
    max: Duration,
    jitter: bool,
}

impl ExponentialBackoff {
    /// 创建退避策略
    ///
    /// # 参数
    /// - `min_ms`: 第一次拉空后的等待时间
    /// - `max_ms`: 等待时间上限
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min: Duration::from_millis(min_ms),
            max: Duration::from_millis(max_ms.max(min_ms)),
            jitter: false,
        }
    }

    /// 开启随机抖动
    ///
    /// 多个消费者共享同一订阅时建议开启，防止同一时刻一起醒来。
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    pub(crate) fn calculate_duration(&self, idle_count: u32) -> Duration {
        // min * 2^(idle_count - 1)，指数最大为 30，防止 overflow
        let exponent = idle_count.saturating_sub(1).min(30);
        let mut duration = self.min.saturating_mul(1u32 << exponent);

        if self.jitter {
            // 在 [0.8 * d, 1.2 * d] 之间波动
            duration = duration.mul_f64(rand::rng().random_range(0.8..1.2));
        }

        duration.min(self.max)
    }
}

impl WaitStrategy for ExponentialBackoff {
    fn make_decision(&self, ctx: &WaitContext) -> WaitDecision {
        if ctx.idle_count == 0 {
            return WaitDecision::Immediate;
        }
        let duration = self.calculate_duration(ctx.idle_count);
        WaitDecision::WaitForNotification(ctx.now_instant + duration)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(50, 5_000)
    }
}
