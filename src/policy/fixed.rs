use std::time::Duration;

use crate::policy::{WaitContext, WaitDecision, WaitStrategy};

/// 固定间隔策略
///
/// - 拉空后总是等待同样的时长，拉到消息后立即继续。
/// - 支持配置为“监听通知”或“纯轮询”。
#[derive(Debug, Clone)]
pub struct FixedWait {
    interval: Duration,
    listen: bool,
}

impl FixedWait {
    /// 混合模式：等待 `millis`，期间可被通知唤醒
    pub fn new(millis: u64) -> Self {
        Self {
            interval: Duration::from_millis(millis),
            listen: true,
        }
    }

    /// 纯轮询：忽略通知，严格按间隔拉取
    pub fn new_pure_polling(millis: u64) -> Self {
        Self {
            interval: Duration::from_millis(millis),
            listen: false,
        }
    }
}

impl WaitStrategy for FixedWait {
    fn make_decision(&self, ctx: &WaitContext) -> WaitDecision {
        if ctx.idle_count == 0 {
            return WaitDecision::Immediate;
        }
        let deadline = ctx.now_instant + self.interval;
        if self.listen {
            WaitDecision::WaitForNotification(deadline)
        } else {
            WaitDecision::WaitUntil(deadline)
        }
    }
}
