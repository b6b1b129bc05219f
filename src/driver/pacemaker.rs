use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use tokio::{sync::Notify, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::policy::{WaitContext, WaitDecision, WaitStrategy};

/// 暂停状态下的自检间隔
const PAUSE_RECHECK: Duration = Duration::from_millis(100);

/// 拉取起搏器
///
/// 核心职责：决定拉取循环的节奏。
/// 上一轮拉到了消息就立刻再拉；拉空了则按 WaitStrategy 退避，
/// 退避期间可以被消息源的新消息信号 (Notify) 提前唤醒。
pub struct PullPacemaker<'a> {
    /// 暂停标志
    paused: &'a AtomicBool,
    /// 新消息 / 恢复信号
    notify: &'a Notify,

    /// 关机信号
    shutdown: &'a CancellationToken,

    /// 等待策略
    wait_strategy: Arc<dyn WaitStrategy>,

    /// 连续空拉计数器
    idle_count: u32,
}

impl<'a> PullPacemaker<'a> {
    pub fn new(
        paused: &'a AtomicBool,
        notify: &'a Notify,
        shutdown: &'a CancellationToken,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Self {
        Self {
            paused,
            notify,
            shutdown,
            wait_strategy,
            idle_count: 0,
        }
    }

    /// 拉到了消息
    pub fn mark_busy(&mut self) {
        self.idle_count = 0;
    }

    /// 拉了个空
    pub fn mark_idle(&mut self) {
        self.idle_count = self.idle_count.saturating_add(1);
    }

    pub fn idle_count(&self) -> u32 {
        self.idle_count
    }

    /// 等待下一次拉取时机
    pub async fn wait_next(&mut self) -> PacemakerEvent {
        loop {
            if self.shutdown.is_cancelled() {
                return PacemakerEvent::Shutdown;
            }
            if self.paused.load(Ordering::Acquire) {
                tokio::select! {
                    _ = self.shutdown.cancelled() => return PacemakerEvent::Shutdown,
                    _ = self.notify.notified() => continue,
                    _ = tokio::time::sleep(PAUSE_RECHECK) => continue,
                }
            }

            let ctx = WaitContext::new(self.idle_count, Instant::now(), Utc::now());
            match self.wait_strategy.make_decision(&ctx) {
                WaitDecision::Immediate => return PacemakerEvent::Trigger,
                WaitDecision::Yield => {
                    tokio::task::yield_now().await;
                    return PacemakerEvent::Trigger;
                }
                // 硬等待：不理会新消息信号
                WaitDecision::WaitUntil(deadline) => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return PacemakerEvent::Shutdown,
                        _ = tokio::time::sleep_until(deadline) => return PacemakerEvent::Trigger,
                    }
                }
                // 软等待：新消息信号可以提前唤醒
                WaitDecision::WaitForNotification(deadline) => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return PacemakerEvent::Shutdown,
                        _ = self.notify.notified() => return PacemakerEvent::Trigger,
                        _ = tokio::time::sleep_until(deadline) => return PacemakerEvent::Trigger,
                    }
                }
                WaitDecision::WaitIndefinitely => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return PacemakerEvent::Shutdown,
                        _ = self.notify.notified() => return PacemakerEvent::Trigger,
                    }
                }
            }
        }
    }
}

/// 起搏器产生的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacemakerEvent {
    /// 该去拉取了
    Trigger,
    /// 停机
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ExponentialBackoff;

    #[tokio::test(start_paused = true)]
    async fn busy_triggers_immediately_idle_backs_off() {
        let paused = AtomicBool::new(false);
        let notify = Notify::new();
        let shutdown = CancellationToken::new();
        let mut pm = PullPacemaker::new(
            &paused,
            &notify,
            &shutdown,
            Arc::new(ExponentialBackoff::new(100, 1_000)),
        );

        let t0 = Instant::now();
        assert_eq!(pm.wait_next().await, PacemakerEvent::Trigger);
        assert_eq!(t0.elapsed(), Duration::ZERO);

        pm.mark_idle();
        pm.mark_idle();
        assert_eq!(pm.wait_next().await, PacemakerEvent::Trigger);
        assert!(t0.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn notify_cuts_idle_wait_short() {
        let paused = AtomicBool::new(false);
        let notify = Notify::new();
        let shutdown = CancellationToken::new();
        let mut pm = PullPacemaker::new(
            &paused,
            &notify,
            &shutdown,
            Arc::new(ExponentialBackoff::new(10_000, 10_000)),
        );
        pm.mark_idle();
        notify.notify_one();

        let t0 = Instant::now();
        assert_eq!(pm.wait_next().await, PacemakerEvent::Trigger);
        assert!(t0.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn cancelled_token_wins_even_when_paused() {
        let paused = AtomicBool::new(true);
        let notify = Notify::new();
        let shutdown = CancellationToken::new();
        let mut pm = PullPacemaker::new(
            &paused,
            &notify,
            &shutdown,
            Arc::new(ExponentialBackoff::default()),
        );
        shutdown.cancel();
        assert_eq!(pm.wait_next().await, PacemakerEvent::Shutdown);
    }
}
