use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// 等待决策
///
/// - 策略层返回给拉取循环的具体行动指令。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitDecision {
    /// [立即拉取]
    ///
    /// - 行为: 直接返回，拉取循环立刻发起下一次 pull。
    /// - 适用场景: 上一批拉到了消息，趁热打铁。
    Immediate,

    /// [协作让权]
    ///
    /// - 行为: `yield_now().await` 之后再拉取，给同一运行时上的 Worker 让出执行权。
    Yield,

    /// [硬等待]
    ///
    /// - 行为: `sleep_until(deadline)`，期间忽略通知，只响应停机。
    /// - 适用场景: 限流、维护窗口。
    WaitUntil(Instant),

    /// [响应式等待]
    ///
    /// - 行为: 睡到 deadline，但收到 Source 的新消息通知或 `resume()` 时提前醒来。
    /// - 适用场景: 空闲退避。
    WaitForNotification(Instant),

    /// [死等]
    ///
    /// - 行为: 只有通知或停机才能唤醒。
    /// - 风险: Source 不支持 `watch` 时会永远挂起，慎用。
    WaitIndefinitely,
}

/// 等待策略上下文
#[derive(Debug, Clone)]
pub struct WaitContext {
    /// 连续空闲次数
    ///
    /// - 0: 上一次拉取拿到了消息 (忙碌状态)。
    /// - >0: 已经连续这么多次拉空。
    pub idle_count: u32,
    /// [单调时钟] 用于构建 Tokio Timer
    pub now_instant: Instant,
    /// [现实时钟] 用于维护窗口等日历判断
    pub now_wall: DateTime<Utc>,
}

impl WaitContext {
    pub fn new(idle_count: u32, now_instant: Instant, now_wall: DateTime<Utc>) -> Self {
        Self {
            idle_count,
            now_instant,
            now_wall,
        }
    }
}

/// 等待策略接口
///
/// - 决定拉取循环在两次 pull 之间等待多久。
pub trait WaitStrategy: Send + Sync + 'static {
    fn make_decision(&self, ctx: &WaitContext) -> WaitDecision;
}

/// 组合策略链 (Arbitrator)
///
/// 多个策略同时生效时，取最“保守”的决策。
#[derive(Default)]
pub struct WaitStrategyChain {
    strategies: Vec<Box<dyn WaitStrategy>>,
}

impl WaitStrategyChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// 向链中添加一个新策略
    pub fn add<S: WaitStrategy>(mut self, strategy: S) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// 合并两个决策，返回更保守的那一个
    ///
    /// 优先级 (由高到低):
    /// 1. WaitIndefinitely
    /// 2. WaitUntil (取最晚时间)
    /// 3. WaitForNotification (取最晚时间)
    /// 4. Yield
    /// 5. Immediate
    fn merge(a: WaitDecision, b: WaitDecision) -> WaitDecision {
        use WaitDecision::*;

        if matches!(a, WaitIndefinitely) || matches!(b, WaitIndefinitely) {
            return WaitIndefinitely;
        }

        let get_deadline = |d: WaitDecision| -> Option<Instant> {
            match d {
                WaitUntil(t) | WaitForNotification(t) => Some(t),
                _ => None,
            }
        };

        let dead_a = get_deadline(a);
        let dead_b = get_deadline(b);

        if let (Some(ta), Some(tb)) = (dead_a, dead_b) {
            let max_t = ta.max(tb);
            // 有一方是硬等待，结果升级为硬等待
            let is_hard = matches!(a, WaitUntil(_)) || matches!(b, WaitUntil(_));
            return if is_hard {
                WaitUntil(max_t)
            } else {
                WaitForNotification(max_t)
            };
        }
        if dead_a.is_some() {
            return a;
        }
        if dead_b.is_some() {
            return b;
        }

        if matches!(a, Yield) || matches!(b, Yield) {
            return Yield;
        }

        Immediate
    }
}

impl WaitStrategy for WaitStrategyChain {
    fn make_decision(&self, ctx: &WaitContext) -> WaitDecision {
        self.strategies
            .iter()
            .map(|s| s.make_decision(ctx))
            .fold(WaitDecision::Immediate, Self::merge)
    }
}
