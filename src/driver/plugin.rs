use crate::{
    common::{Completion, DeliveredMessage, DeliveryState, DrainReport},
    driver::context::DispatcherContext,
};
use async_trait::async_trait;

/// 消费者插件/钩子接口
///
/// 用户可以通过实现此 Trait 来介入 Dispatcher 的生命周期。
/// 常见用途：
/// - 自定义日志/监控 (Metrics)
/// - 错误报警 (Alerting)
/// - 动态流控：下游过载时在 `before_pull` 里“踩刹车”
///
/// 钩子在拉取循环或结算任务中被 `await`，实现里不要做耗时操作。
#[async_trait]
pub trait ConsumerPlugin: Send + Sync + 'static {
    /// [生命周期] Dispatcher 启动时调用
    async fn on_start(&self, _ctx: &DispatcherContext) {}

    /// [生命周期] 排空结束、`run` 返回前调用
    async fn on_shutdown(&self, _ctx: &DispatcherContext, _report: &DrainReport) {}

    /// 每次拉取前调用
    ///
    /// # 返回值
    /// - `true`: 允许拉取。
    /// - `false`: 跳过本轮拉取，按空闲处理并退避。
    async fn before_pull(&self, _ctx: &DispatcherContext) -> bool {
        true
    }

    /// 拉取到一批非空消息后调用
    async fn after_pull(&self, _batch: &[DeliveredMessage]) {}

    /// 同一 ID 已在处理中，这次投递将被立即 Nack
    async fn on_conflict(&self, _message: &DeliveredMessage) {}

    /// [消息] Handler 启动前调用
    async fn before_process(&self, _message: &DeliveredMessage) {}

    /// [消息] 得到执行结果后、确认前调用 (成功、失败、超时、Panic 都会调用)
    async fn after_process(&self, _completion: &Completion) {}

    /// [消息] 消息已交给死信通道
    async fn on_dead_letter(&self, _message: &DeliveredMessage, _reason: &str) {}

    /// [消息] ack/nack 已被消息源接受，消息到达终态
    async fn on_resolved(&self, _message: &DeliveredMessage, _state: DeliveryState) {}
}

// ==========================================
// 默认的空插件 (No-Op)
// ==========================================

pub struct NoOpPlugin;

#[async_trait]
impl ConsumerPlugin for NoOpPlugin {}
