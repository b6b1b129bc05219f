use crate::{
    common::config::ConsumerConfig,
    driver::ConsumerMetrics,
    source::{DeadLetterSink, MessageSource},
};
use std::sync::Arc;

/// 分发器上下文 (Dispatcher Context)
///
/// **职责**:
/// 打包 Dispatcher 运行所需的外部资源，避免在拉取循环和结算任务之间传递一长串参数。
/// 内部全是 Arc，Clone 是廉价的，每个结算任务持有一份。
pub struct DispatcherContext {
    // --- 身份标识 (Identity) ---
    /// 当前消费者实例的 ID
    ///
    /// 只用于日志和排查，不参与任何确认逻辑。
    pub consumer_id: String,

    // --- 外部组件 (Components) ---
    /// 消息源 (pull / ack / nack)
    pub source: Arc<dyn MessageSource>,

    /// 死信通道
    pub deadletter: Arc<dyn DeadLetterSink>,

    /// 全局配置
    pub config: Arc<ConsumerConfig>,

    /// 全局统计指标
    pub metrics: Arc<ConsumerMetrics>,
}

impl Clone for DispatcherContext {
    fn clone(&self) -> Self {
        Self {
            consumer_id: self.consumer_id.clone(),
            source: self.source.clone(),
            deadletter: self.deadletter.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl DispatcherContext {
    pub fn new(
        source: Arc<dyn MessageSource>,
        deadletter: Arc<dyn DeadLetterSink>,
        config: ConsumerConfig,
        metrics: Arc<ConsumerMetrics>,
    ) -> Self {
        Self {
            consumer_id: config.consumer_id.clone(),
            source,
            deadletter,
            config: Arc::new(config),
            metrics,
        }
    }
}
