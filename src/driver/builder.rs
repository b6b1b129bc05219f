use std::sync::Arc;

use tracing::debug;

use crate::{
    common::{ConsumerConfig, ConsumerError, MessageHandler, Result},
    driver::{
        ConsumerMetrics, ConsumerPlugin, Dispatcher, DispatcherContext, plugins::MetricsPlugin,
    },
    policy::{WaitStrategy, expbackoff::ExponentialBackoff},
    source::{DeadLetterSink, LoggingDeadLetterSink, MessageSource},
};

/// 分发器构造器 (Builder Pattern)
pub struct DispatcherBuilder {
    /// 消费者 ID
    consumer_id: Option<String>,
    /// 全局配置
    config: Option<ConsumerConfig>,
    /// 等待策略
    wait_strategy: Option<Arc<dyn WaitStrategy>>,
    /// 插件列表
    plugins: Vec<Box<dyn ConsumerPlugin>>,
    /// 消息源 (必填)
    source: Option<Arc<dyn MessageSource>>,
    /// 死信通道
    deadletter: Option<Arc<dyn DeadLetterSink>>,
    /// 全局统计指标
    metrics: Arc<ConsumerMetrics>,
}

impl Default for DispatcherBuilder {
    /// 创建一个新的构造器
    ///
    /// **默认行为**:
    /// - Config: Default
    /// - WaitStrategy: ExponentialBackoff，参数取自 `pull.idle_backoff_*`
    /// - DeadLetter: LoggingDeadLetterSink
    /// - Source: 无，必须显式设置
    fn default() -> Self {
        Self {
            consumer_id: None,
            config: None,
            wait_strategy: None,
            plugins: Vec::new(),
            source: None,
            deadletter: None,
            metrics: Arc::new(ConsumerMetrics::default()),
        }
    }
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置消费者 ID (如果不设，使用配置中的值)
    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = Some(id.into());
        self
    }

    pub fn with_config(mut self, config: ConsumerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 设置空闲等待策略
    pub fn with_wait_strategy<S>(mut self, strategy: S) -> Self
    where
        S: WaitStrategy + 'static,
    {
        self.wait_strategy = Some(Arc::new(strategy));
        self
    }

    /// 添加插件 (支持链式调用)
    ///
    /// **注意**: 插件的执行顺序与添加顺序一致 (FIFO)，内置的 MetricsPlugin 总在最前。
    pub fn with_plugin<PL>(mut self, plugin: PL) -> Self
    where
        PL: ConsumerPlugin + 'static,
    {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// 设置消息源
    pub fn with_source<S>(mut self, source: S) -> Self
    where
        S: MessageSource,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// 设置死信通道
    pub fn with_deadletter<D>(mut self, sink: D) -> Self
    where
        D: DeadLetterSink,
    {
        self.deadletter = Some(Arc::new(sink));
        self
    }

    /// 共享外部的指标实例
    pub fn with_metrics(mut self, metrics: Arc<ConsumerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// 构建分发器
    ///
    /// # 错误
    /// - 没有设置消息源，或配置校验失败时返回 `ConsumerError::Config`。
    pub fn build<H>(mut self, handler: H) -> Result<Dispatcher<H>>
    where
        H: MessageHandler,
    {
        let mut config = self.config.unwrap_or_default();
        if let Some(id) = self.consumer_id {
            config.consumer_id = id;
        }
        config.validate()?;

        let source = self
            .source
            .ok_or_else(|| ConsumerError::config("a message source is required"))?;

        let deadletter = self.deadletter.unwrap_or_else(|| {
            debug!("Dispatcher build using default LoggingDeadLetterSink");
            Arc::new(LoggingDeadLetterSink)
        });

        let wait_strategy = self.wait_strategy.unwrap_or_else(|| {
            Arc::new(ExponentialBackoff::new(
                config.pull.idle_backoff_min_ms,
                config.pull.idle_backoff_max_ms,
            ))
        });

        // 自动注入 MetricsPlugin
        self.plugins
            .insert(0, Box::new(MetricsPlugin::new(self.metrics.clone())));

        let ctx = DispatcherContext::new(source, deadletter, config, self.metrics);
        Ok(Dispatcher::new_with_components(
            ctx,
            handler,
            self.plugins,
            wait_strategy,
        ))
    }
}
