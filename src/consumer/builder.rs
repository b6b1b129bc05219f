use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    common::{ConsumerConfig, MessageHandler, Result},
    consumer::Consumer,
    driver::{ConsumerMetrics, ConsumerPlugin, DispatcherBuilder},
    policy::WaitStrategy,
    source::{DeadLetterSink, MessageSource},
};

/// Consumer 构建器
///
/// 用于一步步配置并生成 Consumer 实例。
pub struct ConsumerBuilder {
    /// 底层 Dispatcher 的构建器
    inner: DispatcherBuilder,
    /// 全局停机信号 (可选注入，用于多组件协同)
    shutdown_token: Option<CancellationToken>,
}

impl Default for ConsumerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsumerBuilder {
    pub fn new() -> Self {
        Self {
            inner: DispatcherBuilder::new(),
            shutdown_token: None,
        }
    }

    /// [必填] 消息源
    pub fn source<S: MessageSource>(mut self, source: S) -> Self {
        self.inner = self.inner.with_source(source);
        self
    }

    /// [可选] 死信通道，默认只记日志
    pub fn deadletter<D: DeadLetterSink>(mut self, sink: D) -> Self {
        self.inner = self.inner.with_deadletter(sink);
        self
    }

    /// [可选] 配置，默认 `ConsumerConfig::default()`
    pub fn config(mut self, config: ConsumerConfig) -> Self {
        self.inner = self.inner.with_config(config);
        self
    }

    /// [可选] 从 JSON 文件加载配置
    pub fn config_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let config = ConsumerConfig::from_json_file(path)?;
        Ok(self.config(config))
    }

    /// [可选] 消费者 ID，用于日志追踪
    pub fn consumer_id(mut self, id: impl Into<String>) -> Self {
        self.inner = self.inner.with_consumer_id(id);
        self
    }

    /// [可选] 注入自定义插件
    /// 例如：限流器、监控上报、报警
    pub fn with_plugin<PL: ConsumerPlugin>(mut self, plugin: PL) -> Self {
        self.inner = self.inner.with_plugin(plugin);
        self
    }

    /// [可选] 空闲等待策略
    pub fn with_strategy<S: WaitStrategy>(mut self, strategy: S) -> Self {
        self.inner = self.inner.with_wait_strategy(strategy);
        self
    }

    /// [可选] 共享外部指标实例
    pub fn with_metrics(mut self, metrics: Arc<ConsumerMetrics>) -> Self {
        self.inner = self.inner.with_metrics(metrics);
        self
    }

    /// [可选] 外部停机信号
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = Some(token);
        self
    }

    /// [核心] 构建 Consumer
    ///
    /// Config + Source + Sink -> Context -> Dispatcher -> Consumer
    pub fn build<H: MessageHandler>(self, handler: H) -> Result<Consumer<H>> {
        let dispatcher = self.inner.build(handler)?;
        Ok(Consumer {
            dispatcher,
            shutdown: self.shutdown_token.unwrap_or_default(),
        })
    }
}
