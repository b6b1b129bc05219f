use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    common::{DrainReport, MessageHandler},
    driver::{Dispatcher, MetricsSnapshot},
};

/// 消费者 (The Public Face)
///
/// 用户直接交互的对象。它封装了底层的 `Dispatcher` 和它的停机信号，
/// 屏蔽了 Context 创建、插件注入等组装细节。
///
/// Clone 共享同一个 Dispatcher：通常一份拿去 `start`，另一份留着 `shutdown`。
pub struct Consumer<H> {
    /// 内部核心分发器 (引擎)
    pub(crate) dispatcher: Dispatcher<H>,
    /// 停机信号
    pub(crate) shutdown: CancellationToken,
}

impl<H> Clone for Consumer<H> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<H> Consumer<H>
where
    H: MessageHandler,
{
    /// [入口] 启动消费
    ///
    /// 异步阻塞，直到 `shutdown()` 被调用且排空结束。
    /// 通常你应该在 `tokio::spawn` 中调用它。
    pub async fn start(&self) -> DrainReport {
        self.dispatcher.run(self.shutdown.clone()).await
    }

    /// 启动消费，收到 Ctrl-C 后优雅停机
    pub async fn run_until_ctrl_c(&self) -> DrainReport {
        let token = self.shutdown.clone();
        let listener = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("[Consumer] Ctrl-C received, shutting down.");
                    token.cancel();
                }
                Err(e) => warn!("[Consumer] Unable to listen for Ctrl-C: {}", e),
            }
        });

        let report = self.start().await;
        listener.abort();
        report
    }

    /// 触发优雅停机
    pub fn shutdown(&self) {
        info!("[Consumer] Shutdown triggered.");
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// 停机信号，可交给其它组件协同停机
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn pause(&self) {
        self.dispatcher.pause();
    }

    pub fn resume(&self) {
        self.dispatcher.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.dispatcher.is_paused()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.dispatcher.metrics().snapshot()
    }

    /// 当前正在处理中的消息数
    pub fn in_flight(&self) -> usize {
        self.dispatcher.tracker().len()
    }

    pub fn dispatcher(&self) -> &Dispatcher<H> {
        &self.dispatcher
    }
}
