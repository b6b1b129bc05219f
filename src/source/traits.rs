use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::common::{DeliveredMessage, Result};

// ==========================================
// 1. 消息源接口 (MessageSource)
// ==========================================

/// 消息源接口
///
/// **职责**: 对接底层队列服务 (Pub/Sub、SQS、Redis Streams...)，只暴露拉取与确认三个原语。
/// **约定**:
/// - 至少一次 (at-least-once)：在可见性窗口内既没有 ack 也没有 nack 的消息会被重新投递。
/// - 每次投递都带一个新的 `ack_token`；旧回执失效后的 ack/nack 可以被忽略。
/// - 暂时性故障请返回 `ConsumerError::TransientSource`，拉取循环会退避重试。
#[async_trait]
pub trait MessageSource: Send + Sync + 'static {
    /// 拉取一批消息
    ///
    /// # 参数
    /// - `max_messages`: 本次最多返回的消息数 (即 `batch_size`)。
    ///
    /// 没有可用消息时返回空 Vec，而不是错误。
    async fn pull(&self, max_messages: usize) -> Result<Vec<DeliveredMessage>>;

    /// 确认：消息已处理完毕，不要再投递
    async fn ack(&self, ack_token: &str) -> Result<()>;

    /// 否认：让消息尽快重新可见，等待重投
    async fn nack(&self, ack_token: &str) -> Result<()>;

    /// 监听新消息信号 (可选)
    ///
    /// 支持推送通知的实现应在有新消息时调用 `notify.notify_one()`，
    /// 让处于空闲退避中的拉取循环提前醒来。默认不做任何事，完全依赖轮询。
    async fn watch(&self, _notify: Arc<Notify>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<S> MessageSource for Arc<S>
where
    S: MessageSource,
{
    async fn pull(&self, max_messages: usize) -> Result<Vec<DeliveredMessage>> {
        (**self).pull(max_messages).await
    }

    async fn ack(&self, ack_token: &str) -> Result<()> {
        (**self).ack(ack_token).await
    }

    async fn nack(&self, ack_token: &str) -> Result<()> {
        (**self).nack(ack_token).await
    }

    async fn watch(&self, notify: Arc<Notify>) -> Result<()> {
        (**self).watch(notify).await
    }
}

// ==========================================
// 2. 死信接口 (DeadLetterSink)
// ==========================================

/// 死信接口
///
/// **职责**: 接收无法成功处理的消息 (永久失败、Handler Panic)，避免它们被无限重投。
/// **约定**: 尽力而为。返回的错误只会被记录日志，不会重试，也不会阻止随后的 Ack。
#[async_trait]
pub trait DeadLetterSink: Send + Sync + 'static {
    async fn deadletter(&self, message: &DeliveredMessage, reason: &str) -> Result<()>;
}

#[async_trait]
impl<D> DeadLetterSink for Arc<D>
where
    D: DeadLetterSink,
{
    async fn deadletter(&self, message: &DeliveredMessage, reason: &str) -> Result<()> {
        (**self).deadletter(message, reason).await
    }
}
