use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

use crate::common::{DeliveredMessage, Result};
use crate::source::DeadLetterSink;

/// 只记录日志的死信实现
///
/// 未配置死信通道时的默认值：消息内容不落地，只在日志里留下 ID 和原因。
#[derive(Debug, Clone, Default)]
pub struct LoggingDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LoggingDeadLetterSink {
    async fn deadletter(&self, message: &DeliveredMessage, reason: &str) -> Result<()> {
        warn!(
            message_id = %message.id,
            delivery_attempt = message.delivery_attempt,
            payload_len = message.payload.len(),
            reason = %reason,
            "dead-lettered message"
        );
        Ok(())
    }
}

/// 一条死信记录
#[derive(Debug, Clone)]
pub struct DeadLetterRecord {
    pub message: DeliveredMessage,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// 内存死信队列
///
/// 开发与测试用。Clone 共享同一份记录。
#[derive(Debug, Clone, Default)]
pub struct MemoryDeadLetterSink {
    records: Arc<Mutex<Vec<DeadLetterRecord>>>,
}

impl MemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前所有死信的快照
    pub fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// 取走所有记录 (人工重放用)
    pub fn drain(&self) -> Vec<DeadLetterRecord> {
        std::mem::take(&mut *self.records.lock())
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetterSink {
    async fn deadletter(&self, message: &DeliveredMessage, reason: &str) -> Result<()> {
        self.records.lock().push(DeadLetterRecord {
            message: message.clone(),
            reason: reason.to_string(),
            dead_lettered_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_sink_keeps_message_and_reason() {
        let sink = MemoryDeadLetterSink::new();
        let msg = DeliveredMessage::new("deal-1", "t", "payload");
        sink.deadletter(&msg, "unknown deal").await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message.id, "deal-1");
        assert_eq!(records[0].reason, "unknown deal");

        assert_eq!(sink.drain().len(), 1);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn logging_sink_never_fails() {
        let msg = DeliveredMessage::new("deal-2", "t", "payload");
        assert!(LoggingDeadLetterSink.deadletter(&msg, "handler fault").await.is_ok());
    }
}
