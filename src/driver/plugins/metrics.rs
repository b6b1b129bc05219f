use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    common::{DeliveredMessage, DeliveryState},
    driver::{ConsumerMetrics, ConsumerPlugin},
};

/// 内置指标插件
///
/// Dispatcher 构建时总是排在插件列表第一位。
/// 并发数、超时与 Panic 由工作池直接记录，这里只负责投递层面的计数。
pub struct MetricsPlugin {
    metrics: Arc<ConsumerMetrics>,
}

impl MetricsPlugin {
    pub fn new(metrics: Arc<ConsumerMetrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl ConsumerPlugin for MetricsPlugin {
    async fn after_pull(&self, batch: &[DeliveredMessage]) {
        self.metrics.add_pulled(batch.len());
    }

    async fn on_conflict(&self, _message: &DeliveredMessage) {
        self.metrics.inc_conflict();
    }

    async fn on_dead_letter(&self, _message: &DeliveredMessage, _reason: &str) {
        self.metrics.inc_dead_lettered();
    }

    // Acked -> acked+1，其余终态都是某种 Nack
    async fn on_resolved(&self, _message: &DeliveredMessage, state: DeliveryState) {
        match state {
            DeliveryState::Acked => self.metrics.inc_acked(),
            DeliveryState::NackedImmediate
            | DeliveryState::NackedAfterFailure
            | DeliveryState::NackedTimeout => self.metrics.inc_nacked(),
            DeliveryState::Unseen | DeliveryState::InFlight => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_terminal_states() {
        let metrics = Arc::new(ConsumerMetrics::default());
        let plugin = MetricsPlugin::new(metrics.clone());
        let msg = DeliveredMessage::new("1", "t", "x");

        plugin.after_pull(&[msg.clone(), msg.clone()]).await;
        plugin.on_resolved(&msg, DeliveryState::Acked).await;
        plugin.on_resolved(&msg, DeliveryState::NackedTimeout).await;
        plugin.on_conflict(&msg).await;
        plugin.on_resolved(&msg, DeliveryState::NackedImmediate).await;
        plugin.on_dead_letter(&msg, "bad").await;

        let snap = metrics.snapshot();
        assert_eq!(snap.pulled, 2);
        assert_eq!(snap.acked, 1);
        assert_eq!(snap.nacked, 2);
        assert_eq!(snap.conflicts, 1);
        assert_eq!(snap.dead_lettered, 1);
    }
}
