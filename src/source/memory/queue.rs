use async_trait::async_trait;
use std::sync::Arc;
use tokio::{sync::Notify, time::Instant};
use tracing::{debug, trace};

use super::MemorySource;
use super::core::Lease;
use crate::common::{DeliveredMessage, Result, new_ack_token};
use crate::source::MessageSource;

#[async_trait]
impl MessageSource for MemorySource {
    async fn pull(&self, max_messages: usize) -> Result<Vec<DeliveredMessage>> {
        let now = Instant::now();
        let reclaimed = self.reclaim_expired(now);
        if reclaimed > 0 {
            debug!("[MemorySource] {} lease(s) expired, messages visible again", reclaimed);
        }

        // 锁内切出一批 ID，防止被并发的 pull 重复取走
        let ids: Vec<String> = {
            let mut pending = self.pending.lock();
            let n = max_messages.min(pending.len());
            pending.drain(..n).collect()
        };

        let mut batch = Vec::with_capacity(ids.len());
        for id in ids {
            // 已经被 ack 删除的残留条目直接跳过
            let Some(mut stored) = self.data.get_mut(&id) else {
                continue;
            };
            stored.attempts += 1;

            let token = new_ack_token();
            self.leases.lock().insert(
                token.clone(),
                Lease {
                    id: id.clone(),
                    expires_at: now + self.visibility_window,
                },
            );

            let mut message = DeliveredMessage::new(id.clone(), token, stored.payload.clone())
                .with_attempt(stored.attempts)
                .with_enqueued_at(stored.enqueued_at);
            message.attributes = stored.attributes.clone();
            batch.push(message);
        }

        Ok(batch)
    }

    async fn ack(&self, ack_token: &str) -> Result<()> {
        match self.leases.lock().remove(ack_token) {
            Some(lease) => {
                self.data.remove(&lease.id);
                trace!("[MemorySource] Acked {}", lease.id);
            }
            None => debug!("[MemorySource] Ignoring ack with stale token {}", ack_token),
        }
        Ok(())
    }

    async fn nack(&self, ack_token: &str) -> Result<()> {
        let (lease, still_leased) = {
            let mut leases = self.leases.lock();
            let lease = leases.remove(ack_token);
            // 同一 ID 还有别的投递在租约期内：等那次结算或过期再重投
            let still_leased = lease
                .as_ref()
                .is_some_and(|l| leases.values().any(|other| other.id == l.id));
            (lease, still_leased)
        };
        match lease {
            Some(lease) if still_leased => {
                trace!("[MemorySource] {} still leased elsewhere, not requeueing", lease.id);
            }
            Some(lease) => {
                if self.data.contains_key(&lease.id) {
                    self.pending.lock().push_front(lease.id);
                    self.signal();
                }
            }
            None => debug!("[MemorySource] Ignoring nack with stale token {}", ack_token),
        }
        Ok(())
    }

    async fn watch(&self, notify: Arc<Notify>) -> Result<()> {
        self.watchers.lock().push(notify);
        Ok(())
    }
}
