use dashmap::{DashMap, mapref::entry::Entry};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::trace;

/// 飞行集合中的一条记录
#[derive(Debug, Clone)]
pub struct InFlightEntry {
    /// 被接纳的时刻
    pub started_at: Instant,
    /// 被接纳那次投递的回执
    pub ack_token: String,
}

/// 投递追踪器 (Delivery Tracker)
///
/// **职责**: 保证同一个消息 ID 在任意时刻最多只有一个 Worker 在处理。
///
/// - `admit`: 原子的“检查并插入”，ID 已在飞行中则拒绝。
/// - `release`: 终态确定 (ack/nack 完成) 后移除，每个被接纳的 ID 恰好调用一次。
///
/// 内部使用 DashMap 分片锁，`admit`/`release` 之间互为原子。
#[derive(Debug, Clone, Default)]
pub struct DeliveryTracker {
    in_flight: Arc<DashMap<String, InFlightEntry>>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试接纳一次投递
    ///
    /// # 返回值
    /// - `true`: ID 之前不在飞行中，现在已登记。
    /// - `false`: ID 已经在飞行中 (重复投递)，调用方应立即 Nack。
    pub fn admit(&self, id: &str, ack_token: &str) -> bool {
        match self.in_flight.entry(id.to_owned()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(InFlightEntry {
                    started_at: Instant::now(),
                    ack_token: ack_token.to_owned(),
                });
                true
            }
        }
    }

    /// 接纳并返回 RAII 守卫
    ///
    /// 守卫 Drop 时自动 `release`，即使持有它的任务被中止也不会泄漏飞行记录。
    pub fn admit_guarded(&self, id: &str, ack_token: &str) -> Option<Admission> {
        if self.admit(id, ack_token) {
            Some(Admission {
                tracker: self.clone(),
                id: id.to_owned(),
            })
        } else {
            None
        }
    }

    /// 释放一个 ID，返回被移除的记录
    pub fn release(&self, id: &str) -> Option<InFlightEntry> {
        let removed = self.in_flight.remove(id).map(|(_, entry)| entry);
        if let Some(entry) = &removed {
            trace!(
                "[Tracker] Released {} after {:?}",
                id,
                entry.started_at.elapsed()
            );
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.in_flight.contains_key(id)
    }

    /// 某个 ID 已经在飞行中多久
    pub fn in_flight_for(&self, id: &str) -> Option<Duration> {
        self.in_flight.get(id).map(|e| e.started_at.elapsed())
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}

/// 接纳守卫
///
/// 代表“这个 ID 目前归我处理”。Drop 时归还给追踪器。
#[derive(Debug)]
pub struct Admission {
    tracker: DeliveryTracker,
    id: String,
}

impl Admission {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.tracker.release(&self.id);
    }
}
