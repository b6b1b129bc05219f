use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::Notify, time::Instant};

use crate::common::new_message_id;

/// 默认可见性窗口
pub const DEFAULT_VISIBILITY_WINDOW: Duration = Duration::from_secs(30);

/// 队列中保存的一条消息
#[derive(Debug, Clone)]
pub(super) struct StoredMessage {
    pub payload: Bytes,
    pub attributes: HashMap<String, String>,
    pub enqueued_at: DateTime<Utc>,
    /// 已经被投递过的次数
    pub attempts: u32,
}

/// 一次投递的租约：回执 -> 消息 ID + 可见性截止时间
#[derive(Debug, Clone)]
pub(super) struct Lease {
    pub id: String,
    pub expires_at: Instant,
}

/// 内存消息源 (In-Memory MessageSource)
///
/// 模拟一个至少一次投递的托管队列，开发和测试用：
/// - `pull` 取出的消息进入租约期，期间对其他 `pull` 不可见。
/// - 租约期内 `ack` 删除消息；`nack` 让消息立即重新可见。
/// - 租约过期仍未确认的消息重新入队，`delivery_attempt` 递增。
/// - 每次投递生成新的回执，过期回执上的 `ack`/`nack` 被静默忽略。
///
/// Clone 共享同一个队列。
#[derive(Debug, Clone)]
pub struct MemorySource {
    /// 【数据仓库】ID -> 消息
    pub(super) data: Arc<DashMap<String, StoredMessage>>,

    /// 【可见队列】等待投递的 ID
    pub(super) pending: Arc<Mutex<VecDeque<String>>>,

    /// 【租约表】ack_token -> Lease
    pub(super) leases: Arc<Mutex<HashMap<String, Lease>>>,

    pub(super) visibility_window: Duration,

    /// 订阅了新消息信号的外部 Notify
    pub(super) watchers: Arc<Mutex<Vec<Arc<Notify>>>>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new(DEFAULT_VISIBILITY_WINDOW)
    }
}

impl MemorySource {
    pub fn new(visibility_window: Duration) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            pending: Arc::new(Mutex::new(VecDeque::new())),
            leases: Arc::new(Mutex::new(HashMap::new())),
            visibility_window,
            watchers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 发布一条消息，返回生成的 ID
    pub fn publish(&self, payload: impl Into<Bytes>) -> String {
        let id = new_message_id();
        self.publish_with(id.clone(), payload, HashMap::new());
        id
    }

    /// 以指定 ID 和属性发布
    ///
    /// ID 已存在时覆盖内容但不重复入队。
    pub fn publish_with(
        &self,
        id: impl Into<String>,
        payload: impl Into<Bytes>,
        attributes: HashMap<String, String>,
    ) {
        let id = id.into();
        let previous = self.data.insert(
            id.clone(),
            StoredMessage {
                payload: payload.into(),
                attributes,
                enqueued_at: Utc::now(),
                attempts: 0,
            },
        );
        if previous.is_none() {
            self.pending.lock().push_back(id);
        }
        self.signal();
    }

    /// 强制重投：即使消息仍在租约期内，也让它再出现一次
    ///
    /// 用于模拟队列服务的重复投递。消息不存在时返回 false。
    pub fn redeliver(&self, id: &str) -> bool {
        if !self.data.contains_key(id) {
            return false;
        }
        self.pending.lock().push_back(id.to_owned());
        self.signal();
        true
    }

    /// 还未被确认的消息总数 (可见 + 租约中)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 当前可见、等待投递的条目数
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// 当前处于租约期的投递数
    pub fn in_flight_len(&self) -> usize {
        self.leases.lock().len()
    }

    /// 某条消息已经被投递的次数
    pub fn delivery_attempts(&self, id: &str) -> Option<u32> {
        self.data.get(id).map(|m| m.attempts)
    }

    /// 把租约已过期的投递放回可见队列
    pub(super) fn reclaim_expired(&self, now: Instant) -> usize {
        let expired: Vec<String> = {
            let mut leases = self.leases.lock();
            let mut ids = Vec::new();
            leases.retain(|_, lease| {
                if lease.expires_at <= now {
                    ids.push(lease.id.clone());
                    false
                } else {
                    true
                }
            });
            ids
        };

        if expired.is_empty() {
            return 0;
        }

        let mut pending = self.pending.lock();
        let mut count = 0;
        for id in expired {
            if self.data.contains_key(&id) {
                pending.push_back(id);
                count += 1;
            }
        }
        count
    }

    pub(super) fn signal(&self) {
        for w in self.watchers.lock().iter() {
            w.notify_one();
        }
    }
}
