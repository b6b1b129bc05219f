use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// 消费者核心指标
// 使用 Atomic 保证高并发下的计数性能
#[derive(Debug, Default)]
pub struct ConsumerMetrics {
    // --- 瞬时状态 (Gauges) ---
    /// 当前正在运行的 Handler 数 (含超时后仍在后台运行的)
    pub active_handlers: AtomicUsize,

    /// 历史峰值并发
    pub peak_handlers: AtomicUsize,

    // --- 累积计数 (Counters) ---
    /// 拉取到的投递总数
    pub total_pulled: AtomicU64,

    /// Ack 成功次数
    pub total_acked: AtomicU64,

    /// Nack 成功次数
    pub total_nacked: AtomicU64,

    /// 进入死信的消息数
    pub total_dead_lettered: AtomicU64,

    /// 接纳冲突 (重复投递立即 Nack) 次数
    pub total_conflicts: AtomicU64,

    /// 处理超时次数
    pub total_timeouts: AtomicU64,

    /// Handler Panic 次数
    pub total_faults: AtomicU64,
}

impl ConsumerMetrics {
    /// Handler 开始运行
    pub fn inc_active(&self) {
        let now = self.active_handlers.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_handlers.fetch_max(now, Ordering::SeqCst);
    }

    /// Handler 返回 (无论结果是否被采纳)
    pub fn dec_active(&self) {
        self.active_handlers.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn add_pulled(&self, n: usize) {
        self.total_pulled.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn inc_acked(&self) {
        self.total_acked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_nacked(&self) {
        self.total_nacked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dead_lettered(&self) {
        self.total_dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_conflict(&self) {
        self.total_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_timeout(&self) {
        self.total_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fault(&self) {
        self.total_faults.fetch_add(1, Ordering::Relaxed);
    }

    /// 导出一份可序列化的快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_handlers: self.active_handlers.load(Ordering::SeqCst),
            peak_handlers: self.peak_handlers.load(Ordering::SeqCst),
            pulled: self.total_pulled.load(Ordering::Relaxed),
            acked: self.total_acked.load(Ordering::Relaxed),
            nacked: self.total_nacked.load(Ordering::Relaxed),
            dead_lettered: self.total_dead_lettered.load(Ordering::Relaxed),
            conflicts: self.total_conflicts.load(Ordering::Relaxed),
            timeouts: self.total_timeouts.load(Ordering::Relaxed),
            faults: self.total_faults.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub active_handlers: usize,
    pub peak_handlers: usize,
    pub pulled: u64,
    pub acked: u64,
    pub nacked: u64,
    pub dead_lettered: u64,
    pub conflicts: u64,
    pub timeouts: u64,
    pub faults: u64,
}
