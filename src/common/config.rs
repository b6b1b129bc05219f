use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::common::{ConsumerError, Result, utils::default_consumer_id};

// ==========================================
// 1. 拉取配置 (PullConfig)
// ==========================================
/// 拉取循环的节奏与容错配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PullConfig {
    /// 每次拉取的最大消息数
    ///
    /// - 默认值: 10
    /// - 建议: 处理慢则调小，避免拉到手却长时间排队等待工作池空位。
    pub batch_size: usize,

    /// 空闲退避下限 (毫秒)
    ///
    /// - 说明: 连续拉空后第一次等待的时长。
    /// - 默认值: 50
    pub idle_backoff_min_ms: u64,

    /// 空闲退避上限 (毫秒)
    ///
    /// - 默认值: 5000
    pub idle_backoff_max_ms: u64,

    /// 拉取失败退避基数 (毫秒)
    ///
    /// - 说明: TransientSourceError 之后的指数退避起点。
    /// - 默认值: 200
    pub error_backoff_base_ms: u64,

    /// 拉取失败退避上限 (毫秒)
    ///
    /// - 默认值: 30,000
    pub error_backoff_max_ms: u64,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            idle_backoff_min_ms: 50,
            idle_backoff_max_ms: 5_000,
            error_backoff_base_ms: 200,
            error_backoff_max_ms: 30_000,
        }
    }
}

// ==========================================
// 2. 工作池配置 (WorkerConfig)
// ==========================================
/// 并发与单条消息执行控制
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 同时运行的 Handler 上限
    ///
    /// - 说明: 工作池满时，拉取循环在提交处挂起 (背压)。
    /// - 默认值: 8
    pub concurrency_limit: usize,

    /// 单条消息处理超时 (毫秒)
    ///
    /// - 说明: 超时后该消息结果按 `RetryableFailure("timeout")` 处理，Handler 本身继续在后台运行，结果被丢弃。
    /// - 默认值: 30,000
    pub processing_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 8,
            processing_timeout_ms: 30_000,
        }
    }
}

// ==========================================
// 3. 策略配置 (PolicyConfig)
// ==========================================
/// 停机与确认策略
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// 优雅停机排空超时 (毫秒)
    ///
    /// - 说明: 收到取消信号后等待在途消息完成的最长时间。超时仍未完成的消息保持未确认，由队列重新投递。
    /// - 默认值: 30,000
    pub shutdown_drain_timeout_ms: u64,

    /// ack/nack 失败时的最大尝试次数
    ///
    /// - 默认值: 3
    /// - 说明: 耗尽后只记录日志，消息由可见性窗口到期重新投递。
    pub ack_retry_attempts: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            shutdown_drain_timeout_ms: 30_000,
            ack_retry_attempts: 3,
        }
    }
}

// ==========================================
// 4. 总配置入口 (ConsumerConfig)
// ==========================================

/// 消费者总配置
///
/// 使用分层结构组织配置项，支持直接从 JSON 加载。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// 拉取节奏
    #[serde(default)]
    pub pull: PullConfig,

    /// 并发与超时
    #[serde(default)]
    pub worker: WorkerConfig,

    /// 停机与确认
    #[serde(default)]
    pub policy: PolicyConfig,

    /// 订阅名 (仅用于日志)
    #[serde(default = "default_subscription")]
    pub subscription: String,

    /// 消费者唯一标识
    ///
    /// - 默认值: `hostname-随机串`
    #[serde(default = "default_consumer_id")]
    pub consumer_id: String,
}

fn default_subscription() -> String {
    "default".to_string()
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            pull: PullConfig::default(),
            worker: WorkerConfig::default(),
            policy: PolicyConfig::default(),
            subscription: default_subscription(),
            consumer_id: default_consumer_id(),
        }
    }
}

impl ConsumerConfig {
    /// 从 JSON 字符串加载并校验
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 从 JSON 文件加载并校验
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// 校验配置项之间的约束
    pub fn validate(&self) -> Result<()> {
        if self.pull.batch_size == 0 {
            return Err(ConsumerError::config("pull.batch_size must be greater than 0"));
        }
        if self.worker.concurrency_limit == 0 {
            return Err(ConsumerError::config(
                "worker.concurrency_limit must be greater than 0",
            ));
        }
        if self.worker.processing_timeout_ms == 0 {
            return Err(ConsumerError::config(
                "worker.processing_timeout_ms must be greater than 0",
            ));
        }
        if self.pull.idle_backoff_min_ms > self.pull.idle_backoff_max_ms {
            return Err(ConsumerError::config(
                "pull.idle_backoff_min_ms must not exceed pull.idle_backoff_max_ms",
            ));
        }
        if self.pull.error_backoff_base_ms > self.pull.error_backoff_max_ms {
            return Err(ConsumerError::config(
                "pull.error_backoff_base_ms must not exceed pull.error_backoff_max_ms",
            ));
        }
        if self.policy.ack_retry_attempts == 0 {
            return Err(ConsumerError::config(
                "policy.ack_retry_attempts must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_millis(self.worker.processing_timeout_ms)
    }

    pub fn shutdown_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.policy.shutdown_drain_timeout_ms)
    }

    /// 快速创建一个开发/测试配置：短超时、短退避
    pub fn new_dev() -> Self {
        let mut cfg = Self::default();
        cfg.pull.idle_backoff_min_ms = 5;
        cfg.pull.idle_backoff_max_ms = 50;
        cfg.pull.error_backoff_base_ms = 10;
        cfg.pull.error_backoff_max_ms = 100;
        cfg.worker.processing_timeout_ms = 5_000;
        cfg.policy.shutdown_drain_timeout_ms = 5_000;
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ConsumerConfig::default();
        assert_eq!(cfg.pull.batch_size, 10);
        assert_eq!(cfg.worker.concurrency_limit, 8);
        assert_eq!(cfg.processing_timeout(), Duration::from_secs(30));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let cfg = ConsumerConfig::from_json_str(
            r#"{ "subscription": "pipedrive-webhooks-sub", "worker": { "concurrency_limit": 3 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.subscription, "pipedrive-webhooks-sub");
        assert_eq!(cfg.worker.concurrency_limit, 3);
        assert_eq!(cfg.worker.processing_timeout_ms, 30_000);
        assert_eq!(cfg.pull.batch_size, 10);
        assert!(!cfg.consumer_id.is_empty());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = ConsumerConfig::from_json_str(r#"{ "pull": { "batch_size": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConsumerError::Config(_)));
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = ConsumerConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConsumerError::Serialization(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("consumer.json");
        std::fs::write(&path, r#"{ "policy": { "shutdown_drain_timeout_ms": 1500 } }"#).unwrap();
        let cfg = ConsumerConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.shutdown_drain_timeout(), Duration::from_millis(1500));
    }
}
