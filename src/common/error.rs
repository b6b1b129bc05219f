use thiserror::Error;

/// 消费者统一结果类型
///
/// 使用此别名可以简化函数签名：`fn do_something() -> Result<()>`
pub type Result<T> = std::result::Result<T, ConsumerError>;

#[derive(Error, Debug)]
pub enum ConsumerError {
    // ==========================================
    // 1. 基础配置与启动错误 (Configuration & Startup)
    // ==========================================
    /// 配置错误
    ///
    /// - 触发场景: JSON 解析失败、参数校验不通过 (如 `batch_size = 0`)、Builder 缺少 Source。
    /// - 后果: `build()` 失败，消费者无法启动。
    /// - 处理: 检查配置文件。
    #[error("Configuration error: {0}")]
    Config(String),

    /// 工作池已关闭
    ///
    /// - 触发场景: 并发信号量被关闭后仍有消息尝试提交。
    /// - 后果: 消息未被执行，调度器会对其 Nack。
    #[error("Worker pool is closed, rejecting new messages.")]
    PoolClosed,

    // ==========================================
    // 2. 消息源错误 (Message Source)
    // ==========================================
    /// 消息源暂时性故障 (TransientSourceError)
    ///
    /// - 触发场景: pull/ack/nack 的网络抖动、服务端限流、连接重置。
    /// - 处理: 拉取循环执行带上限的指数退避重试；ack/nack 按 `ack_retry_attempts` 重试。
    #[error("Message source unavailable: {0}")]
    TransientSource(String),

    /// 消息源拒绝了请求 (不可重试)
    ///
    /// - 触发场景: 订阅不存在、权限不足、请求参数非法。
    #[error("Message source rejected request: {0}")]
    SourceRejected(String),

    /// 死信投递失败
    ///
    /// - 说明: 死信投递是尽力而为 (best-effort)，该错误只记录日志，不会重试。
    #[error("Dead-letter delivery failed: {0}")]
    DeadLetter(String),

    // ==========================================
    // 3. 基础设施与 IO 错误 (Infrastructure & IO)
    // ==========================================
    /// 序列化/反序列化失败
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 通用 IO 错误
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ConsumerError {
    /// 判断该错误是否值得重试 (Retryable)
    ///
    /// - 返回 `true`: 网络抖动、IO 故障等暂时性问题，调用方应退避后重试。
    /// - 返回 `false`: 配置错误、数据损坏、工作池关闭等永久性问题。
    pub fn is_retryable(&self) -> bool {
        match self {
            ConsumerError::TransientSource(_) => true,
            ConsumerError::Io(_) => true,

            ConsumerError::Config(_) => false,
            ConsumerError::PoolClosed => false,
            ConsumerError::SourceRejected(_) => false,
            ConsumerError::DeadLetter(_) => false,
            ConsumerError::Serialization(_) => false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        ConsumerError::TransientSource(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        ConsumerError::Config(message.into())
    }
}

/// 处理器返回的错误
///
/// 业务代码通过它告诉调度器这次失败是否值得重新投递。
/// 裸的 `anyhow::Error` (即 `?` 冒上来的错误) 默认视为可重试。
#[derive(Error, Debug)]
pub enum HandlerError {
    /// 可恢复的失败：Nack，依赖队列重新投递
    #[error("retryable: {0}")]
    Retryable(#[source] anyhow::Error),

    /// 不可恢复的失败 (毒丸)：Ack + 死信
    #[error("permanent: {0}")]
    Permanent(#[source] anyhow::Error),
}

impl HandlerError {
    pub fn retryable(err: impl Into<anyhow::Error>) -> Self {
        HandlerError::Retryable(err.into())
    }

    pub fn permanent(err: impl Into<anyhow::Error>) -> Self {
        HandlerError::Permanent(err.into())
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, HandlerError::Permanent(_))
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError::Retryable(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_source_is_retryable() {
        assert!(ConsumerError::transient("connection reset").is_retryable());
        assert!(!ConsumerError::config("batch_size must be > 0").is_retryable());
        assert!(!ConsumerError::PoolClosed.is_retryable());
    }

    #[test]
    fn bare_anyhow_error_is_retryable() {
        let err: HandlerError = anyhow::anyhow!("crm timed out").into();
        assert!(!err.is_permanent());
        assert!(HandlerError::permanent(anyhow::anyhow!("bad deal id")).is_permanent());
    }
}
