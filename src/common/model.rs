use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};

// ==========================================
// 1. 投递消息 (DeliveredMessage)
// ==========================================

/// 一次投递
///
/// - 由 `MessageSource::pull` 产生，收到后不可变。
/// - 同一条逻辑消息 (`id`) 可能被多次投递，每次投递的 `ack_token` 都不同。
/// - 所有权: 调度器持有 -> 移交给工作池执行 -> 随 `Completion` 交还调度器做 ack/nack。
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    /// 队列分配的消息 ID (不透明)
    pub id: String,

    /// 本次投递的回执，ack/nack 时使用
    pub ack_token: String,

    /// 消息体
    pub payload: Bytes,

    /// 第几次投递 (从 1 开始)
    pub delivery_attempt: u32,

    /// 入队时间
    pub enqueued_at: DateTime<Utc>,

    /// 消息属性 (键值对)
    pub attributes: HashMap<String, String>,
}

impl DeliveredMessage {
    pub fn new(
        id: impl Into<String>,
        ack_token: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            id: id.into(),
            ack_token: ack_token.into(),
            payload: payload.into(),
            delivery_attempt: 1,
            enqueued_at: Utc::now(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.delivery_attempt = attempt.max(1);
        self
    }

    pub fn with_enqueued_at(mut self, at: DateTime<Utc>) -> Self {
        self.enqueued_at = at;
        self
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// 以 UTF-8 字符串解读消息体
    pub fn payload_utf8(&self) -> std::result::Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.payload)
    }
}

// ==========================================
// 2. 处理结果 (HandlerOutcome)
// ==========================================

/// Handler 执行结果
///
/// 由工作池产生，由调度器消费:
/// - `Success` -> Ack
/// - `RetryableFailure` -> Nack，依赖队列重新投递
/// - `PermanentFailure` -> 死信 + Ack，阻止无限重投
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlerOutcome {
    Success,
    RetryableFailure(String),
    PermanentFailure(String),
}

impl HandlerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, HandlerOutcome::Success)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            HandlerOutcome::Success => None,
            HandlerOutcome::RetryableFailure(r) | HandlerOutcome::PermanentFailure(r) => Some(r),
        }
    }
}

// ==========================================
// 3. 投递状态机 (DeliveryState)
// ==========================================

/// 单个消息 ID 的状态
///
/// `Unseen -> InFlight -> {Acked, NackedImmediate, NackedAfterFailure, NackedTimeout} -> Unseen`
///
/// 状态机按 ID 而非按对象：释放后同一 ID 的重投递可以再次被接纳。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryState {
    /// 不在飞行集合中
    Unseen,
    /// 已被接纳，正在处理
    InFlight,
    /// 已确认 (成功，或永久失败后死信)
    Acked,
    /// 接纳冲突，未执行 Handler 直接 Nack
    NackedImmediate,
    /// Handler 返回可重试失败后 Nack
    NackedAfterFailure,
    /// Handler 超时后 Nack
    NackedTimeout,
}

impl DeliveryState {
    /// 是否为终态 (释放前的最后一个状态)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryState::Unseen | DeliveryState::InFlight)
    }
}

// ==========================================
// 4. 执行回执 (Completion)
// ==========================================

/// 工作池交还给调度器的执行记录
#[derive(Debug)]
pub struct Completion {
    /// 原消息 (所有权交还)
    pub message: DeliveredMessage,
    /// 执行结果
    pub outcome: HandlerOutcome,
    /// 是否因超时得出结果
    pub timed_out: bool,
    /// 从开始执行到得出结果的耗时
    pub elapsed: Duration,
}

impl Completion {
    /// 该结果应当落入的终态
    pub fn resolution(&self) -> DeliveryState {
        match &self.outcome {
            HandlerOutcome::Success | HandlerOutcome::PermanentFailure(_) => DeliveryState::Acked,
            HandlerOutcome::RetryableFailure(_) if self.timed_out => DeliveryState::NackedTimeout,
            HandlerOutcome::RetryableFailure(_) => DeliveryState::NackedAfterFailure,
        }
    }
}

// ==========================================
// 5. 停机报告 (DrainReport)
// ==========================================

/// `Dispatcher::run` 返回时的排空情况
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// 停机阶段在超时内完成的在途消息数
    pub drained: usize,
    /// 排空超时后仍未完成、被保留为未确认的消息数
    pub abandoned: usize,
}

impl DrainReport {
    pub fn is_clean(&self) -> bool {
        self.abandoned == 0
    }
}
