use async_trait::async_trait;
use bytes::Bytes;
use std::{future::Future, sync::Arc};

use crate::common::error::HandlerError;

// ==========================================
// 1. 核心处理接口 (MessageHandler)
// ==========================================

/// 消息处理器接口
///
/// 业务逻辑的唯一入口，对调度器来说是不透明的：可能很慢、可能失败、甚至可能 Panic。
///
/// # 返回值
/// - `Ok(())`: 处理成功，消息会被 Ack。
/// - `Err(HandlerError::Retryable(_))`: 暂时性失败，消息会被 Nack 等待重投。
/// - `Err(HandlerError::Permanent(_))`: 不可恢复，消息进入死信后被 Ack。
///
/// # 并发
/// 同一个 Handler 实例会被多个 Worker 并发调用 (不同的消息)，实现必须是 `Send + Sync`。
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn process(&self, payload: Bytes) -> Result<(), HandlerError>;
}

// 让 Arc<Handler> 自动实现 MessageHandler
#[async_trait]
impl<H> MessageHandler for Arc<H>
where
    H: MessageHandler,
{
    async fn process(&self, payload: Bytes) -> Result<(), HandlerError> {
        (**self).process(payload).await
    }
}

// ==========================================
// 2. 闭包适配器 (HandlerFn)
// ==========================================

/// 把异步闭包包装成 `MessageHandler`
pub struct HandlerFn<F> {
    f: F,
}

/// 用闭包快速构造 Handler
///
/// ```ignore
/// let handler = handler_fn(|payload: Bytes| async move {
///     println!("got {} bytes", payload.len());
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> MessageHandler for HandlerFn<F>
where
    F: Fn(Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn process(&self, payload: Bytes) -> Result<(), HandlerError> {
        (self.f)(payload).await
    }
}

// ==========================================
// 3. 文本消息适配器 (Utf8Handler)
// ==========================================

/// 先把消息体解码为 UTF-8 字符串，再交给业务闭包
///
/// - 解码失败属于数据损坏 (毒丸)，按永久失败处理，不会无限重投。
pub struct Utf8Handler<F> {
    f: F,
}

impl<F, Fut> Utf8Handler<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for Utf8Handler<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn process(&self, payload: Bytes) -> Result<(), HandlerError> {
        let text = match std::str::from_utf8(&payload) {
            Ok(s) => s.to_owned(),
            Err(e) => {
                return Err(HandlerError::permanent(anyhow::anyhow!(
                    "invalid utf-8 payload: {e}"
                )));
            }
        };
        (self.f)(text).await
    }
}
