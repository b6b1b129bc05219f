use bytes::Bytes;
use futures::FutureExt;
use std::{
    any::Any,
    future::{Future, IntoFuture},
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore},
    task::JoinHandle,
    time::Instant,
};
use tracing::{error, warn};

use crate::common::{
    Completion, ConsumerError, DeliveredMessage, HandlerError, HandlerOutcome, MessageHandler,
    Result,
};
use crate::driver::ConsumerMetrics;

/// Handler Panic 时的失败原因
pub const HANDLER_FAULT: &str = "handler fault";
/// 处理超时时的失败原因
pub const PROCESSING_TIMEOUT: &str = "timeout";

/// 工作池 (Worker Pool)
///
/// **职责**:
/// 1. 用信号量把同时运行的 Handler 数量限制在 `concurrency_limit` 以内 (背压)。
/// 2. 隔离单条消息的故障：Panic 被捕获并转换为 `PermanentFailure("handler fault")`。
/// 3. 单条消息超时：超时后结果按 `RetryableFailure("timeout")` 处理。
///
/// **超时与并发额度**:
/// 超时的 Handler 不会被强制取消，它会在后台继续运行直到返回，结果被丢弃。
/// 它占用的并发额度在真正返回时才归还，因此运行中的 Handler 数量永远不超过上限。
pub struct WorkerPool<H> {
    handler: Arc<H>,
    semaphore: Arc<Semaphore>,
    limit: usize,
    processing_timeout: Duration,
    metrics: Arc<ConsumerMetrics>,
}

impl<H> Clone for WorkerPool<H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            semaphore: self.semaphore.clone(),
            limit: self.limit,
            processing_timeout: self.processing_timeout,
            metrics: self.metrics.clone(),
        }
    }
}

/// 一个空闲的执行席位
///
/// 持有期间占用一个并发额度，Drop 即归还。
#[derive(Debug)]
pub struct WorkerSlot {
    permit: OwnedSemaphorePermit,
}

impl<H> WorkerPool<H>
where
    H: MessageHandler,
{
    pub fn new(
        handler: H,
        concurrency_limit: usize,
        processing_timeout: Duration,
        metrics: Arc<ConsumerMetrics>,
    ) -> Self {
        let limit = concurrency_limit.max(1);
        Self {
            handler: Arc::new(handler),
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            processing_timeout,
            metrics,
        }
    }

    /// 等待一个空闲席位
    ///
    /// 工作池满时挂起，直到有 Handler 返回。这是拉取循环唯一的背压点。
    pub async fn acquire(&self) -> Result<WorkerSlot> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ConsumerError::PoolClosed)?;
        Ok(WorkerSlot { permit })
    }

    /// 在已占好的席位上启动一条消息的处理
    pub fn launch(&self, slot: WorkerSlot, message: DeliveredMessage) -> Submission {
        let started = Instant::now();
        let handle = tokio::spawn(invoke(
            self.handler.clone(),
            message.payload.clone(),
            message.id.clone(),
            slot.permit,
            self.metrics.clone(),
        ));
        Submission {
            message,
            handle,
            started,
            deadline: started + self.processing_timeout,
            metrics: self.metrics.clone(),
        }
    }

    /// 提交一条消息：等待席位 + 启动执行
    ///
    /// 永远不会丢弃已提交的消息；返回的 `Submission` 可直接 `.await` 得到 `Completion`。
    pub async fn submit(&self, message: DeliveredMessage) -> Result<Submission> {
        let slot = self.acquire().await?;
        Ok(self.launch(slot, message))
    }

    /// 当前空闲席位数
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 关闭工作池，之后的 `acquire` 全部返回 `PoolClosed`
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// 执行单次 Handler 调用
///
/// 席位 (permit) 随这个任务一起存活，Handler 返回后才归还。
async fn invoke<H: MessageHandler>(
    handler: Arc<H>,
    payload: Bytes,
    id: String,
    permit: OwnedSemaphorePermit,
    metrics: Arc<ConsumerMetrics>,
) -> HandlerOutcome {
    let _permit = permit;
    metrics.inc_active();
    let result = AssertUnwindSafe(handler.process(payload))
        .catch_unwind()
        .await;
    metrics.dec_active();

    match result {
        Ok(Ok(())) => HandlerOutcome::Success,
        Ok(Err(HandlerError::Retryable(e))) => HandlerOutcome::RetryableFailure(format!("{e:#}")),
        Ok(Err(HandlerError::Permanent(e))) => HandlerOutcome::PermanentFailure(format!("{e:#}")),
        Err(panic_err) => {
            error!(
                "[Pool] Handler panicked on message {}: {}",
                id,
                panic_message(&*panic_err)
            );
            metrics.inc_fault();
            HandlerOutcome::PermanentFailure(HANDLER_FAULT.to_string())
        }
    }
}

fn panic_message(panic_err: &(dyn Any + Send)) -> String {
    if let Some(s) = panic_err.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_err.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// 一次已提交的执行
///
/// 持有消息的所有权，结果出来后连同消息一起交还 (`Completion`)。
pub struct Submission {
    message: DeliveredMessage,
    handle: JoinHandle<HandlerOutcome>,
    started: Instant,
    deadline: Instant,
    metrics: Arc<ConsumerMetrics>,
}

impl Submission {
    pub fn message(&self) -> &DeliveredMessage {
        &self.message
    }

    /// 等待结果，最迟在 deadline 给出
    pub async fn outcome(self) -> Completion {
        let Submission {
            message,
            handle,
            started,
            deadline,
            metrics,
        } = self;

        let (outcome, timed_out) = match tokio::time::timeout_at(deadline, handle).await {
            Ok(Ok(outcome)) => (outcome, false),
            Ok(Err(join_err)) => {
                // catch_unwind 已兜住 Handler 的 Panic，这里只剩运行时层面的异常 (如任务被 abort)
                error!("[Pool] Worker task for {} failed: {}", message.id, join_err);
                metrics.inc_fault();
                (HandlerOutcome::PermanentFailure(HANDLER_FAULT.to_string()), false)
            }
            Err(_) => {
                // JoinHandle 被 Drop，任务继续在后台跑完，结果丢弃
                warn!(
                    "[Pool] Message {} exceeded processing timeout after {:?}",
                    message.id,
                    started.elapsed()
                );
                metrics.inc_timeout();
                (
                    HandlerOutcome::RetryableFailure(PROCESSING_TIMEOUT.to_string()),
                    true,
                )
            }
        };

        Completion {
            message,
            outcome,
            timed_out,
            elapsed: started.elapsed(),
        }
    }
}

impl IntoFuture for Submission {
    type Output = Completion;
    type IntoFuture = Pin<Box<dyn Future<Output = Completion> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.outcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::handler_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool<H: MessageHandler>(handler: H, limit: usize, timeout_ms: u64) -> WorkerPool<H> {
        WorkerPool::new(
            handler,
            limit,
            Duration::from_millis(timeout_ms),
            Arc::new(ConsumerMetrics::default()),
        )
    }

    #[tokio::test]
    async fn maps_handler_results_to_outcomes() {
        let pool = pool(
            handler_fn(|payload: Bytes| async move {
                match &payload[..] {
                    b"ok" => Ok(()),
                    b"retry" => Err(HandlerError::retryable(anyhow::anyhow!("crm unavailable"))),
                    _ => Err(HandlerError::permanent(anyhow::anyhow!("unknown deal"))),
                }
            }),
            2,
            1_000,
        );

        let ok = pool.submit(DeliveredMessage::new("1", "t1", "ok")).await.unwrap().await;
        assert_eq!(ok.outcome, HandlerOutcome::Success);
        assert_eq!(ok.message.id, "1");

        let retry = pool.submit(DeliveredMessage::new("2", "t2", "retry")).await.unwrap().await;
        assert_eq!(
            retry.outcome,
            HandlerOutcome::RetryableFailure("crm unavailable".into())
        );

        let perm = pool.submit(DeliveredMessage::new("3", "t3", "???")).await.unwrap().await;
        assert_eq!(perm.outcome, HandlerOutcome::PermanentFailure("unknown deal".into()));
        assert!(!perm.timed_out);
    }

    #[tokio::test]
    async fn panic_becomes_permanent_failure_and_pool_survives() {
        let pool = pool(
            handler_fn(|payload: Bytes| async move {
                if &payload[..] == b"boom" {
                    panic!("translation blew up");
                }
                Ok(())
            }),
            1,
            1_000,
        );

        let faulted = pool.submit(DeliveredMessage::new("1", "t1", "boom")).await.unwrap().await;
        assert_eq!(
            faulted.outcome,
            HandlerOutcome::PermanentFailure(HANDLER_FAULT.into())
        );

        // 唯一的席位已经归还，后续消息照常处理
        let next = pool.submit(DeliveredMessage::new("2", "t2", "fine")).await.unwrap().await;
        assert_eq!(next.outcome, HandlerOutcome::Success);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn slow_handler_times_out_but_keeps_its_slot() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = finished.clone();
        let pool = pool(
            handler_fn(move |_payload: Bytes| {
                let counter = counter.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
            1,
            50,
        );

        let started = std::time::Instant::now();
        let completion = pool.submit(DeliveredMessage::new("slow", "t", "x")).await.unwrap().await;
        assert!(completion.timed_out);
        assert_eq!(
            completion.outcome,
            HandlerOutcome::RetryableFailure(PROCESSING_TIMEOUT.into())
        );
        assert!(started.elapsed() < Duration::from_millis(250));

        // 后台仍在运行，席位未归还
        assert_eq!(pool.available(), 0);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn closed_pool_rejects_submissions() {
        let pool = pool(handler_fn(|_p: Bytes| async { Ok(()) }), 1, 100);
        pool.close();
        let err = pool.submit(DeliveredMessage::new("1", "t", "x")).await.err().unwrap();
        assert!(matches!(err, ConsumerError::PoolClosed));
    }
}
