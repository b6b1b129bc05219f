use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::common::{
    Completion, ConsumerError, DeliveredMessage, DeliveryState, DrainReport, HandlerOutcome,
    MessageHandler, calculate_backoff,
};
use crate::driver::context::DispatcherContext;
use crate::driver::pacemaker::{PacemakerEvent, PullPacemaker};
use crate::driver::plugin::ConsumerPlugin;
use crate::driver::pool::{Submission, WorkerPool};
use crate::driver::tracker::{Admission, DeliveryTracker};
use crate::driver::ConsumerMetrics;
use crate::policy::WaitStrategy;

/// 确认动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settle {
    Ack,
    Nack,
}

impl Settle {
    fn as_str(&self) -> &'static str {
        match self {
            Settle::Ack => "ack",
            Settle::Nack => "nack",
        }
    }
}

/// 分发器 Inner 结构体
struct DispatcherInner<H> {
    /// 全局上下文
    ctx: DispatcherContext,
    /// 工作池 (并发上限 + 超时 + Panic 隔离)
    pool: WorkerPool<H>,
    /// 飞行集合
    tracker: DeliveryTracker,
    /// 插件系统 (第一个总是 MetricsPlugin)
    plugins: Vec<Box<dyn ConsumerPlugin>>,
    /// 空闲等待策略
    wait_strategy: Arc<dyn WaitStrategy>,
    /// 全局暂停开关
    paused: AtomicBool,
    /// 新消息信号，Resume 时也会触发
    notify: Arc<Notify>,
}

/// 分发器 (Dispatcher)
///
/// 单一的拉取循环：pull → 接纳 (Tracker) → 提交 (Pool)，
/// 每条被接纳的消息各有一个结算任务，等待结果后执行 ack / nack / 死信。
pub struct Dispatcher<H> {
    inner: Arc<DispatcherInner<H>>,
}

impl<H> Clone for Dispatcher<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<H> Dispatcher<H>
where
    H: MessageHandler,
{
    /// 构造函数
    pub fn new_with_components(
        ctx: DispatcherContext,
        handler: H,
        plugins: Vec<Box<dyn ConsumerPlugin>>,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Self {
        let pool = WorkerPool::new(
            handler,
            ctx.config.worker.concurrency_limit,
            ctx.config.processing_timeout(),
            ctx.metrics.clone(),
        );
        let inner = DispatcherInner {
            ctx,
            pool,
            tracker: DeliveryTracker::new(),
            plugins,
            wait_strategy,
            paused: AtomicBool::new(false),
            notify: Arc::new(Notify::new()),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn consumer_id(&self) -> &str {
        &self.inner.ctx.consumer_id
    }

    pub fn metrics(&self) -> Arc<ConsumerMetrics> {
        self.inner.ctx.metrics.clone()
    }

    /// 飞行集合 (只读观察用)
    pub fn tracker(&self) -> &DeliveryTracker {
        &self.inner.tracker
    }

    /// 暂停拉取。已在处理中的消息不受影响。
    pub fn pause(&self) {
        if !self.inner.paused.swap(true, Ordering::AcqRel) {
            info!("[Dispatcher-{}] Paused.", self.inner.ctx.consumer_id);
        }
    }

    /// 恢复拉取
    pub fn resume(&self) {
        if self.inner.paused.swap(false, Ordering::AcqRel) {
            info!("[Dispatcher-{}] Resumed.", self.inner.ctx.consumer_id);
            self.inner.notify.notify_one();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    /// 运行拉取循环，直到 `cancel` 被触发并完成排空
    ///
    /// 取消后：
    /// 1. 停止拉取与接纳；
    /// 2. 已拉取但尚未提交的消息立即 Nack；
    /// 3. 在 `shutdown_drain_timeout` 内等待在途消息结算；
    /// 4. 超时仍未结算的消息保持未确认，由队列重新投递。
    pub async fn run(&self, cancel: CancellationToken) -> DrainReport {
        let inner = &self.inner;
        let ctx = &inner.ctx;

        // 订阅新消息信号；不支持时退化为纯轮询
        if let Err(e) = ctx.source.watch(inner.notify.clone()).await {
            warn!("[Dispatcher] Source watch unavailable, polling only: {}", e);
        }

        // [Hook] 启动
        for p in inner.plugins.iter() {
            p.on_start(ctx).await;
        }
        info!(
            "[Dispatcher-{}] Listening on '{}' (concurrency={}, batch={}).",
            ctx.consumer_id,
            ctx.config.subscription,
            inner.pool.limit(),
            ctx.config.pull.batch_size
        );

        let mut resolutions = JoinSet::new();
        self.pull_loop(&cancel, &mut resolutions).await;

        let report = self.drain(&mut resolutions).await;

        // [Hook] 关闭
        for p in inner.plugins.iter() {
            p.on_shutdown(ctx, &report).await;
        }
        info!(
            "[Dispatcher-{}] Shutdown complete: drained={}, abandoned={}.",
            ctx.consumer_id, report.drained, report.abandoned
        );
        report
    }

    /// 拉取主循环
    ///
    /// 职责：
    /// 1. 听起搏器 (Pacemaker) 的节奏。
    /// 2. 执行插件的前置检查 (before_pull)。
    /// 3. 拉取一批消息，失败则指数退避。
    /// 4. 逐条接纳并提交到工作池；工作池满时在这里挂起。
    async fn pull_loop(&self, cancel: &CancellationToken, resolutions: &mut JoinSet<()>) {
        let inner = &self.inner;
        let ctx = &inner.ctx;
        let pull_cfg = &ctx.config.pull;
        let error_base = Duration::from_millis(pull_cfg.error_backoff_base_ms);
        let error_max = Duration::from_millis(pull_cfg.error_backoff_max_ms);

        let mut pacemaker = PullPacemaker::new(
            &inner.paused,
            &inner.notify,
            cancel,
            inner.wait_strategy.clone(),
        );
        let mut error_streak: u32 = 0;

        loop {
            // 回收已经结束的结算任务
            while let Some(res) = resolutions.try_join_next() {
                log_join_result(res);
            }

            match pacemaker.wait_next().await {
                PacemakerEvent::Trigger => {}
                PacemakerEvent::Shutdown => break,
            }

            // 插件流控
            let mut allow_pull = true;
            for plugin in inner.plugins.iter() {
                if !plugin.before_pull(ctx).await {
                    allow_pull = false;
                    break;
                }
            }
            if !allow_pull {
                pacemaker.mark_idle();
                continue;
            }

            // 取消时放弃进行中的 pull，已被消息源租出的消息等可见性窗口到期后重投
            let pulled = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                res = ctx.source.pull(pull_cfg.batch_size) => res,
            };

            let batch = match pulled {
                Ok(batch) => {
                    error_streak = 0;
                    batch
                }
                Err(e) => {
                    error_streak = error_streak.saturating_add(1);
                    let delay = calculate_backoff(error_streak, error_base, error_max);
                    if e.is_retryable() {
                        warn!(
                            "[Dispatcher] Pull failed ({} in a row), retrying in {:?}: {}",
                            error_streak, delay, e
                        );
                    } else {
                        error!(
                            "[Dispatcher] Pull rejected ({} in a row), retrying in {:?}: {}",
                            error_streak, delay, e
                        );
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
            };

            if batch.is_empty() {
                pacemaker.mark_idle();
                continue;
            }
            trace!("[Dispatcher] Pulled {} message(s).", batch.len());

            for p in inner.plugins.iter() {
                p.after_pull(&batch).await;
            }

            match self.dispatch_batch(batch, cancel, resolutions).await {
                None => break,
                Some(0) => {
                    // 整批都是重复投递：按空拉退避，别和在途的那次抢着重拉
                    pacemaker.mark_idle();
                }
                Some(_) => pacemaker.mark_busy(),
            }
        }
    }

    /// 逐条接纳并提交一批消息
    ///
    /// # 返回值
    /// - `Some(n)`: 本批有 `n` 条消息被提交到工作池。
    /// - `None`: 提交途中收到取消信号，剩余消息已被安排 Nack。
    async fn dispatch_batch(
        &self,
        batch: Vec<DeliveredMessage>,
        cancel: &CancellationToken,
        resolutions: &mut JoinSet<()>,
    ) -> Option<usize> {
        let inner = &self.inner;
        let mut pending = batch.into_iter();
        let mut submitted = 0;

        while let Some(message) = pending.next() {
            // 1. 接纳：同一 ID 已在处理中则立即 Nack，不调用 Handler
            let Some(admission) = inner.tracker.admit_guarded(&message.id, &message.ack_token)
            else {
                debug!(
                    "[Dispatcher] Message {} already in flight, nacking duplicate delivery.",
                    message.id
                );
                let this = inner.clone();
                resolutions.spawn(async move { this.reject_duplicate(message).await });
                continue;
            };

            // 2. 等待工作池空位 (背压)，同时听取消信号
            let slot = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                slot = inner.pool.acquire() => match slot {
                    Ok(slot) => Some(slot),
                    Err(e) => {
                        error!("[Dispatcher] Worker pool unavailable: {}", e);
                        None
                    }
                },
            };

            let Some(slot) = slot else {
                let leftovers: Vec<_> = pending.collect();
                debug!(
                    "[Dispatcher] Stopping with {} unsubmitted message(s), nacking.",
                    leftovers.len() + 1
                );
                let this = inner.clone();
                resolutions.spawn(async move {
                    this.return_unsubmitted(message, Some(admission)).await
                });
                for message in leftovers {
                    let this = inner.clone();
                    resolutions.spawn(async move { this.return_unsubmitted(message, None).await });
                }
                return None;
            };

            // 3. 提交
            for p in inner.plugins.iter() {
                p.before_process(&message).await;
            }
            let submission = inner.pool.launch(slot, message);
            let this = inner.clone();
            resolutions.spawn(async move { this.resolve(submission, admission).await });
            submitted += 1;
        }
        Some(submitted)
    }

    /// 排空在途结算任务
    async fn drain(&self, resolutions: &mut JoinSet<()>) -> DrainReport {
        let timeout = self.inner.ctx.config.shutdown_drain_timeout();
        let deadline = Instant::now() + timeout;
        let mut drained = 0;

        if !resolutions.is_empty() {
            info!(
                "[Dispatcher] Draining {} in-flight message(s), waiting up to {:?}.",
                resolutions.len(),
                timeout
            );
        }

        while let Ok(Some(res)) = tokio::time::timeout_at(deadline, resolutions.join_next()).await {
            log_join_result(res);
            drained += 1;
        }

        let abandoned = resolutions.len();
        if abandoned > 0 {
            warn!(
                "[Dispatcher] Drain timed out, leaving {} message(s) un-acked for redelivery.",
                abandoned
            );
            // 中止结算任务；Admission 守卫随之释放飞行记录
            resolutions.shutdown().await;
        }

        DrainReport { drained, abandoned }
    }
}

// ==========================================
// Core Logic: 结算逻辑
// ==========================================

impl<H> DispatcherInner<H>
where
    H: MessageHandler,
{
    /// 等待执行结果并结算
    ///
    /// 飞行记录 (`admission`) 在 ack/nack 完成之后才释放。
    async fn resolve(&self, submission: Submission, admission: Admission) {
        let completion = submission.await;

        // [Hook] 执行后 (通用)
        for p in self.plugins.iter() {
            p.after_process(&completion).await;
        }

        let state = completion.resolution();
        let Completion {
            message,
            outcome,
            elapsed,
            ..
        } = completion;

        let action = match &outcome {
            HandlerOutcome::Success => {
                debug!("[Dispatcher] Message {} processed in {:?}.", message.id, elapsed);
                Settle::Ack
            }
            HandlerOutcome::RetryableFailure(reason) => {
                warn!(
                    "[Dispatcher] Message {} failed on attempt {}, nacking for redelivery: {}",
                    message.id, message.delivery_attempt, reason
                );
                Settle::Nack
            }
            HandlerOutcome::PermanentFailure(reason) => {
                error!(
                    "[Dispatcher] Message {} failed permanently, dead-lettering: {}",
                    message.id, reason
                );
                self.dead_letter(&message, reason).await;
                Settle::Ack
            }
        };

        if self.settle(action, &message).await {
            for p in self.plugins.iter() {
                p.on_resolved(&message, state).await;
            }
        }
        drop(admission);
    }

    /// 重复投递：直接 Nack，Handler 不会被调用
    async fn reject_duplicate(&self, message: DeliveredMessage) {
        for p in self.plugins.iter() {
            p.on_conflict(&message).await;
        }
        if self.settle(Settle::Nack, &message).await {
            for p in self.plugins.iter() {
                p.on_resolved(&message, DeliveryState::NackedImmediate).await;
            }
        }
    }

    /// 停机时已拉取但未提交的消息：归还给队列
    async fn return_unsubmitted(&self, message: DeliveredMessage, admission: Option<Admission>) {
        if self.settle(Settle::Nack, &message).await {
            for p in self.plugins.iter() {
                p.on_resolved(&message, DeliveryState::NackedImmediate).await;
            }
        }
        drop(admission);
    }

    /// 交给死信通道 (尽力而为，失败只记日志)
    async fn dead_letter(&self, message: &DeliveredMessage, reason: &str) {
        match self.ctx.deadletter.deadletter(message, reason).await {
            Ok(()) => {
                for p in self.plugins.iter() {
                    p.on_dead_letter(message, reason).await;
                }
            }
            Err(e) => error!(
                "[Dispatcher] Dead-letter sink failed for {}: {}",
                message.id, e
            ),
        }
    }

    /// 执行 ack / nack，暂时性错误按指数退避重试
    ///
    /// # 返回值
    /// - `true`: 消息源接受了确认。
    /// - `false`: 放弃；消息等可见性窗口到期后由队列重投。
    async fn settle(&self, action: Settle, message: &DeliveredMessage) -> bool {
        let policy = &self.ctx.config.policy;
        let pull_cfg = &self.ctx.config.pull;
        let max_attempts = policy.ack_retry_attempts.max(1);
        let base = Duration::from_millis(pull_cfg.error_backoff_base_ms);
        let max = Duration::from_millis(pull_cfg.error_backoff_max_ms);

        let mut attempt = 1;
        loop {
            let result = match action {
                Settle::Ack => self.ctx.source.ack(&message.ack_token).await,
                Settle::Nack => self.ctx.source.nack(&message.ack_token).await,
            };

            let err: ConsumerError = match result {
                Ok(()) => return true,
                Err(e) => e,
            };

            if !err.is_retryable() || attempt >= max_attempts {
                error!(
                    "[Dispatcher] Giving up {} for message {} after {} attempt(s): {}",
                    action.as_str(),
                    message.id,
                    attempt,
                    err
                );
                return false;
            }

            let delay = calculate_backoff(attempt, base, max);
            warn!(
                "[Dispatcher] {} for message {} failed (attempt {}/{}), retrying in {:?}: {}",
                action.as_str(),
                message.id,
                attempt,
                max_attempts,
                delay,
                err
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn log_join_result(res: Result<(), JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            error!("[Dispatcher] Resolution task panicked: {}", e);
        } else {
            trace!("[Dispatcher] Resolution task cancelled: {}", e);
        }
    }
}
