#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use herald::{ConsumerConfig, ConsumerError, DeliveredMessage, MessageSource, Result};

/// ---- Fakes -----

/// 按脚本返回批次的消息源；脚本放完后一直返回空批次
#[derive(Clone, Default)]
pub struct ScriptedSource {
    script: Arc<Mutex<VecDeque<Result<Vec<DeliveredMessage>>>>>,
    // (ack_token, when)
    pub acks: Arc<Mutex<Vec<(String, Instant)>>>,
    pub nacks: Arc<Mutex<Vec<(String, Instant)>>>,
    pub ack_calls: Arc<AtomicUsize>,
    pub pull_calls: Arc<AtomicUsize>,
    // 前 N 次 ack 返回暂时性错误
    failing_acks: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_batch(&self, batch: Vec<DeliveredMessage>) -> &Self {
        self.script.lock().push_back(Ok(batch));
        self
    }

    pub fn push_error(&self, err: ConsumerError) -> &Self {
        self.script.lock().push_back(Err(err));
        self
    }

    pub fn fail_next_acks(&self, n: usize) {
        self.failing_acks.store(n, Ordering::SeqCst);
    }

    pub fn acked_tokens(&self) -> Vec<String> {
        self.acks.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn nacked_tokens(&self) -> Vec<String> {
        self.nacks.lock().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn pull(&self, max_messages: usize) -> Result<Vec<DeliveredMessage>> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().pop_front() {
            Some(Ok(mut batch)) => {
                batch.truncate(max_messages);
                Ok(batch)
            }
            Some(Err(e)) => Err(e),
            None => Ok(Vec::new()),
        }
    }

    async fn ack(&self, ack_token: &str) -> Result<()> {
        self.ack_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_acks.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_acks.store(remaining - 1, Ordering::SeqCst);
            return Err(ConsumerError::transient("ack endpoint unavailable"));
        }
        self.acks.lock().push((ack_token.to_string(), Instant::now()));
        Ok(())
    }

    async fn nack(&self, ack_token: &str) -> Result<()> {
        self.nacks.lock().push((ack_token.to_string(), Instant::now()));
        Ok(())
    }
}

/// 记录每个 payload 被调用次数和峰值并发的探针
#[derive(Clone, Default)]
pub struct ConcurrencyProbe {
    pub current: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
    pub calls: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    pub fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn msg(id: &str, token: &str, payload: &str) -> DeliveredMessage {
    DeliveredMessage::new(id, token, payload.to_string())
}

/// 短退避、短超时的测试配置
pub fn test_config(concurrency: usize) -> ConsumerConfig {
    let mut cfg = ConsumerConfig::new_dev();
    cfg.worker.concurrency_limit = concurrency;
    cfg.consumer_id = "test-consumer".to_string();
    cfg
}

/// 轮询等待条件成立，超时 panic
pub async fn wait_until<F: Fn() -> bool>(what: &str, timeout: Duration, cond: F) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        if Instant::now() > deadline {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
