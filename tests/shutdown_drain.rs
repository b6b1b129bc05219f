mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use common::{ScriptedSource, init_tracing, msg, test_config, wait_until};
use herald::driver::DispatcherContext;
use herald::{
    ConsumerBuilder, ConsumerPlugin, DeliveredMessage, DeliveryState, DrainReport, MemorySource,
    MessageHandler, handler_fn,
};

fn sleeping_handler(d: Duration) -> impl MessageHandler {
    handler_fn(move |_payload: Bytes| async move {
        tokio::time::sleep(d).await;
        Ok(())
    })
}

#[tokio::test]
async fn in_flight_messages_finish_within_drain_timeout() {
    init_tracing();
    let source = ScriptedSource::new();
    source.push_batch(vec![msg("a", "ta", "x"), msg("b", "tb", "x")]);

    let consumer = ConsumerBuilder::new()
        .source(source.clone())
        .config(test_config(4))
        .build(sleeping_handler(Duration::from_millis(200)))
        .unwrap();

    let runner = consumer.clone();
    let handle = tokio::spawn(async move { runner.start().await });

    let c = consumer.clone();
    wait_until("both admitted", Duration::from_secs(2), move || c.in_flight() == 2).await;
    consumer.shutdown();
    let report = handle.await.unwrap();

    assert_eq!(report, DrainReport { drained: 2, abandoned: 0 });
    let mut acked = source.acked_tokens();
    acked.sort();
    assert_eq!(acked, vec!["ta".to_string(), "tb".to_string()]);
}

#[tokio::test]
async fn unfinished_messages_are_left_unacked_after_drain_timeout() {
    init_tracing();
    let source = ScriptedSource::new();
    source.push_batch(vec![msg("stuck", "t1", "x")]);

    let mut config = test_config(2);
    config.worker.processing_timeout_ms = 10_000;
    config.policy.shutdown_drain_timeout_ms = 100;

    let consumer = ConsumerBuilder::new()
        .source(source.clone())
        .config(config)
        .build(sleeping_handler(Duration::from_secs(5)))
        .unwrap();

    let runner = consumer.clone();
    let handle = tokio::spawn(async move { runner.start().await });

    let c = consumer.clone();
    wait_until("admitted", Duration::from_secs(2), move || c.in_flight() == 1).await;

    let stop = Instant::now();
    consumer.shutdown();
    let report = handle.await.unwrap();

    assert!(stop.elapsed() < Duration::from_secs(2));
    assert_eq!(report, DrainReport { drained: 0, abandoned: 1 });
    assert!(!report.is_clean());
    // 既没有 ack 也没有 nack：交给队列的可见性窗口
    assert!(source.acked_tokens().is_empty());
    assert!(source.nacked_tokens().is_empty());
    assert_eq!(consumer.in_flight(), 0);
}

#[tokio::test]
async fn pulled_but_unsubmitted_messages_are_nacked_on_shutdown() {
    init_tracing();
    let source = ScriptedSource::new();
    source.push_batch(vec![
        msg("m1", "t1", "x"),
        msg("m2", "t2", "x"),
        msg("m3", "t3", "x"),
    ]);

    let consumer = ConsumerBuilder::new()
        .source(source.clone())
        .config(test_config(1))
        .build(sleeping_handler(Duration::from_millis(300)))
        .unwrap();

    let runner = consumer.clone();
    let handle = tokio::spawn(async move { runner.start().await });

    // m1 占住唯一的席位，m2 在等席位
    let c = consumer.clone();
    wait_until("m2 admitted", Duration::from_secs(2), move || c.in_flight() == 2).await;
    consumer.shutdown();
    let report = handle.await.unwrap();

    assert_eq!(source.acked_tokens(), vec!["t1".to_string()]);
    let mut nacked = source.nacked_tokens();
    nacked.sort();
    assert_eq!(nacked, vec!["t2".to_string(), "t3".to_string()]);
    assert_eq!(report.abandoned, 0);
    assert_eq!(consumer.in_flight(), 0);
}

#[tokio::test]
async fn pause_stops_pulling_until_resume() {
    init_tracing();
    let source = Arc::new(MemorySource::default());
    let consumer = ConsumerBuilder::new()
        .source(source.clone())
        .config(test_config(2))
        .build(handler_fn(|_payload: Bytes| async { Ok(()) }))
        .unwrap();

    consumer.pause();
    let runner = consumer.clone();
    let handle = tokio::spawn(async move { runner.start().await });

    source.publish("while paused");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(source.len(), 1);
    assert_eq!(consumer.metrics().pulled, 0);

    consumer.resume();
    let src = source.clone();
    wait_until("processed after resume", Duration::from_secs(2), move || src.is_empty()).await;

    consumer.shutdown();
    handle.await.unwrap();
    assert_eq!(consumer.metrics().acked, 1);
}

#[tokio::test]
async fn source_notification_cuts_idle_backoff_short() {
    init_tracing();
    let source = Arc::new(MemorySource::default());
    let mut config = test_config(2);
    config.pull.idle_backoff_min_ms = 10_000;
    config.pull.idle_backoff_max_ms = 10_000;

    let consumer = ConsumerBuilder::new()
        .source(source.clone())
        .config(config)
        .build(handler_fn(|_payload: Bytes| async { Ok(()) }))
        .unwrap();

    let runner = consumer.clone();
    let handle = tokio::spawn(async move { runner.start().await });

    // 让第一次空拉完成，循环进入 10 秒的空闲等待
    tokio::time::sleep(Duration::from_millis(100)).await;
    let published = Instant::now();
    source.publish("wake up");

    let src = source.clone();
    wait_until("processed without waiting out the backoff", Duration::from_secs(2), move || {
        src.is_empty()
    })
    .await;
    assert!(published.elapsed() < Duration::from_secs(2));

    consumer.shutdown();
    handle.await.unwrap();
}

/// 记录钩子调用的插件
#[derive(Clone, Default)]
struct RecordingPlugin {
    events: Arc<Mutex<Vec<String>>>,
    veto: Arc<AtomicBool>,
}

#[async_trait]
impl ConsumerPlugin for RecordingPlugin {
    async fn on_start(&self, ctx: &DispatcherContext) {
        self.events.lock().push(format!("start:{}", ctx.consumer_id));
    }

    async fn on_shutdown(&self, _ctx: &DispatcherContext, report: &DrainReport) {
        self.events.lock().push(format!("shutdown:{}", report.abandoned));
    }

    async fn before_pull(&self, _ctx: &DispatcherContext) -> bool {
        !self.veto.load(Ordering::SeqCst)
    }

    async fn before_process(&self, message: &DeliveredMessage) {
        self.events.lock().push(format!("process:{}", message.id));
    }

    async fn on_resolved(&self, message: &DeliveredMessage, state: DeliveryState) {
        self.events.lock().push(format!("resolved:{}:{:?}", message.id, state));
    }
}

#[tokio::test]
async fn plugin_hooks_fire_in_order_and_before_pull_can_veto() {
    init_tracing();
    let source = ScriptedSource::new();
    source.push_batch(vec![msg("m1", "t1", "x")]);

    let plugin = RecordingPlugin::default();
    plugin.veto.store(true, Ordering::SeqCst);

    let consumer = ConsumerBuilder::new()
        .source(source.clone())
        .config(test_config(1))
        .with_plugin(plugin.clone())
        .build(handler_fn(|_payload: Bytes| async { Ok(()) }))
        .unwrap();

    let runner = consumer.clone();
    let handle = tokio::spawn(async move { runner.start().await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(source.pull_calls.load(Ordering::SeqCst), 0);

    plugin.veto.store(false, Ordering::SeqCst);
    let acks = source.acks.clone();
    wait_until("acked once veto lifted", Duration::from_secs(2), move || {
        !acks.lock().is_empty()
    })
    .await;
    consumer.shutdown();
    handle.await.unwrap();

    let events = plugin.events.lock().clone();
    assert_eq!(
        events,
        vec![
            "start:test-consumer".to_string(),
            "process:m1".to_string(),
            "resolved:m1:Acked".to_string(),
            "shutdown:0".to_string(),
        ]
    );
}
