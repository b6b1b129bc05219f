// 1. 基础模块
pub mod common;

// 2. 核心接口与实现
pub mod driver;
pub mod policy;
pub mod source;

// 3. 对外入口
pub mod consumer;

pub use common::{
    ConsumerConfig, ConsumerError, DeliveredMessage, DeliveryState, DrainReport, HandlerError,
    HandlerOutcome, MessageHandler, Result, Utf8Handler, handler_fn,
};
pub use consumer::{Consumer, ConsumerBuilder};
pub use driver::{
    ConsumerPlugin, Dispatcher, DispatcherBuilder, MetricsSnapshot, DeliveryTracker, WorkerPool,
};
pub use source::{
    DeadLetterSink, LoggingDeadLetterSink, MemoryDeadLetterSink, MemorySource, MessageSource,
};
