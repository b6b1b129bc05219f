pub mod config;
pub mod error;
pub mod model;
pub mod traits;
pub(crate) mod utils;

// 导出配置
pub use config::{ConsumerConfig, PolicyConfig, PullConfig, WorkerConfig};

// 导出错误类型
pub use error::{ConsumerError, HandlerError, Result};

// 导出核心模型
pub use model::{Completion, DeliveredMessage, DeliveryState, DrainReport, HandlerOutcome};

// 导出用户需实现的 Trait
pub use traits::{HandlerFn, MessageHandler, Utf8Handler, handler_fn};

// 内部工具的快捷访问
pub(crate) use utils::calculate_backoff;
pub use utils::{new_ack_token, new_message_id};
