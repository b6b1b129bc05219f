use nanoid::nanoid;
use rand::Rng;
use std::time::Duration;

// ==========================================
// 1. ID 生成工具 (Identity Utilities)
// ==========================================

const ALPHABET: [char; 62] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'A', 'B',
    'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U',
    'V', 'W', 'X', 'Y', 'Z',
];

/// 生成消息 ID (NanoID, 21 位)
#[inline]
pub fn new_message_id() -> String {
    nanoid!()
}

/// 生成投递回执 (Ack Token)
///
/// 每次投递都是新的回执，同一条消息的重投递不会复用旧回执。
#[inline]
pub fn new_ack_token() -> String {
    nanoid!(32, &ALPHABET)
}

/// 获取当前机器的主机名
pub fn get_hostname() -> String {
    hostname::get()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| format!("node-{}", nanoid!(5, &ALPHABET)))
}

/// 默认消费者 ID: `hostname-随机串`
pub fn default_consumer_id() -> String {
    format!("{}-{}", get_hostname(), nanoid!(5, &ALPHABET))
}

// ==========================================
// 2. 算法工具 (Algorithmic Utilities)
// ==========================================

/// 计算指数退避时间 (Exponential Backoff with Jitter)
///
/// - attempt: 当前连续失败次数 (1, 2, 3...)
/// - base: 基础延迟
/// - max: 最大延迟 (封顶)
///
/// 结果落在 `[base / 2, min(base * 2^(attempt-1), max)]` 之间。
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let mut rng = rand::rng();

    // 1. 指数部分: base * 2^(attempt-1)，指数限制在 30 以内防止溢出
    let exponent = attempt.saturating_sub(1).min(30);
    let mut backoff = base.as_secs_f64() * 2f64.powi(exponent as i32);

    // 2. 封顶
    let cap = max.as_secs_f64();
    if backoff > cap {
        backoff = cap;
    }

    // 3. Equal Jitter: 保留一半确定延迟，另一半随机
    // 错误风暴时不希望退避被随机到接近 0
    let floor = (base.as_secs_f64() / 2.0).min(backoff);
    let jittered = if backoff > floor {
        rng.random_range(floor..=backoff)
    } else {
        backoff
    };

    Duration::from_secs_f64(jittered)
}
