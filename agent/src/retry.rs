use async_trait::async_trait;
use std::time::Duration;

/// Blocks the current task between attempts. Swapped out in tests so retry
/// loops can be checked without waiting.
#[async_trait]
pub trait Sleeper {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `step * attempt`, attempts counted from 1.
    Linear(Duration),
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Linear(step) => *step * attempt,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Search backend retries: 3 attempts, 10s, 20s.
    pub fn search() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Linear(Duration::from_secs(10)),
        }
    }

    /// Model quota retries: 5 attempts, 60s each.
    pub fn model() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::Fixed(Duration::from_secs(60)),
        }
    }
}

/// Loose check used on tool errors: any mention of "rate" or a 429.
pub fn looks_rate_limited(text: &str) -> bool {
    let text = text.to_lowercase();
    text.contains("rate") || text.contains("429")
}
