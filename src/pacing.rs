use std::time::Duration;

use async_trait::async_trait;

/// Decides how long the roster loop waits before starting the next student.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self);
}

/// Fixed gap between successive students.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Pacer for FixedDelay {
    async fn pause(&self) {
        if !self.delay.is_zero() {
            tracing::debug!("Pacing roster sync: waiting {:?}", self.delay);
            tokio::time::sleep(self.delay).await;
        }
    }
}
