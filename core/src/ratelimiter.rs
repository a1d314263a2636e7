use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Paces launches to roughly `tokens_per_sec`. Clones share the same bucket;
/// the refill task stops once the last clone is dropped.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    sem: Arc<Semaphore>,
    refill: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.refill.abort();
    }
}

impl RateLimiter {
    /// Must be called from within a tokio runtime.
    pub fn new(tokens_per_sec: u32) -> Self {
        let sem = Arc::new(Semaphore::new(0));
        let sem_bg = sem.clone();
        let interval_ms = u64::from((1000u32 / tokens_per_sec.max(1)).max(1));
        let refill = tokio::spawn(async move {
            let mut t = tokio::time::interval(Duration::from_millis(interval_ms));
            t.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                t.tick().await;
                // keep at most one second worth of burst
                if sem_bg.available_permits() < tokens_per_sec.max(1) as usize {
                    sem_bg.add_permits(1);
                }
            }
        });
        RateLimiter { inner: Arc::new(Inner { sem, refill }) }
    }

    pub async fn acquire(&self) {
        if let Ok(permit) = self.inner.sem.acquire().await {
            permit.forget();
        }
    }
}
