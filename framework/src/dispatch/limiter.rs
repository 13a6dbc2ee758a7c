use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

#[derive(Debug, thiserror::Error)]
pub enum LimiterError {
    #[error("concurrency ceiling must be between 1 and {max}, got {ceiling}")]
    InvalidCeiling { ceiling: usize, max: usize },
    #[error("limiter is closed")]
    Closed,
}

/// Admission gate bounding how many operations execute at the same time.
///
/// Operations beyond the ceiling wait in a FIFO queue; each completion, whether
/// it succeeded or failed, admits the oldest waiter. The gate never inspects
/// results and never cancels anything it has accepted.
///
/// Clones share the same slots.
///
/// ```ignore
/// let limiter = ConcurrencyLimiter::new(2)?;
/// let (a, b, c) = tokio::join!(
///     limiter.submit(|| send("a")),
///     limiter.submit(|| send("b")),
///     limiter.submit(|| send("c")), // starts once a or b is done
/// );
/// ```
#[derive(Clone, Debug)]
pub struct ConcurrencyLimiter {
    // tokio's semaphore hands out permits in request order
    slots: Arc<Semaphore>,
    ceiling: usize,
    queued: Arc<AtomicUsize>,
}

impl ConcurrencyLimiter {
    pub fn new(ceiling: usize) -> Result<Self, LimiterError> {
        if ceiling == 0 || ceiling > Semaphore::MAX_PERMITS {
            return Err(LimiterError::InvalidCeiling {
                ceiling,
                max: Semaphore::MAX_PERMITS,
            });
        }

        Ok(Self {
            slots: Arc::new(Semaphore::new(ceiling)),
            ceiling,
            queued: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Run `operation` once a slot is free and resolve with its output.
    ///
    /// The slot is held until the operation's future completes.
    pub async fn submit<F, Fut>(&self, operation: F) -> Result<Fut::Output, LimiterError>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let permit = {
            let _waiting = Waiting::enter(&self.queued);
            self.slots.acquire().await.map_err(|_| LimiterError::Closed)?
        };

        let output = operation().await;
        drop(permit);
        Ok(output)
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Operations currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.ceiling - self.slots.available_permits()
    }

    /// Operations waiting for a slot.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }
}

/// Counts a submitter as queued until it is admitted or dropped.
struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Waiting(counter)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
