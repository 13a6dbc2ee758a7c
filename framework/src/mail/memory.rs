use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Delivery, Email, MailError, Mailer};

/// In-memory [`Mailer`] for development and testing.
///
/// Delivered messages are kept in a `Vec` behind a mutex. Failures can be
/// scripted per recipient and an artificial latency makes concurrent sends
/// overlap, which lets callers observe how many were in flight at once.
#[derive(Clone, Default)]
pub struct MemoryMailer {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    latency: Option<Duration>,
    state: Mutex<State>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

#[derive(Default)]
struct State {
    sent: Vec<Email>,
    attempts: HashMap<String, u32>,
    failures: HashMap<String, Failure>,
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Always,
    Times(u32),
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every send for `latency` before completing it.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                latency: Some(latency),
                ..Default::default()
            }),
        }
    }

    /// Every send to `recipient` fails.
    pub async fn fail_always(&self, recipient: impl Into<String>) {
        let mut state = self.inner.state.lock().await;
        state.failures.insert(recipient.into(), Failure::Always);
    }

    /// The next `times` sends to `recipient` fail, later ones succeed.
    pub async fn fail_times(&self, recipient: impl Into<String>, times: u32) {
        let mut state = self.inner.state.lock().await;
        state.failures.insert(recipient.into(), Failure::Times(times));
    }

    /// Messages accepted so far, in completion order.
    pub async fn sent(&self) -> Vec<Email> {
        self.inner.state.lock().await.sent.clone()
    }

    /// Number of send attempts addressed to `recipient`, failed ones included.
    pub async fn attempts(&self, recipient: &str) -> u32 {
        let state = self.inner.state.lock().await;
        state.attempts.get(recipient).copied().unwrap_or(0)
    }

    /// Highest number of sends observed in progress at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn record_attempt(&self, email: &Email) -> Result<(), MailError> {
        let mut state = self.inner.state.lock().await;
        let mut failed = None;

        for to in &email.to {
            *state.attempts.entry(to.clone()).or_default() += 1;

            match state.failures.get_mut(to) {
                Some(Failure::Always) => failed = Some(to.clone()),
                Some(Failure::Times(n)) if *n > 0 => {
                    *n -= 1;
                    failed = Some(to.clone());
                }
                _ => {}
            }
        }

        match failed {
            Some(to) => Err(MailError::Smtp(format!("550 mailbox unavailable: {to}"))),
            None => {
                state.sent.push(email.clone());
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: &Email) -> Result<Delivery, MailError> {
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = self.inner.latency {
            tokio::time::sleep(latency).await;
        }
        let result = self.record_attempt(email).await;

        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        result?;

        tracing::debug!(to = ?email.to, subject = %email.subject, "message captured");
        Ok(Delivery {
            message_id: format!("<{}@localhost>", Uuid::new_v4()),
        })
    }
}
