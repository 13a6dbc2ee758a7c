use futures::future::join_all;
use serde::Serialize;

use super::{ConcurrencyLimiter, RetryPolicy};
use crate::mail::{Delivery, Email, MailError, Mailer};

/// Delivery of one rendered message to one recipient.
#[derive(Debug, Clone)]
pub struct SendTask {
    pub recipient: String,
    pub email: Email,
    pub attempts: u32,
}

/// Final state of a [`SendTask`].
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub recipient: String,
    pub attempts: u32,
    pub result: Result<Delivery, String>,
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.result.as_ref().ok().map(|d| d.message_id.as_str())
    }

    pub fn error(&self) -> Option<&str> {
        self.result.as_ref().err().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRecipient {
    pub email: String,
    pub error: String,
}

/// Aggregate of a settled batch.
///
/// `sent + failed.len()` always equals the number of recipients submitted, and
/// `outcomes` lists one entry per recipient in submission order.
#[derive(Debug, Clone)]
pub struct BulkReport {
    pub sent: usize,
    pub failed: Vec<FailedRecipient>,
    pub outcomes: Vec<SendOutcome>,
}

impl BulkReport {
    fn from_outcomes(outcomes: Vec<SendOutcome>) -> Self {
        let failed: Vec<FailedRecipient> = outcomes
            .iter()
            .filter_map(|outcome| {
                outcome.error().map(|error| FailedRecipient {
                    email: outcome.recipient.clone(),
                    error: error.to_string(),
                })
            })
            .collect();

        BulkReport {
            sent: outcomes.iter().filter(|o| o.is_success()).count(),
            failed,
            outcomes,
        }
    }

    /// True when every recipient ended up delivered.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

/// Fans a batch out to its recipients.
///
/// Each recipient becomes a [`SendTask`] that waits for a slot in the batch's
/// [`ConcurrencyLimiter`] and then sends through the [`RetryPolicy`]. All tasks
/// of a batch are driven from the calling task; a failing recipient is recorded
/// in the report and never stops its siblings.
///
/// The dispatcher holds no slots itself. Callers pass a limiter per batch, so
/// concurrent batches only contend for the shared transport pool.
pub struct BulkDispatcher<M> {
    mailer: M,
    retry: RetryPolicy,
}

impl<M: Mailer> BulkDispatcher<M> {
    pub fn new(mailer: M, retry: RetryPolicy) -> Self {
        Self { mailer, retry }
    }

    /// Send a single message under the retry policy, bypassing the limiter.
    pub async fn send_with_retries(&self, email: &Email) -> Result<Delivery, MailError> {
        self.retry.run(|_| self.mailer.send(email)).await
    }

    /// Render and send one message per recipient, waiting for all to settle.
    ///
    /// `render` builds the message for a recipient; if it fails, that recipient
    /// is reported as failed without any send attempt.
    pub async fn dispatch<I, R>(
        &self,
        limiter: &ConcurrencyLimiter,
        recipients: I,
        render: R,
    ) -> BulkReport
    where
        I: IntoIterator<Item = String>,
        R: Fn(&str) -> Result<Email, MailError>,
    {
        let tasks: Vec<_> = recipients
            .into_iter()
            .map(|recipient| match render(&recipient) {
                Ok(email) => Ok(SendTask {
                    recipient,
                    email,
                    attempts: 0,
                }),
                Err(error) => Err((recipient, error)),
            })
            .collect();

        tracing::info!(
            recipients = tasks.len(),
            ceiling = limiter.ceiling(),
            "dispatching batch"
        );

        let outcomes = join_all(tasks.into_iter().map(|task| async move {
            match task {
                Ok(task) => self.run_task(limiter, task).await,
                Err((recipient, error)) => {
                    tracing::warn!(%recipient, %error, "could not render message");
                    SendOutcome {
                        recipient,
                        attempts: 0,
                        result: Err(error.to_string()),
                    }
                }
            }
        }))
        .await;

        let report = BulkReport::from_outcomes(outcomes);
        tracing::info!(
            sent = report.sent,
            failed = report.failed.len(),
            "batch settled"
        );
        report
    }

    async fn run_task(&self, limiter: &ConcurrencyLimiter, mut task: SendTask) -> SendOutcome {
        let email = &task.email;
        let submitted = limiter
            .submit(|| self.retry.run_counted(|_| self.mailer.send(email)))
            .await;

        let (result, attempts) = match submitted {
            Ok((result, attempts)) => (result.map_err(|e| e.to_string()), attempts),
            Err(e) => (Err(e.to_string()), 0),
        };
        task.attempts = attempts;

        match &result {
            Ok(delivery) => tracing::debug!(
                recipient = %task.recipient,
                attempts,
                message_id = %delivery.message_id,
                "delivered"
            ),
            Err(error) => tracing::error!(
                recipient = %task.recipient,
                attempts,
                %error,
                "delivery failed after retries"
            ),
        }

        SendOutcome {
            recipient: task.recipient,
            attempts: task.attempts,
            result,
        }
    }
}
