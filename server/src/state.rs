use std::sync::Arc;

use sendgate::dispatch::{BulkDispatcher, RetryPolicy};
use sendgate::mail::Mailer;

pub type SharedMailer = Arc<dyn Mailer>;

/// Shared by every handler. The mailer inside the dispatcher is built once at
/// startup and never replaced.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<BulkDispatcher<SharedMailer>>,
    pub admin_email: Arc<str>,
    /// Sends in flight per bulk request.
    pub bulk_ceiling: usize,
}

impl AppState {
    pub fn new(
        mailer: SharedMailer,
        admin_email: impl Into<Arc<str>>,
        bulk_ceiling: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            dispatcher: Arc::new(BulkDispatcher::new(mailer, retry)),
            admin_email: admin_email.into(),
            bulk_ceiling,
        }
    }
}
