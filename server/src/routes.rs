use std::num::NonZeroU32;
use std::time::Duration;

use askama::Template;
use axum::error_handling::HandleErrorLayer;
use axum::extract::State;
use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::{middleware, BoxError, Json, Router};
use sendgate::dispatch::{BulkReport, ConcurrencyLimiter, FailedRecipient};
use sendgate::mail::Email;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;
use tower::timeout::error::Elapsed;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::extract::{Checks, Validate, ValidJson};
use crate::limit::{limit_by_ip, ClientRateLimit};
use crate::state::AppState;
use crate::templates::{
    BulkTemplate, ContactTemplate, LoginTemplate, DEFAULT_BULK_MESSAGE, DEFAULT_BULK_SUBJECT,
};

type Result<T> = std::result::Result<T, ApiError>;
type JsonResult<T> = Result<Json<T>>;

/// Limits applied to every route.
#[derive(Clone, Copy, Debug)]
pub struct RouteLimits {
    pub request_timeout: Duration,
    pub requests_per_minute: NonZeroU32,
}

pub fn app(state: AppState, limits: RouteLimits) -> Router {
    let rate_limit = ClientRateLimit::per_minute(limits.requests_per_minute);

    Router::new()
        .route("/health", get(health))
        .route("/send-login-email", post(send_login_email))
        .route("/send-contact-message", post(send_contact_message))
        .route("/send-bulk-email", post(send_bulk_email))
        .fallback(not_found)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_layer_error))
                .layer(TimeoutLayer::new(limits.request_timeout)),
        )
        .layer(middleware::from_fn_with_state(rate_limit, limit_by_ip))
        .layer(
            ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::REFERRER_POLICY,
                    HeaderValue::from_static("no-referrer"),
                )),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn handle_layer_error(err: BoxError) -> ApiError {
    if err.is::<Elapsed>() {
        ApiError::Timeout
    } else {
        ApiError::Internal(err.to_string())
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    time: String,
}

async fn health() -> JsonResult<HealthResponse> {
    let time = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(HealthResponse {
        status: "ok",
        time,
    }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentResponse {
    success: bool,
    message_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginEmailReq {
    name: String,
    email: String,
}

impl Validate for LoginEmailReq {
    fn validate(&self) -> std::result::Result<(), Vec<sendgate::error::FieldError>> {
        Checks::default()
            .required("name", &self.name)
            .address("email", &self.email)
            .finish()
    }
}

async fn send_login_email(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<LoginEmailReq>,
) -> JsonResult<SentResponse> {
    let name = req.name.trim();
    let login_time = OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second] UTC"
        ))
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let html = LoginTemplate {
        user_name: name,
        login_time: &login_time,
    }
    .render()?;

    let email = Email::builder()
        .to(req.email.trim())
        .subject(format!("Welcome back, {name}!"))
        .html(html)
        .build()?;

    let delivery = state.dispatcher.send_with_retries(&email).await?;
    tracing::info!(message_id = %delivery.message_id, "login email sent");

    Ok(Json(SentResponse {
        success: true,
        message_id: delivery.message_id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ContactMessageReq {
    name: String,
    email: String,
    message: String,
}

impl Validate for ContactMessageReq {
    fn validate(&self) -> std::result::Result<(), Vec<sendgate::error::FieldError>> {
        Checks::default()
            .required("name", &self.name)
            .address("email", &self.email)
            .required("message", &self.message)
            .finish()
    }
}

async fn send_contact_message(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ContactMessageReq>,
) -> JsonResult<SentResponse> {
    let name = req.name.trim();
    let reply_to = req.email.trim();

    let html = ContactTemplate {
        name,
        email: reply_to,
        message: &req.message,
    }
    .render()?;

    let email = Email::builder()
        .to(&*state.admin_email)
        .reply_to(reply_to)
        .subject(format!("New contact message from {name}"))
        .html(html)
        .build()?;

    let delivery = state.dispatcher.send_with_retries(&email).await?;
    tracing::info!(message_id = %delivery.message_id, "contact message forwarded");

    Ok(Json(SentResponse {
        success: true,
        message_id: delivery.message_id,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkEmailReq {
    emails: Vec<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    file_url: Option<String>,
}

impl Validate for BulkEmailReq {
    fn validate(&self) -> std::result::Result<(), Vec<sendgate::error::FieldError>> {
        let mut checks = Checks::default();
        if self.emails.is_empty() {
            checks.fail("emails", "at least one recipient is required");
        }
        for (i, email) in self.emails.iter().enumerate() {
            checks.address(&format!("emails[{i}]"), email);
        }
        checks.finish()
    }
}

#[derive(Debug, Serialize)]
pub struct BulkResponse {
    success: bool,
    sent: usize,
    failed: Vec<FailedRecipient>,
}

impl From<BulkReport> for BulkResponse {
    fn from(report: BulkReport) -> Self {
        BulkResponse {
            success: report.is_success(),
            sent: report.sent,
            failed: report.failed,
        }
    }
}

/// Always answers 200; per-recipient failures are reported in the body.
async fn send_bulk_email(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<BulkEmailReq>,
) -> JsonResult<BulkResponse> {
    let subject = non_blank(req.subject).unwrap_or_else(|| DEFAULT_BULK_SUBJECT.to_string());
    let message = non_blank(req.message).unwrap_or_else(|| DEFAULT_BULK_MESSAGE.to_string());
    let file_url = non_blank(req.file_url);

    let html = BulkTemplate {
        message: &message,
        file_url: file_url.as_deref(),
    }
    .render()?;

    let recipients: Vec<String> = req.emails.into_iter().map(|e| e.trim().to_string()).collect();
    let limiter = ConcurrencyLimiter::new(state.bulk_ceiling)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    // The batch runs on its own task so a dropped response leaves sends running.
    let dispatcher = state.dispatcher.clone();
    let report = tokio::spawn(async move {
        dispatcher
            .dispatch(&limiter, recipients, move |to| {
                Email::builder()
                    .to(to)
                    .subject(subject.clone())
                    .html(html.clone())
                    .build()
            })
            .await
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(report.into()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
