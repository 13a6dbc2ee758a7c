use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sendgate::error::{ErrorResponse, FieldError};
use sendgate::mail::MailError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("not found")]
    NotFound,

    #[error("too many requests")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("send failed: {0}")]
    Send(#[from] MailError),

    #[error("failed to render template: {0}")]
    Template(#[from] askama::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn http_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::Send(_) | Self::Template(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to the client; server-side details stay in the logs.
    pub fn http_message(&self) -> String {
        match self {
            Self::Send(_) => "Failed to send email.".to_string(),
            Self::Template(_) | Self::Internal(_) => "an internal server error occurred".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.http_code();
        if code.is_server_error() {
            tracing::error!("Error Status {}: {}", code, self);
        }

        let body = ErrorResponse::new(self.http_message());
        let body = match self {
            Self::Validation(errors) => body.with_errors(errors),
            _ => body,
        };
        body.with_status(code)
    }
}
