use axum::async_trait;
use axum::extract::{FromRequest, Request};
use axum::Json;
use sendgate::error::FieldError;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Request bodies that can check their own fields.
pub trait Validate {
    fn validate(&self) -> Result<(), Vec<FieldError>>;
}

/// JSON body extractor that rejects malformed or invalid input with a 400.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| {
                ApiError::Validation(vec![FieldError::new("body", rejection.body_text())])
            })?;

        value.validate().map_err(ApiError::Validation)?;
        Ok(ValidJson(value))
    }
}

/// Collects field errors for a request body.
#[derive(Default)]
pub struct Checks(Vec<FieldError>);

impl Checks {
    pub fn required(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.0.push(FieldError::new(field, "is required"));
        }
        self
    }

    pub fn address(&mut self, field: &str, value: &str) -> &mut Self {
        if !sendgate::mail::is_valid_address(value.trim()) {
            self.0.push(FieldError::new(field, "must be a valid email address"));
        }
        self
    }

    pub fn fail(&mut self, field: &str, message: &str) -> &mut Self {
        self.0.push(FieldError::new(field, message));
        self
    }

    pub fn finish(&mut self) -> Result<(), Vec<FieldError>> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(std::mem::take(&mut self.0))
        }
    }
}
