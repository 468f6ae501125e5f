//! Error taxonomy shared by every handler and service.
//!
//! Each variant maps to exactly one HTTP status and a `{status, message}`
//! envelope. Internal failures keep their source for the server log only;
//! the response body carries a generic message.

use std::collections::BTreeMap;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde::Serialize;
use tracing::{error, info};

use crate::store::StoreError;

/// Field name -> human readable problem.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, Display)]
pub enum AppError {
    #[display(fmt = "validation failed")]
    Validation(FieldErrors),

    #[display(fmt = "invalid email or password")]
    InvalidCredentials,
    #[display(fmt = "missing authorization token")]
    MissingToken,
    #[display(fmt = "invalid token")]
    TokenInvalid,
    #[display(fmt = "token expired")]
    TokenExpired,

    #[display(fmt = "new passwords do not match")]
    PasswordMismatch,
    #[display(fmt = "already checked in today")]
    AlreadyCheckedIn,
    #[display(fmt = "not checked in yet today")]
    NotCheckedInYet,
    #[display(fmt = "already checked out today")]
    AlreadyCheckedOut,
    #[display(fmt = "check-out time precedes check-in time")]
    CheckOutBeforeCheckIn,
    #[display(fmt = "unknown absence status")]
    UnknownStatus,
    #[display(fmt = "email already registered")]
    DuplicateEmail,
    #[display(fmt = "system already initialized")]
    AlreadyInitialized,

    #[display(fmt = "access denied")]
    Forbidden,

    #[display(fmt = "{} not found", _0)]
    NotFound(&'static str),

    #[display(fmt = "internal server error")]
    Internal(anyhow::Error),
}

impl AppError {
    pub fn validation_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), message.into());
        AppError::Validation(errors)
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        AppError::Internal(err.into())
    }

    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            AppError::PasswordMismatch
                | AppError::AlreadyCheckedIn
                | AppError::NotCheckedInYet
                | AppError::AlreadyCheckedOut
                | AppError::CheckOutBeforeCheckIn
                | AppError::UnknownStatus
                | AppError::DuplicateEmail
                | AppError::AlreadyInitialized
        )
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: u16,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a FieldErrors>,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::MissingToken | AppError::TokenInvalid | AppError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // clients key on 501 for every rejected business action
            AppError::InvalidCredentials
            | AppError::PasswordMismatch
            | AppError::AlreadyCheckedIn
            | AppError::NotCheckedInYet
            | AppError::AlreadyCheckedOut
            | AppError::CheckOutBeforeCheckIn
            | AppError::UnknownStatus
            | AppError::DuplicateEmail
            | AppError::AlreadyInitialized => StatusCode::NOT_IMPLEMENTED,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let AppError::Internal(source) = self {
            error!(error = ?source, "Internal failure");
        } else if self.is_business_rule() {
            info!(reason = %self, "Request rejected by business rule");
        }

        let status = self.status_code();
        let errors = match self {
            AppError::Validation(fields) => Some(fields),
            _ => None,
        };

        HttpResponse::build(status).json(ErrorBody {
            status: status.as_u16(),
            message: self.to_string(),
            errors,
        })
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(err.into())
    }
}

impl From<actix_web::error::JsonPayloadError> for AppError {
    fn from(err: actix_web::error::JsonPayloadError) -> Self {
        AppError::validation_field("body", err.to_string())
    }
}

impl From<actix_web::error::QueryPayloadError> for AppError {
    fn from(err: actix_web::error::QueryPayloadError) -> Self {
        AppError::validation_field("query", err.to_string())
    }
}
