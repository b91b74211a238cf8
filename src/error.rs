use serde::Serialize;
use warp::{hyper::StatusCode, reject::Reject};

/// One failed field in a rejected request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationDetail {
    pub field: String,
    pub message: String,
}

impl ValidationDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Validation failed")]
    Validation { details: Vec<ValidationDetail> },
    #[error("Unauthorized - Invalid or missing token")]
    Unauthorized,
    #[error("Invalid email or password")]
    LoginFailed,
    #[error("No users found. Please register first.")]
    NoUsers,
    #[error("access denied")]
    AccessDenied,
    #[error("{0}")]
    NotFound(&'static str),
    #[error("User with this email already exists")]
    EmailAlreadyTaken,
    #[error("You are already registered for this course")]
    AlreadyRegistered,
    #[error("error during storage operation")]
    Storage {
        #[from]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("error during password hashing")]
    Password {
        #[from]
        source: argon2::Error,
    },
    #[error("error with token")]
    TokenError {
        #[from]
        source: jsonwebtoken::errors::Error,
    },
    #[error("background task failed")]
    Task {
        #[from]
        source: tokio::task::JoinError,
    },
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            details: vec![ValidationDetail::new(field, message)],
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::AlreadyRegistered => StatusCode::BAD_REQUEST,
            AppError::Unauthorized | AppError::LoginFailed => StatusCode::UNAUTHORIZED,
            AppError::AccessDenied => StatusCode::FORBIDDEN,
            AppError::NotFound(_) | AppError::NoUsers => StatusCode::NOT_FOUND,
            AppError::EmailAlreadyTaken => StatusCode::CONFLICT,
            AppError::Storage { .. }
            | AppError::Password { .. }
            | AppError::TokenError { .. }
            | AppError::Task { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message a client is allowed to see. Internal failures collapse to a
    /// generic message; their source only goes to the log.
    pub fn public_message(&self) -> String {
        match self.status() {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    pub fn details(&self) -> Option<&[ValidationDetail]> {
        match self {
            AppError::Validation { details } => Some(details),
            _ => None,
        }
    }
}

impl Reject for AppError {}
