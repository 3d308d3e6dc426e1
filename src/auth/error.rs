//! Auth failures and their HTTP status mapping.
//!
//! Clients only ever see [`AuthError::public_message`]; internal causes are
//! logged where they are converted.

use axum::http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing or malformed input (400).
    #[error("{0}")]
    Validation(String),

    /// Unknown email or wrong password. Deliberately one variant for both.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Missing, malformed or expired bearer token (401).
    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("Registration is disabled")]
    RegistrationDisabled,

    #[error("User already exists")]
    EmailTaken,

    #[error("Too many requests, try again later")]
    RateLimited,

    #[error("Internal server error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::RegistrationDisabled => StatusCode::FORBIDDEN,
            Self::EmailTaken => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to clients.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<super::store::StoreError> for AuthError {
    fn from(err: super::store::StoreError) -> Self {
        match err {
            super::store::StoreError::DuplicateEmail(_) => Self::EmailTaken,
            other => Self::Internal(other.into()),
        }
    }
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::StoreError;

    #[test]
    fn statuses_follow_http_contract() {
        assert_eq!(AuthError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::Unauthorized("Invalid token").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::EmailTaken.status(), StatusCode::CONFLICT);
        assert_eq!(AuthError::RegistrationDisabled.status(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AuthError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_not_public() {
        let err = AuthError::Internal(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.public_message(), "Internal server error");
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn duplicate_email_maps_to_conflict() {
        let err: AuthError = StoreError::DuplicateEmail("a@x.com".into()).into();
        assert!(matches!(err, AuthError::EmailTaken));
    }
}
