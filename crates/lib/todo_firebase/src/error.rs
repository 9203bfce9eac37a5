//! Firebase error types and REST error body decoding.
//!
//! Identity Toolkit and Firestore both answer failures with
//! `{"error": {"code", "message", "status"}}`. The adapters decode that body
//! once here into the closed [`ProviderError`] / [`StoreError`] sets.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use todo_core::backend::{ProviderError, StoreError};

/// Errors raised while configuring or talking to Firebase.
#[derive(Debug, Error)]
pub enum FirebaseError {
    #[error("Missing environment variable {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for {name}: {message}")]
    InvalidConfig { name: &'static str, message: String },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Firebase returned {status}: {message}")]
    Api { status: StatusCode, message: String },
}

impl From<FirebaseError> for ProviderError {
    fn from(err: FirebaseError) -> Self {
        match err {
            FirebaseError::Http(e) => ProviderError::Network(e.to_string()),
            FirebaseError::Api { message, .. } => identity_error(&message),
            other => ProviderError::other("config", other.to_string()),
        }
    }
}

impl From<FirebaseError> for StoreError {
    fn from(err: FirebaseError) -> Self {
        match err {
            FirebaseError::Http(e) if e.is_decode() => StoreError::Decode(e.to_string()),
            FirebaseError::Http(e) => StoreError::Network(e.to_string()),
            FirebaseError::Api { status, message } => store_error(status, message),
            other => StoreError::Rejected(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Turn a non-success response into [`FirebaseError::Api`].
pub(crate) async fn api_error(response: reqwest::Response) -> FirebaseError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    FirebaseError::Api {
        status,
        message: error_message(&body),
    }
}

/// Extract `error.message` from a REST error body, falling back to the raw body.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ => body.trim().to_string(),
    }
}

/// Map an Identity Toolkit error message (`CODE` or `CODE : detail`).
pub fn identity_error(message: &str) -> ProviderError {
    let (code, detail) = match message.split_once(" : ") {
        Some((code, detail)) => (code.trim(), detail.trim()),
        None => (message.trim(), ""),
    };
    match code {
        "EMAIL_NOT_FOUND"
        | "INVALID_PASSWORD"
        | "INVALID_LOGIN_CREDENTIALS"
        | "INVALID_IDP_RESPONSE"
        | "INVALID_ID_TOKEN"
        | "USER_DISABLED" => ProviderError::InvalidCredential,
        "EMAIL_EXISTS" => ProviderError::EmailAlreadyInUse,
        "INVALID_EMAIL" => ProviderError::InvalidEmail,
        "WEAK_PASSWORD" => ProviderError::WeakPassword,
        "MISSING_EMAIL" | "MISSING_IDENTIFIER" => ProviderError::MissingIdentifier,
        _ => {
            let text = if detail.is_empty() { code } else { detail };
            ProviderError::other(code, text)
        }
    }
}

fn store_error(status: StatusCode, message: String) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::UNAUTHORIZED => StoreError::NotAuthenticated,
        _ => StoreError::Rejected(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_reads_envelope() {
        let body = r#"{"error":{"code":400,"message":"EMAIL_EXISTS","errors":[]}}"#;
        assert_eq!(error_message(body), "EMAIL_EXISTS");
        assert_eq!(error_message("upstream timeout\n"), "upstream timeout");
    }

    #[test]
    fn identity_codes_map_to_provider_errors() {
        assert!(matches!(
            identity_error("INVALID_LOGIN_CREDENTIALS"),
            ProviderError::InvalidCredential
        ));
        assert!(matches!(
            identity_error("EMAIL_EXISTS"),
            ProviderError::EmailAlreadyInUse
        ));
        assert!(matches!(
            identity_error("WEAK_PASSWORD : Password should be at least 6 characters"),
            ProviderError::WeakPassword
        ));
        assert!(matches!(
            identity_error("MISSING_EMAIL"),
            ProviderError::MissingIdentifier
        ));
    }

    #[test]
    fn unknown_identity_code_keeps_detail() {
        match identity_error("TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled for now") {
            ProviderError::Other { code, message } => {
                assert_eq!(code, "TOO_MANY_ATTEMPTS_TRY_LATER");
                assert_eq!(message, "Access disabled for now");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn api_status_maps_to_store_errors() {
        let err: StoreError = FirebaseError::Api {
            status: StatusCode::NOT_FOUND,
            message: "No document to update".into(),
        }
        .into();
        assert!(matches!(err, StoreError::NotFound(_)));

        let err: StoreError = FirebaseError::Api {
            status: StatusCode::FORBIDDEN,
            message: "Missing or insufficient permissions.".into(),
        }
        .into();
        assert!(matches!(err, StoreError::Rejected(m) if m.contains("permissions")));

        let err: StoreError = FirebaseError::Api {
            status: StatusCode::UNAUTHORIZED,
            message: String::new(),
        }
        .into();
        assert!(matches!(err, StoreError::NotAuthenticated));
    }
}
