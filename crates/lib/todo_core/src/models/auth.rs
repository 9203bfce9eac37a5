//! Identity domain models.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An authenticated principal issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-issued, stable user id.
    pub id: String,
    pub email: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// Social sign-in providers offered by the login flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialProvider {
    Google,
    Facebook,
}

impl SocialProvider {
    /// Provider id as used in sign-in method lists (`google.com`).
    pub fn provider_id(self) -> &'static str {
        match self {
            Self::Google => "google.com",
            Self::Facebook => "facebook.com",
        }
    }

    /// Short lowercase name (`google`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Facebook => "facebook",
        }
    }
}

impl fmt::Display for SocialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sign-in method registered for an email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SignInMethod {
    Password,
    Social(SocialProvider),
    Other(String),
}

impl SignInMethod {
    /// Parse a provider method identifier (`password`, `google.com`, ...).
    pub fn parse(raw: &str) -> Self {
        match raw {
            "password" | "emailLink" => Self::Password,
            "google.com" => Self::Social(SocialProvider::Google),
            "facebook.com" => Self::Social(SocialProvider::Facebook),
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Password => "password",
            Self::Social(p) => p.provider_id(),
            Self::Other(raw) => raw,
        }
    }
}

/// Proof of a social sign-in that could not complete because the email is
/// already registered under a different method.
///
/// Held until it is merged into the existing account or dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct PendingCredential {
    pub provider: SocialProvider,
    pub id_token: Option<String>,
    pub access_token: Option<String>,
}

impl PendingCredential {
    pub fn new(
        provider: SocialProvider,
        id_token: Option<String>,
        access_token: Option<String>,
    ) -> Self {
        Self {
            provider,
            id_token,
            access_token,
        }
    }
}

impl fmt::Debug for PendingCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCredential")
            .field("provider", &self.provider)
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
