//! Backend capability contracts.
//!
//! The client delegates identity and persistence to an external service.
//! [`IdentityProvider`] and [`DocumentStore`] are the two capabilities it
//! consumes; any backend (hosted or in-process) plugs in by implementing them.
//! Provider error codes are decoded into [`ProviderError`] inside the adapter
//! so the controllers match on a closed set of variants.

pub mod memory;
pub mod subscription;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use crate::models::{
    Identity, NewTask, OwnerFilter, PendingCredential, SignInMethod, SocialProvider, TaskPatch,
};

pub use subscription::{SnapshotSink, Subscription};

/// Feed of identity changes; `None` means signed out.
pub type IdentityFeed = watch::Receiver<Option<Identity>>;

/// Errors reported by an identity provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("An account already exists with the email {email} under a different sign-in method")]
    AccountExistsWithDifferentCredential {
        email: String,
        credential: PendingCredential,
    },

    #[error("Invalid credential")]
    InvalidCredential,

    #[error("Sign-in was cancelled by the user")]
    UserCancelled,

    #[error("Missing identifier")]
    MissingIdentifier,

    #[error("Email already in use")]
    EmailAlreadyInUse,

    #[error("Invalid email")]
    InvalidEmail,

    #[error("Weak password")]
    WeakPassword,

    #[error("Network error: {0}")]
    Network(String),

    #[error("{message}")]
    Other { code: String, message: String },
}

impl ProviderError {
    pub fn other(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Other {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Errors reported by a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Write rejected: {0}")]
    Rejected(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

/// Identity operations consumed by the auth flow and the session controller.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authenticate with email + password.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, ProviderError>;

    /// Register a new email + password account and sign it in.
    async fn create_account(&self, email: &str, password: &str)
    -> Result<Identity, ProviderError>;

    /// Authenticate through a social provider's interactive flow.
    async fn sign_in_with_social(
        &self,
        provider: SocialProvider,
    ) -> Result<Identity, ProviderError>;

    /// Sign-in methods registered for an email address.
    async fn sign_in_methods(&self, email: &str) -> Result<Vec<SignInMethod>, ProviderError>;

    /// Merge a pending credential into an already signed-in identity.
    async fn link_credential(
        &self,
        identity: &Identity,
        credential: PendingCredential,
    ) -> Result<Identity, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError>;

    /// Subscribe to identity changes. The current value is readable immediately.
    fn identity_changes(&self) -> IdentityFeed;
}

/// Task document operations consumed by the task list.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a task document, returning its store-assigned id.
    async fn create_task(&self, task: &NewTask) -> Result<String, StoreError>;

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<(), StoreError>;

    async fn delete_task(&self, id: &str) -> Result<(), StoreError>;

    /// Open a real-time subscription to the tasks matching `filter`.
    ///
    /// Synchronous so callers can order a close before the next open.
    fn subscribe(&self, filter: &OwnerFilter) -> Result<Subscription, StoreError>;
}
