//! Auth flow controller.
//!
//! Drives login, sign-up, social sign-in, and the account-linking sub-flow:
//!
//! ```text
//! Idle ──▶ Authenticating ──▶ Authenticated
//!                │
//!                ├──▶ Failed
//!                │
//!                └──▶ ConflictDetected ──▶ LinkPending ──▶ Authenticated
//!                            │                  │
//!                            └──▶ Failed ◀──────┘
//! ```
//!
//! A conflict happens when a social sign-in finds the email already
//! registered under another method. If that account has a password, the
//! flow offers a link form; signing in with the password merges the pending
//! social credential into the existing account.
//!
//! Password reset is a side operation outside the state machine.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{IdentityProvider, ProviderError};
use crate::models::{Identity, PendingCredential, SignInMethod, SocialProvider};
use crate::notify::Notifier;

const MSG_LINK_WITH_PASSWORD: &str = "An account with this email already exists. \
     Sign in with your password to link the accounts.";
const MSG_ACCOUNT_EXISTS: &str = "An account with this email already exists.";
const MSG_INVALID_CREDENTIAL: &str = "The supplied credentials are invalid. You may have \
     signed in with this email before using one of the other methods.";
const MSG_CANCELLED: &str = "Sign-in was cancelled. You can try again with a different account.";
const MSG_MISSING_IDENTIFIER: &str = "An email address is required.";
const MSG_EMAIL_IN_USE: &str = "This email address is already in use.";
const MSG_INVALID_EMAIL: &str = "The email address is not valid.";
const MSG_WEAK_PASSWORD: &str = "The password must be at least 6 characters.";
const MSG_GENERIC: &str = "Something went wrong. Please try again.";

/// Where the flow currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    Authenticating,
    Authenticated(Identity),
    ConflictDetected { email: String },
    LinkPending { email: String },
    Failed { message: String },
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Authenticating => "authenticating",
            Self::Authenticated(_) => "authenticated",
            Self::ConflictDetected { .. } => "conflict detected",
            Self::LinkPending { .. } => "link pending",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Auth flow errors. Every one ends the operation that raised it.
#[derive(Debug, Error)]
pub enum AuthFlowError {
    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("{message}")]
    AuthFailed {
        message: String,
        #[source]
        cause: ProviderError,
    },

    /// The email is registered with a password; `link_with_password` is next.
    #[error("{message}")]
    LinkRequired { email: String, message: String },

    /// The email is registered under another social method only.
    #[error("{message}")]
    AccountExists { email: String, message: String },

    #[error("{message}")]
    LinkFailed {
        message: String,
        #[source]
        cause: ProviderError,
    },

    #[error("Failed to send the password reset email: {message}")]
    ResetFailed {
        message: String,
        #[source]
        cause: ProviderError,
    },

    #[error("A password reset email was already sent")]
    ResetAlreadySent,

    #[error("Failed to sign out: {0}")]
    SignOutFailed(#[source] ProviderError),
}

/// Social credential captured on conflict, with the email it belongs to.
#[derive(Debug)]
struct PendingLink {
    email: String,
    credential: PendingCredential,
}

/// User-facing text for an error raised by a sign-in attempt.
/// Unmapped errors fall back to the provider's own message.
pub fn sign_in_message(err: &ProviderError) -> String {
    match err {
        ProviderError::InvalidCredential => MSG_INVALID_CREDENTIAL.to_string(),
        ProviderError::UserCancelled => MSG_CANCELLED.to_string(),
        ProviderError::MissingIdentifier => MSG_MISSING_IDENTIFIER.to_string(),
        other => other.to_string(),
    }
}

/// User-facing text for an error raised while creating an account.
/// Unmapped errors get the generic retry text.
pub fn sign_up_message(err: &ProviderError) -> String {
    match err {
        ProviderError::EmailAlreadyInUse => MSG_EMAIL_IN_USE,
        ProviderError::InvalidEmail => MSG_INVALID_EMAIL,
        ProviderError::WeakPassword => MSG_WEAK_PASSWORD,
        _ => MSG_GENERIC,
    }
    .to_string()
}

/// Login / sign-up / linking state machine.
pub struct AuthFlow {
    provider: Arc<dyn IdentityProvider>,
    notifier: Notifier,
    state: AuthState,
    pending: Option<PendingLink>,
    reset_sent: bool,
}

impl AuthFlow {
    pub fn new(provider: Arc<dyn IdentityProvider>, notifier: Notifier) -> Self {
        Self {
            provider,
            notifier,
            state: AuthState::Idle,
            pending: None,
            reset_sent: false,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Whether the secondary "enter your password to link" form applies.
    pub fn link_form_visible(&self) -> bool {
        matches!(self.state, AuthState::LinkPending { .. })
    }

    pub fn has_pending_credential(&self) -> bool {
        self.pending.is_some()
    }

    /// Email of the account a pending credential would be merged into.
    pub fn pending_email(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.email.as_str())
    }

    /// `false` once a reset email went out.
    pub fn can_request_password_reset(&self) -> bool {
        !self.reset_sent
    }

    /// Sign in with email + password.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<Identity, AuthFlowError> {
        self.begin("log in")?;
        let result = self.provider.sign_in_with_password(email, password).await;
        self.finish_sign_in(result).await
    }

    /// Create an email + password account.
    pub async fn sign_up(
        &mut self,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthFlowError> {
        self.begin("sign up")?;
        match self.provider.create_account(email, password).await {
            Ok(identity) => {
                self.notifier.success("Account created");
                Ok(self.authenticated(identity))
            }
            Err(cause) => {
                let message = sign_up_message(&cause);
                self.transition(AuthState::Failed {
                    message: message.clone(),
                });
                self.notifier.error("Could not create the account", &message);
                Err(AuthFlowError::AuthFailed { message, cause })
            }
        }
    }

    /// Sign in through a social provider.
    pub async fn social_sign_in(
        &mut self,
        provider: SocialProvider,
    ) -> Result<Identity, AuthFlowError> {
        self.begin("sign in")?;
        let result = self.provider.sign_in_with_social(provider).await;
        self.finish_sign_in(result).await
    }

    /// Merge the pending social credential into the existing account.
    ///
    /// `password` is the value entered in the link form for the conflicting
    /// email. On any failure the pending credential is dropped and the social
    /// sign-in has to be started again.
    pub async fn link_with_password(&mut self, password: &str) -> Result<Identity, AuthFlowError> {
        if !self.link_form_visible() {
            return Err(self.invalid("link accounts"));
        }
        let Some(pending) = self.pending.take() else {
            return Err(self.invalid("link accounts"));
        };

        debug!(email = %pending.email, provider = %pending.credential.provider, "linking accounts");
        let merged = match self
            .provider
            .sign_in_with_password(&pending.email, password)
            .await
        {
            Ok(identity) => {
                self.provider
                    .link_credential(&identity, pending.credential)
                    .await
            }
            Err(e) => Err(e),
        };

        match merged {
            Ok(identity) => {
                self.notifier.success("Accounts linked");
                Ok(self.authenticated(identity))
            }
            Err(cause) => {
                let message = format!("Could not link the accounts: {}", sign_in_message(&cause));
                self.transition(AuthState::Failed {
                    message: message.clone(),
                });
                self.notifier.error("Account linking failed", &message);
                Err(AuthFlowError::LinkFailed { message, cause })
            }
        }
    }

    /// Ask the provider to email a password reset link. Only one is sent.
    pub async fn request_password_reset(&mut self, email: &str) -> Result<(), AuthFlowError> {
        if self.reset_sent {
            return Err(AuthFlowError::ResetAlreadySent);
        }
        match self.provider.send_password_reset(email).await {
            Ok(()) => {
                self.reset_sent = true;
                info!(email, "password reset email sent");
                self.notifier.success("Password reset email sent");
                Ok(())
            }
            Err(cause) => {
                let message = sign_in_message(&cause);
                self.notifier
                    .error("Could not send the password reset email", &message);
                Err(AuthFlowError::ResetFailed { message, cause })
            }
        }
    }

    /// Sign out of the provider and return to `Idle`.
    pub async fn sign_out(&mut self) -> Result<(), AuthFlowError> {
        match self.provider.sign_out().await {
            Ok(()) => {
                self.pending = None;
                self.transition(AuthState::Idle);
                self.notifier.success("Signed out");
                Ok(())
            }
            Err(e) => {
                self.notifier.error("Could not sign out", e.to_string());
                Err(AuthFlowError::SignOutFailed(e))
            }
        }
    }

    /// Abandon whatever is in progress (navigating away from the form).
    pub fn reset(&mut self) {
        if self.pending.take().is_some() {
            debug!("discarding pending credential");
        }
        self.transition(AuthState::Idle);
    }

    fn begin(&mut self, action: &'static str) -> Result<(), AuthFlowError> {
        match self.state {
            AuthState::Idle | AuthState::Failed { .. } | AuthState::Authenticated(_) => {
                self.transition(AuthState::Authenticating);
                Ok(())
            }
            _ => Err(self.invalid(action)),
        }
    }

    async fn finish_sign_in(
        &mut self,
        result: Result<Identity, ProviderError>,
    ) -> Result<Identity, AuthFlowError> {
        match result {
            Ok(identity) => {
                self.notifier.success("Signed in");
                Ok(self.authenticated(identity))
            }
            Err(ProviderError::AccountExistsWithDifferentCredential { email, credential }) => {
                self.conflict(email, credential).await
            }
            Err(cause) => Err(self.fail_sign_in(cause).await),
        }
    }

    async fn conflict(
        &mut self,
        email: String,
        credential: PendingCredential,
    ) -> Result<Identity, AuthFlowError> {
        self.transition(AuthState::ConflictDetected {
            email: email.clone(),
        });
        self.pending = Some(PendingLink {
            email: email.clone(),
            credential,
        });

        match self.provider.sign_in_methods(&email).await {
            Ok(methods) if methods.contains(&SignInMethod::Password) => {
                self.transition(AuthState::LinkPending {
                    email: email.clone(),
                });
                self.notifier.warning(MSG_LINK_WITH_PASSWORD);
                Err(AuthFlowError::LinkRequired {
                    email,
                    message: MSG_LINK_WITH_PASSWORD.to_string(),
                })
            }
            Ok(methods) => {
                debug!(
                    methods = ?methods.iter().map(SignInMethod::as_str).collect::<Vec<_>>(),
                    "existing account has no password method"
                );
                self.pending = None;
                self.transition(AuthState::Failed {
                    message: MSG_ACCOUNT_EXISTS.to_string(),
                });
                self.notifier.error("Sign-in failed", MSG_ACCOUNT_EXISTS);
                Err(AuthFlowError::AccountExists {
                    email,
                    message: MSG_ACCOUNT_EXISTS.to_string(),
                })
            }
            Err(cause) => {
                self.pending = None;
                Err(self.fail_sign_in(cause).await)
            }
        }
    }

    async fn fail_sign_in(&mut self, cause: ProviderError) -> AuthFlowError {
        let message = sign_in_message(&cause);
        if matches!(cause, ProviderError::UserCancelled) {
            // Clear any half-established session.
            if let Err(e) = self.provider.sign_out().await {
                warn!(error = %e, "sign-out after cancelled sign-in failed");
            }
        }
        self.transition(AuthState::Failed {
            message: message.clone(),
        });
        self.notifier.error("Sign-in failed", &message);
        AuthFlowError::AuthFailed { message, cause }
    }

    fn authenticated(&mut self, identity: Identity) -> Identity {
        self.pending = None;
        self.transition(AuthState::Authenticated(identity.clone()));
        identity
    }

    fn invalid(&self, action: &'static str) -> AuthFlowError {
        AuthFlowError::InvalidTransition {
            action,
            state: self.state.name(),
        }
    }

    fn transition(&mut self, next: AuthState) {
        info!(from = self.state.name(), to = next.name(), "auth state");
        self.state = next;
    }
}
