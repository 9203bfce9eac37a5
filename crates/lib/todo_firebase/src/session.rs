//! Signed-in session shared by the identity provider and the document store.
//!
//! Identity Toolkit hands out a short-lived ID token plus a refresh token.
//! [`SessionToken::bearer`] renews the ID token through the Secure Token API
//! shortly before it expires. When the refresh token itself is rejected the
//! session ends and the identity feed reports the sign-out.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use todo_core::backend::IdentityFeed;
use todo_core::models::Identity;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::FirebaseConfig;
use crate::error::{self, FirebaseError};

/// Renew this long before the reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Token material returned by a sign-in or refresh call.
#[derive(Debug, Default)]
pub(crate) struct Grant {
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, as the decimal string Firebase sends.
    pub expires_in: Option<String>,
}

#[derive(Clone)]
struct Tokens {
    id_token: String,
    refresh_token: Option<String>,
    expires_at: Option<Instant>,
}

impl Tokens {
    fn from_grant(grant: Grant) -> Option<Self> {
        let expires_at = grant
            .expires_in
            .as_deref()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        Some(Self {
            id_token: grant.id_token?,
            refresh_token: grant.refresh_token,
            expires_at,
        })
    }

    fn is_stale(&self) -> bool {
        self.expires_at
            .is_some_and(|at| at <= Instant::now() + REFRESH_MARGIN)
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

struct Inner {
    http: Client,
    config: Arc<FirebaseConfig>,
    tokens: RwLock<Option<Tokens>>,
    /// Serializes refresh calls so concurrent requests renew once.
    refreshing: Mutex<()>,
    identity_tx: watch::Sender<Option<Identity>>,
}

/// The signed-in user's tokens and identity feed.
#[derive(Clone)]
pub struct SessionToken {
    inner: Arc<Inner>,
}

impl SessionToken {
    pub fn new(http: Client, config: Arc<FirebaseConfig>) -> Self {
        let (identity_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                http,
                config,
                tokens: RwLock::new(None),
                refreshing: Mutex::new(()),
                identity_tx,
            }),
        }
    }

    /// Current ID token as last stored, without refreshing.
    pub fn get(&self) -> Option<String> {
        self.tokens().map(|t| t.id_token)
    }

    /// ID token for an authorized request, renewed first when it is about to
    /// expire. `None` when nobody is signed in.
    pub async fn bearer(&self) -> Result<Option<String>, FirebaseError> {
        match self.tokens() {
            None => Ok(None),
            Some(tokens) if tokens.is_stale() => self.renew(&tokens.id_token).await,
            Some(tokens) => Ok(Some(tokens.id_token)),
        }
    }

    /// Renew after `rejected` was refused by the server.
    pub async fn refresh(&self, rejected: &str) -> Result<Option<String>, FirebaseError> {
        self.renew(rejected).await
    }

    /// Drop the tokens and publish the sign-out.
    pub fn end(&self) {
        self.set_tokens(None);
        self.inner.identity_tx.send_replace(None);
    }

    pub(crate) fn establish(&self, identity: Identity, grant: Grant) {
        self.set_tokens(Tokens::from_grant(grant));
        info!(user_id = %identity.id, "signed in");
        self.inner.identity_tx.send_replace(Some(identity));
    }

    pub(crate) fn identity_changes(&self) -> IdentityFeed {
        self.inner.identity_tx.subscribe()
    }

    fn tokens(&self) -> Option<Tokens> {
        self.inner
            .tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_tokens(&self, tokens: Option<Tokens>) {
        *self
            .inner
            .tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner) = tokens;
    }

    async fn renew(&self, stale: &str) -> Result<Option<String>, FirebaseError> {
        let _guard = self.inner.refreshing.lock().await;
        let Some(current) = self.tokens() else {
            return Ok(None);
        };
        if current.id_token != stale {
            // Another request renewed it while we waited.
            return Ok(Some(current.id_token));
        }
        let Some(refresh_token) = current.refresh_token else {
            warn!("ID token expired with no refresh token, ending session");
            self.end();
            return Ok(None);
        };

        match self.exchange(&refresh_token).await {
            Ok(renewed) => {
                debug!("ID token refreshed");
                let id_token = renewed.id_token.clone();
                self.set_tokens(Tokens::from_grant(Grant {
                    id_token: Some(renewed.id_token),
                    refresh_token: Some(renewed.refresh_token),
                    expires_in: Some(renewed.expires_in),
                }));
                Ok(Some(id_token))
            }
            Err(e @ FirebaseError::Api { status, .. }) if status.is_client_error() => {
                warn!(error = %e, "refresh token rejected, ending session");
                self.end();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn exchange(&self, refresh_token: &str) -> Result<RefreshResponse, FirebaseError> {
        let config = &self.inner.config;
        let response = self
            .inner
            .http
            .post(config.token_endpoint()?)
            .query(&[("key", config.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error::api_error(response).await);
        }
        Ok(response.json().await?)
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.get().is_some() { "<set>" } else { "<none>" };
        f.debug_tuple("SessionToken").field(&state).finish()
    }
}
