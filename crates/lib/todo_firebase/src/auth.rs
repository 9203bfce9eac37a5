//! Identity provider over the Identity Toolkit REST API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use todo_core::backend::{IdentityFeed, IdentityProvider, ProviderError};
use todo_core::models::{Identity, PendingCredential, SignInMethod, SocialProvider};
use tracing::{debug, info};

use crate::config::FirebaseConfig;
use crate::error::{self, FirebaseError};
use crate::oauth::{OAuthToken, OAuthTokenSource};
use crate::session::{Grant, SessionToken};

/// Redirect URI reported to `createAuthUri` / `signInWithIdp`. Only needs to be
/// an authorized domain of the project.
const REQUEST_URI: &str = "http://localhost";

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    local_id: String,
    #[serde(default)]
    email: String,
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateAuthUriRequest<'a> {
    identifier: &'a str,
    continue_uri: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAuthUriResponse {
    #[serde(default)]
    signin_methods: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest<'a> {
    post_body: String,
    request_uri: &'a str,
    return_secure_token: bool,
    return_idp_credential: bool,
    /// Set when linking: the IdP credential is attached to this user.
    #[serde(skip_serializing_if = "Option::is_none")]
    id_token: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdpResponse {
    local_id: Option<String>,
    email: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<String>,
    #[serde(default)]
    need_confirmation: bool,
    oauth_id_token: Option<String>,
    oauth_access_token: Option<String>,
    error_message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OobRequest<'a> {
    request_type: &'static str,
    email: &'a str,
}

/// Decide what a `signInWithIdp` answer means.
fn resolve_idp(
    provider: SocialProvider,
    sent: &OAuthToken,
    response: IdpResponse,
) -> Result<AuthResponse, ProviderError> {
    if let Some(message) = response.error_message {
        return Err(error::identity_error(&message));
    }
    if response.need_confirmation {
        let email = response.email.ok_or(ProviderError::MissingIdentifier)?;
        let credential = PendingCredential::new(
            provider,
            response.oauth_id_token.or_else(|| sent.id_token.clone()),
            response.oauth_access_token.or_else(|| sent.access_token.clone()),
        );
        return Err(ProviderError::AccountExistsWithDifferentCredential { email, credential });
    }
    let local_id = response
        .local_id
        .ok_or_else(|| ProviderError::other("INVALID_RESPONSE", "signInWithIdp returned no user"))?;
    Ok(AuthResponse {
        local_id,
        email: response.email.unwrap_or_default(),
        id_token: response.id_token,
        refresh_token: response.refresh_token,
        expires_in: response.expires_in,
    })
}

// =============================================================================
// Provider
// =============================================================================

/// Identity provider backed by Firebase Authentication.
pub struct FirebaseAuth {
    http: Client,
    config: Arc<FirebaseConfig>,
    tokens: Arc<dyn OAuthTokenSource>,
    session: SessionToken,
}

impl FirebaseAuth {
    pub fn new(config: Arc<FirebaseConfig>, tokens: Arc<dyn OAuthTokenSource>) -> Self {
        Self::with_client(Client::new(), config, tokens)
    }

    pub fn with_client(
        http: Client,
        config: Arc<FirebaseConfig>,
        tokens: Arc<dyn OAuthTokenSource>,
    ) -> Self {
        let session = SessionToken::new(http.clone(), config.clone());
        Self {
            http,
            config,
            tokens,
            session,
        }
    }

    /// Handle on the signed-in session, for authorizing document requests.
    pub fn session(&self) -> SessionToken {
        self.session.clone()
    }

    async fn call<B, R>(&self, method: &str, body: &B) -> Result<R, FirebaseError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.config.auth_endpoint(method)?;
        debug!(method, "identity toolkit request");
        let response = self
            .http
            .post(url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error::api_error(response).await);
        }
        Ok(response.json().await?)
    }

    fn establish(&self, response: AuthResponse) -> Identity {
        let identity = Identity::new(response.local_id, response.email);
        let grant = Grant {
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            expires_in: response.expires_in,
        };
        self.session.establish(identity.clone(), grant);
        identity
    }

    async fn password_call(
        &self,
        method: &str,
        email: &str,
        password: &str,
    ) -> Result<Identity, ProviderError> {
        let response: AuthResponse = self
            .call(
                method,
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        Ok(self.establish(response))
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, ProviderError> {
        if email.trim().is_empty() {
            return Err(ProviderError::MissingIdentifier);
        }
        self.password_call("signInWithPassword", email, password)
            .await
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, ProviderError> {
        self.password_call("signUp", email, password).await
    }

    async fn sign_in_with_social(
        &self,
        provider: SocialProvider,
    ) -> Result<Identity, ProviderError> {
        let token = self
            .tokens
            .token(provider)
            .await?
            .ok_or(ProviderError::UserCancelled)?;
        let response: IdpResponse = self
            .call(
                "signInWithIdp",
                &IdpRequest {
                    post_body: token.post_body(provider),
                    request_uri: REQUEST_URI,
                    return_secure_token: true,
                    return_idp_credential: true,
                    id_token: None,
                },
            )
            .await?;
        let signed_in = resolve_idp(provider, &token, response)?;
        Ok(self.establish(signed_in))
    }

    async fn sign_in_methods(&self, email: &str) -> Result<Vec<SignInMethod>, ProviderError> {
        if email.trim().is_empty() {
            return Err(ProviderError::MissingIdentifier);
        }
        let response: CreateAuthUriResponse = self
            .call(
                "createAuthUri",
                &CreateAuthUriRequest {
                    identifier: email,
                    continue_uri: REQUEST_URI,
                },
            )
            .await?;
        Ok(response
            .signin_methods
            .iter()
            .map(|m| SignInMethod::parse(m))
            .collect())
    }

    async fn link_credential(
        &self,
        identity: &Identity,
        credential: PendingCredential,
    ) -> Result<Identity, ProviderError> {
        let id_token = self
            .session
            .bearer()
            .await?
            .ok_or(ProviderError::InvalidCredential)?;
        debug!(user_id = %identity.id, provider = %credential.provider, "linking credential");
        let token = OAuthToken {
            id_token: credential.id_token,
            access_token: credential.access_token,
        };
        let response: IdpResponse = self
            .call(
                "signInWithIdp",
                &IdpRequest {
                    post_body: token.post_body(credential.provider),
                    request_uri: REQUEST_URI,
                    return_secure_token: true,
                    return_idp_credential: true,
                    id_token: Some(&id_token),
                },
            )
            .await?;
        let mut linked = resolve_idp(credential.provider, &token, response)?;
        if linked.local_id != identity.id {
            return Err(ProviderError::InvalidCredential);
        }
        if linked.email.is_empty() {
            linked.email = identity.email.clone();
        }
        Ok(self.establish(linked))
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.session.end();
        info!("signed out");
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        if email.trim().is_empty() {
            return Err(ProviderError::MissingIdentifier);
        }
        let _: serde_json::Value = self
            .call(
                "sendOobCode",
                &OobRequest {
                    request_type: "PASSWORD_RESET",
                    email,
                },
            )
            .await?;
        Ok(())
    }

    fn identity_changes(&self) -> IdentityFeed {
        self.session.identity_changes()
    }
}
