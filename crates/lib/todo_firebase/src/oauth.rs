//! Social provider tokens fed to `signInWithIdp`.
//!
//! Running the provider's interactive consent screen is outside this crate;
//! a token source hands over whatever that screen produced.

use std::collections::HashMap;

use async_trait::async_trait;
use todo_core::backend::ProviderError;
use todo_core::models::SocialProvider;

/// Tokens issued by a social provider after the user consented.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct OAuthToken {
    pub id_token: Option<String>,
    pub access_token: Option<String>,
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl OAuthToken {
    /// `postBody` for `signInWithIdp`: `id_token=..&access_token=..&providerId=..`.
    pub fn post_body(&self, provider: SocialProvider) -> String {
        let mut body = url::form_urlencoded::Serializer::new(String::new());
        if let Some(id_token) = &self.id_token {
            body.append_pair("id_token", id_token);
        }
        if let Some(access_token) = &self.access_token {
            body.append_pair("access_token", access_token);
        }
        body.append_pair("providerId", provider.provider_id());
        body.finish()
    }
}

/// Source of social provider tokens.
#[async_trait]
pub trait OAuthTokenSource: Send + Sync {
    /// Run (or replay) the consent step. `Ok(None)` means the user backed out.
    async fn token(&self, provider: SocialProvider) -> Result<Option<OAuthToken>, ProviderError>;
}

/// Tokens read from environment variables once at startup.
///
/// | Variable                     | Provider |
/// |------------------------------|----------|
/// | `TODO_GOOGLE_ID_TOKEN`       | google   |
/// | `TODO_FACEBOOK_ACCESS_TOKEN` | facebook |
#[derive(Debug, Default)]
pub struct EnvTokenSource {
    tokens: HashMap<SocialProvider, OAuthToken>,
}

impl EnvTokenSource {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut tokens = HashMap::new();
        if let Some(id_token) = get("TODO_GOOGLE_ID_TOKEN") {
            tokens.insert(
                SocialProvider::Google,
                OAuthToken {
                    id_token: Some(id_token),
                    access_token: None,
                },
            );
        }
        if let Some(access_token) = get("TODO_FACEBOOK_ACCESS_TOKEN") {
            tokens.insert(
                SocialProvider::Facebook,
                OAuthToken {
                    id_token: None,
                    access_token: Some(access_token),
                },
            );
        }
        Self { tokens }
    }
}

#[async_trait]
impl OAuthTokenSource for EnvTokenSource {
    async fn token(&self, provider: SocialProvider) -> Result<Option<OAuthToken>, ProviderError> {
        Ok(self.tokens.get(&provider).cloned())
    }
}
