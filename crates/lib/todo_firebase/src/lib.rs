//! # todo_firebase
//!
//! Firebase backends for Todo: [`FirebaseAuth`] implements the identity
//! provider over the Identity Toolkit REST API and [`FirestoreStore`] the
//! document store over the Firestore REST API.

pub mod auth;
pub mod config;
pub mod error;
pub mod firestore;
pub mod oauth;
pub mod session;

use std::sync::Arc;

pub use auth::FirebaseAuth;
pub use config::FirebaseConfig;
pub use error::FirebaseError;
pub use firestore::FirestoreStore;
pub use oauth::{EnvTokenSource, OAuthToken, OAuthTokenSource};
pub use session::SessionToken;

/// Identity provider and document store sharing one signed-in session.
pub struct FirebaseBackend {
    pub auth: Arc<FirebaseAuth>,
    pub store: Arc<FirestoreStore>,
}

impl FirebaseBackend {
    pub fn new(config: FirebaseConfig, tokens: Arc<dyn OAuthTokenSource>) -> Self {
        let config = Arc::new(config);
        let http = reqwest::Client::new();
        let auth = FirebaseAuth::with_client(http.clone(), config.clone(), tokens);
        let store = FirestoreStore::with_client(http, config, auth.session());
        Self {
            auth: Arc::new(auth),
            store: Arc::new(store),
        }
    }

    /// Build from environment variables, with social tokens from the environment.
    pub fn from_env() -> Result<Self, FirebaseError> {
        let config = FirebaseConfig::from_env()?;
        Ok(Self::new(config, Arc::new(EnvTokenSource::from_env())))
    }
}
