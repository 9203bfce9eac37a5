//! Firebase project configuration.

use std::time::Duration;

use url::Url;

use crate::error::FirebaseError;

const DEFAULT_AUTH_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";
const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_COLLECTION: &str = "tasks";
const DEFAULT_OWNER_FIELD: &str = "userId";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Configuration for the Identity Toolkit and Firestore REST endpoints.
#[derive(Clone, Debug)]
pub struct FirebaseConfig {
    /// Web API key, sent as `?key=` on every Identity Toolkit call.
    pub api_key: String,
    pub project_id: String,
    pub auth_url: Url,
    /// Secure Token API base, used to refresh ID tokens.
    pub token_url: Url,
    pub firestore_url: Url,
    /// Collection holding the task documents.
    pub collection: String,
    /// Document field holding the owner's user id.
    pub owner_field: String,
    /// How often an open subscription re-runs its query.
    pub poll_interval: Duration,
}

impl FirebaseConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                | Default                                    |
    /// |-------------------------|--------------------------------------------|
    /// | `FIREBASE_API_KEY`      | required                                   |
    /// | `FIREBASE_PROJECT_ID`   | required                                   |
    /// | `FIREBASE_AUTH_URL`     | `https://identitytoolkit.googleapis.com/v1` |
    /// | `FIREBASE_TOKEN_URL`    | `https://securetoken.googleapis.com/v1`    |
    /// | `FIRESTORE_URL`         | `https://firestore.googleapis.com/v1`      |
    /// | `TODO_TASKS_COLLECTION` | `tasks`                                    |
    /// | `TODO_OWNER_FIELD`      | `userId`                                   |
    /// | `TODO_POLL_INTERVAL_MS` | `1000`                                     |
    pub fn from_env() -> Result<Self, FirebaseError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Self::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FirebaseError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required =
            |name: &'static str| get(name).ok_or(FirebaseError::MissingEnv(name));

        let poll_interval = match get("TODO_POLL_INTERVAL_MS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| FirebaseError::InvalidConfig {
                name: "TODO_POLL_INTERVAL_MS",
                message: e.to_string(),
            })?,
            None => DEFAULT_POLL_INTERVAL_MS,
        };
        if poll_interval == 0 {
            return Err(FirebaseError::InvalidConfig {
                name: "TODO_POLL_INTERVAL_MS",
                message: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            api_key: required("FIREBASE_API_KEY")?,
            project_id: required("FIREBASE_PROJECT_ID")?,
            auth_url: parse_base("FIREBASE_AUTH_URL", get("FIREBASE_AUTH_URL"), DEFAULT_AUTH_URL)?,
            token_url: parse_base(
                "FIREBASE_TOKEN_URL",
                get("FIREBASE_TOKEN_URL"),
                DEFAULT_TOKEN_URL,
            )?,
            firestore_url: parse_base(
                "FIRESTORE_URL",
                get("FIRESTORE_URL"),
                DEFAULT_FIRESTORE_URL,
            )?,
            collection: get("TODO_TASKS_COLLECTION").unwrap_or_else(|| DEFAULT_COLLECTION.into()),
            owner_field: get("TODO_OWNER_FIELD").unwrap_or_else(|| DEFAULT_OWNER_FIELD.into()),
            poll_interval: Duration::from_millis(poll_interval),
        })
    }

    /// Identity Toolkit endpoint for `accounts:{method}`.
    pub fn auth_endpoint(&self, method: &str) -> Result<Url, FirebaseError> {
        // `./` keeps the colon from being read as a URL scheme.
        Ok(self.auth_url.join(&format!("./accounts:{method}"))?)
    }

    /// Secure Token endpoint exchanging a refresh token for a new ID token.
    pub fn token_endpoint(&self) -> Result<Url, FirebaseError> {
        Ok(self.token_url.join("token")?)
    }

    /// Root of the project's default database documents.
    pub fn documents_url(&self) -> Result<Url, FirebaseError> {
        Ok(self.firestore_url.join(&format!(
            "projects/{}/databases/(default)/documents/",
            self.project_id
        ))?)
    }

    pub fn collection_url(&self) -> Result<Url, FirebaseError> {
        Ok(self.documents_url()?.join(&format!("./{}", self.collection))?)
    }

    pub fn document_url(&self, id: &str) -> Result<Url, FirebaseError> {
        let mut url = self.collection_url()?;
        url.path_segments_mut()
            .map_err(|()| FirebaseError::InvalidConfig {
                name: "FIRESTORE_URL",
                message: "cannot be a base URL".into(),
            })?
            .push(id);
        Ok(url)
    }

    /// `:runQuery` endpoint scoped to the documents root.
    pub fn run_query_url(&self) -> Result<Url, FirebaseError> {
        let documents = self.documents_url()?;
        let trimmed = documents.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{trimmed}:runQuery"))?)
    }
}

/// Parse a base URL, forcing a trailing slash so `join` appends.
fn parse_base(
    name: &'static str,
    value: Option<String>,
    default: &str,
) -> Result<Url, FirebaseError> {
    let raw = value.unwrap_or_else(|| default.to_string());
    let with_slash = if raw.ends_with('/') {
        raw
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash).map_err(|e| FirebaseError::InvalidConfig {
        name,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn minimal() -> FirebaseConfig {
        FirebaseConfig::from_lookup(lookup(&[
            ("FIREBASE_API_KEY", "k"),
            ("FIREBASE_PROJECT_ID", "demo"),
        ]))
        .unwrap()
    }

    #[test]
    fn defaults_apply() {
        let config = minimal();
        assert_eq!(config.collection, "tasks");
        assert_eq!(config.owner_field, "userId");
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(
            config.auth_url.as_str(),
            "https://identitytoolkit.googleapis.com/v1/"
        );
    }

    #[test]
    fn missing_api_key_is_reported() {
        let err = FirebaseConfig::from_lookup(lookup(&[("FIREBASE_PROJECT_ID", "demo")]))
            .unwrap_err();
        assert!(matches!(err, FirebaseError::MissingEnv("FIREBASE_API_KEY")));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let err = FirebaseConfig::from_lookup(lookup(&[
            ("FIREBASE_API_KEY", "k"),
            ("FIREBASE_PROJECT_ID", "  "),
        ]))
        .unwrap_err();
        assert!(matches!(err, FirebaseError::MissingEnv("FIREBASE_PROJECT_ID")));
    }

    #[test]
    fn bad_poll_interval_is_rejected() {
        for raw in ["soon", "0"] {
            let err = FirebaseConfig::from_lookup(lookup(&[
                ("FIREBASE_API_KEY", "k"),
                ("FIREBASE_PROJECT_ID", "demo"),
                ("TODO_POLL_INTERVAL_MS", raw),
            ]))
            .unwrap_err();
            assert!(matches!(
                err,
                FirebaseError::InvalidConfig {
                    name: "TODO_POLL_INTERVAL_MS",
                    ..
                }
            ));
        }
    }

    #[test]
    fn endpoints_are_built_from_base_urls() {
        let config = FirebaseConfig::from_lookup(lookup(&[
            ("FIREBASE_API_KEY", "k"),
            ("FIREBASE_PROJECT_ID", "demo"),
            ("FIREBASE_AUTH_URL", "http://localhost:9099/identitytoolkit.googleapis.com/v1"),
            ("FIREBASE_TOKEN_URL", "http://localhost:9099/securetoken.googleapis.com/v1"),
            ("FIRESTORE_URL", "http://localhost:8080/v1"),
        ]))
        .unwrap();

        assert_eq!(
            config.token_endpoint().unwrap().as_str(),
            "http://localhost:9099/securetoken.googleapis.com/v1/token"
        );

        assert_eq!(
            config.auth_endpoint("signInWithPassword").unwrap().as_str(),
            "http://localhost:9099/identitytoolkit.googleapis.com/v1/accounts:signInWithPassword"
        );
        assert_eq!(
            config.collection_url().unwrap().as_str(),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents/tasks"
        );
        assert_eq!(
            config.document_url("abc").unwrap().as_str(),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents/tasks/abc"
        );
        assert_eq!(
            config.run_query_url().unwrap().as_str(),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents:runQuery"
        );
    }
}
