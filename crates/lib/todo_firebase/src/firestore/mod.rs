//! Document store over the Firestore REST API.
//!
//! Point writes map to single REST calls. The REST surface has no listen
//! stream, so a subscription is a background task re-running an owner-scoped
//! `:runQuery`; it pushes a snapshot whenever the result set differs from the
//! last one pushed, and ends on the first failed query.

pub mod value;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use todo_core::backend::subscription::{self, SnapshotSink};
use todo_core::backend::{DocumentStore, StoreError, Subscription};
use todo_core::models::{NewTask, OwnerFilter, Snapshot, Task, TaskPatch};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::FirebaseConfig;
use crate::error::{self, FirebaseError};
use crate::session::SessionToken;

use self::value::Document;

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    /// Absent on the progress-only entry returned for empty results.
    document: Option<Document>,
}

/// Structured query selecting `owner_id`'s tasks in id order.
fn owner_query(config: &FirebaseConfig, owner_id: &str) -> serde_json::Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": config.collection }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": config.owner_field },
                    "op": "EQUAL",
                    "value": { "stringValue": owner_id },
                }
            },
            "orderBy": [{
                "field": { "fieldPath": "__name__" },
                "direction": "ASCENDING",
            }],
        }
    })
}

/// Documents that fail to decode are skipped; the rest still form a snapshot.
fn decode_query(items: Vec<RunQueryItem>, owner_field: &str) -> Vec<Task> {
    items
        .into_iter()
        .filter_map(|item| item.document)
        .filter_map(|doc| match value::decode_task(&doc, owner_field) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(document = %doc.name, error = %e, "skipping undecodable task document");
                None
            }
        })
        .collect()
}

/// Shared request state, cloned into every poll task.
#[derive(Clone)]
struct Rest {
    http: Client,
    config: Arc<FirebaseConfig>,
    session: SessionToken,
}

impl Rest {
    /// Send an authorized request built by `build` from an ID token. A 401
    /// triggers one token refresh and a retry; a second 401 ends the session.
    async fn send<F>(&self, build: F) -> Result<reqwest::Response, StoreError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self
            .session
            .bearer()
            .await?
            .ok_or(StoreError::NotAuthenticated)?;
        let response = build(&token).send().await.map_err(FirebaseError::from)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::check(response).await;
        }

        debug!("ID token rejected, refreshing");
        let token = self
            .session
            .refresh(&token)
            .await?
            .ok_or(StoreError::NotAuthenticated)?;
        let response = build(&token).send().await.map_err(FirebaseError::from)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("refreshed ID token rejected, ending session");
            self.session.end();
            return Err(StoreError::NotAuthenticated);
        }
        Self::check(response).await
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error::api_error(response).await.into())
        }
    }

    async fn run_query(&self, owner_id: &str) -> Result<Vec<Task>, StoreError> {
        let url = self.config.run_query_url()?;
        let query = owner_query(&self.config, owner_id);
        let response = self
            .send(|token| self.http.post(url.clone()).bearer_auth(token).json(&query))
            .await?;
        let items: Vec<RunQueryItem> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(decode_query(items, &self.config.owner_field))
    }
}

/// Task documents stored in a Firestore collection.
pub struct FirestoreStore {
    rest: Rest,
    /// Wakes open subscriptions after a successful write.
    refresh: Arc<Notify>,
}

impl FirestoreStore {
    /// `session` authorizes every request; it is normally
    /// [`crate::FirebaseAuth::session`].
    pub fn new(config: Arc<FirebaseConfig>, session: SessionToken) -> Self {
        Self::with_client(Client::new(), config, session)
    }

    pub fn with_client(http: Client, config: Arc<FirebaseConfig>, session: SessionToken) -> Self {
        Self {
            rest: Rest {
                http,
                config,
                session,
            },
            refresh: Arc::new(Notify::new()),
        }
    }

    fn written(&self) {
        self.refresh.notify_waiters();
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn create_task(&self, task: &NewTask) -> Result<String, StoreError> {
        let rest = &self.rest;
        let url = rest.config.collection_url()?;
        let body = value::encode_new_task(task, &rest.config.owner_field);
        let response = rest
            .send(|token| rest.http.post(url.clone()).bearer_auth(token).json(&body))
            .await?;
        let created: Document = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let id = created
            .id()
            .ok_or_else(|| StoreError::Decode("created document has no name".into()))?
            .to_string();
        debug!(task_id = %id, "document created");
        self.written();
        Ok(id)
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<(), StoreError> {
        let rest = &self.rest;
        let url = rest.config.document_url(id)?;
        let (body, mask) = value::encode_patch(patch);
        let mut query: Vec<(&str, &str)> = mask
            .iter()
            .map(|field| ("updateMask.fieldPaths", *field))
            .collect();
        // Patch must not create the document.
        query.push(("currentDocument.exists", "true"));

        rest.send(|token| {
            rest.http
                .patch(url.clone())
                .bearer_auth(token)
                .query(&query)
                .json(&body)
        })
        .await?;
        debug!(task_id = id, "document updated");
        self.written();
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<(), StoreError> {
        let rest = &self.rest;
        let url = rest.config.document_url(id)?;
        rest.send(|token| rest.http.delete(url.clone()).bearer_auth(token)).await?;
        debug!(task_id = id, "document deleted");
        self.written();
        Ok(())
    }

    fn subscribe(&self, filter: &OwnerFilter) -> Result<Subscription, StoreError> {
        let runtime = Handle::try_current()
            .map_err(|e| StoreError::Network(format!("no async runtime: {e}")))?;
        let (sink, subscription) = subscription::channel();
        info!(subscription = %sink.id(), owner_id = %filter.owner_id, "starting task poller");
        let poller = Poller {
            rest: self.rest.clone(),
            refresh: self.refresh.clone(),
            owner_id: filter.owner_id.clone(),
            sink,
        };
        runtime.spawn(poller.run());
        Ok(subscription)
    }
}

/// Background query loop feeding one subscription.
struct Poller {
    rest: Rest,
    refresh: Arc<Notify>,
    owner_id: String,
    sink: SnapshotSink,
}

impl Poller {
    async fn run(self) {
        let mut last: Option<Vec<Task>> = None;
        loop {
            let result = tokio::select! {
                _ = self.sink.closed() => break,
                result = self.rest.run_query(&self.owner_id) => result,
            };
            match result {
                Ok(tasks) if last.as_ref() != Some(&tasks) => {
                    last = Some(tasks.clone());
                    if !self.sink.push(Snapshot::new(tasks)) {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        subscription = %self.sink.id(),
                        error = %e,
                        "task query failed, ending subscription"
                    );
                    break;
                }
            }
            tokio::select! {
                _ = self.sink.closed() => break,
                _ = self.refresh.notified() => {}
                _ = tokio::time::sleep(self.rest.config.poll_interval) => {}
            }
        }
        debug!(subscription = %self.sink.id(), "task poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_out() -> SessionToken {
        SessionToken::new(Client::new(), config())
    }

    fn config() -> Arc<FirebaseConfig> {
        Arc::new(
            FirebaseConfig::from_lookup(|name| match name {
                "FIREBASE_API_KEY" => Some("k".into()),
                "FIREBASE_PROJECT_ID" => Some("demo".into()),
                "FIRESTORE_URL" => Some("http://127.0.0.1:9/v1".into()),
                _ => None,
            })
            .unwrap(),
        )
    }

    #[test]
    fn owner_query_filters_on_owner_field() {
        let query = owner_query(&config(), "u1");
        let filter = &query["structuredQuery"]["where"]["fieldFilter"];
        assert_eq!(filter["field"]["fieldPath"], "userId");
        assert_eq!(filter["op"], "EQUAL");
        assert_eq!(filter["value"]["stringValue"], "u1");
        assert_eq!(query["structuredQuery"]["from"][0]["collectionId"], "tasks");
    }

    #[test]
    fn empty_query_result_decodes_to_no_tasks() {
        let items: Vec<RunQueryItem> =
            serde_json::from_str(r#"[{"readTime":"2024-01-01T00:00:00Z"}]"#).unwrap();
        assert!(decode_query(items, "userId").is_empty());
    }

    #[test]
    fn query_result_decodes_in_order() {
        let items: Vec<RunQueryItem> = serde_json::from_str(
            r#"[
              {"document":{"name":"p/d/tasks/a","fields":{"text":{"stringValue":"one"},"completed":{"booleanValue":false},"userId":{"stringValue":"u1"}}},"readTime":"t"},
              {"document":{"name":"p/d/tasks/b","fields":{"text":{"stringValue":"two"},"completed":{"booleanValue":true},"userId":{"stringValue":"u1"}}},"readTime":"t"}
            ]"#,
        )
        .unwrap();
        let tasks = decode_query(items, "userId");
        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(tasks[1].completed);
    }

    #[test]
    fn malformed_documents_are_skipped() {
        let items: Vec<RunQueryItem> = serde_json::from_str(
            r#"[
              {"document":{"name":"p/d/tasks/a","fields":{"text":{"integerValue":"7"},"userId":{"stringValue":"u1"}}}},
              {"document":{"name":"p/d/tasks/b","fields":{"text":{"stringValue":"two"},"completed":{"stringValue":"yes"},"userId":{"stringValue":"u1"}}}},
              {"document":{"name":"p/d/tasks/c","fields":{"text":{"stringValue":"three"},"userId":{"stringValue":"u1"}}}}
            ]"#,
        )
        .unwrap();
        let tasks = decode_query(items, "userId");
        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[tokio::test]
    async fn writes_require_a_session() {
        let store = FirestoreStore::new(config(), signed_out());
        assert!(matches!(
            store.create_task(&NewTask::open("x", "u1")).await,
            Err(StoreError::NotAuthenticated)
        ));
        assert!(matches!(
            store.delete_task("a").await,
            Err(StoreError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn subscription_ends_when_query_fails() {
        let store = FirestoreStore::new(config(), signed_out());
        let mut subscription = store.subscribe(&OwnerFilter::new("u1")).unwrap();
        // No session: the first query fails and the stream ends.
        assert!(subscription.next_snapshot().await.is_none());
    }

    #[test]
    fn subscribe_outside_runtime_is_an_error() {
        let store = FirestoreStore::new(config(), signed_out());
        assert!(matches!(
            store.subscribe(&OwnerFilter::new("u1")),
            Err(StoreError::Network(_))
        ));
    }
}
