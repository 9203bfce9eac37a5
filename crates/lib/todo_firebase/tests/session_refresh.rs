//! ID token expiry against a mock Identity Toolkit / Secure Token / Firestore.

use std::sync::Arc;

use serde_json::json;
use todo_core::backend::{DocumentStore, IdentityProvider};
use todo_core::models::OwnerFilter;
use todo_firebase::{EnvTokenSource, FirebaseBackend, FirebaseConfig};
use wiremock::matchers::{body_string_contains, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

fn backend(server: &MockServer) -> FirebaseBackend {
    let base = server.uri();
    let config = FirebaseConfig::from_lookup(|name| match name {
        "FIREBASE_API_KEY" => Some("k".into()),
        "FIREBASE_PROJECT_ID" => Some("demo".into()),
        "FIREBASE_AUTH_URL" => Some(format!("{base}/identitytoolkit/v1")),
        "FIREBASE_TOKEN_URL" => Some(format!("{base}/securetoken/v1")),
        "FIRESTORE_URL" => Some(format!("{base}/firestore/v1")),
        "TODO_POLL_INTERVAL_MS" => Some("50".into()),
        _ => None,
    })
    .unwrap();
    FirebaseBackend::new(config, Arc::new(EnvTokenSource::default()))
}

async fn mount_sign_in(server: &MockServer, id_token: &str, expires_in: &str) {
    Mock::given(method("POST"))
        .and(path_regex("accounts:signInWithPassword$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "localId": "u1",
            "email": "a@x.com",
            "idToken": id_token,
            "refreshToken": "r1",
            "expiresIn": expires_in,
        })))
        .mount(server)
        .await;
}

async fn mount_query(server: &MockServer, bearer: &str, status: u16, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path_regex(":runQuery$"))
        .and(header("authorization", format!("Bearer {bearer}").as_str()))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

fn unauthenticated() -> serde_json::Value {
    json!({
        "error": {
            "code": 401,
            "message": "Request had invalid authentication credentials.",
            "status": "UNAUTHENTICATED",
        }
    })
}

fn one_task() -> serde_json::Value {
    json!([{
        "document": {
            "name": "projects/demo/databases/(default)/documents/tasks/a",
            "fields": {
                "text": {"stringValue": "Buy milk"},
                "completed": {"booleanValue": false},
                "userId": {"stringValue": "u1"},
            },
        },
        "readTime": "2024-01-01T00:00:00Z",
    }])
}

#[tokio::test]
async fn expired_token_is_refreshed_before_the_request() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    mount_sign_in(&server, "stale", "0").await;
    Mock::given(method("POST"))
        .and(path("/securetoken/v1/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id_token": "fresh",
            "refresh_token": "r2",
            "expires_in": "3600",
            "token_type": "Bearer",
            "user_id": "u1",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(":runQuery$"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401).set_body_json(unauthenticated()))
        .expect(0)
        .mount(&server)
        .await;
    mount_query(&server, "fresh", 200, one_task()).await;

    let backend = backend(&server);
    backend
        .auth
        .sign_in_with_password("a@x.com", "secret")
        .await
        .unwrap();

    let mut subscription = backend.store.subscribe(&OwnerFilter::new("u1")).unwrap();
    let snapshot = subscription.next_snapshot().await.unwrap();
    assert_eq!(snapshot.tasks.len(), 1);
    assert_eq!(snapshot.tasks[0].text, "Buy milk");
    assert_eq!(backend.auth.session().get().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn rejected_token_is_refreshed_and_retried() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    mount_sign_in(&server, "revoked", "3600").await;
    Mock::given(method("POST"))
        .and(path("/securetoken/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id_token": "renewed",
            "refresh_token": "r2",
            "expires_in": "3600",
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_query(&server, "revoked", 401, unauthenticated()).await;
    mount_query(&server, "renewed", 200, one_task()).await;

    let backend = backend(&server);
    let feed = backend.auth.identity_changes();
    backend
        .auth
        .sign_in_with_password("a@x.com", "secret")
        .await
        .unwrap();

    let mut subscription = backend.store.subscribe(&OwnerFilter::new("u1")).unwrap();
    let snapshot = subscription.next_snapshot().await.unwrap();
    assert_eq!(snapshot.tasks[0].id, "a");
    assert!(feed.borrow().is_some());
}

#[tokio::test]
async fn rejected_refresh_token_signs_out() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    mount_sign_in(&server, "expired", "3600").await;
    Mock::given(method("POST"))
        .and(path("/securetoken/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "TOKEN_EXPIRED", "status": "INVALID_ARGUMENT"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(":runQuery$"))
        .respond_with(ResponseTemplate::new(401).set_body_json(unauthenticated()))
        .mount(&server)
        .await;

    let backend = backend(&server);
    let feed = backend.auth.identity_changes();
    backend
        .auth
        .sign_in_with_password("a@x.com", "secret")
        .await
        .unwrap();
    assert!(feed.borrow().is_some());

    let mut subscription = backend.store.subscribe(&OwnerFilter::new("u1")).unwrap();
    assert!(subscription.next_snapshot().await.is_none());
    // The store and the identity feed agree: nobody is signed in.
    assert!(feed.borrow().is_none());
    assert!(backend.auth.session().get().is_none());
}
