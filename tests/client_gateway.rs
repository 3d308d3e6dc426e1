//! Client behaviour against mocked and real gateways.

use cacadores_auth::auth::password::MIN_BCRYPT_COST;
use cacadores_auth::auth::{AuthPolicy, AuthService, MemoryUserStore, TokenIssuer};
use cacadores_auth::client::{
    ApiClient, AuthSession, AuthSnapshot, FileSnapshotStorage, MemorySnapshotStorage,
    SnapshotStorage, LOGIN_ROUTE, TOKEN_KEY, USER_KEY,
};
use cacadores_auth::config::ClientConfig;
use cacadores_auth::gateway::{self, AppState, AuthRateLimiter};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_config(base: &str) -> ClientConfig {
    ClientConfig {
        api_url: base.to_string(),
        timeout_secs: 5,
        ..ClientConfig::default()
    }
}

fn user_json() -> serde_json::Value {
    serde_json::json!({ "id": "u-1", "name": "A", "email": "a@x.com", "role": "user" })
}

fn memory_client(base: &str) -> (Arc<MemorySnapshotStorage>, ApiClient) {
    let storage = Arc::new(MemorySnapshotStorage::new());
    let client = ApiClient::new(client_config(base), storage.clone()).unwrap();
    (storage, client)
}

#[tokio::test]
async fn login_persists_snapshot_and_attaches_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(
            serde_json::json!({ "email": "a@x.com", "password": "longenough1" }),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": "Login successful",
            "token": "tok-1",
            "user": user_json(),
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/user"))
        .and(header("Authorization", "Bearer tok-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "user": user_json() })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (storage, client) = memory_client(&server.uri());
    let response = client.login("a@x.com", "longenough1").await;

    assert!(response.success);
    assert_eq!(response.message, "Login successful");
    assert_eq!(storage.get(TOKEN_KEY).as_deref(), Some("tok-1"));
    assert!(storage.get(USER_KEY).unwrap().contains("a@x.com"));

    let me = client.current_user().await;
    assert!(me.success);
    assert_eq!(me.user.unwrap().id, "u-1");
}

#[tokio::test]
async fn failed_login_is_an_envelope_and_stores_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(serde_json::json!({ "message": "Invalid credentials" })),
        )
        .mount(&server)
        .await;

    let (storage, client) = memory_client(&server.uri());
    let response = client.login("a@x.com", "nope").await;

    assert!(!response.success);
    assert_eq!(response.status, Some(401));
    assert_eq!(response.message, "Invalid credentials");
    assert!(response.token.is_none());
    assert!(storage.get(TOKEN_KEY).is_none());
}

#[tokio::test]
async fn success_without_token_is_not_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({ "message": "ok" })),
        )
        .mount(&server)
        .await;

    let (storage, client) = memory_client(&server.uri());
    let response = client.register("A", "a@x.com", "longenough1").await;

    assert!(!response.success);
    assert!(storage.get(TOKEN_KEY).is_none());
}

#[tokio::test]
async fn network_failure_becomes_envelope() {
    // Bind then drop to get a port nothing listens on.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let (_storage, client) = memory_client(&format!("http://127.0.0.1:{port}"));

    let response = client.login("a@x.com", "longenough1").await;
    assert!(!response.success);
    assert!(response.status.is_none());
    assert!(response.message.starts_with("Network error"));
}

#[tokio::test]
async fn endpoint_overrides_are_respected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": "Login successful",
            "token": "tok-2",
            "user": user_json(),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientConfig {
        login_endpoint: "/v2/sessions".into(),
        ..client_config(&server.uri())
    };
    let client = ApiClient::new(config, Arc::new(MemorySnapshotStorage::new())).unwrap();
    assert!(client.login("a@x.com", "longenough1").await.success);
}

#[tokio::test]
async fn cached_get_hits_server_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stats"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "detections": 3 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (_storage, client) = memory_client(&server.uri());
    let first = client.get_cached("/api/stats").await;
    let second = client.get_cached("/api/stats").await;

    assert!(first.success);
    assert_eq!(first, second);
    assert_eq!(second.data.unwrap()["detections"], 3);
}

#[tokio::test]
async fn check_auth_clears_snapshot_on_401() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/user"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(serde_json::json!({ "message": "Token expired" })),
        )
        .mount(&server)
        .await;

    let (storage, client) = memory_client(&server.uri());
    let user: cacadores_auth::auth::PublicUser = serde_json::from_value(user_json()).unwrap();
    AuthSnapshot::new(&*storage)
        .save("stale-token", &user)
        .unwrap();

    let session = AuthSession::new(client);
    assert!(session.is_loading());
    assert!(!session.initialize().await);
    assert!(!session.is_loading());
    assert!(!session.is_authenticated());
    assert!(storage.get(TOKEN_KEY).is_none());
    assert!(storage.get(USER_KEY).is_none());
}

#[tokio::test]
async fn check_auth_keeps_session_when_server_unreachable() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let (storage, client) = memory_client(&format!("http://127.0.0.1:{port}"));
    let user: cacadores_auth::auth::PublicUser = serde_json::from_value(user_json()).unwrap();
    AuthSnapshot::new(&*storage).save("tok", &user).unwrap();

    let session = AuthSession::new(client);
    assert!(session.initialize().await);
    assert_eq!(session.user().unwrap().email, "a@x.com");
    assert!(storage.get(TOKEN_KEY).is_some());
}

#[tokio::test]
async fn initialize_without_token_drops_stale_user() {
    let (storage, client) = memory_client("http://127.0.0.1:9");
    storage
        .set(USER_KEY, &user_json().to_string())
        .unwrap();

    let session = AuthSession::new(client);
    assert!(!session.initialize().await);
    assert!(!session.is_authenticated());
    assert!(storage.get(USER_KEY).is_none());
}

// ── End-to-end against the real gateway ─────────────────────────────

async fn spawn_gateway() -> String {
    let auth = AuthService::new(
        Arc::new(MemoryUserStore::new()),
        TokenIssuer::new("e2e-secret", Duration::from_secs(3600)),
        AuthPolicy {
            bcrypt_cost: MIN_BCRYPT_COST,
            ..AuthPolicy::default()
        },
    );
    let state = AppState {
        auth: Arc::new(auth),
        rate_limiter: Arc::new(AuthRateLimiter::new(0)),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = gateway::serve(listener, state, Duration::from_secs(30)).await;
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn session_flow_against_real_gateway() {
    let base = spawn_gateway().await;
    let tmp = tempfile::TempDir::new().unwrap();
    let session_dir = tmp.path().join("session");

    let storage: Arc<dyn SnapshotStorage> = Arc::new(FileSnapshotStorage::new(&session_dir));
    let session = AuthSession::new(ApiClient::new(client_config(&base), storage).unwrap());

    let registered = session.register("A", "a@x.com", "longenough1").await;
    assert!(registered.success, "{}", registered.message);
    assert_eq!(registered.status, Some(201));
    let user_id = registered.user.as_ref().unwrap().id.clone();
    assert!(session.is_authenticated());

    let duplicate = session.api().register("B", "a@x.com", "longenough2").await;
    assert_eq!(duplicate.status, Some(409));

    // A fresh session over the same directory restores and re-validates.
    let storage: Arc<dyn SnapshotStorage> = Arc::new(FileSnapshotStorage::new(&session_dir));
    let restored = AuthSession::new(ApiClient::new(client_config(&base), storage).unwrap());
    assert!(restored.initialize().await);
    assert_eq!(restored.user().unwrap().id, user_id);

    let renamed = restored.api().update_profile("Ana").await;
    assert!(renamed.success, "{}", renamed.message);
    assert_eq!(restored.api().snapshot().user().unwrap().name, "Ana");

    assert_eq!(restored.logout(), LOGIN_ROUTE);
    assert!(!restored.is_authenticated());
    assert!(!session_dir.join(TOKEN_KEY).exists());

    let logged_in = restored.login("a@x.com", "longenough1").await;
    assert!(logged_in.success);
    assert_eq!(logged_in.user.unwrap().id, user_id);

    let wrong = restored.login("a@x.com", "wrong-password").await;
    assert!(!wrong.success);
    assert_eq!(wrong.status, Some(401));
    assert!(wrong.token.is_none());
}

#[tokio::test]
async fn short_password_rejected_end_to_end() {
    let base = spawn_gateway().await;
    let (storage, client) = memory_client(&base);

    let response = client.register("A", "a@x.com", "short").await;
    assert!(!response.success);
    assert_eq!(response.status, Some(400));
    assert!(storage.get(TOKEN_KEY).is_none());

    let login = client.login("a@x.com", "short").await;
    assert_eq!(login.status, Some(401));
}
