//! Axum-based HTTP gateway exposing the token-issuance endpoints.
//!
//! - `POST /api/auth/login`    — `{email, password}` → `{message, token, user}`
//! - `POST /api/auth/register` — `{name, email, password}` → `{message, token, user}`
//! - `GET  /api/user`          — bearer token → `{user}`
//! - `PUT  /api/user`          — bearer token + `{name}` → `{message, user}`
//! - `GET  /health`
//!
//! Request bodies are capped at 64KB and requests time out with `408`.
//! Error bodies are always `{"message": "..."}`.

use crate::auth::{
    AuthError, AuthPolicy, AuthResult, AuthService, LoginRequest, MemoryUserStore,
    RegisterRequest, SqliteUserStore, TokenIssuer, UpdateProfileRequest, UserStore,
};
use crate::config::{Config, StoreBackend};
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{header, Extensions, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;
/// Sliding window used by login/register rate limiting.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// How often idle clients are dropped from a window.
const RATE_LIMITER_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Bucket for requests with neither a peer address nor a trusted header.
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug)]
struct WindowState {
    hits: HashMap<String, VecDeque<Instant>>,
    last_sweep: Instant,
}

/// Per-client attempt timestamps within a sliding window.
#[derive(Debug)]
struct SlidingWindow {
    limit: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

impl SlidingWindow {
    fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(WindowState {
                hits: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Record an attempt for `client` unless its budget is spent.
    fn try_acquire(&self, client: &str) -> bool {
        if self.limit == 0 {
            return true;
        }

        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if now.duration_since(state.last_sweep) >= RATE_LIMITER_SWEEP_INTERVAL {
            state.hits.retain(|_, hits| {
                prune(hits, now, self.window);
                !hits.is_empty()
            });
            state.last_sweep = now;
        }

        let hits = state.hits.entry(client.to_owned()).or_default();
        prune(hits, now, self.window);
        if hits.len() >= self.limit as usize {
            return false;
        }
        hits.push_back(now);
        true
    }
}

fn prune(hits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while hits
        .front()
        .is_some_and(|t| now.duration_since(*t) >= window)
    {
        hits.pop_front();
    }
}

/// Separate budgets for login and registration attempts, keyed per client.
#[derive(Debug)]
pub struct AuthRateLimiter {
    login: SlidingWindow,
    register: SlidingWindow,
    trust_proxy_headers: bool,
}

impl AuthRateLimiter {
    pub fn new(per_minute: u32) -> Self {
        let window = Duration::from_secs(RATE_LIMIT_WINDOW_SECS);
        Self {
            login: SlidingWindow::new(per_minute, window),
            register: SlidingWindow::new(per_minute, window),
            trust_proxy_headers: false,
        }
    }

    /// Key clients on `X-Forwarded-For`/`X-Real-IP` before the peer address.
    pub fn with_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    fn client_key(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        if self.trust_proxy_headers {
            if let Some(forwarded) = forwarded_client(headers) {
                return forwarded;
            }
        }
        peer.map_or_else(|| UNKNOWN_CLIENT.to_owned(), |addr| addr.ip().to_string())
    }

    fn allow_login(&self, client: &str) -> bool {
        self.login.try_acquire(client)
    }

    fn allow_register(&self, client: &str) -> bool {
        self.register.try_acquire(client)
    }
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`.
fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    let header_value = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let first_hop = header_value("x-forwarded-for").and_then(|v| v.split(',').next());

    [first_hop, header_value("x-real-ip")]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_owned)
}

fn peer_addr(extensions: &Extensions) -> Option<SocketAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Extract bearer token from Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub rate_limiter: Arc<AuthRateLimiter>,
}

impl AppState {
    /// Build the auth service and its store from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn UserStore> = match config.auth.store {
            StoreBackend::Memory => Arc::new(MemoryUserStore::new()),
            StoreBackend::Sqlite => {
                std::fs::create_dir_all(&config.data_dir).with_context(|| {
                    format!("Failed to create data dir {}", config.data_dir.display())
                })?;
                let path = config.users_db_path();
                let store = SqliteUserStore::open(&path)
                    .with_context(|| format!("Failed to open user store {}", path.display()))?;
                tracing::info!("User store opened at {}", path.display());
                Arc::new(store)
            }
        };

        let tokens = TokenIssuer::new(config.jwt_secret(), config.token_ttl()?);
        let policy = AuthPolicy {
            bcrypt_cost: config.auth.bcrypt_cost,
            min_password_len: config.auth.min_password_len,
            allow_registration: config.auth.allow_registration,
        };
        let auth = AuthService::new(store, tokens, policy);

        if !config.auth.seed_users.is_empty() {
            let inserted = auth
                .seed(&config.auth.seed_users)
                .map_err(|e| anyhow::anyhow!("Failed to seed users: {e}"))?;
            tracing::info!(inserted, "Seed users applied");
        }

        Ok(Self {
            auth: Arc::new(auth),
            rate_limiter: Arc::new(
                AuthRateLimiter::new(config.server.rate_limit_per_minute)
                    .with_proxy_headers(config.server.trust_proxy_headers),
            ),
        })
    }
}

/// Assemble the router with CORS, body-limit and timeout layers.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    // ── CORS: browser dashboards call from other origins ──
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/auth/login", post(handle_login))
        .route("/api/auth/register", post(handle_register))
        .route("/api/user", get(handle_user_get).put(handle_user_update))
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
}

fn is_loopback_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.trim_matches(|c| c == '[' || c == ']')
        .parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

/// Run the HTTP gateway.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    // ── Security: the fallback secret is public knowledge ──
    if !is_loopback_host(host) && config.auth.jwt_secret.is_none() {
        anyhow::bail!(
            "Refusing to bind to {host} with the development JWT secret.\n\
             Fix: set JWT_SECRET (or [auth] jwt_secret) or bind to 127.0.0.1."
        );
    }

    let listener = bind_listener(host, port).await?;
    let actual = listener.local_addr()?;

    let state = AppState::from_config(&config)?;
    let timeout = Duration::from_secs(config.server.request_timeout_secs.max(1));

    tracing::info!(
        addr = %actual,
        store = state.auth.store().name(),
        environment = ?config.environment,
        "Auth gateway listening"
    );
    println!("🔐 Caçadores auth gateway listening on http://{actual}");
    println!("  POST /api/auth/login     — {{\"email\", \"password\"}}");
    println!("  POST /api/auth/register  — {{\"name\", \"email\", \"password\"}}");
    println!("  GET  /api/user           — current user (Bearer token)");
    println!("  PUT  /api/user           — update profile (Bearer token)");
    println!("  GET  /health             — health check");
    println!("  Press Ctrl+C to stop.\n");

    serve(listener, state, timeout).await
}

/// Bind `host:port`, resolving names such as `localhost`. IPv6 literals may
/// be bracketed.
pub async fn bind_listener(host: &str, port: u16) -> Result<tokio::net::TcpListener> {
    let host = host.trim_matches(|c| c == '[' || c == ']');
    tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))
}

/// Serve on an already-bound listener until Ctrl+C.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    request_timeout: Duration,
) -> Result<()> {
    let app = build_router(state, request_timeout);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Auth request failed: {self}");
        }
        (
            status,
            Json(serde_json::json!({ "message": self.public_message() })),
        )
            .into_response()
    }
}

/// Reject an unreadable body with the extractor's own status (400, 413, 415...).
fn bad_body(rejection: &JsonRejection) -> Response {
    (
        rejection.status(),
        Json(serde_json::json!({
            "message": format!("Invalid request: {}", rejection.body_text()),
        })),
    )
        .into_response()
}

/// Run blocking auth work (bcrypt) off the async workers.
async fn run_blocking<T, F>(work: F) -> AuthResult<T>
where
    F: FnOnce() -> AuthResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AuthError::Internal(anyhow::anyhow!("auth worker panicked: {e}")))?
}

/// GET /health (public)
async fn handle_health(State(state): State<AppState>) -> Response {
    let users = state.auth.store().count().ok();
    Json(serde_json::json!({
        "status": "ok",
        "store": state.auth.store().name(),
        "users": users,
    }))
    .into_response()
}

/// POST /api/auth/login
async fn handle_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let client = state.rate_limiter.client_key(&headers, peer_addr(&extensions));
    if !state.rate_limiter.allow_login(&client) {
        tracing::warn!(client = %client, "Login rate limit exceeded");
        return AuthError::RateLimited.into_response();
    }

    let Json(req) = match body {
        Ok(b) => b,
        Err(e) => return bad_body(&e),
    };

    let auth = Arc::clone(&state.auth);
    match run_blocking(move || auth.login(&req)).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/auth/register
async fn handle_register(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Response {
    let client = state.rate_limiter.client_key(&headers, peer_addr(&extensions));
    if !state.rate_limiter.allow_register(&client) {
        tracing::warn!(client = %client, "Registration rate limit exceeded");
        return AuthError::RateLimited.into_response();
    }

    let Json(req) = match body {
        Ok(b) => b,
        Err(e) => return bad_body(&e),
    };

    let auth = Arc::clone(&state.auth);
    match run_blocking(move || auth.register(&req)).await {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/user: the client re-validates its stored token here.
async fn handle_user_get(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(token) = extract_bearer_token(&headers) else {
        return AuthError::Unauthorized("Missing authorization token").into_response();
    };

    match state.auth.current_user(token) {
        Ok(user) => Json(serde_json::json!({ "user": user })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// PUT /api/user: profile update.
async fn handle_user_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Response {
    let Some(token) = extract_bearer_token(&headers) else {
        return AuthError::Unauthorized("Missing authorization token").into_response();
    };
    let Json(req) = match body {
        Ok(b) => b,
        Err(e) => return bad_body(&e),
    };

    match state.auth.update_profile(token, &req) {
        Ok(user) => Json(serde_json::json!({
            "message": "Profile updated",
            "user": user,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}
