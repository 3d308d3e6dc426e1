//! Client-side auth state.
//!
//! [`AuthSession`] owns the current user and exposes the only transitions:
//! `login`, `register`, `logout` and `check_auth`. `is_authenticated` is
//! derived from whether a user is held.

use parking_lot::RwLock;

use super::api::{ApiClient, ApiResponse};
use crate::auth::PublicUser;

/// Route the caller navigates to after logout.
pub const LOGIN_ROUTE: &str = "/login";

#[derive(Debug, Clone, Default)]
struct AuthState {
    user: Option<PublicUser>,
    is_loading: bool,
}

pub struct AuthSession {
    api: ApiClient,
    state: RwLock<AuthState>,
}

impl AuthSession {
    /// New session in the loading state; call [`AuthSession::initialize`].
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            state: RwLock::new(AuthState {
                user: None,
                is_loading: true,
            }),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn user(&self) -> Option<PublicUser> {
        self.state.read().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().user.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().is_loading
    }

    /// Restore the persisted snapshot, then re-validate it with the server.
    pub async fn initialize(&self) -> bool {
        let snapshot = self.api.snapshot();
        let restored = match (snapshot.token(), snapshot.user()) {
            (Some(_), Some(user)) => Some(user),
            (Some(_), None) => None,
            _ => {
                // No token: any leftover user snapshot is stale.
                self.clear_snapshot();
                None
            }
        };
        let has_token = snapshot.token().is_some();

        self.state.write().user = restored;
        let authenticated = if has_token {
            self.check_auth().await
        } else {
            false
        };
        self.state.write().is_loading = false;
        authenticated
    }

    pub async fn login(&self, email: &str, password: &str) -> ApiResponse {
        self.state.write().is_loading = true;
        let response = self.api.login(email, password).await;
        self.finish_auth(&response);
        response
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> ApiResponse {
        self.state.write().is_loading = true;
        let response = self.api.register(name, email, password).await;
        self.finish_auth(&response);
        response
    }

    /// Clear the snapshot and the user. Returns the route to navigate to.
    pub fn logout(&self) -> &'static str {
        self.clear_snapshot();
        self.api.clear_cache();
        let mut state = self.state.write();
        state.user = None;
        state.is_loading = false;
        tracing::info!("Logged out");
        LOGIN_ROUTE
    }

    /// Ask the server whether the stored token is still good.
    ///
    /// A 401 clears the snapshot. Transport failures keep whatever user is
    /// held, so an offline client stays signed in.
    pub async fn check_auth(&self) -> bool {
        if self.api.snapshot().token().is_none() {
            self.state.write().user = None;
            return false;
        }

        let response = self.api.current_user().await;
        if response.success {
            if let Some(user) = response.user {
                if let Err(e) = self.api.snapshot().save_user(&user) {
                    tracing::warn!("Failed to refresh user snapshot: {e:#}");
                }
                self.state.write().user = Some(user);
                return true;
            }
        }

        if response.is_unauthorized() {
            tracing::info!("Stored token rejected: {}", response.message);
            self.clear_snapshot();
            self.api.clear_cache();
            self.state.write().user = None;
            return false;
        }

        tracing::warn!("Could not re-validate session: {}", response.message);
        self.is_authenticated()
    }

    fn clear_snapshot(&self) {
        if let Err(e) = self.api.snapshot().clear() {
            tracing::warn!("Failed to clear auth snapshot: {e:#}");
        }
    }

    fn finish_auth(&self, response: &ApiResponse) {
        let mut state = self.state.write();
        if response.success {
            state.user = response.user.clone();
        }
        state.is_loading = false;
    }
}
