//! Auth client for dashboards and the CLI.
//!
//! - [`ApiClient`]: gateway calls normalised into [`ApiResponse`] envelopes
//! - [`AuthSession`]: current user plus login/register/logout/check_auth
//! - [`SnapshotStorage`]: where the token and user snapshot persist
//! - [`ResponseCache`]: TTL memoization for GET requests

pub mod api;
pub mod cache;
pub mod session;
pub mod storage;

pub use api::{ApiClient, ApiResponse};
pub use cache::ResponseCache;
pub use session::{AuthSession, LOGIN_ROUTE};
pub use storage::{
    AuthSnapshot, FileSnapshotStorage, MemorySnapshotStorage, SnapshotStorage, TOKEN_KEY,
    USER_KEY,
};
