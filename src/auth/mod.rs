//! Token-issuing authentication.
//!
//! Provides:
//! - Credential stores behind the [`UserStore`] trait (in-memory and SQLite)
//! - bcrypt password hashing
//! - Stateless HS256 session tokens carrying `{userId, email, role}`
//! - [`AuthService`]: login, registration, token-backed user lookup
//!
//! ## Design Decisions
//! - Tokens are self-contained; there is no server-side session table, so a
//!   token can only be invalidated early by rotating the signing secret.
//! - Login failures for unknown emails and wrong passwords are
//!   indistinguishable, including in timing.
//! - Email uniqueness is enforced atomically by the store.

pub mod error;
pub mod password;
pub mod service;
pub mod store;
pub mod token;

pub use error::{AuthError, AuthResult};
pub use service::{
    AuthOutcome, AuthPolicy, AuthService, LoginRequest, RegisterRequest, UpdateProfileRequest,
};
pub use store::{MemoryUserStore, PublicUser, SqliteUserStore, UserRecord, UserStore};
pub use token::{Claims, TokenIssuer};
