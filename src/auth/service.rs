//! Token issuance: login, registration and token-backed user lookups.
//!
//! All methods are blocking (bcrypt is deliberately slow); async callers run
//! them on `spawn_blocking`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

use super::error::{AuthError, AuthResult};
use super::password::{dummy_verify, hash_password, verify_password};
use super::store::{normalize_email, PublicUser, UserRecord, UserStore};
use super::token::{Claims, TokenIssuer};
use crate::config::SeedUser;

/// Role given to self-registered accounts.
pub const DEFAULT_ROLE: &str = "user";

/// Login request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Registration request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Profile update body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: String,
}

/// Successful login/registration: `{message, token, user}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthOutcome {
    pub message: String,
    pub token: String,
    pub user: PublicUser,
}

/// Tunables for [`AuthService`].
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub bcrypt_cost: u32,
    pub min_password_len: usize,
    pub allow_registration: bool,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            bcrypt_cost: 10,
            min_password_len: 8,
            allow_registration: true,
        }
    }
}

/// Issues tokens against a credential store.
pub struct AuthService {
    store: Arc<dyn UserStore>,
    tokens: TokenIssuer,
    policy: AuthPolicy,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, tokens: TokenIssuer, policy: AuthPolicy) -> Self {
        Self {
            store,
            tokens,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Verify credentials and sign a token.
    pub fn login(&self, req: &LoginRequest) -> AuthResult<AuthOutcome> {
        if req.email.trim().is_empty() || req.password.is_empty() {
            return Err(AuthError::validation("Email and password are required"));
        }

        let email = normalize_email(&req.email);
        let Some(record) = self.store.find_by_email(&email)? else {
            dummy_verify(&req.password, self.policy.bcrypt_cost);
            tracing::info!(email = %email, "Login rejected: unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(&req.password, &record.password_hash)? {
            tracing::info!(user_id = %record.id, "Login rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let user = record.to_public();
        let token = self.tokens.issue(&user)?;
        tracing::info!(user_id = %user.id, role = %user.role, "Login succeeded");

        Ok(AuthOutcome {
            message: "Login successful".into(),
            token,
            user,
        })
    }

    /// Validate input, create the account and sign a token.
    pub fn register(&self, req: &RegisterRequest) -> AuthResult<AuthOutcome> {
        if !self.policy.allow_registration {
            return Err(AuthError::RegistrationDisabled);
        }
        self.validate_registration(req)?;

        let record = self.create_record(&req.name, &req.email, &req.password, DEFAULT_ROLE)?;
        let user = record.to_public();
        self.store.insert(record)?;

        let token = self.tokens.issue(&user)?;
        tracing::info!(user_id = %user.id, email = %user.email, "User registered");

        Ok(AuthOutcome {
            message: "User registered successfully".into(),
            token,
            user,
        })
    }

    /// Resolve a bearer token to its user.
    pub fn current_user(&self, token: &str) -> AuthResult<PublicUser> {
        let claims = self.verify_token(token)?;
        self.store
            .find_by_id(&claims.user_id)?
            .map(|record| record.to_public())
            .ok_or(AuthError::Unauthorized("User no longer exists"))
    }

    /// Rename the token's user.
    pub fn update_profile(
        &self,
        token: &str,
        req: &UpdateProfileRequest,
    ) -> AuthResult<PublicUser> {
        let claims = self.verify_token(token)?;
        let name = req.name.trim();
        if name.is_empty() {
            return Err(AuthError::validation("Name is required"));
        }

        let updated = self
            .store
            .update_name(&claims.user_id, name)?
            .ok_or(AuthError::Unauthorized("User no longer exists"))?;
        tracing::info!(user_id = %updated.id, "Profile updated");
        Ok(updated.to_public())
    }

    /// Insert configured accounts, skipping ones that already exist.
    /// Returns how many were inserted.
    pub fn seed(&self, users: &[SeedUser]) -> AuthResult<usize> {
        let mut inserted = 0;
        for seed in users {
            if !is_valid_email(seed.email.trim()) {
                tracing::warn!(email = %seed.email, "Skipping seed user with invalid email");
                continue;
            }
            if self.store.find_by_email(&seed.email)?.is_some() {
                tracing::debug!(email = %seed.email, "Seed user already present");
                continue;
            }
            let record = self.create_record(&seed.name, &seed.email, &seed.password, &seed.role)?;
            match self.store.insert(record) {
                Ok(()) => inserted += 1,
                Err(super::store::StoreError::DuplicateEmail(email)) => {
                    tracing::warn!(email = %email, "Seed user raced with an existing account");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(inserted)
    }

    fn verify_token(&self, token: &str) -> AuthResult<Claims> {
        if token.trim().is_empty() {
            return Err(AuthError::Unauthorized("Missing authorization token"));
        }
        self.tokens.verify(token).map_err(|e| {
            tracing::debug!("Token rejected: {e}");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AuthError::Unauthorized("Token expired")
                }
                _ => AuthError::Unauthorized("Invalid token"),
            }
        })
    }

    fn validate_registration(&self, req: &RegisterRequest) -> AuthResult<()> {
        if req.name.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
            return Err(AuthError::validation(
                "Name, email and password are required",
            ));
        }
        if !is_valid_email(req.email.trim()) {
            return Err(AuthError::validation("Invalid email format"));
        }
        if req.password.chars().count() < self.policy.min_password_len {
            return Err(AuthError::validation(format!(
                "Password must be at least {} characters long",
                self.policy.min_password_len
            )));
        }
        Ok(())
    }

    fn create_record(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: &str,
    ) -> AuthResult<UserRecord> {
        let hash = hash_password(password, self.policy.bcrypt_cost)?;
        Ok(UserRecord::new(name, email, hash, role))
    }
}

/// `local@domain.tld` with no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
        .is_match(email)
}
