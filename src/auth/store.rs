//! Credential stores.
//!
//! Two backends share the [`UserStore`] interface:
//! - [`MemoryUserStore`]: process-local list, reset on restart
//! - [`SqliteUserStore`]: `users` table, survives restarts
//!
//! Email uniqueness is enforced inside `insert` for both backends, so two
//! concurrent registrations for one address cannot both succeed.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A stored account, including its password hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    /// Unix seconds.
    pub created_at: i64,
}

impl UserRecord {
    /// Build a fresh record with a random id.
    pub fn new(name: &str, email: &str, password_hash: String, role: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            email: normalize_email(email),
            password_hash,
            role: role.to_string(),
            created_at: Utc::now().timestamp(),
        }
    }

    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
        }
    }
}

/// The user shape exposed to clients: never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Email '{0}' is already registered")]
    DuplicateEmail(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage interface for accounts.
pub trait UserStore: Send + Sync {
    fn name(&self) -> &str;

    /// Look up by (normalised) email.
    fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>>;

    fn find_by_id(&self, id: &str) -> StoreResult<Option<UserRecord>>;

    /// Insert a record. Fails with [`StoreError::DuplicateEmail`] if the
    /// email is taken; the check and the insert are one atomic step.
    fn insert(&self, record: UserRecord) -> StoreResult<()>;

    /// Rename a user. Returns the updated record, or `None` if absent.
    fn update_name(&self, id: &str, name: &str) -> StoreResult<Option<UserRecord>>;

    fn count(&self) -> StoreResult<u64>;
}

/// Trim and lower-case an email for lookup and storage.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ── In-memory store ─────────────────────────────────────────────

/// Process-local store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryUserStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let email = normalize_email(email);
        let users = self.users.lock();
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    fn find_by_id(&self, id: &str) -> StoreResult<Option<UserRecord>> {
        let users = self.users.lock();
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    fn insert(&self, record: UserRecord) -> StoreResult<()> {
        let mut users = self.users.lock();
        if users.iter().any(|u| u.email == record.email) {
            return Err(StoreError::DuplicateEmail(record.email));
        }
        users.push(record);
        Ok(())
    }

    fn update_name(&self, id: &str, name: &str) -> StoreResult<Option<UserRecord>> {
        let mut users = self.users.lock();
        Ok(users.iter_mut().find(|u| u.id == id).map(|user| {
            user.name = name.trim().to_string();
            user.clone()
        }))
    }

    fn count(&self) -> StoreResult<u64> {
        Ok(self.users.lock().len() as u64)
    }
}

// ── SQLite store ────────────────────────────────────────────────

/// SQLite-backed store.
pub struct SqliteUserStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteUserStore {
    /// Open (or create) the user database at the given path.
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        let conn = rusqlite::Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                created_at INTEGER NOT NULL
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_one(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StoreResult<Option<UserRecord>> {
        let conn = self.conn.lock();
        let row = conn.query_row(sql, params, |row| {
            Ok(UserRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                password_hash: row.get(3)?,
                role: row.get(4)?,
                created_at: row.get(5)?,
            })
        });

        match row {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl UserStore for SqliteUserStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        self.query_one(
            "SELECT id, name, email, password_hash, role, created_at
             FROM users WHERE email = ?1 COLLATE NOCASE",
            rusqlite::params![normalize_email(email)],
        )
    }

    fn find_by_id(&self, id: &str) -> StoreResult<Option<UserRecord>> {
        self.query_one(
            "SELECT id, name, email, password_hash, role, created_at
             FROM users WHERE id = ?1",
            rusqlite::params![id],
        )
    }

    fn insert(&self, record: UserRecord) -> StoreResult<()> {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO users (id, name, email, password_hash, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.id,
                record.name,
                record.email,
                record.password_hash,
                record.role,
                record.created_at,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateEmail(record.email))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update_name(&self, id: &str, name: &str) -> StoreResult<Option<UserRecord>> {
        let updated = {
            let conn = self.conn.lock();
            conn.execute(
                "UPDATE users SET name = ?1 WHERE id = ?2",
                rusqlite::params![name.trim(), id],
            )?
        };
        if updated == 0 {
            return Ok(None);
        }
        self.find_by_id(id)
    }

    fn count(&self) -> StoreResult<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
