//! User Storage
//! Mission: Store and manage user accounts with SQLite

use anyhow::{Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use crate::models::OPENING_BALANCE;

/// Result of an account creation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignupOutcome {
    Created,
    AlreadyExists,
}

/// User storage with SQLite backend
pub struct UserStore {
    db_path: String,
}

impl UserStore {
    /// Create a new user store and initialize the database.
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn init_db(&self) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                balance REAL NOT NULL DEFAULT 100000,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .context("create users table")?;
        Ok(())
    }

    /// Register a new user with the default opening balance.
    pub fn create_account(&self, username: &str, password: &str) -> Result<SignupOutcome> {
        let conn = Connection::open(&self.db_path)?;

        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Ok(SignupOutcome::AlreadyExists);
        }

        let password_hash = hash(password, DEFAULT_COST).context("hash password")?;
        conn.execute(
            "INSERT INTO users (id, username, password_hash, balance, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Uuid::new_v4().to_string(),
                username,
                password_hash,
                OPENING_BALANCE,
                Utc::now().to_rfc3339(),
            ],
        )
        .context("insert user")?;

        info!(username, "account created");
        Ok(SignupOutcome::Created)
    }

    /// Check credentials; on success return the stored cash balance.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<f64>> {
        let conn = Connection::open(&self.db_path)?;

        let row: Option<(String, f64)> = conn
            .query_row(
                "SELECT password_hash, balance FROM users WHERE username = ?1",
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((password_hash, balance)) = row else {
            return Ok(None);
        };

        if verify(password, &password_hash).context("verify password")? {
            Ok(Some(balance))
        } else {
            Ok(None)
        }
    }

    /// Write the closing balance back to the user record.
    pub fn update_balance(&self, username: &str, balance: f64) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;
        let updated = conn
            .execute(
                "UPDATE users SET balance = ?1 WHERE username = ?2",
                params![balance, username],
            )
            .context("update balance")?;
        if updated == 0 {
            anyhow::bail!("no such user: {}", username);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> UserStore {
        UserStore::new(dir.path().join("users.db").to_str().unwrap()).unwrap()
    }

    #[test]
    fn signup_then_login() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        assert_eq!(
            store.create_account("alice", "hunter2").unwrap(),
            SignupOutcome::Created
        );
        assert_eq!(
            store.create_account("alice", "other").unwrap(),
            SignupOutcome::AlreadyExists
        );

        assert_eq!(
            store.authenticate("alice", "hunter2").unwrap(),
            Some(OPENING_BALANCE)
        );
        assert_eq!(store.authenticate("alice", "wrong").unwrap(), None);
        assert_eq!(store.authenticate("bob", "hunter2").unwrap(), None);
    }

    #[test]
    fn balance_write_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store.create_account("carol", "pw").unwrap();
        store.update_balance("carol", 123_456.0).unwrap();
        assert_eq!(store.authenticate("carol", "pw").unwrap(), Some(123_456.0));

        assert!(store.update_balance("nobody", 1.0).is_err());
    }
}
