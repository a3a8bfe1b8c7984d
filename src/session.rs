//! Identity provider seam and the explicit session context passed to the
//! task list.

use std::sync::Mutex;

use anyhow::{anyhow, Context};
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::db;
use crate::error::{Result, TodoError};
use crate::validate::validate_credentials;

/// The signed-in user. Task collections are scoped by `user_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub email: String,
}

pub trait IdentityProvider {
    fn current_user(&self) -> Result<Option<Session>>;

    fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// Create an account and sign it in.
    fn create_user(&self, email: &str, password: &str) -> Result<Session>;

    fn sign_out(&self) -> Result<()>;
}

/// Minimum password length accepted by [`LocalIdentity::create_user`].
pub const MIN_PASSWORD_LEN: usize = 6;

/// Account table in the local database, standing in for a hosted identity
/// service. The signed-in user survives restarts until `sign_out`.
pub struct LocalIdentity {
    conn: Mutex<Connection>,
}

impl LocalIdentity {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = db::open(path)?;
        db::init(&conn)?;
        Ok(Self::new(conn))
    }

    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> anyhow::Result<T>) -> anyhow::Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("identity connection lock poisoned"))?;
        f(&conn)
    }
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn remember(conn: &Connection, uid: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO auth_session (id, uid) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET uid = excluded.uid,
             signed_in = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')",
        [uid],
    )
    .context("failed to persist session")?;
    Ok(())
}

impl IdentityProvider for LocalIdentity {
    fn current_user(&self) -> Result<Option<Session>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT u.uid, u.email FROM auth_session s JOIN users u ON u.uid = s.uid
                 WHERE s.id = 1",
                [],
                |row| {
                    Ok(Session {
                        user_id: row.get(0)?,
                        email: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
        })
        .map_err(|e| TodoError::Auth(format!("{e:#}")))
    }

    fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let (email, password) = validate_credentials(email, password)?;
        let found = self
            .with_conn(|conn| {
                let row: Option<(String, String, String, String)> = conn
                    .query_row(
                        "SELECT uid, email, salt, password_hash FROM users WHERE email = ?1",
                        [email],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                    )
                    .optional()?;
                let Some((uid, email, salt, stored)) = row else {
                    return Ok(None);
                };
                if hash_password(&salt, password) != stored {
                    return Ok(None);
                }
                remember(conn, &uid)?;
                Ok(Some(Session {
                    user_id: uid,
                    email,
                }))
            })
            .map_err(|e| TodoError::Auth(format!("{e:#}")))?;
        match found {
            Some(session) => {
                log::info!("signed in as {}", session.email);
                Ok(session)
            }
            None => Err(TodoError::Auth("invalid email or password".into())),
        }
    }

    fn create_user(&self, email: &str, password: &str) -> Result<Session> {
        let (email, password) = validate_credentials(email, password)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(TodoError::Registration(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let session = self
            .with_conn(|conn| {
                let taken: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM users WHERE email = ?1",
                    [email],
                    |row| row.get(0),
                )?;
                if taken > 0 {
                    anyhow::bail!("an account for '{email}' already exists");
                }
                let uid = uuid::Uuid::new_v4().simple().to_string();
                let salt = uuid::Uuid::new_v4().simple().to_string();
                conn.execute(
                    "INSERT INTO users (uid, email, salt, password_hash) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![uid, email, salt, hash_password(&salt, password)],
                )?;
                remember(conn, &uid)?;
                Ok(Session {
                    user_id: uid,
                    email: email.to_string(),
                })
            })
            .map_err(|e| TodoError::Registration(format!("{e:#}")))?;
        log::info!("registered {}", session.email);
        Ok(session)
    }

    fn sign_out(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM auth_session", [])?;
            Ok(())
        })
        .map_err(|e| TodoError::Auth(format!("{e:#}")))
    }
}
