use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use accounts_common::{normalize_email, NewUser, User};

use super::{SessionRecord, SessionStore, StoreError, UserRepository};

const USER_COLUMNS: &str = "id, email, username, first_name, last_name, password, \
    is_staff, is_superuser, is_active, date_joined, last_login";

/// SQLite-backed user and session store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(database_url: &str) -> Result<Self, StoreError> {
        // Parse sqlite: prefix if present
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

        let conn = if path == ":memory:" {
            Connection::open_in_memory().map_err(db_err)?
        } else {
            // Create parent directories if needed
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::IoError(e.to_string()))?;
            }
            Connection::open(path).map_err(db_err)?
        };

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL,
                first_name TEXT NOT NULL DEFAULT '',
                last_name TEXT NOT NULL DEFAULT '',
                password TEXT NOT NULL,
                is_staff INTEGER NOT NULL DEFAULT 0,
                is_superuser INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                date_joined TEXT NOT NULL,
                last_login TEXT
            )",
            [],
        )
        .map_err(db_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_key TEXT PRIMARY KEY,
                session_data TEXT NOT NULL,
                expire_date TEXT NOT NULL
            )",
            [],
        )
        .map_err(db_err)?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_expire_date ON sessions(expire_date)",
            [],
        )
        .map_err(db_err)?;

        tracing::info!("Account store initialized with database: {}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))
    }
}

impl UserRepository for SqliteStore {
    fn find_by_email(&self, email: &str) -> Result<Vec<User>, StoreError> {
        let Some(email) = normalize_email(email) else {
            return Ok(vec![]);
        };
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS))
            .map_err(db_err)?;
        let users = stmt
            .query_map(params![email], row_to_user)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(users)
    }

    fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            row_to_user,
        )
        .optional()
        .map_err(db_err)
    }

    fn create(&self, new_user: &NewUser) -> Result<User, StoreError> {
        let conn = self.lock()?;
        // Stored with microsecond precision; keep the returned value identical.
        let now = Utc::now().trunc_subsecs(6);

        conn.execute(
            "INSERT INTO users (email, username, first_name, last_name, password, is_staff, is_superuser, is_active, date_joined)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
            params![
                new_user.email,
                new_user.username,
                new_user.first_name,
                new_user.last_name,
                new_user.password,
                new_user.is_staff,
                new_user.is_superuser,
                fmt_timestamp(now),
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref err, _) if err.code == ErrorCode::ConstraintViolation => {
                StoreError::Conflict(format!("A user with email {} already exists", new_user.email))
            }
            other => db_err(other),
        })?;

        let id = conn.last_insert_rowid();
        tracing::info!("Created new user: {} ({})", id, new_user.email);

        Ok(User {
            id,
            email: new_user.email.clone(),
            username: new_user.username.clone(),
            first_name: new_user.first_name.clone(),
            last_name: new_user.last_name.clone(),
            password: new_user.password.clone(),
            is_staff: new_user.is_staff,
            is_superuser: new_user.is_superuser,
            is_active: true,
            date_joined: now,
            last_login: None,
        })
    }

    fn update(&self, user: &User) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE users SET username = ?1, first_name = ?2, last_name = ?3, password = ?4,
                 is_staff = ?5, is_superuser = ?6, is_active = ?7, last_login = ?8 WHERE id = ?9",
                params![
                    user.username,
                    user.first_name,
                    user.last_name,
                    user.password,
                    user.is_staff,
                    user.is_superuser,
                    user.is_active,
                    user.last_login.map(fmt_timestamp),
                    user.id,
                ],
            )
            .map_err(db_err)?;

        if changed == 0 {
            return Err(StoreError::UserNotFound(user.id));
        }
        Ok(())
    }
}

impl SessionStore for SqliteStore {
    fn load(&self, session_key: &str) -> Result<Option<SessionRecord>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT session_key, session_data, expire_date FROM sessions WHERE session_key = ?1",
            params![session_key],
            row_to_session,
        )
        .optional()
        .map_err(db_err)
    }

    fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sessions (session_key, session_data, expire_date) VALUES (?1, ?2, ?3)
             ON CONFLICT(session_key) DO UPDATE SET session_data = excluded.session_data,
             expire_date = excluded.expire_date",
            params![
                record.session_key,
                record.session_data,
                fmt_timestamp(record.expire_date),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn delete(&self, session_key: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let removed = conn
            .execute("DELETE FROM sessions WHERE session_key = ?1", params![session_key])
            .map_err(db_err)?;
        Ok(removed > 0)
    }

    fn all(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT session_key, session_data, expire_date FROM sessions ORDER BY expire_date DESC")
            .map_err(db_err)?;
        let sessions = stmt
            .query_map([], row_to_session)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(sessions)
    }

    fn clear_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        // Fixed-width UTC timestamps compare chronologically as text.
        let conn = self.lock()?;
        let removed = conn
            .execute("DELETE FROM sessions WHERE expire_date < ?1", params![fmt_timestamp(now)])
            .map_err(db_err)?;
        if removed > 0 {
            tracing::debug!("Cleared {} expired sessions", removed);
        }
        Ok(removed)
    }
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::DatabaseError(e.to_string())
}

fn fmt_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let date_joined: String = row.get(9)?;
    let last_login: Option<String> = row.get(10)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        password: row.get(5)?,
        is_staff: row.get(6)?,
        is_superuser: row.get(7)?,
        is_active: row.get(8)?,
        date_joined: parse_timestamp(9, &date_joined)?,
        last_login: last_login.map(|v| parse_timestamp(10, &v)).transpose()?,
    })
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let expire_date: String = row.get(2)?;
    Ok(SessionRecord {
        session_key: row.get(0)?,
        session_data: row.get(1)?,
        expire_date: parse_timestamp(2, &expire_date)?,
    })
}
