use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, ErrorCode, OptionalExtension, Result, Row, ToSql};

use crate::auth::generate_id;
use crate::error::AppError;
use crate::models::{ApiToken, Session, Todo, TodoChanges, User};

pub type DbPool = Arc<Mutex<Connection>>;

// Timestamps are assigned by SQLite, in epoch milliseconds.
const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        created_at INTEGER DEFAULT (CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER))
    );

    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at INTEGER DEFAULT (CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)),
        expires_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS api_tokens (
        id INTEGER PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        token TEXT UNIQUE NOT NULL,
        name TEXT,
        created_at INTEGER DEFAULT (CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER))
    );

    CREATE TABLE IF NOT EXISTS todos (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        task TEXT NOT NULL,
        completed INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL DEFAULT (CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)),
        completed_at INTEGER
    );

    CREATE INDEX IF NOT EXISTS todos_by_owner ON todos (user_id, created_at DESC);
";

const NOW_MILLIS: &str = "CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)";

const TODO_COLUMNS: &str = "id, user_id, task, completed, created_at, completed_at";

pub fn init_db(path: &str) -> Result<DbPool> {
    setup(Connection::open(path)?)
}

pub fn init_memory_db() -> Result<DbPool> {
    setup(Connection::open_in_memory()?)
}

fn setup(conn: Connection) -> Result<DbPool> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn lock(pool: &DbPool) -> Result<MutexGuard<'_, Connection>, AppError> {
    pool.lock()
        .map_err(|_| AppError::Internal("database lock poisoned".to_string()))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

// User operations
pub fn create_user(pool: &DbPool, username: &str, password_hash: &str) -> Result<User, AppError> {
    let conn = lock(pool)?;
    let id = generate_id();
    match conn.execute(
        "INSERT INTO users (id, username, password_hash) VALUES (?1, ?2, ?3)",
        (&id, username, password_hash),
    ) {
        Ok(_) => {}
        Err(e) if is_constraint_violation(&e) => {
            return Err(AppError::InvalidArgument(
                "username is already taken.".to_string(),
            ))
        }
        Err(e) => return Err(e.into()),
    }

    let user = conn.query_row(
        "SELECT id, username, password_hash, created_at FROM users WHERE id = ?1",
        [&id],
        user_from_row,
    )?;
    Ok(user)
}

pub fn get_user_by_username(pool: &DbPool, username: &str) -> Result<Option<User>, AppError> {
    let conn = lock(pool)?;
    let user = conn
        .query_row(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
            [username],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

fn user_from_row(row: &Row<'_>) -> Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: row.get(3)?,
    })
}

// Session operations
pub fn create_session(pool: &DbPool, session: &Session) -> Result<(), AppError> {
    let conn = lock(pool)?;
    conn.execute(
        "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        (
            &session.id,
            &session.user_id,
            session.created_at,
            session.expires_at,
        ),
    )?;
    Ok(())
}

pub fn get_session(pool: &DbPool, id: &str) -> Result<Option<Session>, AppError> {
    let conn = lock(pool)?;
    let session = conn
        .query_row(
            "SELECT id, user_id, created_at, expires_at FROM sessions WHERE id = ?1",
            [id],
            |row| {
                Ok(Session {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    created_at: row.get(2)?,
                    expires_at: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(session)
}

pub fn delete_session(pool: &DbPool, id: &str) -> Result<(), AppError> {
    let conn = lock(pool)?;
    conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
    Ok(())
}

pub fn cleanup_expired_sessions(pool: &DbPool, now: i64) -> Result<usize, AppError> {
    let conn = lock(pool)?;
    let removed = conn.execute("DELETE FROM sessions WHERE expires_at < ?1", [now])?;
    Ok(removed)
}

// API Token operations
pub fn create_api_token(
    pool: &DbPool,
    user_id: &str,
    token: &str,
    name: Option<&str>,
) -> Result<ApiToken, AppError> {
    let conn = lock(pool)?;
    conn.execute(
        "INSERT INTO api_tokens (user_id, token, name) VALUES (?1, ?2, ?3)",
        (user_id, token, name),
    )?;
    let id = conn.last_insert_rowid();

    let token = conn.query_row(
        "SELECT id, user_id, token, name, created_at FROM api_tokens WHERE id = ?1",
        [id],
        api_token_from_row,
    )?;
    Ok(token)
}

pub fn get_api_token_by_value(pool: &DbPool, token: &str) -> Result<Option<ApiToken>, AppError> {
    let conn = lock(pool)?;
    let token = conn
        .query_row(
            "SELECT id, user_id, token, name, created_at FROM api_tokens WHERE token = ?1",
            [token],
            api_token_from_row,
        )
        .optional()?;
    Ok(token)
}

pub fn list_api_tokens(pool: &DbPool, user_id: &str) -> Result<Vec<ApiToken>, AppError> {
    let conn = lock(pool)?;
    let mut stmt = conn.prepare(
        "SELECT id, user_id, token, name, created_at FROM api_tokens
         WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
    )?;
    let tokens = stmt
        .query_map([user_id], api_token_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tokens)
}

pub fn delete_api_token(pool: &DbPool, user_id: &str, id: i64) -> Result<bool, AppError> {
    let conn = lock(pool)?;
    let rows = conn.execute(
        "DELETE FROM api_tokens WHERE id = ?1 AND user_id = ?2",
        (id, user_id),
    )?;
    Ok(rows > 0)
}

fn api_token_from_row(row: &Row<'_>) -> Result<ApiToken> {
    Ok(ApiToken {
        id: row.get(0)?,
        user_id: row.get(1)?,
        token: row.get(2)?,
        name: row.get(3)?,
        created_at: row.get(4)?,
    })
}

// Todo operations
pub fn create_todo(pool: &DbPool, user_id: &str, task: &str) -> Result<Todo, AppError> {
    let conn = lock(pool)?;
    let id = generate_id();
    conn.execute(
        "INSERT INTO todos (id, user_id, task) VALUES (?1, ?2, ?3)",
        (&id, user_id, task),
    )?;

    let todo = conn.query_row(
        &format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1"),
        [&id],
        todo_from_row,
    )?;
    Ok(todo)
}

/// Newest first. Equal timestamps fall back to reverse insertion order.
pub fn list_todos(pool: &DbPool, user_id: &str) -> Result<Vec<Todo>, AppError> {
    let conn = lock(pool)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {TODO_COLUMNS} FROM todos WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
    ))?;
    let todos = stmt
        .query_map([user_id], todo_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(todos)
}

pub fn get_todo(pool: &DbPool, id: &str) -> Result<Option<Todo>, AppError> {
    let conn = lock(pool)?;
    let todo = conn
        .query_row(
            &format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1"),
            [id],
            todo_from_row,
        )
        .optional()?;
    Ok(todo)
}

/// Applies `changes` in place. `completed_at` follows `completed` and is
/// stamped with the store's clock. An empty change set writes nothing.
pub fn update_todo(pool: &DbPool, id: &str, changes: &TodoChanges) -> Result<(), AppError> {
    if changes.is_empty() {
        return Ok(());
    }

    let mut updates = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(task) = &changes.task {
        updates.push("task = ?".to_string());
        params.push(Box::new(task.clone()));
    }
    if let Some(completed) = changes.completed {
        updates.push("completed = ?".to_string());
        params.push(Box::new(completed));
        if completed {
            updates.push(format!("completed_at = {NOW_MILLIS}"));
        } else {
            updates.push("completed_at = NULL".to_string());
        }
    }

    params.push(Box::new(id.to_string()));
    let query = format!("UPDATE todos SET {} WHERE id = ?", updates.join(", "));

    let conn = lock(pool)?;
    let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    conn.execute(&query, params_refs.as_slice())?;
    Ok(())
}

pub fn delete_todo(pool: &DbPool, id: &str) -> Result<bool, AppError> {
    let conn = lock(pool)?;
    let rows = conn.execute("DELETE FROM todos WHERE id = ?1", [id])?;
    Ok(rows > 0)
}

fn todo_from_row(row: &Row<'_>) -> Result<Todo> {
    Ok(Todo {
        id: row.get(0)?,
        user_id: row.get(1)?,
        task: row.get(2)?,
        completed: row.get(3)?,
        created_at: row.get(4)?,
        completed_at: row.get(5)?,
    })
}
