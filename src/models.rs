use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored todo. Timestamps are epoch milliseconds from the store's clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub user_id: String,
    pub task: String,
    pub completed: bool,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// Caller-controlled fields of an update. Server-derived fields
/// (`completed_at`, `created_at`, ownership) have no place here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodoChanges {
    pub task: Option<String>,
    pub completed: Option<bool>,
}

impl TodoChanges {
    pub fn is_empty(&self) -> bool {
        self.task.is_none() && self.completed.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct TodoList {
    pub todos: Vec<Todo>,
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub message: String,
}

/// Request envelope of a callable operation.
#[derive(Debug, Default, Deserialize)]
pub struct CallableRequest {
    #[serde(default)]
    pub data: Value,
}

/// Success envelope of a callable operation.
#[derive(Debug, Serialize)]
pub struct CallableResponse<T> {
    pub result: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub created_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiToken {
    pub id: i64,
    pub user_id: String,
    pub token: String,
    pub name: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApiToken {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}
