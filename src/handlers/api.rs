use axum::{extract::State, Json};
use tracing::info;

use crate::error::AppError;
use crate::middleware::{CallableData, Identity};
use crate::models::{Ack, CallableResponse, Todo, TodoList};
use crate::service;
use crate::AppState;

pub async fn create_todo(
    identity: Identity,
    State(state): State<AppState>,
    CallableData(data): CallableData,
) -> Result<Json<CallableResponse<Todo>>, AppError> {
    let todo = service::create(&state.db, identity.subject(), &data)?;
    info!(id = %todo.id, user_id = %todo.user_id, "Created todo");
    Ok(Json(CallableResponse { result: todo }))
}

pub async fn list_todos(
    identity: Identity,
    State(state): State<AppState>,
    CallableData(_): CallableData,
) -> Result<Json<CallableResponse<TodoList>>, AppError> {
    let list = service::list(&state.db, identity.subject())?;
    info!(count = list.todos.len(), "Listed todos");
    Ok(Json(CallableResponse { result: list }))
}

pub async fn update_todo(
    identity: Identity,
    State(state): State<AppState>,
    CallableData(data): CallableData,
) -> Result<Json<CallableResponse<Todo>>, AppError> {
    let todo = service::update(&state.db, identity.subject(), &data)?;
    info!(id = %todo.id, completed = todo.completed, "Updated todo");
    Ok(Json(CallableResponse { result: todo }))
}

pub async fn delete_todo(
    identity: Identity,
    State(state): State<AppState>,
    CallableData(data): CallableData,
) -> Result<Json<CallableResponse<Ack>>, AppError> {
    let todo = service::delete(&state.db, identity.subject(), &data)?;
    info!(id = %todo.id, user_id = %todo.user_id, "Deleted todo");
    Ok(Json(CallableResponse {
        result: Ack {
            message: "Todo deleted successfully.".to_string(),
        },
    }))
}
