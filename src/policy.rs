//! Identity and ownership checks shared by every todo operation.
//!
//! Order matters: presence of a caller is checked before anything else, and
//! a record's existence is confirmed before its owner is compared.

use crate::error::AppError;
use crate::models::Todo;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Update,
    Delete,
}

impl Action {
    fn denied(self) -> &'static str {
        match self {
            Action::Update => "Cannot update another user's todo.",
            Action::Delete => "Cannot delete another user's todo.",
        }
    }
}

/// Returns the caller subject, or `Unauthenticated` when there is none.
pub fn require_caller(caller: Option<&str>) -> Result<&str, AppError> {
    caller.ok_or(AppError::Unauthenticated)
}

/// Resolves a looked-up record against the caller: `NotFound` if it does
/// not exist, `PermissionDenied` if someone else owns it.
pub fn authorize(todo: Option<Todo>, subject: &str, action: Action) -> Result<Todo, AppError> {
    let todo = todo.ok_or(AppError::NotFound("Todo not found."))?;
    if todo.user_id != subject {
        tracing::warn!(id = %todo.id, ?action, "ownership check failed");
        return Err(AppError::PermissionDenied(action.denied()));
    }
    Ok(todo)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn todo_owned_by(user_id: &str) -> Todo {
        Todo {
            id: "abc".to_string(),
            user_id: user_id.to_string(),
            task: "t".to_string(),
            completed: false,
            created_at: 0,
            completed_at: None,
        }
    }

    #[test]
    fn missing_caller_is_unauthenticated() {
        assert_eq!(require_caller(None), Err(AppError::Unauthenticated));
        assert_eq!(require_caller(Some("alice")), Ok("alice"));
    }

    #[test]
    fn existence_is_checked_before_ownership() {
        assert_eq!(
            authorize(None, "alice", Action::Update).unwrap_err().status(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn owner_mismatch_is_denied() {
        let err = authorize(Some(todo_owned_by("bob")), "alice", Action::Delete).unwrap_err();
        assert_eq!(
            err,
            AppError::PermissionDenied("Cannot delete another user's todo.")
        );
    }

    #[test]
    fn owner_is_allowed() {
        let todo = authorize(Some(todo_owned_by("alice")), "alice", Action::Update).unwrap();
        assert_eq!(todo.user_id, "alice");
    }
}
