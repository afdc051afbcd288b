//! The four todo operations.
//!
//! Each takes the caller subject (if any) and the raw request payload and
//! performs at most two store round-trips on the todo collection.

use serde_json::Value;

use crate::db::{self, DbPool};
use crate::error::AppError;
use crate::models::{Todo, TodoChanges, TodoList};
use crate::policy::{authorize, require_caller, Action};
use crate::validate::{optional_bool, optional_string, required_string};

pub fn create(pool: &DbPool, caller: Option<&str>, data: &Value) -> Result<Todo, AppError> {
    let subject = require_caller(caller)?;
    let task = required_string(data, "task")?;
    db::create_todo(pool, subject, task)
}

pub fn list(pool: &DbPool, caller: Option<&str>) -> Result<TodoList, AppError> {
    let subject = require_caller(caller)?;
    let todos = db::list_todos(pool, subject)?;
    Ok(TodoList { todos })
}

pub fn update(pool: &DbPool, caller: Option<&str>, data: &Value) -> Result<Todo, AppError> {
    let subject = require_caller(caller)?;
    let id = required_string(data, "id")?;
    authorize(db::get_todo(pool, id)?, subject, Action::Update)?;

    let changes = TodoChanges {
        task: optional_string(data, "task").map(str::to_string),
        completed: optional_bool(data, "completed"),
    };
    db::update_todo(pool, id, &changes)?;

    // A concurrent delete can land between the write and this read.
    db::get_todo(pool, id)?.ok_or(AppError::NotFound("Todo not found."))
}

/// Returns the record as it was before removal.
pub fn delete(pool: &DbPool, caller: Option<&str>, data: &Value) -> Result<Todo, AppError> {
    let subject = require_caller(caller)?;
    let id = required_string(data, "id")?;
    let todo = authorize(db::get_todo(pool, id)?, subject, Action::Delete)?;

    if !db::delete_todo(pool, id)? {
        return Err(AppError::NotFound("Todo not found."));
    }
    Ok(todo)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn pool() -> DbPool {
        db::init_memory_db().unwrap()
    }

    fn count_rows(pool: &DbPool) -> i64 {
        pool.lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM todos", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn every_operation_requires_a_caller() {
        let pool = pool();
        let existing = create(&pool, Some("alice"), &json!({ "task": "a" })).unwrap();
        let by_id = json!({ "id": existing.id, "completed": true });

        assert_eq!(
            create(&pool, None, &json!({ "task": "b" })).unwrap_err(),
            AppError::Unauthenticated
        );
        assert_eq!(list(&pool, None).unwrap_err(), AppError::Unauthenticated);
        assert_eq!(
            update(&pool, None, &by_id).unwrap_err(),
            AppError::Unauthenticated
        );
        assert_eq!(
            delete(&pool, None, &by_id).unwrap_err(),
            AppError::Unauthenticated
        );

        // Identity is checked before payload shape.
        assert_eq!(
            create(&pool, None, &Value::Null).unwrap_err(),
            AppError::Unauthenticated
        );

        assert_eq!(count_rows(&pool), 1);
        let unchanged = db::get_todo(&pool, &existing.id).unwrap().unwrap();
        assert_eq!(unchanged, existing);
    }

    #[test]
    fn create_validates_task() {
        let pool = pool();
        for data in [
            json!({}),
            json!({ "task": "" }),
            json!({ "task": 7 }),
            json!({ "task": true }),
            Value::Null,
        ] {
            let err = create(&pool, Some("alice"), &data).unwrap_err();
            assert_eq!(err.status(), "INVALID_ARGUMENT", "payload {data}");
        }
        assert_eq!(count_rows(&pool), 0);
    }

    #[test]
    fn create_assigns_server_fields() {
        let pool = pool();
        let todo = create(&pool, Some("alice"), &json!({ "task": "buy milk" })).unwrap();
        assert_eq!(todo.user_id, "alice");
        assert_eq!(todo.task, "buy milk");
        assert!(!todo.completed);
        assert_eq!(todo.completed_at, None);
        assert!(todo.created_at > 0);
        assert_eq!(todo.id.len(), 20);
    }

    #[test]
    fn create_ignores_caller_supplied_server_fields() {
        let pool = pool();
        let todo = create(
            &pool,
            Some("alice"),
            &json!({
                "task": "x",
                "user_id": "mallory",
                "completed": true,
                "created_at": 1,
                "completed_at": 2
            }),
        )
        .unwrap();
        assert_eq!(todo.user_id, "alice");
        assert!(!todo.completed);
        assert_ne!(todo.created_at, 1);
        assert_eq!(todo.completed_at, None);
    }

    #[test]
    fn list_is_scoped_and_newest_first() {
        let pool = pool();
        let first = create(&pool, Some("alice"), &json!({ "task": "first" })).unwrap();
        create(&pool, Some("bob"), &json!({ "task": "bob's" })).unwrap();
        let second = create(&pool, Some("alice"), &json!({ "task": "second" })).unwrap();

        let alice = list(&pool, Some("alice")).unwrap().todos;
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].id, second.id);
        assert_eq!(alice[1].id, first.id);
        assert!(alice.iter().all(|t| t.user_id == "alice"));

        assert!(list(&pool, Some("carol")).unwrap().todos.is_empty());
    }

    #[test]
    fn list_orders_by_created_at() {
        let pool = pool();
        let older = create(&pool, Some("alice"), &json!({ "task": "older" })).unwrap();
        let newer = create(&pool, Some("alice"), &json!({ "task": "newer" })).unwrap();
        // Force timestamps apart in the opposite order of insertion.
        pool.lock()
            .unwrap()
            .execute(
                "UPDATE todos SET created_at = ?1 WHERE id = ?2",
                (1_000i64, &newer.id),
            )
            .unwrap();
        pool.lock()
            .unwrap()
            .execute(
                "UPDATE todos SET created_at = ?1 WHERE id = ?2",
                (2_000i64, &older.id),
            )
            .unwrap();

        let todos = list(&pool, Some("alice")).unwrap().todos;
        assert_eq!(todos[0].id, older.id);
        assert_eq!(todos[1].id, newer.id);
    }

    #[test]
    fn update_requires_id() {
        let pool = pool();
        for data in [json!({}), json!({ "id": "" }), json!({ "id": 12 })] {
            let err = update(&pool, Some("alice"), &data).unwrap_err();
            assert_eq!(err.status(), "INVALID_ARGUMENT");
        }
    }

    #[test]
    fn update_missing_is_not_found() {
        let pool = pool();
        let err = update(&pool, Some("alice"), &json!({ "id": "nope", "task": "x" })).unwrap_err();
        assert_eq!(err, AppError::NotFound("Todo not found."));
    }

    #[test]
    fn update_by_other_user_is_denied_and_leaves_record() {
        let pool = pool();
        let todo = create(&pool, Some("alice"), &json!({ "task": "mine" })).unwrap();
        let err = update(
            &pool,
            Some("bob"),
            &json!({ "id": todo.id, "task": "stolen", "completed": true }),
        )
        .unwrap_err();
        assert_eq!(err.status(), "PERMISSION_DENIED");
        assert_eq!(db::get_todo(&pool, &todo.id).unwrap().unwrap(), todo);
    }

    #[test]
    fn completion_stamps_and_clears_completed_at() {
        let pool = pool();
        let todo = create(&pool, Some("alice"), &json!({ "task": "walk dog" })).unwrap();

        let done = update(&pool, Some("alice"), &json!({ "id": todo.id, "completed": true })).unwrap();
        assert!(done.completed);
        assert!(done.completed_at.is_some());
        assert_eq!(done.task, "walk dog");

        let reopened =
            update(&pool, Some("alice"), &json!({ "id": todo.id, "completed": false })).unwrap();
        assert!(!reopened.completed);
        assert_eq!(reopened.completed_at, None);
        assert_eq!(reopened.task, "walk dog");
        assert_eq!(reopened.created_at, todo.created_at);
    }

    #[test]
    fn completed_at_is_not_taken_from_input() {
        let pool = pool();
        let todo = create(&pool, Some("alice"), &json!({ "task": "t" })).unwrap();
        let done = update(
            &pool,
            Some("alice"),
            &json!({ "id": todo.id, "completed": true, "completed_at": 5 }),
        )
        .unwrap();
        assert_ne!(done.completed_at, Some(5));
    }

    #[test]
    fn update_replaces_task_only_when_non_empty_string() {
        let pool = pool();
        let todo = create(&pool, Some("alice"), &json!({ "task": "old" })).unwrap();

        let same = update(&pool, Some("alice"), &json!({ "id": todo.id, "task": "" })).unwrap();
        assert_eq!(same.task, "old");
        let same = update(&pool, Some("alice"), &json!({ "id": todo.id, "task": 3 })).unwrap();
        assert_eq!(same.task, "old");

        let renamed = update(&pool, Some("alice"), &json!({ "id": todo.id, "task": "new" })).unwrap();
        assert_eq!(renamed.task, "new");
        assert!(!renamed.completed);
    }

    #[test]
    fn non_boolean_completed_is_ignored() {
        let pool = pool();
        let todo = create(&pool, Some("alice"), &json!({ "task": "t" })).unwrap();
        let same = update(&pool, Some("alice"), &json!({ "id": todo.id, "completed": "true" })).unwrap();
        assert!(!same.completed);
        assert_eq!(same.completed_at, None);
    }

    #[test]
    fn update_without_known_fields_is_a_no_op() {
        let pool = pool();
        let todo = create(&pool, Some("alice"), &json!({ "task": "t" })).unwrap();
        let same = update(&pool, Some("alice"), &json!({ "id": todo.id, "colour": "red" })).unwrap();
        assert_eq!(same, todo);
    }

    #[test]
    fn delete_rules() {
        let pool = pool();
        let todo = create(&pool, Some("alice"), &json!({ "task": "t" })).unwrap();
        let by_id = json!({ "id": todo.id });

        assert_eq!(
            delete(&pool, Some("alice"), &json!({ "id": "" })).unwrap_err().status(),
            "INVALID_ARGUMENT"
        );
        assert_eq!(
            delete(&pool, Some("alice"), &json!({ "id": "missing" })).unwrap_err(),
            AppError::NotFound("Todo not found.")
        );
        assert_eq!(
            delete(&pool, Some("bob"), &by_id).unwrap_err().status(),
            "PERMISSION_DENIED"
        );
        assert_eq!(count_rows(&pool), 1);

        let removed = delete(&pool, Some("alice"), &by_id).unwrap();
        assert_eq!(removed, todo);
        assert_eq!(db::get_todo(&pool, &todo.id).unwrap(), None);

        assert_eq!(
            delete(&pool, Some("alice"), &by_id).unwrap_err().status(),
            "NOT_FOUND"
        );
        assert_eq!(
            update(&pool, Some("alice"), &json!({ "id": todo.id, "completed": true }))
                .unwrap_err()
                .status(),
            "NOT_FOUND"
        );
    }
}
