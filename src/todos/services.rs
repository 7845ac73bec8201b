use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{CreateTodoRequest, ListTodosQuery, Pagination, TodoListResponse, UpdateTodoRequest},
    gate::{authorize_owner_access, Access},
    repo_types::{NewTodo, Priority, Todo, TodoChanges, TodoFilter},
};
use crate::{auth::extractors::Principal, error::AppError, state::AppState};

pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 500;
pub const MAX_CATEGORY_LEN: usize = 30;
pub const DEFAULT_CATEGORY: &str = "general";

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

fn not_found() -> AppError {
    AppError::NotFound("Todo not found".into())
}

// ---- field validation ----

fn clean_title(raw: &str) -> Result<String, AppError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(AppError::validation("Title is required"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::validation("Title cannot be more than 100 characters"));
    }
    Ok(title.to_string())
}

fn clean_description(raw: &str) -> Result<String, AppError> {
    let description = raw.trim();
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(AppError::validation(
            "Description cannot be more than 500 characters",
        ));
    }
    Ok(description.to_string())
}

fn parse_priority(raw: &str) -> Result<Priority, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::validation("Priority must be low, medium or high"))
}

fn clean_category(raw: &str) -> Result<String, AppError> {
    let category = raw.trim();
    if category.is_empty() {
        return Ok(DEFAULT_CATEGORY.to_string());
    }
    if category.chars().count() > MAX_CATEGORY_LEN {
        return Err(AppError::validation(
            "Category cannot be more than 30 characters",
        ));
    }
    Ok(category.to_string())
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
/// An empty string means "no due date".
fn parse_due_date(raw: &str) -> Result<Option<OffsetDateTime>, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(Some(ts));
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map(|d| Some(d.midnight().assume_utc()))
        .map_err(|_| AppError::validation("Due date must be a valid date"))
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.filter(|v| !v.trim().is_empty())
}

/// Validates a create request and fills in defaults.
pub fn new_todo_from(req: CreateTodoRequest) -> Result<NewTodo, AppError> {
    let title = clean_title(req.title.as_deref().unwrap_or_default())?;
    let description = match req.description.as_deref() {
        Some(d) => clean_description(d)?,
        None => String::new(),
    };
    let priority = match non_empty(req.priority) {
        Some(p) => parse_priority(&p)?,
        None => Priority::default(),
    };
    let category = clean_category(req.category.as_deref().unwrap_or_default())?;
    let due_date = match req.due_date.as_deref() {
        Some(d) => parse_due_date(d)?,
        None => None,
    };
    Ok(NewTodo {
        title,
        description,
        priority,
        category,
        due_date,
    })
}

/// Validates only the fields the client sent. Empty `priority`/`category`
/// strings are treated as not sent.
pub fn changes_from(req: UpdateTodoRequest) -> Result<TodoChanges, AppError> {
    Ok(TodoChanges {
        title: req.title.as_deref().map(clean_title).transpose()?,
        description: req.description.as_deref().map(clean_description).transpose()?,
        completed: req.completed,
        priority: non_empty(req.priority)
            .as_deref()
            .map(parse_priority)
            .transpose()?,
        category: non_empty(req.category)
            .as_deref()
            .map(clean_category)
            .transpose()?,
        due_date: match req.due_date {
            Some(Some(d)) => Some(parse_due_date(&d)?),
            Some(None) => Some(None),
            None => None,
        },
    })
}

// ---- listing ----

fn positive_or(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n >= 1)
        .unwrap_or(default)
}

/// Turns the raw query into a filter plus `(page, limit)`.
pub fn list_params(q: ListTodosQuery) -> (TodoFilter, i64, i64) {
    let page = positive_or(q.page.as_deref(), DEFAULT_PAGE);
    let limit = positive_or(q.limit.as_deref(), DEFAULT_LIMIT).min(MAX_LIMIT);
    let filter = TodoFilter {
        completed: non_empty(q.completed).map(|c| c.trim() == "true"),
        priority: non_empty(q.priority),
        category: non_empty(q.category),
    };
    (filter, page, limit)
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = (total + limit - 1) / limit;
        Self {
            current_page: page,
            total_pages,
            total_todos: total,
            has_next_page: page < total_pages,
            has_prev_page: page > 1,
        }
    }
}

// ---- operations ----

fn owned(principal: &Principal, todo: Todo) -> Result<Todo, AppError> {
    match authorize_owner_access(principal, todo.user_id) {
        Access::Allow => Ok(todo),
        Access::Deny => {
            warn!(user_id = %principal.id(), todo_id = %todo.id, "store returned a foreign todo");
            Err(not_found())
        }
    }
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| not_found())
}

pub async fn create_todo(
    state: &AppState,
    principal: &Principal,
    req: CreateTodoRequest,
) -> Result<Todo, AppError> {
    let new = new_todo_from(req)?;
    let todo = state.todos.create(principal.id(), new).await?;
    info!(user_id = %principal.id(), todo_id = %todo.id, priority = %todo.priority, "todo created");
    Ok(todo)
}

pub async fn get_todo(state: &AppState, principal: &Principal, id: &str) -> Result<Todo, AppError> {
    let id = parse_id(id)?;
    let todo = state
        .todos
        .find_owned(principal.id(), id)
        .await?
        .ok_or_else(not_found)?;
    owned(principal, todo)
}

pub async fn update_todo(
    state: &AppState,
    principal: &Principal,
    id: &str,
    req: UpdateTodoRequest,
) -> Result<Todo, AppError> {
    let id = parse_id(id)?;
    let changes = changes_from(req)?;
    let todo = state
        .todos
        .update_owned(principal.id(), id, changes)
        .await?
        .ok_or_else(not_found)?;
    info!(user_id = %principal.id(), todo_id = %todo.id, "todo updated");
    owned(principal, todo)
}

pub async fn delete_todo(state: &AppState, principal: &Principal, id: &str) -> Result<(), AppError> {
    let id = parse_id(id)?;
    if !state.todos.delete_owned(principal.id(), id).await? {
        return Err(not_found());
    }
    info!(user_id = %principal.id(), todo_id = %id, "todo deleted");
    Ok(())
}

pub async fn list_todos(
    state: &AppState,
    principal: &Principal,
    query: ListTodosQuery,
) -> Result<TodoListResponse, AppError> {
    let (filter, page, limit) = list_params(query);
    let offset = (page - 1).saturating_mul(limit);
    let result = state
        .todos
        .list(principal.id(), &filter, limit, offset)
        .await?;
    Ok(TodoListResponse {
        pagination: Pagination::new(page, limit, result.total),
        todos: result.todos,
    })
}
