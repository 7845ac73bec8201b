use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{
        CreateTodoRequest, ListTodosQuery, TodoListResponse, TodoMessageResponse, TodoResponse,
        UpdateTodoRequest,
    },
    services,
};
use crate::{
    auth::{dto::MessageResponse, extractors::Principal},
    error::AppError,
    state::AppState,
};

pub fn todo_routes() -> Router<AppState> {
    Router::new()
        .route("/todos", get(list_todos).post(create_todo))
        .route(
            "/todos/:id",
            get(get_todo).put(update_todo).delete(delete_todo),
        )
}

#[instrument(skip(state, principal), fields(user_id = %principal.id()))]
pub async fn list_todos(
    State(state): State<AppState>,
    principal: Principal,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<TodoListResponse>, AppError> {
    let Query(pairs) = query?;
    let page = services::list_todos(&state, &principal, ListTodosQuery::from_pairs(pairs)).await?;
    Ok(Json(page))
}

#[instrument(skip(state, principal, payload), fields(user_id = %principal.id()))]
pub async fn create_todo(
    State(state): State<AppState>,
    principal: Principal,
    payload: Result<Json<CreateTodoRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TodoMessageResponse>), AppError> {
    let Json(payload) = payload?;
    let todo = services::create_todo(&state, &principal, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(TodoMessageResponse {
            message: "Todo created successfully",
            todo,
        }),
    ))
}

#[instrument(skip(state, principal), fields(user_id = %principal.id()))]
pub async fn get_todo(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<TodoResponse>, AppError> {
    let todo = services::get_todo(&state, &principal, &id).await?;
    Ok(Json(TodoResponse { todo }))
}

#[instrument(skip(state, principal, payload), fields(user_id = %principal.id()))]
pub async fn update_todo(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTodoRequest>, JsonRejection>,
) -> Result<Json<TodoMessageResponse>, AppError> {
    let Json(payload) = payload?;
    let todo = services::update_todo(&state, &principal, &id, payload).await?;
    Ok(Json(TodoMessageResponse {
        message: "Todo updated successfully",
        todo,
    }))
}

#[instrument(skip(state, principal), fields(user_id = %principal.id()))]
pub async fn delete_todo(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    services::delete_todo(&state, &principal, &id).await?;
    Ok(Json(MessageResponse {
        message: "Todo deleted successfully",
    }))
}
