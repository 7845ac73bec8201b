use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::todos::repo_types::{NewTodo, Todo, TodoChanges, TodoFilter, TodoPage};

/// Todo persistence. Every method takes the owner and filters on it inside the
/// same statement, so a foreign id behaves exactly like a missing one.
#[async_trait]
pub trait TodoStore: Send + Sync {
    async fn create(&self, owner_id: Uuid, new: NewTodo) -> anyhow::Result<Todo>;
    async fn find_owned(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<Option<Todo>>;
    async fn update_owned(
        &self,
        owner_id: Uuid,
        id: Uuid,
        changes: TodoChanges,
    ) -> anyhow::Result<Option<Todo>>;
    async fn delete_owned(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<bool>;
    async fn list(
        &self,
        owner_id: Uuid,
        filter: &TodoFilter,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<TodoPage>;
}

const TODO_COLUMNS: &str = "id, title, description, completed, priority, category, due_date, \
                            user_id, created_at, updated_at";

const FILTER_CLAUSE: &str = "user_id = $1 \
     AND ($2::boolean IS NULL OR completed = $2) \
     AND ($3::text IS NULL OR priority::text = $3) \
     AND ($4::text IS NULL OR category = $4)";

#[derive(Clone)]
pub struct PgTodoStore {
    db: PgPool,
}

impl PgTodoStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TodoStore for PgTodoStore {
    async fn create(&self, owner_id: Uuid, new: NewTodo) -> anyhow::Result<Todo> {
        let sql = format!(
            "INSERT INTO todos (id, user_id, title, description, priority, category, due_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {TODO_COLUMNS}"
        );
        let todo = sqlx::query_as::<_, Todo>(&sql)
            .bind(Uuid::new_v4())
            .bind(owner_id)
            .bind(new.title)
            .bind(new.description)
            .bind(new.priority)
            .bind(new.category)
            .bind(new.due_date)
            .fetch_one(&self.db)
            .await?;
        Ok(todo)
    }

    async fn find_owned(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<Option<Todo>> {
        let sql = format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = $1 AND user_id = $2");
        let todo = sqlx::query_as::<_, Todo>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(todo)
    }

    async fn update_owned(
        &self,
        owner_id: Uuid,
        id: Uuid,
        changes: TodoChanges,
    ) -> anyhow::Result<Option<Todo>> {
        let sql = format!(
            r#"
            UPDATE todos
               SET title = COALESCE($3, title),
                   description = COALESCE($4, description),
                   completed = COALESCE($5, completed),
                   priority = COALESCE($6, priority),
                   category = COALESCE($7, category),
                   due_date = CASE WHEN $8 THEN $9 ELSE due_date END,
                   updated_at = NOW()
             WHERE id = $1 AND user_id = $2
            RETURNING {TODO_COLUMNS}
            "#
        );
        let touch_due_date = changes.due_date.is_some();
        let todo = sqlx::query_as::<_, Todo>(&sql)
            .bind(id)
            .bind(owner_id)
            .bind(changes.title)
            .bind(changes.description)
            .bind(changes.completed)
            .bind(changes.priority)
            .bind(changes.category)
            .bind(touch_due_date)
            .bind(changes.due_date.flatten())
            .fetch_optional(&self.db)
            .await?;
        Ok(todo)
    }

    async fn delete_owned(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM todos WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list(
        &self,
        owner_id: Uuid,
        filter: &TodoFilter,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<TodoPage> {
        let sql = format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE {FILTER_CLAUSE} \
             ORDER BY created_at DESC, id DESC LIMIT $5 OFFSET $6"
        );
        let todos = sqlx::query_as::<_, Todo>(&sql)
            .bind(owner_id)
            .bind(filter.completed)
            .bind(filter.priority.as_deref())
            .bind(filter.category.as_deref())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM todos WHERE {FILTER_CLAUSE}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(owner_id)
            .bind(filter.completed)
            .bind(filter.priority.as_deref())
            .bind(filter.category.as_deref())
            .fetch_one(&self.db)
            .await?;

        Ok(TodoPage { todos, total })
    }
}
