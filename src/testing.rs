//! In-memory stand-ins for the database and object storage, plus helpers for
//! driving the router in tests.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use axum::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::Value;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    app::build_app,
    auth::{
        jwt::TokenCodec,
        repo::UserStore,
        repo_types::{NewUser, ProfileChanges, User},
    },
    config::{AppConfig, JwtConfig},
    db::StoreError,
    state::AppState,
    storage::{url_prefix, StorageClient},
    todos::{
        repo::TodoStore,
        repo_types::{NewTodo, Todo, TodoChanges, TodoFilter, TodoPage},
    },
};

pub fn sample_user(email: &str) -> User {
    let now = OffsetDateTime::now_utc();
    User {
        id: Uuid::new_v4(),
        email: email.into(),
        password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into(),
        name: "Sample".into(),
        bio: String::new(),
        profile_image: None,
        created_at: now,
        updated_at: now,
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    pub fn remove(&self, id: Uuid) {
        self.users.lock().unwrap().retain(|u| u.id != id);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == new.email) {
            return Err(StoreError::Duplicate);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            name: new.name,
            bio: String::new(),
            profile_image: None,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> anyhow::Result<Option<User>> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(bio) = changes.bio {
            user.bio = bio;
        }
        if let Some(image) = changes.profile_image {
            user.profile_image = Some(image);
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }
}

/// Rows carry an insertion sequence so "newest first" is stable even when two
/// rows share a timestamp.
#[derive(Default)]
pub struct MemoryTodoStore {
    rows: Mutex<Vec<(u64, Todo)>>,
}

#[async_trait]
impl TodoStore for MemoryTodoStore {
    async fn create(&self, owner_id: Uuid, new: NewTodo) -> anyhow::Result<Todo> {
        let mut rows = self.rows.lock().unwrap();
        let now = OffsetDateTime::now_utc();
        let todo = Todo {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            completed: false,
            priority: new.priority,
            category: new.category,
            due_date: new.due_date,
            user_id: owner_id,
            created_at: now,
            updated_at: now,
        };
        let seq = rows.len() as u64;
        rows.push((seq, todo.clone()));
        Ok(todo)
    }

    async fn find_owned(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<Option<Todo>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .map(|(_, t)| t)
            .find(|t| t.id == id && t.user_id == owner_id)
            .cloned())
    }

    async fn update_owned(
        &self,
        owner_id: Uuid,
        id: Uuid,
        changes: TodoChanges,
    ) -> anyhow::Result<Option<Todo>> {
        let mut rows = self.rows.lock().unwrap();
        let Some((_, todo)) = rows
            .iter_mut()
            .find(|(_, t)| t.id == id && t.user_id == owner_id)
        else {
            return Ok(None);
        };
        changes.apply_to(todo);
        todo.updated_at = OffsetDateTime::now_utc();
        Ok(Some(todo.clone()))
    }

    async fn delete_owned(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|(_, t)| !(t.id == id && t.user_id == owner_id));
        Ok(rows.len() < before)
    }

    async fn list(
        &self,
        owner_id: Uuid,
        filter: &TodoFilter,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<TodoPage> {
        let rows = self.rows.lock().unwrap();
        let mut matching: Vec<&(u64, Todo)> = rows
            .iter()
            .filter(|(_, t)| t.user_id == owner_id && filter.matches(t))
            .collect();
        matching.sort_by(|(sa, a), (sb, b)| b.created_at.cmp(&a.created_at).then(sb.cmp(sa)));
        let total = matching.len() as i64;
        let todos = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|(_, t)| t.clone())
            .collect();
        Ok(TodoPage { todos, total })
    }
}

pub struct FakeStorage {
    prefix: String,
    objects: Mutex<BTreeMap<String, Bytes>>,
}

impl Default for FakeStorage {
    fn default() -> Self {
        Self {
            prefix: url_prefix("https://fake.local", "avatars"),
            objects: Mutex::new(BTreeMap::new()),
        }
    }
}

impl FakeStorage {
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn put_object(&self, key: &str, body: Bytes, _ct: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.prefix).map(str::to_string)
    }
}

/// Handles to the in-memory backends behind an [`AppState::fakes`] state.
pub struct Fakes {
    pub users: Arc<MemoryUserStore>,
    pub todos: Arc<MemoryTodoStore>,
    pub storage: Arc<FakeStorage>,
}

pub fn fake_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".into(),
        jwt: JwtConfig {
            secret: "test-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
        },
        cookie_secure: false,
        minio_endpoint: "fake".into(),
        minio_bucket: "avatars".into(),
        minio_access_key: "fake".into(),
        minio_secret_key: "fake".into(),
        minio_region: "us-east-1".into(),
        minio_public_url: "https://fake.local".into(),
    }
}

impl AppState {
    pub fn fakes() -> (Self, Fakes) {
        let config = fake_config();
        let fakes = Fakes {
            users: Arc::new(MemoryUserStore::default()),
            todos: Arc::new(MemoryTodoStore::default()),
            storage: Arc::new(FakeStorage::default()),
        };
        let state = AppState {
            tokens: TokenCodec::new(&config.jwt).expect("test codec"),
            config: Arc::new(config),
            users: fakes.users.clone(),
            todos: fakes.todos.clone(),
            storage: fakes.storage.clone(),
        };
        (state, fakes)
    }

    pub fn fake() -> Self {
        Self::fakes().0
    }
}

// ---- HTTP helpers ----

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub fn test_app() -> (Router, AppState, Fakes) {
    let (state, fakes) = AppState::fakes();
    (build_app(state.clone()), state, fakes)
}

pub async fn send(app: &Router, req: Request<Body>) -> TestResponse {
    let res = app.clone().oneshot(req).await.expect("router is infallible");
    let status = res.status();
    let headers = res.headers().clone();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse {
        status,
        headers,
        body,
    }
}

pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Registers a user through the API and returns `(token, user_id)`.
pub async fn register_user(app: &Router, name: &str, email: &str) -> (String, String) {
    let res = send(
        app,
        json_request(
            Method::POST,
            "/api/auth/register",
            None,
            Some(serde_json::json!({ "name": name, "email": email, "password": "secret1" })),
        ),
    )
    .await;
    assert_eq!(res.status, StatusCode::CREATED, "register failed: {}", res.body);
    (
        res.body["token"].as_str().unwrap().to_string(),
        res.body["user"]["id"].as_str().unwrap().to_string(),
    )
}
