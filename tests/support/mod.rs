#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rowcache::application::{
    CacheAside, EntityDescriptor, EntitySchema, ListQuery, RepoError, Repository,
};
use rowcache::cache::{CacheConfig, CacheError, CacheStore, MemoryCache};
use rowcache::domain::{FieldMap, FilterSet, Value};
use rowcache::infra::memory::MemoryRepository;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub bio: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct UserCreate {
    pub email: String,
    pub name: String,
    pub bio: Option<String>,
}

impl UserCreate {
    pub fn new(email: &str, name: &str) -> Self {
        Self {
            email: email.to_string(),
            name: name.to_string(),
            bio: None,
        }
    }

    pub fn bio(mut self, bio: &str) -> Self {
        self.bio = Some(bio.to_string());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub bio: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub struct UserSchema;

impl EntitySchema for UserSchema {
    type Record = User;
    type Create = UserCreate;
    type Update = UserUpdate;
    type Response = UserResponse;

    const NAME: &'static str = "user";
    const FIELDS: &'static [&'static str] = &[
        "id",
        "email",
        "name",
        "bio",
        "is_active",
        "created_at",
        "updated_at",
    ];
    const DEFAULT_ORDER_BY: &'static str = "id";

    fn insert_values(input: &UserCreate) -> FieldMap {
        FieldMap::new()
            .with("email", input.email.as_str())
            .with("name", input.name.as_str())
            .with("bio", input.bio.as_deref())
    }

    fn update_values(input: &UserUpdate) -> FieldMap {
        let mut values = FieldMap::new();
        if let Some(email) = input.email.as_deref() {
            values.insert("email", email);
        }
        if let Some(name) = input.name.as_deref() {
            values.insert("name", name);
        }
        if let Some(bio) = input.bio.as_deref() {
            values.insert("bio", bio);
        }
        if let Some(active) = input.is_active {
            values.insert("is_active", active);
        }
        values
    }

    fn to_response(record: &User) -> UserResponse {
        UserResponse {
            id: record.id,
            email: record.email.clone(),
            name: record.name.clone(),
            bio: record.bio.clone(),
            is_active: record.is_active,
            created_at: record.created_at,
        }
    }
}

pub fn user_descriptor() -> EntityDescriptor {
    EntityDescriptor::builder(
        "user:email:{email}",
        "user:list:{order_by}:{direction}:{limit}:{page}",
    )
    .invalidate_prefix("user:list:")
    .default_ttl_from(&CacheConfig::default())
    .build()
    .expect("valid user descriptor")
}

pub fn users_engine() -> CacheAside<UserSchema> {
    CacheAside::new(user_descriptor())
}

pub fn by_email(email: &str) -> FilterSet {
    FilterSet::new().with("email", email)
}

/// In-memory `users` table that fills the columns Postgres would default.
pub fn memory_users() -> MemoryRepository<User> {
    MemoryRepository::new("users")
        .unique("email")
        .touch_column("updated_at")
        .with_defaults(|row| {
            let now = OffsetDateTime::now_utc();
            if !row.contains("bio") {
                row.insert("bio", Value::Null);
            }
            if !row.contains("is_active") {
                row.insert("is_active", true);
            }
            if !row.contains("created_at") {
                row.insert("created_at", now);
            }
            if !row.contains("updated_at") {
                row.insert("updated_at", now);
            }
        })
}

/// Records every call before delegating to the wrapped repository.
pub struct SpyRepository<R> {
    inner: MemoryRepository<R>,
    calls: Mutex<Vec<&'static str>>,
}

impl<R> SpyRepository<R> {
    pub fn new(inner: MemoryRepository<R>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|call| **call == op).count()
    }

    pub fn reset(&self) {
        self.calls.lock().expect("calls lock").clear();
    }

    pub fn inner(&self) -> &MemoryRepository<R> {
        &self.inner
    }

    fn record(&self, op: &'static str) {
        self.calls.lock().expect("calls lock").push(op);
    }
}

#[async_trait]
impl<R> Repository<R> for SpyRepository<R>
where
    R: serde::de::DeserializeOwned + Send + 'static,
{
    async fn insert(&self, values: FieldMap) -> Result<R, RepoError> {
        self.record("insert");
        self.inner.insert(values).await
    }

    async fn insert_many(&self, rows: Vec<FieldMap>) -> Result<Vec<R>, RepoError> {
        self.record("insert_many");
        self.inner.insert_many(rows).await
    }

    async fn find_one(&self, filters: &FilterSet) -> Result<R, RepoError> {
        self.record("find_one");
        self.inner.find_one(filters).await
    }

    async fn find_many(
        &self,
        filters: &FilterSet,
        query: &ListQuery,
    ) -> Result<Vec<R>, RepoError> {
        self.record("find_many");
        self.inner.find_many(filters, query).await
    }

    async fn update(&self, filters: &FilterSet, values: FieldMap) -> Result<R, RepoError> {
        self.record("update");
        self.inner.update(filters, values).await
    }

    async fn delete(&self, filters: &FilterSet) -> Result<u64, RepoError> {
        self.record("delete");
        self.inner.delete(filters).await
    }

    async fn count(&self, filters: &FilterSet) -> Result<u64, RepoError> {
        self.record("count");
        self.inner.count(filters).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheCall {
    Get(String),
    Set(String),
    Delete(String),
    DeleteMatching(String),
}

/// Records every call before delegating to a [`MemoryCache`].
#[derive(Default)]
pub struct SpyCache {
    inner: MemoryCache,
    calls: Mutex<Vec<CacheCall>>,
    ttls: Mutex<Vec<(String, Duration)>>,
}

impl SpyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<CacheCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Expirations passed to `set`, in call order.
    pub fn ttls(&self) -> Vec<(String, Duration)> {
        self.ttls.lock().expect("ttls lock").clone()
    }

    pub fn reset(&self) {
        self.calls.lock().expect("calls lock").clear();
    }

    pub fn inner(&self) -> &MemoryCache {
        &self.inner
    }

    fn record(&self, call: CacheCall) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

#[async_trait]
impl CacheStore for SpyCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        self.record(CacheCall::Get(key.to_string()));
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.record(CacheCall::Set(key.to_string()));
        self.ttls
            .lock()
            .expect("ttls lock")
            .push((key.to_string(), ttl));
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.record(CacheCall::Delete(key.to_string()));
        self.inner.delete(key).await
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        self.record(CacheCall::DeleteMatching(pattern.to_string()));
        self.inner.delete_matching(pattern).await
    }
}

/// A cache whose every operation fails.
#[derive(Default, Clone)]
pub struct FailingCache {
    attempts: Arc<Mutex<usize>>,
}

impl FailingCache {
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().expect("attempts lock")
    }

    fn fail<T>(&self) -> Result<T, CacheError> {
        *self.attempts.lock().expect("attempts lock") += 1;
        Err(CacheError::unavailable("connection refused"))
    }
}

#[async_trait]
impl CacheStore for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
        self.fail()
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), CacheError> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        self.fail()
    }

    async fn delete_matching(&self, _pattern: &str) -> Result<u64, CacheError> {
        self.fail()
    }
}
