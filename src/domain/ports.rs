//! Ports to external collaborators.
//!
//! # Responsibilities
//! - Persistent store for users (create/read/update by id)
//! - Key-value cache with per-key TTL
//!
//! # Design Decisions
//! - Async traits so adapters can be network-backed
//! - Cache values are opaque bytes; JSON helpers sit on top

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::user::User;

/// Store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UsersRepository: Send + Sync {
    /// Insert `user`; an existing id is left untouched.
    async fn create(&self, user: &User) -> Result<(), StoreError>;

    async fn get_by_id(&self, id: Uuid) -> Result<User, StoreError>;

    /// Set the mutable fields of the user with `user.id`.
    async fn update(&self, user: &User) -> Result<(), StoreError>;
}

/// Cache failures.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache key {0} does not exist")]
    KeyNotFound(String),
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
}

/// Read and decode a JSON value.
pub async fn get_json<T>(cache: &dyn Cache, key: &str) -> Result<T, CacheError>
where
    T: DeserializeOwned,
{
    let bytes = cache.get(key).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Encode a value as JSON and store it.
pub async fn set_json<T>(cache: &dyn Cache, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
where
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(value)?;
    cache.set(key, bytes, ttl).await
}
