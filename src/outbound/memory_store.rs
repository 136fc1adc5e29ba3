//! In-memory users repository.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::ports::{StoreError, UsersRepository};
use crate::domain::user::User;

/// Thread-safe users table keyed by id.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: DashMap<Uuid, User>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UsersRepository for MemoryUserStore {
    async fn create(&self, user: &User) -> Result<(), StoreError> {
        if let Entry::Vacant(slot) = self.users.entry(user.id) {
            slot.insert(user.clone());
        }
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, StoreError> {
        self.users
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let mut stored = self.users.get_mut(&user.id).ok_or(StoreError::NotFound)?;
        stored.name = user.name.clone();
        stored.updated_at = user.updated_at;
        Ok(())
    }
}
