use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::models::User;

/// Errors from UserStore
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found: {0}")]
    NotFound(String),

    #[error("internal store error: {0}")]
    Internal(String),
}

/// Process-wide in-memory user table keyed by id.
///
/// Reads share the lock, insert/update/delete hold it exclusively, so every
/// operation observes and leaves the map in a consistent state.
#[derive(Clone, Default)]
pub struct UserStore {
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl UserStore {
    pub const SEED_FIRST_NAME: &'static str = "First User";
    pub const SEED_LAST_NAME: &'static str = "Admin";
    pub const SEED_BIOGRAPHY: &'static str = "This is the owner of the project!";

    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding exactly one admin record with a fresh id
    pub fn seeded() -> Self {
        let seed = User::new(
            Uuid::new_v4().to_string(),
            Self::SEED_FIRST_NAME,
            Self::SEED_LAST_NAME,
            Self::SEED_BIOGRAPHY,
        );
        info!(id = %seed.id, "seeded admin user");

        let mut users = HashMap::new();
        users.insert(seed.id.clone(), seed);

        Self {
            users: Arc::new(RwLock::new(users)),
        }
    }

    /// Every stored user, in no particular order
    pub async fn find_all(&self) -> Vec<User> {
        self.users.read().await.values().cloned().collect()
    }

    pub async fn find_by_id(&self, id: &str) -> Result<User, StoreError> {
        self.users
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub async fn insert(
        &self,
        first_name: &str,
        last_name: &str,
        biography: &str,
    ) -> Result<User, StoreError> {
        let id = Uuid::new_v4().to_string();
        let user = User::new(id, first_name, last_name, biography);

        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(StoreError::Internal(format!(
                "generated id {} is already in use",
                user.id
            )));
        }
        users.insert(user.id.clone(), user.clone());
        debug!(id = %user.id, "inserted user");

        Ok(user)
    }

    /// Replaces every field of an existing user; the id is kept.
    pub async fn update(
        &self,
        id: &str,
        first_name: &str,
        last_name: &str,
        biography: &str,
    ) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        let slot = users
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        *slot = User::new(id, first_name, last_name, biography);
        debug!(id, "updated user");

        Ok(slot.clone())
    }

    /// Removes a user and returns what was stored
    pub async fn delete(&self, id: &str) -> Result<User, StoreError> {
        let removed = self
            .users
            .write()
            .await
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        debug!(id, "deleted user");

        Ok(removed)
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}
