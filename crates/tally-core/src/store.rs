//! Credential storage seam
//!
//! The identity subsystem only ever talks to storage through
//! [`CredentialStore`]. Token validation and request authentication depend on
//! the narrower [`UserResolver`], which every store provides.

use crate::identity::Identity;
use crate::{Result, TallyError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Durable storage of identity records
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>>;

    async fn exists_by_username(&self, username: &str) -> Result<bool>;

    async fn exists_by_email(&self, email: &str) -> Result<bool>;

    /// Insert (when `id` is `None`) or replace a whole identity row
    ///
    /// A save is applied as a single unit: readers observe either the old row
    /// or the new one. Inserting a username or email that is already taken
    /// fails with [`TallyError::DuplicateKey`] naming the field.
    async fn save(&self, identity: Identity) -> Result<Identity>;

    /// Advance `last_login` of `username` to `at`, leaving every other field
    /// as currently stored
    ///
    /// Returns the updated identity, or `None` when no such user exists.
    async fn record_login(&self, username: &str, at: DateTime<Utc>) -> Result<Option<Identity>>;
}

/// Resolve a username to the current identity record
#[async_trait]
pub trait UserResolver: Send + Sync {
    async fn resolve(&self, username: &str) -> Result<Option<Identity>>;
}

#[async_trait]
impl<T> UserResolver for T
where
    T: CredentialStore + ?Sized,
{
    async fn resolve(&self, username: &str) -> Result<Option<Identity>> {
        self.find_by_username(username).await
    }
}

#[derive(Default)]
struct Rows {
    next_id: i64,
    by_id: HashMap<i64, Identity>,
}

impl Rows {
    fn find(&self, predicate: impl Fn(&Identity) -> bool) -> Option<&Identity> {
        self.by_id.values().find(|identity| predicate(*identity))
    }
}

/// Process-local credential store
///
/// Used when no database is configured and by the test suites.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    rows: RwLock<Rows>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored identities
    pub async fn len(&self) -> usize {
        self.rows.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove an identity by username, returning it if present
    pub async fn remove(&self, username: &str) -> Option<Identity> {
        let mut rows = self.rows.write().await;
        let id = rows.find(|i| i.username == username)?.id?;
        rows.by_id.remove(&id)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>> {
        let rows = self.rows.read().await;
        Ok(rows.find(|i| i.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let rows = self.rows.read().await;
        Ok(rows.find(|i| i.email == email).cloned())
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool> {
        Ok(self.find_by_username(username).await?.is_some())
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool> {
        Ok(self.find_by_email(email).await?.is_some())
    }

    async fn save(&self, mut identity: Identity) -> Result<Identity> {
        let mut rows = self.rows.write().await;

        let current = identity.id;
        let taken = |field: fn(&Identity) -> &str| {
            rows.by_id
                .values()
                .any(|other| other.id != current && field(other) == field(&identity))
        };
        if taken(|i| &i.username) {
            return Err(TallyError::DuplicateKey("username".to_string()));
        }
        if taken(|i| &i.email) {
            return Err(TallyError::DuplicateKey("email".to_string()));
        }

        let id = match identity.id {
            Some(id) if rows.by_id.contains_key(&id) => id,
            Some(id) => return Err(TallyError::NotFound(format!("identity {id}"))),
            None => {
                rows.next_id += 1;
                rows.next_id
            }
        };

        identity.id = Some(id);
        rows.by_id.insert(id, identity.clone());
        tracing::debug!(id, username = %identity.username, "identity saved");

        Ok(identity)
    }

    async fn record_login(&self, username: &str, at: DateTime<Utc>) -> Result<Option<Identity>> {
        let mut rows = self.rows.write().await;
        let Some(identity) = rows.by_id.values_mut().find(|i| i.username == username) else {
            return Ok(None);
        };

        identity.touch_last_login(at);
        Ok(Some(identity.clone()))
    }
}
