//! An in-memory implementation of `UserProvider`.

use std::{
    collections::{BTreeMap, HashMap},
    convert::Infallible,
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{AuthUser, RegisterVerdict, Registration, RequestContext, UserProvider};

/// A user held by [`MemoryProvider`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryUser {
    /// Primary key value.
    pub primary_key: String,
    /// bcrypt hash of the password.
    pub password_hash: String,
    /// Extra registration fields.
    pub fields: BTreeMap<String, String>,
}

impl AuthUser for MemoryUser {
    fn primary_key(&self) -> String {
        self.primary_key.clone()
    }
}

impl From<Registration> for MemoryUser {
    fn from(registration: Registration) -> Self {
        Self {
            primary_key: registration.primary_key,
            password_hash: registration.password_hash,
            fields: registration.fields,
        }
    }
}

/// An ephemeral provider, useful for testing and demonstration purposes.
#[derive(Clone, Debug, Default)]
pub struct MemoryProvider {
    inner: Arc<RwLock<HashMap<String, MemoryUser>>>,
}

impl MemoryProvider {
    /// Creates a new memory provider over shared storage.
    ///
    /// ```rust
    /// use std::{collections::HashMap, sync::Arc};
    ///
    /// use axum_authflow::memory_provider::MemoryProvider;
    /// use tokio::sync::RwLock;
    ///
    /// let inner = Arc::new(RwLock::new(HashMap::new()));
    /// let memory_provider = MemoryProvider::new(&inner);
    /// ```
    pub fn new(inner: &Arc<RwLock<HashMap<String, MemoryUser>>>) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    /// Adds or replaces a user.
    pub async fn insert(&self, user: MemoryUser) {
        self.inner
            .write()
            .await
            .insert(user.primary_key.clone(), user);
    }

    /// Returns a copy of the user stored under `primary_key`.
    pub async fn get(&self, primary_key: &str) -> Option<MemoryUser> {
        self.inner.read().await.get(primary_key).cloned()
    }
}

#[async_trait]
impl UserProvider for MemoryProvider {
    type User = MemoryUser;
    type Error = Infallible;

    async fn password_hash(&self, primary_key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self
            .inner
            .read()
            .await
            .get(primary_key)
            .map(|user| user.password_hash.clone()))
    }

    async fn find_user(&self, primary_key: &str) -> Result<Option<Self::User>, Self::Error> {
        Ok(self.get(primary_key).await)
    }

    async fn register(
        &self,
        registration: Registration,
        _cx: &RequestContext,
    ) -> Result<RegisterVerdict<Self::User>, Self::Error> {
        let mut users = self.inner.write().await;

        // Another request may have registered the key since the existence
        // check.
        if users.contains_key(&registration.primary_key) {
            return Ok(RegisterVerdict::Rejected(
                "An account already exists.".to_string(),
            ));
        }

        let user = MemoryUser::from(registration);
        users.insert(user.primary_key.clone(), user.clone());

        Ok(RegisterVerdict::Registered(user))
    }
}
