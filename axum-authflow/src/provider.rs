use std::{collections::BTreeMap, fmt::Debug};

use async_trait::async_trait;
use axum::response::Response;

use crate::RequestContext;

/// A user record as the host application stores it.
///
/// # Examples
///
/// ```rust
/// use axum_authflow::AuthUser;
///
/// #[derive(Debug, Clone)]
/// struct User {
///     email: String,
///     name: String,
/// }
///
/// impl AuthUser for User {
///     fn primary_key(&self) -> String {
///         self.email.clone()
///     }
/// }
/// ```
pub trait AuthUser: Debug + Clone + Send + Sync + 'static {
    /// Returns the value which identifies the user, e.g. their email.
    fn primary_key(&self) -> String;
}

/// A new account, handed to [`UserProvider::register`].
///
/// The password has already been hashed with bcrypt; the plaintext never
/// leaves the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Primary key value of the new account.
    pub primary_key: String,
    /// bcrypt hash of the submitted password.
    pub password_hash: String,
    /// Configured extra fields, by name.
    pub fields: BTreeMap<String, String>,
}

/// Answer of [`UserProvider::validate_login`].
#[derive(Debug)]
pub enum LoginVerdict {
    /// Let the login complete.
    Proceed,

    /// Refuse the login. With no message the generic credential failure
    /// message is used.
    Reject(Option<String>),

    /// Stop the flow and answer with this response instead, e.g. to start an
    /// extra verification step. No session values are written.
    Halt(Response),
}

/// Answer of [`UserProvider::register`].
#[derive(Debug)]
pub enum RegisterVerdict<User> {
    /// The account was persisted.
    Registered(User),

    /// The provider refused the account, with a message for the client.
    Rejected(String),

    /// Stop the flow and answer with this response instead.
    Halt(Response),
}

/// The hooks through which the state machine reaches the host's user store.
///
/// Providers must implement:
///
/// 1. [`password_hash`](UserProvider::password_hash), returning the stored
///    bcrypt hash for a primary key,
/// 2. [`find_user`](UserProvider::find_user), looking a user up by primary
///    key,
/// 3. [`register`](UserProvider::register), validating and persisting a new
///    account.
///
/// [`validate_login`](UserProvider::validate_login) may be overridden to veto
/// logins after the password has been checked.
///
/// # Examples
///
/// ```rust
/// use std::{collections::HashMap, convert::Infallible};
///
/// use async_trait::async_trait;
/// use axum_authflow::{
///     AuthUser, RegisterVerdict, Registration, RequestContext, UserProvider,
/// };
///
/// #[derive(Debug, Clone)]
/// struct User {
///     email: String,
///     password_hash: String,
/// }
///
/// impl AuthUser for User {
///     fn primary_key(&self) -> String {
///         self.email.clone()
///     }
/// }
///
/// #[derive(Clone)]
/// struct Provider {
///     users: HashMap<String, User>,
/// }
///
/// #[async_trait]
/// impl UserProvider for Provider {
///     type User = User;
///     type Error = Infallible;
///
///     async fn password_hash(&self, primary_key: &str) -> Result<Option<String>, Self::Error> {
///         Ok(self.users.get(primary_key).map(|u| u.password_hash.clone()))
///     }
///
///     async fn find_user(&self, primary_key: &str) -> Result<Option<Self::User>, Self::Error> {
///         Ok(self.users.get(primary_key).cloned())
///     }
///
///     async fn register(
///         &self,
///         registration: Registration,
///         _cx: &RequestContext,
///     ) -> Result<RegisterVerdict<Self::User>, Self::Error> {
///         // A real provider would persist here.
///         Ok(RegisterVerdict::Registered(User {
///             email: registration.primary_key,
///             password_hash: registration.password_hash,
///         }))
///     }
/// }
/// ```
#[async_trait]
pub trait UserProvider: Clone + Send + Sync + 'static {
    /// User type returned by the store.
    type User: AuthUser;

    /// An error raised by the store. It is never turned into a user-facing
    /// message.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the stored bcrypt hash for `primary_key`, or `None` when there
    /// is no such account.
    async fn password_hash(&self, primary_key: &str) -> Result<Option<String>, Self::Error>;

    /// Returns the user identified by `primary_key`.
    async fn find_user(&self, primary_key: &str) -> Result<Option<Self::User>, Self::Error>;

    /// Validates and persists a new account.
    async fn register(
        &self,
        registration: Registration,
        cx: &RequestContext,
    ) -> Result<RegisterVerdict<Self::User>, Self::Error>;

    /// Runs after the password of `primary_key` was verified.
    async fn validate_login(
        &self,
        _primary_key: &str,
        _cx: &RequestContext,
    ) -> Result<LoginVerdict, Self::Error> {
        Ok(LoginVerdict::Proceed)
    }
}
