use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bcrypt::BcryptError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::{sync::Mutex, task::JoinError};
use tower_sessions::{session, Session};

use crate::{
    config::{label, AuthConfig},
    events::{AuthEvents, EventKind},
    provider::{AuthUser, LoginVerdict, RegisterVerdict, Registration, UserProvider},
    token::{TokenCodec, TokenPair},
    RequestContext,
};

const MISSING_CREDENTIALS: &str = "Missing credentials.";
const LOGIN_SUCCESS: &str = "Login successful.";
const ACCOUNT_EXISTS: &str = "An account already exists.";
const REGISTERED: &str = "Registration successful, login now!";

/// An error type which maps session, provider and hashing errors.
#[derive(thiserror::Error)]
pub enum Error<P: UserProvider> {
    /// A mapping to `tower_sessions::session::Error`.
    #[error(transparent)]
    Session(session::Error),

    /// A mapping to `UserProvider::Error`.
    #[error(transparent)]
    Provider(P::Error),

    /// Hashing a password or token failed.
    #[error(transparent)]
    Hash(BcryptError),

    /// The blocking task running bcrypt did not complete.
    #[error("hashing task failed: {0}")]
    Blocking(JoinError),
}

impl<P: UserProvider> Debug for Error<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Session(err) => write!(f, "{:?}", err)?,
            Error::Provider(err) => write!(f, "{:?}", err)?,
            Error::Hash(err) => write!(f, "{:?}", err)?,
            Error::Blocking(err) => write!(f, "{:?}", err)?,
        };

        Ok(())
    }
}

impl<P: UserProvider> IntoResponse for Error<P> {
    fn into_response(self) -> Response {
        tracing::error!(err = %self, "authentication flow failed");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

/// Where a session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No verified token.
    Anonymous,
    /// Credentials are being checked.
    Authenticating,
    /// A verified token is held.
    Authenticated,
}

/// Outcome of a login, registration or logout, as shown to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Message for the client.
    pub message: String,
}

impl AuthResult {
    pub(crate) fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub(crate) fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Credentials submitted to [`AuthSession::login`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    /// Primary key value, e.g. an email.
    pub primary_key: Option<String>,
    /// Plaintext password.
    pub password: Option<SecretString>,
}

/// Fields submitted to [`AuthSession::register`].
#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    /// Primary key value of the new account.
    pub primary_key: Option<String>,
    /// Plaintext password.
    pub password: Option<SecretString>,
    /// Values of the configured extra fields, by field name.
    pub fields: BTreeMap<String, String>,
}

/// Result of [`AuthSession::login`].
#[derive(Debug)]
pub enum LoginOutcome {
    /// The session now holds a token.
    Authenticated(AuthResult),
    /// The login was refused.
    Rejected(AuthResult),
    /// The login validator took over and supplied this response.
    Halted(Response),
}

/// Result of [`AuthSession::register`].
#[derive(Debug)]
pub enum RegisterOutcome<User> {
    /// The provider persisted the account.
    Registered {
        /// Message for the client.
        result: AuthResult,
        /// The persisted user.
        user: User,
    },
    /// The registration was refused.
    Rejected(AuthResult),
    /// The provider took over and supplied this response.
    Halted(Response),
}

#[derive(Debug, Clone, Default)]
enum Verification {
    #[default]
    Unchecked,
    Anonymous,
    Authenticated(String),
}

impl Verification {
    fn identity(&self) -> Option<&str> {
        match self {
            Verification::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Memo<User> {
    verification: Verification,
    // Outer `None` when the user was not looked up yet.
    user: Option<Option<User>>,
}

impl<User> Default for Memo<User> {
    fn default() -> Self {
        Self {
            verification: Verification::Unchecked,
            user: None,
        }
    }
}

/// State shared by all requests passing one auth layer.
#[derive(Debug)]
pub(crate) struct Shared<User> {
    pub(crate) config: AuthConfig,
    pub(crate) codec: TokenCodec,
    pub(crate) events: AuthEvents<User>,
}

/// A session which logs users in and out with stateless tokens.
///
/// One `AuthSession` is created per request by
/// [`AuthManagerLayer`](crate::AuthManagerLayer); clones share the same
/// per-request state. The logged in state is carried by two session values
/// (see [`SessionKeys`](crate::config::SessionKeys)) holding a token issued by
/// [`TokenCodec`]. Checking them never touches the user provider, and the
/// bcrypt comparison runs at most once per request however often
/// [`is_logged`](Self::is_logged) is called.
///
/// Credentials are checked with the provider's hooks. Failures which reveal
/// nothing about an account (wrong password, unknown account) are returned
/// as [`LoginOutcome::Rejected`] with identical messages; failures of the
/// provider or session store are returned as [`Error`].
#[derive(Debug, Clone)]
pub struct AuthSession<P: UserProvider> {
    /// The user provider.
    pub provider: P,

    session: Session,
    shared: Arc<Shared<P::User>>,
    memo: Arc<Mutex<Memo<P::User>>>,
}

impl<P: UserProvider> AuthSession<P> {
    pub(crate) fn new(session: Session, provider: P, shared: Arc<Shared<P::User>>) -> Self {
        Self {
            provider,
            session,
            shared,
            memo: Arc::new(Mutex::new(Memo::default())),
        }
    }

    /// The configuration of the layer which created this session.
    pub fn config(&self) -> &AuthConfig {
        &self.shared.config
    }

    /// Returns `true` when the session holds a valid token.
    pub async fn is_logged(&self) -> bool {
        self.identity().await.is_some()
    }

    /// Returns where the session stands.
    pub async fn state(&self) -> AuthState {
        if self.is_logged().await {
            AuthState::Authenticated
        } else {
            AuthState::Anonymous
        }
    }

    /// The verified identity of the logged in user.
    pub async fn identity(&self) -> Option<String> {
        let mut memo = self.memo.lock().await;

        if let Verification::Unchecked = memo.verification {
            memo.verification = match self.verify_session().await {
                Some(identity) => Verification::Authenticated(identity),
                None => Verification::Anonymous,
            };
        }

        memo.verification.identity().map(str::to_owned)
    }

    /// The logged in user, looked up through the provider on first use.
    pub async fn user(&self) -> Result<Option<P::User>, Error<P>> {
        let Some(identity) = self.identity().await else {
            return Ok(None);
        };

        let mut memo = self.memo.lock().await;
        if let Some(ref user) = memo.user {
            return Ok(user.clone());
        }

        let user = self
            .provider
            .find_user(&identity)
            .await
            .map_err(Error::Provider)?;
        memo.user = Some(user.clone());

        Ok(user)
    }

    /// Checks the credentials and, when they are valid, logs the user in.
    #[tracing::instrument(level = "debug", skip_all, fields(user.id), err)]
    pub async fn login(
        &self,
        creds: Credentials,
        cx: &RequestContext,
    ) -> Result<LoginOutcome, Error<P>> {
        let (Some(primary_key), Some(password)) =
            (present(creds.primary_key), present_secret(creds.password))
        else {
            return Ok(LoginOutcome::Rejected(AuthResult::failure(
                MISSING_CREDENTIALS,
            )));
        };

        tracing::Span::current().record("user.id", primary_key.as_str());
        tracing::debug!(state = ?AuthState::Authenticating);

        let incorrect = AuthResult::failure(format!(
            "Incorrect {}/Password combination!",
            self.shared.config.primary_key_label()
        ));

        let Some(stored) = self
            .provider
            .password_hash(&primary_key)
            .await
            .map_err(Error::Provider)?
        else {
            return Ok(LoginOutcome::Rejected(incorrect));
        };

        let verified = blocking(move || bcrypt::verify(password.expose_secret(), &stored))
            .await
            .map_err(Error::Blocking)?;
        match verified {
            Ok(true) => {}
            Ok(false) => return Ok(LoginOutcome::Rejected(incorrect)),
            // The account exists, but the answer must not say so.
            Err(err) => {
                tracing::error!(err = %err, "stored password hash is not a bcrypt hash");
                return Ok(LoginOutcome::Rejected(incorrect));
            }
        }

        match self
            .provider
            .validate_login(&primary_key, cx)
            .await
            .map_err(Error::Provider)?
        {
            LoginVerdict::Proceed => {}
            LoginVerdict::Reject(message) => {
                return Ok(LoginOutcome::Rejected(
                    message.map(AuthResult::failure).unwrap_or(incorrect),
                ))
            }
            LoginVerdict::Halt(response) => {
                tracing::debug!("login validator halted the flow");
                return Ok(LoginOutcome::Halted(response));
            }
        }

        let user = self
            .provider
            .find_user(&primary_key)
            .await
            .map_err(Error::Provider)?;
        self.establish(&primary_key, user).await?;

        Ok(LoginOutcome::Authenticated(AuthResult::success(
            LOGIN_SUCCESS,
        )))
    }

    /// Logs the given user in without checking credentials.
    #[tracing::instrument(level = "debug", skip_all, fields(user.id = %user.primary_key()), err)]
    pub async fn login_as(&self, user: &P::User) -> Result<(), Error<P>> {
        self.establish(&user.primary_key(), Some(user.clone())).await
    }

    /// Removes the token and every configured logout key from the session.
    ///
    /// Returns the identity which was logged in, if any.
    #[tracing::instrument(level = "debug", skip_all, fields(user.id), ret, err)]
    pub async fn logout(&self) -> Result<Option<String>, Error<P>> {
        let identity = self.identity().await;

        let mut memo = self.memo.lock().await;
        for key in self.shared.config.session.logout_keys() {
            self.session
                .remove_value(key)
                .await
                .map_err(Error::Session)?;
        }
        let user = memo.user.take().flatten();
        memo.verification = Verification::Anonymous;
        memo.user = Some(None);
        drop(memo);

        if let Some(ref identity) = identity {
            tracing::Span::current().record("user.id", identity.as_str());
            self.shared.events.emit(
                &self.shared.config.events,
                EventKind::LoggedOut,
                identity,
                user,
            );
        }

        Ok(identity)
    }

    /// Validates the form, hashes the password and hands the account to the
    /// provider.
    #[tracing::instrument(level = "debug", skip_all, fields(user.id), err)]
    pub async fn register(
        &self,
        form: RegistrationForm,
        cx: &RequestContext,
    ) -> Result<RegisterOutcome<P::User>, Error<P>> {
        let config = &self.shared.config;

        let Some(primary_key) = present(form.primary_key) else {
            return Ok(RegisterOutcome::Rejected(required(&config.primary_key)));
        };
        let Some(password) = present_secret(form.password) else {
            return Ok(RegisterOutcome::Rejected(required("password")));
        };

        let mut fields = BTreeMap::new();
        for field in &config.register.fields {
            match form.fields.get(&field.name).filter(|v| !v.trim().is_empty()) {
                Some(value) => fields.insert(field.name.clone(), value.clone()),
                None => return Ok(RegisterOutcome::Rejected(required(&field.name))),
            };
        }

        tracing::Span::current().record("user.id", primary_key.as_str());

        if self
            .provider
            .find_user(&primary_key)
            .await
            .map_err(Error::Provider)?
            .is_some()
        {
            return Ok(RegisterOutcome::Rejected(AuthResult::failure(
                ACCOUNT_EXISTS,
            )));
        }

        let cost = config.token.cost;
        let password_hash = blocking(move || bcrypt::hash(password.expose_secret(), cost))
            .await
            .map_err(Error::Blocking)?
            .map_err(Error::Hash)?;

        let registration = Registration {
            primary_key: primary_key.clone(),
            password_hash,
            fields,
        };

        let user = match self
            .provider
            .register(registration, cx)
            .await
            .map_err(Error::Provider)?
        {
            RegisterVerdict::Registered(user) => user,
            RegisterVerdict::Rejected(message) => {
                return Ok(RegisterOutcome::Rejected(AuthResult::failure(message)))
            }
            RegisterVerdict::Halt(response) => return Ok(RegisterOutcome::Halted(response)),
        };

        self.shared.events.emit(
            &config.events,
            EventKind::Registered,
            &primary_key,
            Some(user.clone()),
        );

        if config.register.login_after {
            self.establish(&primary_key, Some(user.clone())).await?;
        }

        Ok(RegisterOutcome::Registered {
            result: AuthResult::success(REGISTERED),
            user,
        })
    }

    async fn establish(&self, identity: &str, user: Option<P::User>) -> Result<(), Error<P>> {
        let codec = self.shared.codec.clone();
        let owned = identity.to_owned();
        let token = blocking(move || codec.issue(&owned))
            .await
            .map_err(Error::Blocking)?
            .map_err(Error::Hash)?;
        let TokenPair {
            public_key,
            public_hash,
        } = token.pair();

        let keys = &self.shared.config.session;
        let mut memo = self.memo.lock().await;

        // Session-fixation mitigation.
        self.session.cycle_id().await.map_err(Error::Session)?;
        self.session
            .insert(&keys.public_key, public_key)
            .await
            .map_err(Error::Session)?;
        self.session
            .insert(&keys.public_hash, public_hash)
            .await
            .map_err(Error::Session)?;

        memo.verification = Verification::Authenticated(identity.to_owned());
        memo.user = Some(user.clone());
        drop(memo);

        tracing::debug!(state = ?AuthState::Authenticated);
        self.shared
            .events
            .emit(&self.shared.config.events, EventKind::LoggedIn, identity, user);

        Ok(())
    }

    async fn verify_session(&self) -> Option<String> {
        let keys = &self.shared.config.session;
        let pair = TokenPair::from_parts(
            self.read(&keys.public_key).await,
            self.read(&keys.public_hash).await,
        )?;

        let codec = self.shared.codec.clone();
        match blocking(move || codec.decode(&pair)).await {
            Ok(token) => token.map(|token| token.identity().to_owned()),
            Err(err) => {
                tracing::error!(err = %err, "token verification task failed");
                None
            }
        }
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.session.get::<String>(key).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key, err = %err, "unreadable session value");
                None
            }
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, JoinError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn present_secret(value: Option<SecretString>) -> Option<SecretString> {
    value.filter(|v| !v.expose_secret().is_empty())
}

fn required(field: &str) -> AuthResult {
    AuthResult::failure(format!("{} is required.", label(field)))
}
