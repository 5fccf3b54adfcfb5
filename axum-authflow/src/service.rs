use std::{
    fmt,
    sync::Arc,
    task::{Context, Poll},
};

use axum::http::{self, Request, Response};
use futures::future::BoxFuture;
use secrecy::{ExposeSecret, SecretVec};
use tower_layer::Layer;
use tower_service::Service;
use tower_sessions::Session;
use tracing::Instrument;

use crate::{
    config::{AuthConfig, ConfigError, MIN_SECRET_LEN},
    events::AuthEvents,
    session::Shared,
    token::TokenCodec,
    AuthSession, UserProvider,
};

/// A middleware that provides [`AuthSession`] as a request extension.
#[derive(Debug, Clone)]
pub struct AuthManager<S, P: UserProvider> {
    inner: S,
    provider: P,
    shared: Arc<Shared<P::User>>,
}

impl<ReqBody, ResBody, S, P> Service<Request<ReqBody>> for AuthManager<S, P>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send,
    P: UserProvider,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let span = tracing::debug_span!("auth", method = %req.method(), uri = %req.uri());

        let provider = self.provider.clone();
        let shared = self.shared.clone();

        // Because the inner service can panic until ready, we need to ensure we only
        // use the ready service.
        //
        // See: https://docs.rs/tower/latest/tower/trait.Service.html#be-careful-when-cloning-inner-services
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(
            async move {
                let Some(session) = req.extensions().get::<Session>().cloned() else {
                    tracing::error!("session not found in request extensions");
                    let mut res = Response::default();
                    *res.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
                    return Ok(res);
                };

                req.extensions_mut()
                    .insert(AuthSession::new(session, provider, shared));

                inner.call(req).await
            }
            .instrument(span),
        )
    }
}

/// A layer for providing [`AuthSession`] as a request extension.
///
/// The session layer of `tower-sessions` must wrap this layer, as the session
/// is where tokens are kept:
///
/// ```rust,no_run
/// use axum::{routing::get, Router};
/// use axum_authflow::{
///     memory_provider::MemoryProvider, AuthManagerLayerBuilder, AuthSession,
/// };
/// use tower_sessions::{MemoryStore, SessionManagerLayer};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let secret = [42u8; 64];
/// let auth_layer = AuthManagerLayerBuilder::new(MemoryProvider::default(), &secret).build()?;
/// let session_layer = SessionManagerLayer::new(MemoryStore::default());
///
/// let app: Router = Router::new()
///     .route(
///         "/",
///         get(|auth: AuthSession<MemoryProvider>| async move {
///             auth.is_logged().await.to_string()
///         }),
///     )
///     .layer(auth_layer)
///     .layer(session_layer);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AuthManagerLayer<P: UserProvider> {
    provider: P,
    shared: Arc<Shared<P::User>>,
}

impl<P: UserProvider> AuthManagerLayer<P> {
    /// The configuration in use.
    pub fn config(&self) -> &AuthConfig {
        &self.shared.config
    }

    /// The channel events are emitted on.
    pub fn events(&self) -> &AuthEvents<P::User> {
        &self.shared.events
    }
}

impl<S, P: UserProvider> Layer<S> for AuthManagerLayer<P> {
    type Service = AuthManager<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthManager {
            inner,
            provider: self.provider.clone(),
            shared: self.shared.clone(),
        }
    }
}

/// Builder for the [`AuthManagerLayer`].
pub struct AuthManagerLayerBuilder<P: UserProvider> {
    provider: P,
    secret: SecretVec<u8>,
    config: Option<AuthConfig>,
    events: Option<AuthEvents<P::User>>,
}

impl<P: UserProvider + fmt::Debug> fmt::Debug for AuthManagerLayerBuilder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthManagerLayerBuilder")
            .field("provider", &self.provider)
            .field("secret", &"[REDACTED]")
            .field("config", &self.config)
            .field("events", &self.events)
            .finish()
    }
}

impl<P: UserProvider> AuthManagerLayerBuilder<P> {
    /// Create a new [`AuthManagerLayerBuilder`] with the provided user
    /// provider.
    ///
    /// Note that the `secret` is used to key session tokens. For security
    /// reasons, this value **must** be securely generated.
    pub fn new(provider: P, secret: &[u8]) -> Self {
        Self {
            provider,
            secret: SecretVec::new(secret.to_vec()),
            config: None,
            events: None,
        }
    }

    /// Replaces the default configuration.
    pub fn with_config(mut self, config: AuthConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Emits events on the given channel instead of a private one.
    pub fn with_events(mut self, events: AuthEvents<P::User>) -> Self {
        self.events = Some(events);
        self
    }

    /// Validates the configuration and builds the [`AuthManagerLayer`].
    pub fn build(self) -> Result<AuthManagerLayer<P>, ConfigError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let secret = self.secret.expose_secret();
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::ShortSecret(secret.len()));
        }

        let codec = TokenCodec::new(secret, config.token.cost).with_max_age(config.token.max_age());

        tracing::debug!(
            cost = config.token.cost,
            max_age_secs = ?config.token.max_age_secs,
            "auth layer configured"
        );

        Ok(AuthManagerLayer {
            provider: self.provider,
            shared: Arc::new(Shared {
                config,
                codec,
                events: self.events.unwrap_or_default(),
            }),
        })
    }
}
