use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
    Router,
};
use tower::ServiceExt;
use tower_sessions::{cookie::Cookie, MemoryStore, SessionManagerLayer};

use crate::{
    config::AuthConfig,
    memory_provider::{MemoryProvider, MemoryUser},
    AuthManagerLayer, AuthManagerLayerBuilder, RegisterVerdict, Registration, RequestContext,
    UserProvider,
};

pub const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

/// Default configuration with the cheapest bcrypt cost.
pub fn config() -> AuthConfig {
    let mut config = AuthConfig::default();
    config.token.cost = 4;
    config
}

pub fn auth_layer<P: UserProvider>(provider: P, config: AuthConfig) -> AuthManagerLayer<P> {
    AuthManagerLayerBuilder::new(provider, SECRET)
        .with_config(config)
        .build()
        .unwrap()
}

pub fn session_layer() -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(MemoryStore::default()).with_secure(false)
}

/// A provider holding `a@b.com` with password `secret`.
pub async fn seeded_provider() -> MemoryProvider {
    let provider = MemoryProvider::default();
    provider
        .insert(MemoryUser {
            primary_key: "a@b.com".to_string(),
            password_hash: bcrypt::hash("secret", 4).unwrap(),
            fields: BTreeMap::from([("name".to_string(), "A".to_string())]),
        })
        .await;
    provider
}

pub async fn body_string(res: Response) -> String {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// A urlencoded `POST` from a client asking for JSON answers.
pub fn form_request(uri: &str, body: &'static str) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::ACCEPT, "application/json")
        .body(Body::from(body))
        .unwrap()
}

/// Sends requests through a router, carrying the session cookie over like a
/// browser would.
pub struct TestClient {
    app: Router,
    cookie: Option<String>,
}

impl TestClient {
    pub fn new(app: Router) -> Self {
        Self { app, cookie: None }
    }

    pub async fn send(&mut self, mut req: Request<Body>) -> Response {
        if let Some(cookie) = &self.cookie {
            req.headers_mut()
                .insert(header::COOKIE, cookie.parse().unwrap());
        }

        let res = self.app.clone().oneshot(req).await.unwrap();

        if let Some(set_cookie) = res.headers().get(header::SET_COOKIE) {
            let cookie = Cookie::parse(set_cookie.to_str().unwrap()).unwrap();
            // A removal cookie carries an empty value.
            self.cookie = (!cookie.value().is_empty())
                .then(|| format!("{}={}", cookie.name(), cookie.value()));
        }

        res
    }
}

#[derive(Debug, thiserror::Error)]
#[error("user store unavailable")]
pub struct StoreUnavailable;

/// A provider whose store is always down.
#[derive(Debug, Clone)]
pub struct FailingProvider;

#[async_trait]
impl UserProvider for FailingProvider {
    type User = MemoryUser;
    type Error = StoreUnavailable;

    async fn password_hash(&self, _primary_key: &str) -> Result<Option<String>, Self::Error> {
        Err(StoreUnavailable)
    }

    async fn find_user(&self, _primary_key: &str) -> Result<Option<Self::User>, Self::Error> {
        Err(StoreUnavailable)
    }

    async fn register(
        &self,
        _registration: Registration,
        _cx: &RequestContext,
    ) -> Result<RegisterVerdict<Self::User>, Self::Error> {
        Err(StoreUnavailable)
    }
}
