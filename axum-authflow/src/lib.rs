//! Session-token login, registration and logout flows for Axum.
//!
//! This crate provides a Tower middleware which tracks who is logged in with a
//! pair of values kept in the session, and the flows which set and clear them:
//!
//! 1. Logging users in with a primary key (e.g. an email) and a password,
//! 2. Registering new accounts,
//! 3. Logging users out,
//! 4. Protecting access to routes.
//!
//! The logged in state is a signed token (see [`TokenCodec`]): checking it
//! never touches the user store. User storage is reached through the
//! [`UserProvider`] hooks, so any storage engine may be used; likewise any
//! user type implementing [`AuthUser`].
//!
//! Sessions are provided via [`tower-sessions`](tower_sessions). The session
//! layer must wrap the authentication layer, as the session is where tokens
//! are kept.
//!
//! # Example
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use axum_authflow::{
//!     login_required, memory_provider::MemoryProvider, routes, AuthManagerLayerBuilder,
//!     AuthSession,
//! };
//! use tower_sessions::{MemoryStore, SessionManagerLayer};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let secret = [7u8; 64];
//! let auth_layer = AuthManagerLayerBuilder::new(MemoryProvider::default(), &secret).build()?;
//! let session_layer = SessionManagerLayer::new(MemoryStore::default());
//!
//! let app = Router::new()
//!     .route(
//!         "/",
//!         get(|auth: AuthSession<MemoryProvider>| async move {
//!             format!("Hello, {}!", auth.identity().await.unwrap_or_default())
//!         }),
//!     )
//!     .route_layer(login_required!(MemoryProvider, login_url = "/auth"))
//!     .nest("/auth", routes::router::<MemoryProvider, ()>())
//!     .layer(auth_layer)
//!     .layer(session_layer);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! Form keys, redirect targets, event names, session keys and the bcrypt cost
//! are described by [`AuthConfig`], which can be loaded from TOML.

#![warn(
    clippy::all,
    nonstandard_style,
    future_incompatible,
    missing_debug_implementations
)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub use axum;
pub use secrecy;
pub use tower_sessions;
#[doc(hidden)]
pub use tracing;

pub use crate::{
    config::{AuthConfig, ConfigError},
    events::{AuthEvent, AuthEvents, EventKind},
    extract::RequestContext,
    middleware::url_with_redirect_query,
    provider::{AuthUser, LoginVerdict, RegisterVerdict, Registration, UserProvider},
    service::{AuthManager, AuthManagerLayer, AuthManagerLayerBuilder},
    session::{
        AuthResult, AuthSession, AuthState, Credentials, Error, LoginOutcome, RegisterOutcome,
        RegistrationForm,
    },
    token::{SessionToken, TokenCodec, TokenPair},
};

pub mod config;
mod events;
mod extract;
pub mod memory_provider;
mod middleware;
mod provider;
pub mod routes;
mod service;
mod session;
pub mod token;

#[cfg(test)]
mod test_support;
