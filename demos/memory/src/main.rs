//! Run with
//!
//! ```not_rust
//! cargo run -p demo-memory
//! ```
//!
//! Set `AUTH_CONFIG` to the path of a TOML file to override the defaults.

use axum::{routing::get, Router};
use axum_authflow::{
    login_required, memory_provider::MemoryProvider, routes, AuthConfig, AuthEvents,
    AuthManagerLayerBuilder, AuthSession,
};
use rand::Rng;
use tokio::sync::broadcast::error::RecvError;
use tower_sessions::{MemoryStore, SessionManagerLayer};

type Auth = AuthSession<MemoryProvider>;

async fn protected(auth: Auth) -> String {
    match auth.user().await {
        Ok(Some(user)) => format!(
            "Logged in as: {}",
            user.fields.get("name").unwrap_or(&user.primary_key)
        ),
        _ => "Logged in".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(
            |_| "axum_authflow=debug,tower_sessions=warn".into(),
        )))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    let config = match std::env::var("AUTH_CONFIG") {
        Ok(path) => AuthConfig::from_toml_str(&std::fs::read_to_string(path)?)?,
        Err(_) => AuthConfig::default(),
    };

    let secret = rand::thread_rng().gen::<[u8; 64]>();

    let events = AuthEvents::default();
    let mut listener = events.subscribe();
    tokio::spawn(async move {
        loop {
            match listener.recv().await {
                Ok(event) => {
                    tracing::info!(event = %event.name, identity = %event.identity, "auth event")
                }
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "auth events dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let auth_layer = AuthManagerLayerBuilder::new(MemoryProvider::default(), &secret)
        .with_config(config)
        .with_events(events)
        .build()?;
    let session_layer = SessionManagerLayer::new(MemoryStore::default()).with_secure(false);

    let app = Router::new()
        .route("/", get(protected))
        .route_layer(login_required!(MemoryProvider, login_url = "/auth"))
        .nest("/auth", routes::router::<MemoryProvider, ()>())
        .layer(auth_layer)
        .layer(session_layer);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
