//! Login, registration, logout and dashboard endpoints.
//!
//! [`router`] is meant to be nested by the host application:
//!
//! ```rust,no_run
//! use axum::Router;
//! use axum_authflow::{memory_provider::MemoryProvider, routes};
//!
//! let app: Router = Router::new().nest("/auth", routes::router::<MemoryProvider, ()>());
//! ```
//!
//! Clients sending `X-Requested-With: XMLHttpRequest` or accepting
//! `application/json` are answered with an [`AuthResult`] body, `200` on
//! success and `400` otherwise. Other clients are redirected, to
//! `routes.after_login` after logging in and to `routes.login` otherwise.

use std::collections::HashMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{any, get, post},
    Form, Json, Router,
};
use secrecy::SecretString;
use serde::Serialize;

use crate::{
    guest_only, login_required, AuthResult, AuthSession, Credentials, Error, LoginOutcome,
    RegisterOutcome, RegistrationForm, RequestContext, UserProvider,
};

const LOGGED_OUT: &str = "Logout successful.";

/// Builds the auth router.
///
/// `POST /login` and `POST /register` are reserved to anonymous sessions;
/// logged in users are redirected to `routes.after_login`. `GET /dashboard`
/// is reserved to logged in sessions and answers `401` otherwise.
pub fn router<P, S>() -> Router<S>
where
    P: UserProvider,
    S: Clone + Send + Sync + 'static,
{
    let members = Router::new()
        .route("/dashboard", get(self::get::dashboard::<P>))
        .route_layer(login_required!(P));

    Router::new()
        .route("/login", post(self::post::login::<P>))
        .route("/register", post(self::post::register::<P>))
        .route_layer(guest_only!(P))
        .route("/logout", any(self::logout::<P>))
        .route("/", get(self::get::status::<P>))
        .merge(members)
}

fn respond(cx: &RequestContext, result: AuthResult, redirect_to: &str) -> Response {
    if cx.wants_json() {
        let status = if result.success {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        };
        (status, Json(result)).into_response()
    } else {
        Redirect::to(redirect_to).into_response()
    }
}

mod post {
    use super::*;

    pub async fn login<P: UserProvider>(
        auth_session: AuthSession<P>,
        cx: RequestContext,
        Form(mut form): Form<HashMap<String, String>>,
    ) -> Result<Response, Error<P>> {
        let config = auth_session.config();
        let creds = Credentials {
            primary_key: form.remove(&config.login.primary_key),
            password: form.remove(&config.login.password).map(SecretString::new),
        };

        let response = match auth_session.login(creds, &cx).await? {
            LoginOutcome::Authenticated(result) => respond(&cx, result, &config.routes.after_login),
            LoginOutcome::Rejected(result) => respond(&cx, result, &config.routes.login),
            LoginOutcome::Halted(response) => response,
        };

        Ok(response)
    }

    pub async fn register<P: UserProvider>(
        auth_session: AuthSession<P>,
        cx: RequestContext,
        Form(mut form): Form<HashMap<String, String>>,
    ) -> Result<Response, Error<P>> {
        let config = auth_session.config();
        let registration = RegistrationForm {
            primary_key: form.remove(&config.register.primary_key),
            password: form.remove(&config.register.password).map(SecretString::new),
            fields: config
                .register
                .fields
                .iter()
                .filter_map(|field| {
                    form.get(&field.key)
                        .map(|value| (field.name.clone(), value.clone()))
                })
                .collect(),
        };

        let response = match auth_session.register(registration, &cx).await? {
            RegisterOutcome::Registered { result, .. } if config.register.login_after => {
                respond(&cx, result, &config.routes.after_login)
            }
            RegisterOutcome::Registered { result, .. } | RegisterOutcome::Rejected(result) => {
                respond(&cx, result, &config.routes.login)
            }
            RegisterOutcome::Halted(response) => response,
        };

        Ok(response)
    }
}

mod get {
    use super::*;

    #[derive(Debug, Serialize)]
    pub struct Status {
        logged: bool,
        identity: Option<String>,
    }

    pub async fn status<P: UserProvider>(auth_session: AuthSession<P>) -> Json<Status> {
        let identity = auth_session.identity().await;
        Json(Status {
            logged: identity.is_some(),
            identity,
        })
    }

    #[derive(Debug, Serialize)]
    pub struct Dashboard {
        identity: String,
        found: bool,
    }

    pub async fn dashboard<P: UserProvider>(
        auth_session: AuthSession<P>,
    ) -> Result<Json<Dashboard>, Error<P>> {
        let user = auth_session.user().await?;
        Ok(Json(Dashboard {
            identity: auth_session.identity().await.unwrap_or_default(),
            found: user.is_some(),
        }))
    }
}

async fn logout<P: UserProvider>(
    auth_session: AuthSession<P>,
    cx: RequestContext,
) -> Result<Response, Error<P>> {
    auth_session.logout().await?;

    Ok(respond(
        &cx,
        AuthResult::success(LOGGED_OUT),
        &auth_session.config().routes.login,
    ))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request},
    };
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        memory_provider::MemoryProvider,
        test_support::{self, TestClient},
    };

    async fn client() -> TestClient {
        let app = Router::new()
            .nest("/auth", router::<MemoryProvider, ()>())
            .layer(test_support::auth_layer(
                test_support::seeded_provider().await,
                test_support::config(),
            ))
            .layer(test_support::session_layer());

        TestClient::new(app)
    }

    async fn json_body(res: Response) -> Value {
        serde_json::from_str(&test_support::body_string(res).await).unwrap()
    }

    #[tokio::test]
    async fn login_answers_json() {
        let mut client = client().await;

        let res = client
            .send(test_support::form_request(
                "/auth/login",
                "login-email=a%40b.com&login-password=nope",
            ))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(res).await,
            json!({ "success": false, "message": "Incorrect Email/Password combination!" })
        );

        let res = client
            .send(test_support::form_request(
                "/auth/login",
                "login-email=a%40b.com&login-password=secret",
            ))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            json_body(res).await,
            json!({ "success": true, "message": "Login successful." })
        );

        let res = client
            .send(Request::get("/auth").body(Body::empty()).unwrap())
            .await;
        assert_eq!(
            json_body(res).await,
            json!({ "logged": true, "identity": "a@b.com" })
        );
    }

    #[tokio::test]
    async fn login_redirects_browsers() {
        let mut client = client().await;

        let res = client
            .send(
                Request::post("/auth/login")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("login-email=a%40b.com&login-password=nope"))
                    .unwrap(),
            )
            .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/auth");

        let res = client
            .send(
                Request::post("/auth/login")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("login-email=a%40b.com&login-password=secret"))
                    .unwrap(),
            )
            .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/");
    }

    #[tokio::test]
    async fn missing_fields_are_named() {
        let mut client = client().await;

        let res = client
            .send(test_support::form_request("/auth/login", "login-email=a%40b.com"))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["message"], "Missing credentials.");

        let res = client
            .send(test_support::form_request(
                "/auth/register",
                "join-email=c%40d.com&join-password=pw",
            ))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["message"], "Name is required.");
    }

    #[tokio::test]
    async fn duplicate_registration_is_generic() {
        let mut client = client().await;

        let res = client
            .send(test_support::form_request(
                "/auth/register",
                "join-email=a%40b.com&join-password=other&join-name=B",
            ))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["message"], "An account already exists.");
    }

    #[tokio::test]
    async fn logged_in_users_cannot_log_in_again() {
        let mut client = client().await;

        client
            .send(test_support::form_request(
                "/auth/login",
                "login-email=a%40b.com&login-password=secret",
            ))
            .await;

        let res = client
            .send(test_support::form_request(
                "/auth/login",
                "login-email=a%40b.com&login-password=secret",
            ))
            .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/");
    }

    #[tokio::test]
    async fn dashboard_is_for_members() {
        let mut client = client().await;

        let res = client
            .send(Request::get("/auth/dashboard").body(Body::empty()).unwrap())
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        client
            .send(test_support::form_request(
                "/auth/login",
                "login-email=a%40b.com&login-password=secret",
            ))
            .await;

        let res = client
            .send(Request::get("/auth/dashboard").body(Body::empty()).unwrap())
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            json_body(res).await,
            json!({ "identity": "a@b.com", "found": true })
        );
    }

    #[tokio::test]
    async fn logout_answers_even_when_anonymous() {
        let mut client = client().await;

        let res = client
            .send(
                Request::post("/auth/logout")
                    .header("X-Requested-With", "XMLHttpRequest")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            json_body(res).await,
            json!({ "success": true, "message": "Logout successful." })
        );

        let res = client
            .send(Request::get("/auth/logout").body(Body::empty()).unwrap())
            .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/auth");
    }
}
