use axum::http::{self, Uri};

fn append_query(uri: &Uri, pair: (&str, &str)) -> Result<Uri, http::Error> {
    let existing = form_urlencoded::parse(uri.query().unwrap_or_default().as_bytes());
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(existing)
        .append_pair(pair.0, pair.1)
        .finish();

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(format!("{}?{}", uri.path(), query).parse()?);

    Ok(Uri::from_parts(parts)?)
}

/// This is intended for internal use only and subject to change in the future
/// without warning!
#[doc(hidden)]
pub fn url_with_redirect_query(
    url: &str,
    redirect_field: &str,
    redirect_uri: Uri,
) -> Result<Uri, http::Error> {
    let uri = url.parse::<Uri>()?;

    let already_set = uri
        .query()
        .map(|q| form_urlencoded::parse(q.as_bytes()).any(|(k, _)| k == redirect_field))
        .unwrap_or(false);
    if already_set {
        return Ok(uri);
    }

    let redirect = urlencoding::decode(&redirect_uri.to_string())
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| redirect_uri.to_string());

    append_query(&uri, (redirect_field, &redirect))
}

/// Login-required middleware.
///
/// Anonymous requests are answered with `401 Unauthorized`, or, when a login
/// URL is given, redirected there with the original URI in a query field
/// (`next` unless named otherwise).
///
/// ```rust
/// use axum::{routing::get, Router};
/// use axum_authflow::{login_required, memory_provider::MemoryProvider};
///
/// let app: Router = Router::new()
///     .route("/dashboard", get(|| async { "welcome" }))
///     .route_layer(login_required!(MemoryProvider, login_url = "/auth"));
/// ```
#[macro_export]
macro_rules! login_required {
    ($provider_type:ty) => {{
        use $crate::axum::{
            extract::Request,
            middleware::{from_fn, Next},
            response::IntoResponse,
        };

        from_fn(
            |auth_session: $crate::AuthSession<$provider_type>, req: Request, next: Next| async move {
                if auth_session.is_logged().await {
                    next.run(req).await
                } else {
                    $crate::axum::http::StatusCode::UNAUTHORIZED.into_response()
                }
            },
        )
    }};

    ($provider_type:ty, login_url = $login_url:expr, redirect_field = $redirect_field:expr) => {{
        use $crate::axum::{
            extract::{OriginalUri, Request},
            middleware::{from_fn, Next},
            response::{IntoResponse, Redirect},
        };

        from_fn(
            |auth_session: $crate::AuthSession<$provider_type>,
             OriginalUri(original_uri): OriginalUri,
             req: Request,
             next: Next| async move {
                if auth_session.is_logged().await {
                    next.run(req).await
                } else {
                    match $crate::url_with_redirect_query(
                        $login_url,
                        $redirect_field,
                        original_uri,
                    ) {
                        Ok(login_url) => {
                            Redirect::temporary(&login_url.to_string()).into_response()
                        }

                        Err(err) => {
                            $crate::tracing::error!(err = %err);
                            $crate::axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
                        }
                    }
                }
            },
        )
    }};

    ($provider_type:ty, login_url = $login_url:expr) => {
        $crate::login_required!(
            $provider_type,
            login_url = $login_url,
            redirect_field = "next"
        )
    };
}

/// Guest-only middleware.
///
/// Logged in users are redirected away, to the given URL or else to the
/// configured `routes.after_login`.
#[macro_export]
macro_rules! guest_only {
    ($provider_type:ty) => {{
        use $crate::axum::{
            extract::Request,
            middleware::{from_fn, Next},
            response::{IntoResponse, Redirect},
        };

        from_fn(
            |auth_session: $crate::AuthSession<$provider_type>, req: Request, next: Next| async move {
                if auth_session.is_logged().await {
                    Redirect::to(&auth_session.config().routes.after_login).into_response()
                } else {
                    next.run(req).await
                }
            },
        )
    }};

    ($provider_type:ty, redirect_to = $redirect_to:expr) => {{
        use $crate::axum::{
            extract::Request,
            middleware::{from_fn, Next},
            response::{IntoResponse, Redirect},
        };

        from_fn(
            |auth_session: $crate::AuthSession<$provider_type>, req: Request, next: Next| async move {
                if auth_session.is_logged().await {
                    Redirect::to($redirect_to).into_response()
                } else {
                    next.run(req).await
                }
            },
        )
    }};
}
