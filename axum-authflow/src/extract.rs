use std::convert::Infallible;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, Extensions, HeaderMap, Method, StatusCode, Uri},
};

use crate::{AuthSession, UserProvider};

#[async_trait]
impl<S, P> FromRequestParts<S> for AuthSession<P>
where
    S: Send + Sync,
    P: UserProvider,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthSession<_>>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "Can't extract auth session. Is `AuthManagerLayer` enabled?",
        ))
    }
}

/// What provider hooks get to see of the current request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request method.
    pub method: Method,
    /// Request URI.
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request extensions, e.g. state inserted by other layers.
    pub extensions: Extensions,
}

impl RequestContext {
    /// Copies the context out of request parts.
    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            extensions: parts.extensions.clone(),
        }
    }

    /// Whether the client asked for a JSON answer rather than a redirect.
    pub fn wants_json(&self) -> bool {
        let header_contains = |name: &'static str, needle: &str| {
            self.headers
                .get_all(name)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .any(|value| value.to_ascii_lowercase().contains(needle))
        };

        header_contains("x-requested-with", "xmlhttprequest")
            || header_contains("accept", "application/json")
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn cx(name: &str, value: &str) -> RequestContext {
        let request = Request::get("/").header(name, value).body(()).unwrap();
        RequestContext::from_parts(&request.into_parts().0)
    }

    #[test]
    fn detects_json_clients() {
        assert!(cx("X-Requested-With", "XMLHttpRequest").wants_json());
        assert!(cx("Accept", "text/html, application/json;q=0.9").wants_json());
        assert!(!cx("Accept", "text/html").wants_json());
    }
}
