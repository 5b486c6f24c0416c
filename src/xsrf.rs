//! XSRF (Cross-Site Request Forgery) protection middleware and utilities.
//!
//! Every session carries its own token. Requests without a session are
//! checked against a per-process anonymous token, which is what the login
//! and signup forms render.

use axum::body::Body;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::auth::SESSION_COOKIE;
use crate::state::AppState;

/// The header name for XSRF tokens in AJAX/HTMX requests.
pub const XSRF_HEADER: &str = "X-XSRF-Token";

/// The form field name for XSRF tokens in form submissions. Multipart
/// uploads carry it as a query parameter of the same name.
pub const XSRF_FORM_FIELD: &str = "_xsrf_token";

/// Form bodies larger than this are rejected before the token is read.
const MAX_FORM_BODY: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct XsrfToken(Arc<String>);

impl XsrfToken {
    /// Generate a new random XSRF token.
    pub fn generate() -> Self {
        Self(Arc::new(Uuid::new_v4().to_string()))
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

/// Token expected for a request: the session's when the cookie names a
/// live session, the anonymous one otherwise.
pub fn expected_token(state: &AppState, cookies: &Cookies) -> String {
    cookies
        .get(SESSION_COOKIE)
        .and_then(|c| state.sessions.get(c.value()))
        .map(|s| s.xsrf_token)
        .unwrap_or_else(|| state.anon_xsrf.value().to_string())
}

/// Middleware that validates XSRF tokens on state-changing requests.
pub async fn xsrf_middleware(
    State(state): State<AppState>,
    cookies: Cookies,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !matches!(
        *request.method(),
        Method::POST | Method::PUT | Method::DELETE | Method::PATCH
    ) {
        return next.run(request).await;
    }

    let expected = expected_token(&state, &cookies);

    // Header first (HTMX/AJAX requests)
    if let Some(token) = request
        .headers()
        .get(XSRF_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        if token == expected {
            return next.run(request).await;
        }
        return xsrf_error_response();
    }

    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let (parts, body) = request.into_parts();
        let bytes = match axum::body::to_bytes(body, MAX_FORM_BODY).await {
            Ok(b) => b,
            Err(_) => return xsrf_error_response(),
        };

        let Ok(body_str) = std::str::from_utf8(&bytes) else {
            return xsrf_error_response();
        };

        let form_token = form_decode::parse(body_str)
            .find(|(key, _)| key == XSRF_FORM_FIELD)
            .map(|(_, value)| value.into_owned());

        if form_token.as_deref() == Some(expected.as_str()) {
            return next.run(Request::from_parts(parts, Body::from(bytes))).await;
        }
        return xsrf_error_response();
    }

    if content_type.starts_with("multipart/form-data") {
        let query_token = request.uri().query().and_then(|q| {
            form_decode::parse(q)
                .find(|(key, _)| key == XSRF_FORM_FIELD)
                .map(|(_, value)| value.into_owned())
        });
        if query_token.as_deref() == Some(expected.as_str()) {
            return next.run(request).await;
        }
    }

    xsrf_error_response()
}

fn xsrf_error_response() -> Response {
    tracing::warn!("Rejected request with invalid or missing XSRF token");
    (StatusCode::FORBIDDEN, "Invalid or missing XSRF token").into_response()
}

/// Simple form decoding helper module
mod form_decode {
    use std::borrow::Cow;

    /// Parse URL-encoded form data
    pub fn parse(input: &str) -> impl Iterator<Item = (Cow<'_, str>, Cow<'_, str>)> {
        input.split('&').filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((decode(key), decode(value)))
        })
    }

    fn decode(input: &str) -> Cow<'_, str> {
        if !input.contains('%') && !input.contains('+') {
            return Cow::Borrowed(input);
        }
        let plus_decoded = input.replace('+', " ");
        match urlencoding::decode(&plus_decoded) {
            Ok(decoded) => Cow::Owned(decoded.into_owned()),
            Err(_) => Cow::Owned(plus_decoded),
        }
    }

}
