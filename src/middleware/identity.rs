use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::models::Identity;

/// Numeric user id set by the upstream authentication layer
pub const USER_ID_HEADER: &str = "x-user-id";

/// Opaque token identifying an anonymous session
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Resolves the caller's identity from request headers.
///
/// Returns the identity and whether a new session token had to be minted.
pub fn resolve_identity(headers: &HeaderMap) -> (Identity, bool) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(user_id) = header(USER_ID_HEADER).and_then(|v| v.parse::<i64>().ok()) {
        return (Identity::User(user_id), false);
    }

    match header(SESSION_TOKEN_HEADER) {
        Some(token) => (Identity::Session(token.to_string()), false),
        None => (Identity::Session(Uuid::new_v4().to_string()), true),
    }
}

/// Stores the resolved [`Identity`] in request extensions.
///
/// A freshly minted session token is sent back in `x-session-token` so the
/// client can present it on later requests.
pub async fn identity_middleware(mut request: Request, next: Next) -> Response {
    let (identity, minted) = resolve_identity(request.headers());
    request.extensions_mut().insert(identity.clone());

    let mut response = next.run(request).await;

    if let (true, Identity::Session(token)) = (minted, &identity) {
        if let Ok(header_value) = HeaderValue::from_str(token) {
            response
                .headers_mut()
                .insert(SESSION_TOKEN_HEADER, header_value);
        }
    }

    response
}
