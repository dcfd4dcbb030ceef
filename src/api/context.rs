//! Request identity context
//!
//! Every federation request passes through the caller middleware before
//! reaching a handler. The middleware buffers the body (needed for
//! digest verification), resolves the signing account, and attaches it
//! as a request extension. Handlers read the identity through
//! `Extension<Caller>`; unauthenticated requests carry the anonymous
//! account.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::domain::Account;
use crate::error::AppError;
use crate::AppState;

/// Request body cap, shared with digest verification
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// The acting identity of the current request
#[derive(Debug, Clone)]
pub struct Caller(pub Account);

/// Resolve the caller from the request signature and attach it
pub async fn attach_caller(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();

    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return AppError::NotValid(format!("unable to read request body: {err}"))
                .into_response()
        }
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());
    let body_for_digest = (!bytes.is_empty()).then_some(&bytes[..]);

    let account = state
        .resolver
        .resolve(
            parts.method.as_str(),
            &path_and_query,
            &parts.headers,
            body_for_digest,
        )
        .await;

    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(Caller(account));
    next.run(request).await
}
