//! Owner identification middleware

use axum::{
    body::Body,
    extract::Request,
    http::HeaderName,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::{ApiError, Result};

/// Header carrying the opaque owner id set by the upstream auth layer.
pub const OWNER_HEADER: HeaderName = HeaderName::from_static("x-owner-id");

/// Authenticated owner stored in request extensions
#[derive(Clone, Copy, Debug)]
pub struct AuthenticatedOwner {
    pub owner_id: Uuid,
}

/// Owner middleware - extracts the owner id from the `X-Owner-Id` header
pub async fn owner_middleware(mut request: Request<Body>, next: Next) -> Result<Response> {
    let raw = request
        .headers()
        .get(&OWNER_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing X-Owner-Id header".to_string()))?;

    let owner_id = Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::Unauthorized("Invalid X-Owner-Id header".to_string()))?;

    request
        .extensions_mut()
        .insert(AuthenticatedOwner { owner_id });

    Ok(next.run(request).await)
}
