//! Correlation id middleware
//!
//! Every request gets a `CorrelationId` in its extensions, taken from the
//! `x-correlation-id` header when the caller sent a valid UUID and generated
//! otherwise. The same id is echoed on the response so callers can look up
//! the audit record for an operation.

use crate::operation::CorrelationId;
use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use uuid::Uuid;

/// Correlation id header name
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

fn incoming_id(request: &Request) -> Option<CorrelationId> {
    let value = request.headers().get(CORRELATION_ID_HEADER)?;
    let parsed = Uuid::parse_str(value.to_str().ok()?.trim()).ok()?;
    Some(CorrelationId::from(parsed))
}

/// Attach a correlation id to the request and echo it on the response
pub async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = incoming_id(&request).unwrap_or_default();

    tracing::debug!(
        correlation_id = %correlation_id,
        method = %request.method(),
        uri = %request.uri(),
        "Incoming request"
    );

    request.extensions_mut().insert(correlation_id);

    let mut response = next.run(request).await;

    if let Ok(header_value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, header_value);
    }

    response
}
