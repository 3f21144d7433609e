//! Operation endpoint
//!
//! `POST /v1/operations` runs one support operation end to end. Failures are
//! returned with the correlation id so callers can find the audit record.

use crate::error::OperationFailure;
use crate::executor::SupportOperationResponse;
use crate::handlers::AppState;
use crate::operation::{CorrelationId, OperationBody};
use axum::{
    Extension, Json,
    extract::{FromRequest, Request, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;

/// JSON body rejection in the service's error format
///
/// - JSON syntax errors → 400 Bad Request
/// - Data validation errors → 422 Unprocessable Entity
/// - Missing content type → 415 Unsupported Media Type
pub struct BodyRejection {
    rejection: JsonRejection,
    correlation_id: Option<CorrelationId>,
}

impl IntoResponse for BodyRejection {
    fn into_response(self) -> Response {
        let rejection = &self.rejection;
        let (status, message) = match rejection {
            JsonRejection::JsonSyntaxError(_) => (StatusCode::BAD_REQUEST, rejection.body_text()),
            JsonRejection::JsonDataError(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text())
            }
            JsonRejection::MissingJsonContentType(_) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "Content-Type must be application/json".to_string(),
            ),
            _ => (StatusCode::BAD_REQUEST, rejection.body_text()),
        };
        let mut body = serde_json::json!({
            "error": message,
            "kind": "validation",
        });
        if let Some(id) = self.correlation_id {
            body["correlation_id"] = serde_json::json!(id);
        }
        (status, Json(body)).into_response()
    }
}

/// `Json` extractor that reports rejections as `BodyRejection`
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = BodyRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = req.extensions().get::<CorrelationId>().copied();
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(rejection) => {
                tracing::debug!(
                    correlation_id = ?correlation_id,
                    error = %rejection.body_text(),
                    "Rejected operation body"
                );
                Err(BodyRejection {
                    rejection,
                    correlation_id,
                })
            }
        }
    }
}

pub async fn handler(
    State(state): State<AppState>,
    Extension(correlation_id): Extension<CorrelationId>,
    ValidatedJson(body): ValidatedJson<OperationBody>,
) -> Result<Json<SupportOperationResponse>, OperationFailure> {
    let request = body.into_request(correlation_id);

    tracing::debug!(
        correlation_id = %correlation_id,
        class = %request.operation_class(),
        priority = %request.priority(),
        text_length = request.payload().text().len(),
        "Received operation"
    );

    state.executor().execute(request).await.map(Json)
}
