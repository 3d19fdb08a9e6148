use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use snafu::Snafu;

use crate::likes::LikeError;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ApiError {
    #[snafu(display("the like counter is unavailable right now, please try again later"))]
    Unavailable { source: LikeError },
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match &self {
            ApiError::Unavailable { source } => {
                tracing::error!(error = %source, "like counter request failed");
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
            }
        };

        let content = ErrorResponse {
            error,
            message: self.to_string(),
        };

        (status, Json(content)).into_response()
    }
}
