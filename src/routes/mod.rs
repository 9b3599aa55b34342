//! HTTP routes for Lapidary

pub mod health;
pub mod jobs;
pub mod live;
pub mod staking;

pub use health::{health_check, readiness_check, version_info};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::{LapidaryError, Result};

/// HTTP status an error maps to
pub fn status_for(err: &LapidaryError) -> StatusCode {
    match err {
        LapidaryError::Validation(_) => StatusCode::BAD_REQUEST,
        LapidaryError::Ownership(_) => StatusCode::FORBIDDEN,
        LapidaryError::NotFound(_) => StatusCode::NOT_FOUND,
        LapidaryError::Conflict(_)
        | LapidaryError::SlotsExhausted(_)
        | LapidaryError::StillRunning(_)
        | LapidaryError::InsufficientResource(_) => StatusCode::CONFLICT,
        LapidaryError::Database(_)
        | LapidaryError::Http(_)
        | LapidaryError::Nats(_)
        | LapidaryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// JSON error body for a service error
pub fn error_response(err: &LapidaryError) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": err.to_string() }).to_string();
    Response::builder()
        .status(status_for(err))
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Serialize a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(body)
        .unwrap_or_else(|_| r#"{"error":"serialization failed"}"#.to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// 404 for unmatched routes
pub fn not_found(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": format!("no route for {}", path) }).to_string();
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Collect and deserialize a JSON request body
pub async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T> {
    let bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|e| LapidaryError::Validation(format!("failed to read body: {}", e)))?
        .to_bytes();

    serde_json::from_slice(&bytes)
        .map_err(|e| LapidaryError::Validation(format!("invalid JSON body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses_follow_the_taxonomy() {
        assert_eq!(
            status_for(&LapidaryError::Validation("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&LapidaryError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&LapidaryError::Conflict("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&LapidaryError::InsufficientResource("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&LapidaryError::Ownership("x".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&LapidaryError::Database("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
