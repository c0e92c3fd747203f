use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug)]
pub enum WebError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
    Forbidden(String),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            WebError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            WebError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            WebError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
            WebError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg).into_response(),
        }
    }
}

impl From<std::io::Error> for WebError {
    fn from(err: std::io::Error) -> Self {
        WebError::Internal(format!("IO error: {err}"))
    }
}

impl From<serde_json::Error> for WebError {
    fn from(err: serde_json::Error) -> Self {
        WebError::Internal(format!("Blocklist config error: {err}"))
    }
}

impl From<axum::extract::multipart::MultipartError> for WebError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        WebError::BadRequest(format!("Malformed upload: {err}"))
    }
}
