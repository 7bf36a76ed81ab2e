use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::mention::Violation;

#[derive(Debug, Clone)]
pub struct InvalidRequest(pub Violation);

impl IntoResponse for InvalidRequest {
    fn into_response(self) -> Response {
        IntoResponse::into_response((
            StatusCode::BAD_REQUEST,
            format!("Invalid request: {}", self.0),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminError {
    /// No admin token is configured.
    Disabled,

    Unauthorized,
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        match self {
            Self::Disabled => IntoResponse::into_response((
                StatusCode::FORBIDDEN,
                "Triage was disabled in the config",
            )),

            Self::Unauthorized => {
                IntoResponse::into_response((StatusCode::UNAUTHORIZED, "Invalid admin token"))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MentionNotFound {
    pub key: String,
}

impl IntoResponse for MentionNotFound {
    fn into_response(self) -> Response {
        let key = self.key;

        IntoResponse::into_response((
            StatusCode::NOT_FOUND,
            format!("There is no mention `{key}`"),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct InvalidState(pub String);

impl IntoResponse for InvalidState {
    fn into_response(self) -> Response {
        IntoResponse::into_response((StatusCode::BAD_REQUEST, format!("Invalid state: {}", self.0)))
    }
}
