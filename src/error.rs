use axum::extract::{rejection::JsonRejection, Json};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::env;
use std::fmt::Debug;

#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub code: i32,
    pub message: String,
}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        Error::config_error(err)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::database_error(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization_error(err)
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::invalid_input_error(rejection.body_text())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match self.code {
            1..=99 => {
                tracing::error!(code = self.code, message = %self.message, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
            102 => (StatusCode::NOT_FOUND, self.message.as_str()),
            _ => (StatusCode::BAD_REQUEST, self.message.as_str()),
        };

        let body = Json(json!({
            "code": self.code,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl Error {
    pub fn invalid_state_error(message: impl Into<String>) -> Self {
        Self {
            code: 100,
            message: message.into(),
        }
    }

    pub fn invalid_input_error(message: impl Into<String>) -> Self {
        Self {
            code: 101,
            message: message.into(),
        }
    }

    pub fn not_found_error(message: impl Into<String>) -> Self {
        Self {
            code: 102,
            message: message.into(),
        }
    }

    pub fn config_error<T: Debug>(err: T) -> Self {
        Self {
            code: 1,
            message: format!("configuration error: {:?}", err),
        }
    }

    pub fn database_error<T: Debug>(err: T) -> Self {
        Self {
            code: 2,
            message: format!("database error: {:?}", err),
        }
    }

    pub fn serialization_error<T: Debug>(err: T) -> Self {
        Self {
            code: 3,
            message: format!("serialization error: {:?}", err),
        }
    }

    pub fn server_error<T: Debug>(err: T) -> Self {
        Self {
            code: 4,
            message: format!("server error: {:?}", err),
        }
    }

    pub fn is_invalid_state_error(&self) -> bool {
        self.code == 100
    }

    pub fn is_invalid_input_error(&self) -> bool {
        self.code == 101
    }

    pub fn is_not_found_error(&self) -> bool {
        self.code == 102
    }
}

#[test]
fn status_codes() {
    let response = Error::not_found_error("Ride not found").into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = Error::invalid_state_error("closed").into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = Error::invalid_input_error("bad").into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = Error::database_error("pool timed out").into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
