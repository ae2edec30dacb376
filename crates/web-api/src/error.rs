use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{DomainError, RepositoryError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.body.code
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::Domain(domain) => match domain {
                DomainError::Forbidden { action } => Self::new(
                    StatusCode::FORBIDDEN,
                    "FORBIDDEN",
                    format!("not allowed to {action}"),
                ),
                DomainError::NotFound {
                    resource_type,
                    resource_id,
                } => Self::new(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{resource_type} {resource_id} not found"),
                ),
                DomainError::InvalidInput { field, reason } => Self::new(
                    StatusCode::BAD_REQUEST,
                    "INVALID_INPUT",
                    format!("{field}: {reason}"),
                ),
                DomainError::SelfReference => Self::new(
                    StatusCode::BAD_REQUEST,
                    "SELF_REFERENCE",
                    "cannot target yourself",
                ),
                DomainError::AlreadyFriends => {
                    Self::new(StatusCode::CONFLICT, "ALREADY_FRIENDS", "already friends")
                }
                DomainError::DuplicateRequest => Self::new(
                    StatusCode::CONFLICT,
                    "DUPLICATE_REQUEST",
                    "a pending request already exists",
                ),
            },
            ApplicationError::Repository(repo) => match repo {
                RepositoryError::NotFound => {
                    Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", "entity not found")
                }
                RepositoryError::Conflict(message) => {
                    Self::new(StatusCode::CONFLICT, "CONFLICT", message)
                }
                RepositoryError::Storage(message) => {
                    tracing::error!(error = %message, "存储层错误");
                    Self::internal_server_error("storage failure")
                }
            },
            ApplicationError::Infrastructure(message) => {
                tracing::error!(error = %message, "基础设施错误");
                Self::internal_server_error("internal failure")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_rejections_map_to_client_errors() {
        let cases: Vec<(ApplicationError, StatusCode, &str)> = vec![
            (
                DomainError::forbidden("send message").into(),
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
            ),
            (
                DomainError::not_found("chat", "x").into(),
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
            ),
            (
                DomainError::invalid_input("kind", "unknown").into(),
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
            ),
            (
                DomainError::SelfReference.into(),
                StatusCode::BAD_REQUEST,
                "SELF_REFERENCE",
            ),
            (
                DomainError::AlreadyFriends.into(),
                StatusCode::CONFLICT,
                "ALREADY_FRIENDS",
            ),
            (
                DomainError::DuplicateRequest.into(),
                StatusCode::CONFLICT,
                "DUPLICATE_REQUEST",
            ),
        ];
        for (error, status, code) in cases {
            let api: ApiError = error.into();
            assert_eq!(api.status(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn storage_failures_are_opaque_500s() {
        let api: ApiError =
            ApplicationError::Repository(RepositoryError::storage("pg down")).into();
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.code(), "INTERNAL_ERROR");
    }
}
