//! 核心错误处理模块

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, warn};

/// 核心错误类型
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    /// 业务规则不允许，例如分类下仍有设备
    #[error("{0}")]
    Business(String),
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    InternalServerError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// 错误响应结构
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
    pub timestamp: String,
}

impl CoreError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        CoreError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    pub fn business(msg: impl Into<String>) -> Self {
        CoreError::Business(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        CoreError::Forbidden(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        CoreError::Unauthorized(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            CoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Business(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Database(_) | CoreError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            CoreError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// 返回给客户端的提示，数据库错误不暴露细节
    pub fn client_message(&self) -> String {
        match self {
            CoreError::Database(_) => "数据库操作失败".to_string(),
            other => other.to_string(),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            CoreError::BadRequest(_) => "BAD_REQUEST",
            CoreError::Unauthorized(_) => "UNAUTHORIZED",
            CoreError::Forbidden(_) => "FORBIDDEN",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::Business(_) => "BUSINESS_ERROR",
            CoreError::Database(_) => "DATABASE_ERROR",
            CoreError::Upstream(_) => "UPSTREAM_ERROR",
            CoreError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            CoreError::Database(e) => {
                error!("Database error: {:?}", e);
                "数据库操作失败".to_string()
            }
            CoreError::InternalServerError(msg) => {
                error!("Internal error: {}", msg);
                msg.clone()
            }
            CoreError::Upstream(msg) => {
                warn!("Upstream error: {}", msg);
                msg.clone()
            }
            other => other.to_string(),
        };

        let error_response = ErrorResponse {
            error: self.error_code().to_string(),
            message,
            code: status.as_u16(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, axum::Json(error_response)).into_response()
    }
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("{} 参数无效", field),
                })
            })
            .collect();
        messages.sort();

        CoreError::BadRequest(messages.join("; "))
    }
}

impl From<JsonRejection> for CoreError {
    fn from(rejection: JsonRejection) -> Self {
        warn!("JSON rejection: {}", rejection.body_text());
        CoreError::BadRequest("参数解析失败".to_string())
    }
}

impl From<QueryRejection> for CoreError {
    fn from(rejection: QueryRejection) -> Self {
        warn!("Query rejection: {}", rejection.body_text());
        CoreError::BadRequest("参数解析失败".to_string())
    }
}

impl From<PathRejection> for CoreError {
    fn from(rejection: PathRejection) -> Self {
        warn!("Path rejection: {}", rejection.body_text());
        CoreError::BadRequest("参数解析失败".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1, message = "名称不能为空"))]
        name: String,
        #[validate(range(min = 1))]
        count: i64,
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            CoreError::bad_request("x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CoreError::business("x").status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            CoreError::Database(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            CoreError::Upstream("wx".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_validation_errors_are_joined() {
        let sample = Sample {
            name: String::new(),
            count: 0,
        };
        let err: CoreError = sample.validate().unwrap_err().into();

        match err {
            CoreError::BadRequest(msg) => {
                assert!(msg.contains("名称不能为空"));
                assert!(msg.contains("count 参数无效"));
                assert!(msg.contains("; "));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_database_error_hides_details() {
        let response = CoreError::Database(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "DATABASE_ERROR");
        assert_eq!(json["message"], "数据库操作失败");
        assert_eq!(json["code"], 500);
    }
}
