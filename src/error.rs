//! Error types for jmx-bridge
//!
//! This module defines the error types used throughout the application.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Rule 파싱 및 regex 관련 에러
#[derive(Error, Debug)]
pub enum RuleError {
    /// 정규식 패턴 컴파일 실패
    #[error("Invalid regex pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },

    /// 지원되지 않는 regex 문법
    #[error("Unsupported regex syntax in pattern '{pattern}': {feature}")]
    UnsupportedSyntax { pattern: String, feature: String },

    /// 필수 동반 필드 누락 (예: name 없이 labels 지정)
    #[error("Rule at index {index}: {reason}")]
    MissingCompanion { index: usize, reason: String },

    /// 유효하지 않은 valueFactor
    #[error("Rule at index {index}: valueFactor must be a finite number, got {factor}")]
    InvalidValueFactor { index: usize, factor: f64 },

    /// 규칙 컴파일 실패 (인덱스 포함)
    #[error("Failed to compile rule at index {index}: {source}")]
    RuleCompileFailed {
        index: usize,
        #[source]
        source: Box<RuleError>,
    },
}

/// Snapshot 변환 에러
///
/// Both cases indicate a rule configuration defect and are never masked.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// 동일한 라벨 셋을 가진 데이터 포인트가 둘 이상 존재
    #[error("Duplicate labels in metric '{metric}': {labels}")]
    DuplicateLabels { metric: String, labels: String },

    /// 하나의 데이터 포인트에 같은 라벨명이 두 번 등장
    #[error("Duplicate label name '{label}' in metric '{metric}'")]
    DuplicateLabelName { metric: String, label: String },
}

/// Exporter-level scrape errors that abort a response
#[derive(Error, Debug)]
pub enum ExporterError {
    /// startDelaySeconds has not elapsed yet
    #[error("Exporter is waiting for startDelaySeconds ({remaining_secs}s remaining)")]
    StartingUp { remaining_secs: u64 },

    /// Snapshot conversion failed
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Collector error
    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),

    /// Scrape error
    #[error("Scrape error: {0}")]
    Exporter(#[from] ExporterError),
}

/// Collector 모듈 에러 타입
#[derive(Error, Debug)]
pub enum CollectorError {
    /// HTTP 클라이언트 초기화 실패
    #[error("Failed to initialize HTTP client: {0}")]
    HttpClientInit(#[source] reqwest::Error),

    /// HTTP 요청 실패
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[source] reqwest::Error),

    /// HTTP 응답 읽기 실패
    #[error("Failed to read HTTP response: {0}")]
    HttpResponse(#[source] reqwest::Error),

    /// HTTP 상태 코드 에러
    #[error("HTTP error status: {0}")]
    HttpStatus(u16),

    /// JSON 파싱 에러
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// Jolokia 에러 응답
    #[error("Jolokia error (status {status}): {message}")]
    JolokiaError { status: u16, message: String },

    /// MBean을 찾을 수 없음
    #[error("MBean not found: {0}")]
    MBeanNotFound(String),

    /// 속성 읽기 실패
    #[error("Failed to read attribute '{attribute}' of {mbean}: {reason}")]
    AttributeRead {
        mbean: String,
        attribute: String,
        reason: String,
    },

    /// 잘못된 ObjectName
    #[error("Invalid ObjectName '{name}': {reason}")]
    InvalidObjectName { name: String, reason: String },

    /// 타임아웃
    /// The value is the configured timeout in milliseconds, if known.
    #[error("Request timed out{}", .0.map(|ms| format!(" after {}ms", ms)).unwrap_or_default())]
    Timeout(Option<u64>),

    /// 연결 실패
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// 인증 실패
    #[error("Authentication failed")]
    AuthenticationFailed,
}

impl CollectorError {
    /// 연결 수준의 실패인지 확인
    ///
    /// Connection-level failures abort a whole scrape and raise the scrape
    /// error flag. Everything else is scoped to a single bean.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            CollectorError::HttpClientInit(_)
                | CollectorError::HttpRequest(_)
                | CollectorError::Timeout(..)
                | CollectorError::ConnectionFailed(_)
                | CollectorError::AuthenticationFailed
        )
    }

    /// HTTP 상태 코드 추출
    pub fn http_status(&self) -> Option<u16> {
        match self {
            CollectorError::HttpStatus(code) => Some(*code),
            CollectorError::JolokiaError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Create a Timeout error with known duration
    pub fn timeout_with_duration(ms: u64) -> Self {
        CollectorError::Timeout(Some(ms))
    }

    pub(crate) fn invalid_object_name(name: &str, reason: impl Into<String>) -> Self {
        CollectorError::InvalidObjectName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for CollectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest doesn't expose the configured timeout duration.
            CollectorError::Timeout(None)
        } else if err.is_connect() {
            CollectorError::ConnectionFailed(err.to_string())
        } else if err.is_request() {
            CollectorError::HttpRequest(err)
        } else {
            CollectorError::HttpResponse(err)
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, public_message, log_message) = match self {
            AppError::Config(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error",
                e.to_string(),
            ),
            AppError::Collector(e) => (StatusCode::BAD_GATEWAY, "Collector error", e.to_string()),
            AppError::Exporter(ExporterError::StartingUp { remaining_secs }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Exporter is starting up",
                format!("start delay, {}s remaining", remaining_secs),
            ),
            AppError::Exporter(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Scrape error",
                e.to_string(),
            ),
        };

        tracing::error!(status = %status, error = %log_message, "Request failed");

        (status, public_message).into_response()
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;
