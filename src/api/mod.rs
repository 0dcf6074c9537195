//! REST API 客户端模块
//!
//! 所有请求共用一条发送路径：
//! - 存在令牌时附加 `Authorization: Bearer <token>`
//! - 401 响应：清除会话并返回 `ApiError::Unauthorized`，不论是哪个请求触发
//! - 其余非 2xx：优先取 FastAPI 的 `detail` 字段作为错误信息
//!
//! 不设超时、不重试、请求不可取消。
//!
//! ## 子模块
//! - `auth`: 登录、注册、当前用户
//! - `medicines`: 药品与分类
//! - `orders`: 订单、状态推进、配送凭证、跟踪
//! - `prescriptions`: 处方上传与审核
//! - `users`: 用户资料与用户列表

mod auth;
mod medicines;
mod orders;
mod prescriptions;
mod users;

pub use medicines::MedicineQuery;
pub use orders::OrderQuery;
pub use prescriptions::PrescriptionUpload;
pub use users::UserQuery;

use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::session::SessionState;

// ============================================================================
// 错误类型
// ============================================================================

/// API 错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// 令牌缺失或失效，会话已被清除
    #[error("Session expired, please log in again")]
    Unauthorized,

    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    Decode(String),

    /// 上传前的本地文件检查失败（不会发出请求）
    #[error("{0}")]
    InvalidFile(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl ApiError {
    /// HTTP 状态码（非 HTTP 错误返回 `None`）
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ============================================================================
// 客户端
// ============================================================================

/// REST API 客户端（可克隆，克隆体共享连接池与会话）
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    session: Arc<SessionState>,
}

impl ApiClient {
    /// `base_url` 包含 `/api/v1` 前缀
    pub fn new(base_url: &str, session: Arc<SessionState>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: Arc::from(base_url.trim_end_matches('/')),
            session,
        }
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// 发送请求并检查状态码
    async fn execute(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(url = %response.url(), "请求返回 401");
            self.session.invalidate();
            return Err(ApiError::Unauthorized);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(status, &body);
        tracing::debug!(status = status.as_u16(), %message, "请求失败");
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.execute(builder).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// 从错误响应中提取提示信息
///
/// - `{"detail": "..."}` → 原样
/// - `{"detail": [{"msg": "..."}, ...]}`（422 校验错误）→ 以 "; " 连接
/// - `{"message": "..."}` → 原样
/// - 其余 → `Request failed with status code N`
fn error_message(status: StatusCode, body: &str) -> String {
    let fallback = || format!("Request failed with status code {}", status.as_u16());

    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return fallback();
    };

    match value.get("detail") {
        Some(serde_json::Value::String(detail)) => return detail.clone(),
        Some(serde_json::Value::Array(entries)) => {
            let messages: Vec<&str> = entries
                .iter()
                .filter_map(|e| e.get("msg").and_then(|m| m.as_str()))
                .collect();
            if !messages.is_empty() {
                return messages.join("; ");
            }
        }
        _ => {}
    }

    value
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(fallback)
}

/// 上传文件大小上限（10 MB）
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// 待上传文件
struct Upload {
    file_name: String,
    mime: String,
    bytes: Vec<u8>,
}

impl Upload {
    fn into_form(self) -> Result<Form, ApiError> {
        let part = Part::bytes(self.bytes)
            .file_name(self.file_name)
            .mime_str(&self.mime)
            .map_err(|e| ApiError::InvalidFile(e.to_string()))?;
        Ok(Form::new().part("file", part))
    }
}

/// 读取并检查待上传文件
///
/// 类型按扩展名判断，`accept` 不通过时返回 `type_error`；超过 10 MB 拒绝
async fn read_upload(
    path: &Path,
    accept: impl Fn(&str) -> bool,
    type_error: &str,
) -> Result<Upload, ApiError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| ApiError::InvalidFile(format!("Invalid file path: {}", path.display())))?;

    let mime = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    if !accept(&mime) {
        return Err(ApiError::InvalidFile(type_error.to_string()));
    }

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| ApiError::InvalidFile(format!("Failed to read {}: {}", file_name, e)))?;
    if metadata.len() > MAX_UPLOAD_BYTES {
        return Err(ApiError::InvalidFile(
            "File size too large. Maximum 10MB allowed".to_string(),
        ));
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ApiError::InvalidFile(format!("Failed to read {}: {}", file_name, e)))?;

    Ok(Upload {
        file_name,
        mime,
        bytes,
    })
}
