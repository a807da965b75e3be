use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("网络请求失败: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("响应解析失败: {0}")]
    InvalidResponse(String),

    #[error("返回了HTML页面而不是JSON")]
    HtmlResponse(String),

    #[error("需要登录认证 (Bearer Token 或 Cookie)")]
    AuthRequired,

    #[error("访问被拒绝 ({0}): 未购买课程或登录信息已过期")]
    AccessDenied(u16),

    #[error("资源不存在: {0}")]
    NotFound(String),

    #[error("服务暂时不可用 ({0})，请稍后重试")]
    RetryLater(u16),

    #[error("请求失败 ({status}): {url}")]
    Status { status: u16, url: String },

    #[error("重试 {attempts} 次后仍然失败: {last}")]
    RetryExhausted { attempts: u32, last: String },

    #[error("无效的URL: {0}")]
    InvalidUrl(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidResponse(e.to_string())
    }
}

impl From<url::ParseError> for ApiError {
    fn from(e: url::ParseError) -> Self {
        Self::InvalidUrl(e.to_string())
    }
}

/// 区分临时性失败和永久性失败
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for ApiError {
    fn is_retryable(&self) -> bool {
        match self {
            ApiError::Reqwest(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ApiError::RetryLater(_) => true,
            ApiError::Status { status, .. } => *status == 429,
            _ => false,
        }
    }
}
