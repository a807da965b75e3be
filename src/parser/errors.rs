use thiserror::Error;

use crate::common::client::error::ApiError;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("无效的课程URL: {0}")]
    InvalidUrl(String),
    #[error("未找到课程: {0}")]
    CourseNotFound(String),
    #[error("无效的范围: {0}")]
    InvalidRange(String),
    #[error("播放列表解析失败: {0}")]
    Manifest(String),
    #[error("未找到外部工具: {0}")]
    ToolMissing(String),
    #[error("解析错误: {0}")]
    ParseError(String),
    #[error("API错误: {0}")]
    ApiError(#[from] ApiError),
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::ParseError(err.to_string())
    }
}

impl ParseError {
    /// 这些错误意味着整个运行无法继续
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ParseError::CourseNotFound(_)
                | ParseError::ToolMissing(_)
                | ParseError::ApiError(ApiError::AuthRequired)
                | ParseError::ApiError(ApiError::AccessDenied(_))
                | ParseError::ApiError(ApiError::RetryExhausted { .. })
        )
    }
}
