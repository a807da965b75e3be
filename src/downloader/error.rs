use std::path::PathBuf;
use thiserror::Error;

use crate::common::client::error::ApiError;
use crate::parser::errors::ParseError;

use super::process::Tool;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP错误: {0}")]
    Api(#[from] ApiError),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("未找到 {0}，请安装后重试或通过参数指定路径")]
    ToolMissing(Tool),

    #[error("{tool} 执行失败 (退出码 {code:?}): {stderr}")]
    ToolFailed {
        tool: Tool,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} 执行成功但输出文件缺失或为空: {path:?}")]
    OutputMissing { tool: Tool, path: PathBuf },

    #[error("已取消")]
    Cancelled,
}

impl DownloadError {
    /// 致命错误会终止整个运行，其余错误只影响单个课时
    pub fn is_fatal(&self) -> bool {
        match self {
            DownloadError::ToolMissing(_) => true,
            DownloadError::Api(ApiError::AuthRequired) => true,
            DownloadError::Api(ApiError::AccessDenied(_)) => true,
            DownloadError::Api(ApiError::RetryExhausted { .. }) => true,
            DownloadError::Parse(e) => e.is_fatal(),
            _ => false,
        }
    }
}
