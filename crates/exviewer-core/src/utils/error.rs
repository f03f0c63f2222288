//! ExViewer 错误处理模块
//!
//! 定义核心库错误类型

use serde::Serialize;
use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 数据库错误
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 图像处理错误
    #[error("图像处理错误: {0}")]
    Image(#[from] image::ImageError),

    /// 网络请求错误
    #[error("网络错误: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON 序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 页面解析失败
    #[error("页面解析失败: {0}")]
    Parse(String),

    /// 服务器返回了意料之外的内容（例如图片请求返回 HTML）
    #[error("无效的响应: {0}")]
    InvalidResponse(String),

    /// 参数错误
    #[error("参数错误: {0}")]
    InvalidArgument(String),

    /// 记录未找到
    #[error("未找到: {0}")]
    NotFound(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 操作被取消
    #[error("操作已取消")]
    Cancelled,

    /// 通用错误
    #[error("{0}")]
    General(String),
}

impl AppError {
    /// 是否为取消错误（取消不视为加载失败）
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }

    /// 复制一份错误用于广播给多个等待者
    ///
    /// 底层错误类型大多无法 Clone，这里保留分类并转为文本。
    pub fn to_shared(&self) -> AppError {
        match self {
            AppError::Cancelled => AppError::Cancelled,
            AppError::Parse(s) => AppError::Parse(s.clone()),
            AppError::InvalidResponse(s) => AppError::InvalidResponse(s.clone()),
            AppError::InvalidArgument(s) => AppError::InvalidArgument(s.clone()),
            AppError::NotFound(s) => AppError::NotFound(s.clone()),
            AppError::Config(s) => AppError::Config(s.clone()),
            other => AppError::General(other.to_string()),
        }
    }

    /// 锁中毒时的统一转换
    pub(crate) fn poisoned<E: std::fmt::Display>(e: E) -> AppError {
        AppError::General(format!("锁已中毒: {}", e))
    }
}

/// 用于前端命令返回的错误包装
#[derive(Debug, Serialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

impl From<AppError> for CommandError {
    fn from(err: AppError) -> Self {
        let code = match &err {
            AppError::Database(_) => "E_DB_ERROR",
            AppError::Io(_) => "E_IO_ERROR",
            AppError::Image(_) => "E_IMAGE_ERROR",
            AppError::Http(_) => "E_HTTP_ERROR",
            AppError::Json(_) => "E_JSON_ERROR",
            AppError::Parse(_) => "E_PARSE",
            AppError::InvalidResponse(_) => "E_INVALID_RESPONSE",
            AppError::InvalidArgument(_) => "E_INVALID_ARGUMENT",
            AppError::NotFound(_) => "E_NOT_FOUND",
            AppError::Config(_) => "E_CONFIG",
            AppError::Cancelled => "E_CANCELLED",
            AppError::General(_) => "E_GENERAL",
        };

        CommandError {
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for CommandError {}

/// 应用程序结果类型别名
pub type AppResult<T> = Result<T, AppError>;
