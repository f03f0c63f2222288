//! ExViewer 工具模块
//!
//! 包含错误类型、文件名净化和 HTML 文本处理

pub mod error;
pub mod html;
pub mod sanitize;

pub use error::*;
pub use html::*;
pub use sanitize::*;
