//! ExViewer 命令模块
//!
//! 每个子命令对应一个函数，返回可序列化的结果或 `CommandError`

pub mod gallery;
pub mod image;
pub mod search;
pub mod settings;

pub use gallery::*;
pub use image::*;
pub use search::*;
pub use settings::*;

use exviewer_core::{CommandError, ConnectionStrategy};

use crate::AppState;

/// 解析命令行给出的连接策略，未给出时使用设置中的策略
pub(crate) fn resolve_strategy(
    state: &AppState,
    strategy: Option<&str>,
) -> Result<ConnectionStrategy, CommandError> {
    match strategy {
        None => Ok(state.core.settings().connection_strategy),
        Some(s) => Ok(s.parse::<ConnectionStrategy>()?),
    }
}
