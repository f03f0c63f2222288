//! 设置管理命令

use exviewer_core::{AppSettings, CommandError};

use crate::AppState;

/// 获取应用程序设置
pub fn get_settings(state: &AppState) -> Result<AppSettings, CommandError> {
    let settings = state.core.settings_manager().load()?;
    Ok(settings)
}

/// 重置设置为默认值
pub fn reset_settings(state: &AppState) -> Result<AppSettings, CommandError> {
    let settings = state.core.settings_manager().reset()?;
    tracing::info!("设置已重置");
    Ok(settings)
}
