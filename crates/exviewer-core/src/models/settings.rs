//! 应用程序设置数据模型

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::error::AppError;

/// 图片连接策略：决定下载原图还是低清图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionStrategy {
    /// 始终下载低清图
    AllLofi,
    /// 按流量计费的网络下使用低清图
    #[default]
    LofiOnMetered,
    /// 始终下载原图
    AllFull,
}

impl ConnectionStrategy {
    /// 当前网络条件下是否必须使用低清图
    pub fn is_lofi_required(&self, metered: bool) -> bool {
        match self {
            ConnectionStrategy::AllLofi => true,
            ConnectionStrategy::LofiOnMetered => metered,
            ConnectionStrategy::AllFull => false,
        }
    }
}

impl FromStr for ConnectionStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "alllofi" | "lofi" => Ok(ConnectionStrategy::AllLofi),
            "lofionmetered" | "auto" => Ok(ConnectionStrategy::LofiOnMetered),
            "allfull" | "full" => Ok(ConnectionStrategy::AllFull),
            _ => Err(AppError::InvalidArgument(format!("未知的连接策略: {}", s))),
        }
    }
}

/// 应用程序设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// 站点根地址
    pub root_uri: String,
    /// API 地址
    pub api_uri: String,
    /// 图片连接策略
    pub connection_strategy: ConnectionStrategy,
    /// 当前是否为按流量计费的网络
    pub metered_connection: bool,
    /// 请求使用的 User-Agent
    pub user_agent: String,
    /// 登录 Cookie（原样放入请求头）
    pub cookie: Option<String>,
    /// 请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            root_uri: String::from("https://exhentai.org/"),
            api_uri: String::from("https://exhentai.org/api.php"),
            connection_strategy: ConnectionStrategy::default(),
            metered_connection: false,
            user_agent: concat!("exviewer/", env!("CARGO_PKG_VERSION")).to_string(),
            cookie: None,
            request_timeout_secs: 60,
        }
    }
}

impl AppSettings {
    /// 当前设置下是否需要低清图
    pub fn is_lofi_required(&self, strategy: ConnectionStrategy) -> bool {
        strategy.is_lofi_required(self.metered_connection)
    }
}
