//! 图片数据模型

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::error::AppError;

/// 图片加载状态
///
/// Waiting → Preparing → Loading → {Loaded, Failed}，Failed 可重试回到 Preparing。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ImageLoadingState {
    #[default]
    Waiting,
    Preparing,
    Loading,
    Loaded,
    Failed,
}

impl ImageLoadingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageLoadingState::Waiting => "waiting",
            ImageLoadingState::Preparing => "preparing",
            ImageLoadingState::Loading => "loading",
            ImageLoadingState::Loaded => "loaded",
            ImageLoadingState::Failed => "failed",
        }
    }
}

impl fmt::Display for ImageLoadingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 图片密钥，页面 URL 中的 10 位十六进制串
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageKey(pub u64);

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010x}", self.0)
    }
}

impl FromStr for ImageKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 16 {
            return Err(AppError::Parse(format!("无效的图片密钥: {}", s)));
        }
        u64::from_str_radix(s, 16)
            .map(ImageKey)
            .map_err(|_| AppError::Parse(format!("无效的图片密钥: {}", s)))
    }
}

/// 图片缓存记录（images 表的一行）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// 所属画廊 ID
    pub owner_id: i64,
    /// 页码（从 1 开始）
    pub page_id: u32,
    /// 图片密钥
    pub image_key: ImageKey,
    /// 画廊目录下的文件名
    pub file_name: String,
    /// 是否为原图
    pub original_loaded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_key_round_trips_through_hex() {
        let key: ImageKey = "0a1b2c3d4e".parse().unwrap();
        assert_eq!(key.0, 0x0a1b2c3d4e);
        assert_eq!(key.to_string(), "0a1b2c3d4e");

        assert_eq!(ImageKey(0xff).to_string(), "00000000ff");
        assert!("xyz".parse::<ImageKey>().is_err());
        assert!("".parse::<ImageKey>().is_err());
    }

    #[test]
    fn state_serializes_lowercase() {
        let json = serde_json::to_string(&ImageLoadingState::Preparing).unwrap();
        assert_eq!(json, "\"preparing\"");
        assert_eq!(ImageLoadingState::default(), ImageLoadingState::Waiting);
    }
}
