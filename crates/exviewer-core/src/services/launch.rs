//! 站内标签与上传者链接
//!
//! 画廊页上的 `<root>/tag/<namespace>:<content>` 和 `<root>/uploader/<name>`
//! 链接在客户端内打开为对应的搜索。

use percent_encoding::percent_decode_str;
use reqwest::Url;
use serde::Serialize;

use crate::utils::error::{AppError, AppResult};

/// 站点承认的标签命名空间
pub const TAG_NAMESPACES: &[&str] = &[
    "reclass",
    "language",
    "parody",
    "character",
    "group",
    "artist",
    "cosplayer",
    "male",
    "female",
    "mixed",
    "other",
    "misc",
];

/// 可转为搜索的链接
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SearchLaunch {
    Tag { namespace: String, content: String },
    Uploader { name: String },
}

impl SearchLaunch {
    /// 识别链接；路径不是恰好两段或标签无效时返回 `None`
    pub fn from_uri(uri: &Url) -> Option<Self> {
        let segments: Vec<&str> = uri.path_segments()?.filter(|s| !s.is_empty()).collect();
        let [kind, value] = segments.as_slice() else {
            return None;
        };
        let value = unescape(value)?;
        match *kind {
            "tag" => parse_tag(value.trim_end_matches('$')),
            "uploader" if !value.trim().is_empty() => Some(Self::Uploader { name: value }),
            _ => None,
        }
    }

    /// 从字符串解析链接
    pub fn parse(uri: &str) -> AppResult<Self> {
        let parsed = Url::parse(uri)
            .map_err(|e| AppError::InvalidArgument(format!("无效的地址 {}: {}", uri, e)))?;
        Self::from_uri(&parsed)
            .ok_or_else(|| AppError::InvalidArgument(format!("不支持的链接: {}", uri)))
    }

    /// 站点搜索关键字
    ///
    /// 标签使用精确匹配（结尾的 `$`）。
    pub fn query(&self) -> String {
        match self {
            Self::Tag { namespace, content } => format!("{}:\"{}$\"", namespace, content),
            Self::Uploader { name } => format!("uploader:\"{}\"", name),
        }
    }
}

/// 路径段中的 `+` 表示空格
fn unescape(segment: &str) -> Option<String> {
    let spaced = segment.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

/// `namespace:content`，没有命名空间时归入 `misc`
fn parse_tag(value: &str) -> Option<SearchLaunch> {
    let (namespace, content) = match value.split_once(':') {
        Some((ns, content)) => (ns.trim().to_lowercase(), content.trim()),
        None => ("misc".to_string(), value.trim()),
    };
    if content.is_empty() || !TAG_NAMESPACES.contains(&namespace.as_str()) {
        return None;
    }
    Some(SearchLaunch::Tag {
        namespace,
        content: content.to_string(),
    })
}
