//! 画廊数据模型

use std::sync::OnceLock;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};

use crate::utils::html::decode_entities;

/// 画廊标识（API 请求中序列化为 `[id, "token"]`）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GalleryInfo {
    pub id: i64,
    pub token: String,
}

impl GalleryInfo {
    pub fn new(id: i64, token: impl Into<String>) -> Self {
        Self {
            id,
            token: token.into(),
        }
    }
}

impl Serialize for GalleryInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.id)?;
        tuple.serialize_element(&self.token)?;
        tuple.end()
    }
}

/// 画廊分类（与站点的分类位掩码一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    #[default]
    Unspecified,
    Misc,
    Doujinshi,
    Manga,
    ArtistCG,
    GameCG,
    ImageSet,
    Cosplay,
    AsianPorn,
    NonH,
    Western,
}

impl Category {
    /// API 返回的分类名（大小写不敏感）
    pub fn from_api_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "doujinshi" => Category::Doujinshi,
            "manga" => Category::Manga,
            "artist cg sets" | "artist cg" => Category::ArtistCG,
            "game cg sets" | "game cg" => Category::GameCG,
            "western" => Category::Western,
            "image sets" | "image set" => Category::ImageSet,
            "non-h" => Category::NonH,
            "cosplay" => Category::Cosplay,
            "asian porn" => Category::AsianPorn,
            "misc" => Category::Misc,
            _ => Category::Unspecified,
        }
    }

    /// 数据库中存储的位值
    pub fn bits(&self) -> u32 {
        match self {
            Category::Unspecified => 0,
            Category::Misc => 1,
            Category::Doujinshi => 2,
            Category::Manga => 4,
            Category::ArtistCG => 8,
            Category::GameCG => 16,
            Category::ImageSet => 32,
            Category::Cosplay => 64,
            Category::AsianPorn => 128,
            Category::NonH => 256,
            Category::Western => 512,
        }
    }

    pub fn from_bits(bits: u32) -> Self {
        match bits {
            1 => Category::Misc,
            2 => Category::Doujinshi,
            4 => Category::Manga,
            8 => Category::ArtistCG,
            16 => Category::GameCG,
            32 => Category::ImageSet,
            64 => Category::Cosplay,
            128 => Category::AsianPorn,
            256 => Category::NonH,
            512 => Category::Western,
            _ => Category::Unspecified,
        }
    }
}

/// 画廊元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryMetadata {
    pub id: i64,
    pub token: String,
    /// 画廊是否可用（API 报错或字段解析失败时为 false）
    pub available: bool,
    pub archiver_key: Option<String>,
    pub title: String,
    pub title_jpn: Option<String>,
    pub category: Category,
    pub uploader: String,
    pub posted: DateTime<Utc>,
    pub file_size: i64,
    pub expunged: bool,
    pub rating: f64,
    pub torrent_count: u32,
    /// 形如 `namespace:content` 的标签
    pub tags: Vec<String>,
    /// 图片总数
    pub record_count: u32,
    pub thumb_uri: String,
}

/// 技术性语言标签，不代表画廊语言
const TECHNICAL_TAGS: &[&str] = &["rewrite", "speechless", "text cleaned", "translated"];

impl GalleryMetadata {
    /// 仅有标识、尚未获取元数据的画廊
    pub fn unavailable(id: i64, token: impl Into<String>) -> Self {
        Self {
            id,
            token: token.into(),
            available: false,
            archiver_key: None,
            title: String::new(),
            title_jpn: None,
            category: Category::Unspecified,
            uploader: String::new(),
            posted: DateTime::<Utc>::default(),
            file_size: 0,
            expunged: false,
            rating: 0.0,
            torrent_count: 0,
            tags: Vec::new(),
            record_count: 0,
            thumb_uri: String::new(),
        }
    }

    pub fn info(&self) -> GalleryInfo {
        GalleryInfo::new(self.id, self.token.clone())
    }

    /// 画廊语言：第一个非技术性的 `language:` 标签，大写
    pub fn language(&self) -> Option<String> {
        self.tags
            .iter()
            .filter_map(|t| t.strip_prefix("language:"))
            .find(|c| !TECHNICAL_TAGS.contains(c))
            .map(|c| c.to_uppercase())
    }
}

/// `gdata` API 返回的单个画廊条目
///
/// 站点把数字字段以字符串返回，所以这里全部按原样接收再转换。
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ApiGallery {
    pub gid: i64,
    pub error: Option<String>,
    pub token: Option<String>,
    pub archiver_key: Option<String>,
    pub title: Option<String>,
    pub title_jpn: Option<String>,
    pub category: Option<String>,
    pub thumb: Option<String>,
    pub uploader: Option<String>,
    pub posted: Option<String>,
    pub filecount: Option<String>,
    pub filesize: i64,
    /// 缺失时视为已删除
    #[serde(default = "default_expunged")]
    pub expunged: bool,
    pub rating: Option<String>,
    pub torrentcount: Option<String>,
    pub tags: Vec<String>,
}

fn default_expunged() -> bool {
    true
}

impl ApiGallery {
    /// 转换为元数据；缺失或无法解析的字段使画廊标记为不可用
    pub fn into_metadata(self) -> GalleryMetadata {
        let token = self.token.clone().unwrap_or_default();
        let mut meta = GalleryMetadata::unavailable(self.gid, token);
        if self.error.is_some() {
            return meta;
        }

        match self.fill(&mut meta) {
            Some(()) => meta.available = !self.expunged,
            None => meta.available = false,
        }
        meta
    }

    fn fill(&self, meta: &mut GalleryMetadata) -> Option<()> {
        meta.archiver_key = self.archiver_key.clone();
        meta.title = decode_entities(self.title.as_deref()?);
        meta.title_jpn = self
            .title_jpn
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(decode_entities);
        meta.category = Category::from_api_name(self.category.as_deref()?);
        meta.uploader = decode_entities(self.uploader.as_deref().unwrap_or(""));
        let posted: i64 = self.posted.as_deref()?.trim().parse().ok()?;
        meta.posted = Utc.timestamp_opt(posted, 0).single()?;
        meta.record_count = self.filecount.as_deref()?.trim().parse().ok()?;
        meta.file_size = self.filesize;
        meta.expunged = self.expunged;
        meta.rating = self.rating.as_deref()?.trim().parse().ok()?;
        meta.torrent_count = self
            .torrentcount
            .as_deref()
            .and_then(|t| t.trim().parse().ok())
            .unwrap_or(0);
        meta.tags = self.tags.clone();
        meta.thumb_uri = to_ex_thumb_uri(self.thumb.as_deref()?);
        Some(())
    }
}

fn thumb_host_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(((gt\d|ul)\.ehgt\.org)|(ehgt\.org/t)|((\d{1,3}\.){3}\d{1,3}))(?P<body>.+)_l\.")
            .expect("thumb host regex is valid")
    })
}

/// 将公共缩略图地址改写为站点自身的 250px 缩略图地址
///
/// `gt0.ehgt.org/ab/cd/abcd-123_l.jpg` → `exhentai.org/t/ab/cd/abcd-123_250.jpg`
pub fn to_ex_thumb_uri(uri: &str) -> String {
    thumb_host_regex()
        .replace(uri, "exhentai.org/t${body}_250.")
        .into_owned()
}

/// 根据记录数计算列表页数
pub fn page_count(record_count: u32, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    record_count.div_ceil(page_size)
}

/// 保存画廊的进度
///
/// `image_loaded == -1` 表示仍在枚举列表页。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveGalleryProgress {
    pub image_loaded: i32,
    pub image_count: u32,
}

/// 已保存的画廊（saved_galleries 表的一行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedGallery {
    pub gallery_id: i64,
    pub saved_at: DateTime<Utc>,
    #[serde(skip)]
    pub thumb_data: Vec<u8>,
}
