//! 页面解析
//!
//! 从列表页和单页 HTML 中提取页数、缩略图拼图坐标、图片地址和重试令牌。

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::models::ImageKey;
use crate::utils::error::{AppError, AppResult};

fn selector(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("valid selector"))
}

fn image_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "#img")
}

fn original_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "#i7 a")
}

fn load_fail_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "#loadfail")
}

fn pager_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, r#"td[onclick="document.location=this.firstChild.href"]"#)
}

fn thumb_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "#gdt div.gdtm > div")
}

fn link_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "a[href]")
}

fn fail_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"return\s+nl\(\s*'(.+?)'\s*\)").expect("fail token regex is valid")
    })
}

fn pic_info_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"width:\s*(\d+)px;\s*height:\s*(\d+)px;.*url\((.+)\)\s*-\s*(\d+)px")
            .expect("pic info regex is valid")
    })
}

fn img_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/s/([0-9a-f]+)/(\d+)-(\d+)").expect("img link regex is valid"))
}

fn first_attr(document: &Html, selector: &Selector, attr: &str) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// 单页解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePageInfo {
    /// 页面展示的图片地址
    pub image_uri: String,
    /// 原图地址（没有“下载原图”链接时为 None）
    pub original_uri: Option<String>,
    /// 加载失败时可用于换源的令牌
    pub fail_token: Option<String>,
}

/// 解析单页 HTML
pub fn parse_image_page(html: &str) -> AppResult<ImagePageInfo> {
    let document = Html::parse_document(html);

    let image_uri = first_attr(&document, image_selector(), "src")
        .ok_or_else(|| AppError::Parse("单页中没有找到图片".to_string()))?;
    let original_uri = first_attr(&document, original_selector(), "href");
    let fail_token = first_attr(&document, load_fail_selector(), "onclick").and_then(|onclick| {
        fail_token_regex()
            .captures(&onclick)
            .map(|caps| caps[1].to_string())
    });

    Ok(ImagePageInfo {
        image_uri,
        original_uri,
        fail_token,
    })
}

/// 解析列表页的最大页数（分页控件中数字的最大值，默认为 1）
pub fn parse_page_count(html: &str) -> u32 {
    let document = Html::parse_document(html);
    document
        .select(pager_selector())
        .filter_map(|td| td.text().collect::<String>().trim().parse::<u32>().ok())
        .max()
        .unwrap_or(1)
}

/// 拼图中的一个缩略图位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbSlot {
    /// 页码（从 1 开始）
    pub page_id: u32,
    pub image_key: ImageKey,
    pub width: u32,
    pub height: u32,
    /// 在拼图中的水平偏移
    pub offset_x: u32,
}

/// 共用同一张背景图的缩略图组
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteGroup {
    pub uri: String,
    pub slots: Vec<ThumbSlot>,
}

/// 解析列表页中的缩略图拼图
///
/// 按背景图地址分组，组按首次出现排序，组内保持文档顺序。
pub fn parse_thumbnail_sprites(html: &str) -> Vec<SpriteGroup> {
    let document = Html::parse_document(html);
    let mut sheets: Vec<SpriteGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in document.select(thumb_selector()) {
        let Some((uri, slot)) = thumb_slot(item) else {
            continue;
        };
        let i = *index.entry(uri.clone()).or_insert_with(|| {
            sheets.push(SpriteGroup {
                uri,
                slots: Vec::new(),
            });
            sheets.len() - 1
        });
        sheets[i].slots.push(slot);
    }

    sheets
}

fn thumb_slot(item: ElementRef<'_>) -> Option<(String, ThumbSlot)> {
    let style = item.value().attr("style")?;
    let href = item.select(link_selector()).next()?.value().attr("href")?;
    build_slot(style, href)
}

fn build_slot(style: &str, href: &str) -> Option<(String, ThumbSlot)> {
    let pic = pic_info_regex().captures(style)?;
    let link = img_link_regex().captures(href)?;

    let uri = pic[3].trim().trim_matches(['"', '\'']).to_string();
    let slot = ThumbSlot {
        page_id: link[3].parse().ok()?,
        image_key: link[1].parse().ok()?,
        width: pic[1].parse().ok()?,
        height: pic[2].parse::<u32>().ok()?.saturating_sub(1),
        offset_x: pic[4].parse().ok()?,
    };
    Some((uri, slot))
}
