//! 缩略图处理
//!
//! 列表页的缩略图是多张拼在一起的拼图，解码一次后按偏移裁剪；
//! 已下载的图片则直接从本地文件缩放生成缩略图。

use std::io::Cursor;
use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat, ImageReader};

use crate::utils::error::{AppError, AppResult};

/// 本地文件生成缩略图时的目标宽度
pub const THUMBNAIL_WIDTH: u32 = 180;

/// 已解码的缩略图拼图
pub struct SpriteSheet {
    image: DynamicImage,
}

impl SpriteSheet {
    pub fn decode(bytes: &[u8]) -> AppResult<Self> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self { image })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// 裁剪 `(x, y, width, height)` 区域并编码为 PNG，超出部分被截掉
    pub fn crop_png(&self, x: u32, y: u32, width: u32, height: u32) -> AppResult<Vec<u8>> {
        let (sheet_w, sheet_h) = self.image.dimensions();
        if x >= sheet_w || y >= sheet_h {
            return Err(AppError::InvalidArgument(format!(
                "裁剪区域 ({}, {}) 超出拼图 {}x{}",
                x, y, sheet_w, sheet_h
            )));
        }
        let width = width.min(sheet_w - x);
        let height = height.min(sheet_h - y);
        if width == 0 || height == 0 {
            return Err(AppError::InvalidArgument("裁剪区域为空".to_string()));
        }

        encode_png(&self.image.crop_imm(x, y, width, height))
    }
}

/// 从本地图片文件生成指定宽度的 PNG 缩略图（保持宽高比）
///
/// 文件名来自下载地址，扩展名不一定与内容一致，格式按文件头判断。
pub fn thumbnail_from_file(path: &Path, width: u32) -> AppResult<Vec<u8>> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    let (w, h) = img.dimensions();
    let width = width.max(1);
    let height = ((h as u64 * width as u64) / w.max(1) as u64).max(1) as u32;

    let thumbnail = if w <= width {
        img
    } else {
        img.resize_exact(width, height, FilterType::Triangle)
    };
    encode_png(&thumbnail)
}

fn encode_png(img: &DynamicImage) -> AppResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
