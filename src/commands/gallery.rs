//! 画廊命令

use chrono::{DateTime, Utc};
use serde::Serialize;

use exviewer_core::paths::folder_stats;
use exviewer_core::{AppError, CommandError, Gallery, GalleryInfo, GalleryMetadata};

use super::image::ImageView;
use crate::AppState;

/// 画廊信息
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryView {
    #[serde(flatten)]
    pub metadata: GalleryMetadata,
    pub page_count: u32,
    pub language: Option<String>,
    pub saved_at: Option<DateTime<Utc>>,
}

impl GalleryView {
    fn from_gallery(gallery: &Gallery) -> Self {
        Self {
            metadata: gallery.metadata().clone(),
            page_count: gallery.page_count(),
            language: gallery.language(),
            saved_at: gallery.saved_at(),
        }
    }
}

/// 一个列表页的内容
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryPageView {
    pub gallery_id: i64,
    pub page_index: u32,
    pub page_count: u32,
    pub images: Vec<ImageView>,
}

/// 已保存画廊
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedGalleryView {
    pub gallery_id: i64,
    pub title: Option<String>,
    pub saved_at: DateTime<Utc>,
    pub thumb_size: usize,
}

/// 删除结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub gallery_id: i64,
    pub removed_files: u64,
    pub removed_bytes: u64,
}

/// 通过 API 获取画廊信息
pub async fn get_gallery_info(
    state: &AppState,
    gid: i64,
    token: &str,
) -> Result<GalleryView, CommandError> {
    let info = GalleryInfo::new(gid, token);
    let galleries = Gallery::fetch_galleries(state.core.context(), std::slice::from_ref(&info)).await?;
    let gallery = galleries
        .first()
        .ok_or_else(|| AppError::NotFound(format!("画廊 {}", gid)))?;
    Ok(GalleryView::from_gallery(gallery))
}

/// 获取一个列表页
pub async fn get_gallery_page(
    state: &AppState,
    gid: i64,
    token: &str,
    page_index: u32,
) -> Result<GalleryPageView, CommandError> {
    let mut gallery = state.core.open_gallery(gid, token).await?;
    let images = gallery.load_page(page_index).await?;

    Ok(GalleryPageView {
        gallery_id: gid,
        page_index,
        page_count: gallery.page_count(),
        images: images.iter().map(|img| ImageView::from_image(img)).collect(),
    })
}

/// 保存整本画廊
pub async fn save_gallery(
    state: &AppState,
    gid: i64,
    token: &str,
    strategy: Option<&str>,
) -> Result<GalleryView, CommandError> {
    let strategy = super::resolve_strategy(state, strategy)?;
    let mut gallery = state.core.open_gallery(gid, token).await?;

    let jobs = state.core.jobs();
    let cancel = jobs.start_job();
    let result = gallery.save_gallery(strategy, &cancel).await;
    jobs.complete_job(cancel.job_id());

    result?;
    Ok(GalleryView::from_gallery(&gallery))
}

/// 列出已保存的画廊（最近保存的在前）
pub fn get_saved_galleries(state: &AppState) -> Result<Vec<SavedGalleryView>, CommandError> {
    let db = state.core.database();
    let saved = db.get_all_saved_galleries()?;

    saved
        .into_iter()
        .map(|s| {
            let title = db.get_gallery(s.gallery_id)?.map(|g| g.title);
            Ok(SavedGalleryView {
                gallery_id: s.gallery_id,
                title,
                saved_at: s.saved_at,
                thumb_size: s.thumb_data.len(),
            })
        })
        .collect::<Result<Vec<_>, AppError>>()
        .map_err(CommandError::from)
}

/// 删除画廊的缓存文件和图片记录
pub async fn delete_gallery(state: &AppState, gid: i64) -> Result<DeleteResult, CommandError> {
    let mut gallery = Gallery::try_load_gallery(state.core.context(), gid)?
        .ok_or_else(|| AppError::NotFound(format!("画廊 {}", gid)))?;

    let stats = folder_stats(&state.core.paths().gallery_dir(gid));
    gallery.delete().await?;

    Ok(DeleteResult {
        gallery_id: gid,
        removed_files: stats.file_count,
        removed_bytes: stats.total_bytes,
    })
}
