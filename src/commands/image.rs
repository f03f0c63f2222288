//! 单张图片命令

use std::sync::Arc;

use serde::Serialize;

use exviewer_core::services::PAGE_SIZE;
use exviewer_core::{AppError, CommandError, GalleryImage, ImageLoadingState};

use crate::AppState;

/// 图片状态
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageView {
    pub page_id: u32,
    pub image_key: String,
    pub state: ImageLoadingState,
    pub progress: u8,
    pub original_loaded: bool,
    pub path: Option<String>,
    pub has_thumbnail: bool,
}

impl ImageView {
    pub fn from_image(image: &GalleryImage) -> Self {
        let snapshot = image.snapshot();
        Self {
            page_id: snapshot.page_id,
            image_key: image.image_key().to_string(),
            state: snapshot.state,
            progress: snapshot.progress,
            original_loaded: snapshot.original_loaded,
            path: image.image_path().map(|p| p.display().to_string()),
            has_thumbnail: matches!(image.thumbnail(), Ok(Some(_))),
        }
    }
}

/// 下载画廊中的一页图片
///
/// 不要求重新加载且本地已有缓存时直接返回，不发任何请求。
pub async fn load_image(
    state: &AppState,
    gid: i64,
    token: &str,
    page: u32,
    reload: bool,
    strategy: Option<&str>,
) -> Result<ImageView, CommandError> {
    if page == 0 {
        return Err(AppError::InvalidArgument("页码从 1 开始".to_string()).into());
    }
    let strategy = super::resolve_strategy(state, strategy)?;

    if !reload {
        if let Some(image) = state.core.cached_image(gid, page)? {
            tracing::debug!("使用缓存图片: {}-{}", gid, page);
            return Ok(ImageView::from_image(&image));
        }
    }

    let mut gallery = state.core.open_gallery(gid, token).await?;
    let images = gallery.load_page((page - 1) / PAGE_SIZE).await?;
    let image: Arc<GalleryImage> = images
        .into_iter()
        .find(|img| img.page_id() == page)
        .ok_or_else(|| AppError::NotFound(format!("画廊 {} 第 {} 页", gid, page)))?;

    let jobs = state.core.jobs();
    let cancel = jobs.start_job();
    let result = image
        .load_image_with(reload, strategy, true, &cancel)
        .await;
    jobs.complete_job(cancel.job_id());

    result?;
    Ok(ImageView::from_image(&image))
}
