//! 画廊服务
//!
//! 按列表页增量加载图片，裁剪拼图缩略图，优先复用本地缓存；
//! 另外负责整本保存、删除和元数据获取。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;

use crate::events::{EventSinkExt, SaveProgressPayload, GALLERY_SAVE_PROGRESS};
use crate::jobs::CancelToken;
use crate::models::{
    page_count, ConnectionStrategy, GalleryInfo, GalleryMetadata, ImageRecord,
    SaveGalleryProgress,
};
use crate::utils::error::{AppError, AppResult};

use super::context::ServiceContext;
use super::gallery_image::GalleryImage;
use super::parser::{parse_page_count, parse_thumbnail_sprites, SpriteGroup};
use super::sprite::SpriteSheet;

/// 每个列表页的图片数
pub const PAGE_SIZE: u32 = 40;

/// 一个画廊及其已加载的图片
pub struct Gallery {
    ctx: ServiceContext,
    meta: GalleryMetadata,
    saved_at: Option<DateTime<Utc>>,
    page_count: u32,
    loaded_pages: u32,
    images: Vec<Arc<GalleryImage>>,
}

impl Gallery {
    /// 创建画廊并写入（或更新）画廊记录
    pub fn new(ctx: ServiceContext, meta: GalleryMetadata) -> AppResult<Self> {
        ctx.db.upsert_gallery(&meta)?;
        let saved_at = ctx.db.get_saved_gallery(meta.id)?.map(|s| s.saved_at);
        Ok(Self::with_state(ctx, meta, saved_at))
    }

    fn with_state(ctx: ServiceContext, meta: GalleryMetadata, saved_at: Option<DateTime<Utc>>) -> Self {
        let page_count = page_count(meta.record_count, PAGE_SIZE);
        Self {
            ctx,
            meta,
            saved_at,
            page_count,
            loaded_pages: 0,
            images: Vec::new(),
        }
    }

    /// 从数据库恢复画廊；未知 ID 返回 None
    pub fn try_load_gallery(ctx: &ServiceContext, id: i64) -> AppResult<Option<Self>> {
        let Some(meta) = ctx.db.get_gallery(id)? else {
            return Ok(None);
        };
        let saved_at = ctx.db.get_saved_gallery(id)?.map(|s| s.saved_at);
        Ok(Some(Self::with_state(ctx.clone(), meta, saved_at)))
    }

    /// 通过 gdata API 获取画廊并保存到数据库
    pub async fn fetch_galleries(ctx: &ServiceContext, infos: &[GalleryInfo]) -> AppResult<Vec<Self>> {
        let metas = ctx.client.fetch_gallery_metadata(infos).await?;
        metas
            .into_iter()
            .map(|meta| Self::new(ctx.clone(), meta))
            .collect()
    }

    pub fn id(&self) -> i64 {
        self.meta.id
    }

    pub fn token(&self) -> &str {
        &self.meta.token
    }

    pub fn metadata(&self) -> &GalleryMetadata {
        &self.meta
    }

    pub fn language(&self) -> Option<String> {
        self.meta.language()
    }

    /// 已保存时的保存时间
    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.saved_at
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn images(&self) -> &[Arc<GalleryImage>] {
        &self.images
    }

    pub fn has_more_items(&self) -> bool {
        self.loaded_pages < self.page_count
    }

    /// 加载下一个列表页，返回新增的图片数
    pub async fn load_more_items(&mut self) -> AppResult<usize> {
        self.load_more_items_with(&CancelToken::new(0)).await
    }

    async fn load_more_items_with(&mut self, cancel: &CancelToken) -> AppResult<usize> {
        if !self.has_more_items() {
            return Ok(0);
        }
        let images = self.load_page_with(self.loaded_pages, cancel).await?;
        self.loaded_pages += 1;
        let added = images.len();
        self.images.extend(images);
        Ok(added)
    }

    /// 加载全部剩余列表页
    pub async fn load_all(&mut self, cancel: &CancelToken) -> AppResult<()> {
        while self.has_more_items() {
            cancel.check()?;
            self.load_more_items_with(cancel).await?;
        }
        Ok(())
    }

    /// 获取并解析一个列表页（从 0 开始），返回按页码排序的图片
    pub async fn load_page(&mut self, page_index: u32) -> AppResult<Vec<Arc<GalleryImage>>> {
        self.load_page_with(page_index, &CancelToken::new(0)).await
    }

    async fn load_page_with(
        &mut self,
        page_index: u32,
        cancel: &CancelToken,
    ) -> AppResult<Vec<Arc<GalleryImage>>> {
        let client = &self.ctx.client;
        let mut url = client.uris().gallery(self.meta.id, &self.meta.token)?;
        url.query_pairs_mut()
            .append_pair("p", &page_index.to_string());

        let html = cancel.run(client.transport().get_text(&url)).await?;
        self.page_count = parse_page_count(&html);
        let groups = parse_thumbnail_sprites(&html);

        let cached: HashMap<u32, ImageRecord> = self
            .ctx
            .db
            .get_image_records(self.meta.id)?
            .into_iter()
            .map(|r| (r.page_id, r))
            .collect();

        let mut images = Vec::new();
        for group in groups {
            cancel.check()?;
            images.extend(self.build_group(&url, group, &cached, cancel).await?);
        }
        images.sort_by_key(|img| img.page_id());

        tracing::debug!(
            "画廊 {} 第 {} 页: {} 张图片，共 {} 页",
            self.meta.id,
            page_index,
            images.len(),
            self.page_count
        );
        Ok(images)
    }

    async fn build_group(
        &self,
        page_url: &reqwest::Url,
        group: SpriteGroup,
        cached: &HashMap<u32, ImageRecord>,
        cancel: &CancelToken,
    ) -> AppResult<Vec<Arc<GalleryImage>>> {
        let mut images = Vec::with_capacity(group.slots.len());
        let mut pending = Vec::new();

        for slot in group.slots {
            let restored = cached
                .get(&slot.page_id)
                .and_then(|record| GalleryImage::load_cached(&self.ctx, record));
            match restored {
                Some(image) => {
                    tracing::debug!("使用缓存图片: {}-{}", self.meta.id, slot.page_id);
                    images.push(image);
                }
                None => pending.push(slot),
            }
        }
        if pending.is_empty() {
            return Ok(images);
        }

        let sheet = match self.fetch_sprite(page_url, &group.uri, cancel).await {
            Ok(sheet) => Some(sheet),
            Err(AppError::Cancelled) => return Err(AppError::Cancelled),
            Err(e) => {
                tracing::warn!("缩略图拼图加载失败 {}: {}", group.uri, e);
                None
            }
        };

        for slot in pending {
            let image = GalleryImage::new(self.ctx.clone(), self.meta.id, slot.page_id, slot.image_key);
            if let Some(sheet) = &sheet {
                match sheet.crop_png(slot.offset_x, 0, slot.width, slot.height) {
                    Ok(png) => image.set_thumbnail(png),
                    Err(e) => tracing::warn!("裁剪缩略图失败 {}-{}: {}", self.meta.id, slot.page_id, e),
                }
            }
            images.push(image);
        }
        Ok(images)
    }

    async fn fetch_sprite(
        &self,
        page_url: &reqwest::Url,
        uri: &str,
        cancel: &CancelToken,
    ) -> AppResult<SpriteSheet> {
        let url = page_url
            .join(uri)
            .map_err(|e| AppError::InvalidResponse(format!("拼图地址无效 {}: {}", uri, e)))?;
        let download = self
            .ctx
            .client
            .transport()
            .download(&url, &mut |_: u64, _: Option<u64>| {}, cancel)
            .await?;
        if download.media_type.as_deref() == Some("text/html") {
            return Err(AppError::InvalidResponse(format!("拼图不是图片: {}", url)));
        }
        SpriteSheet::decode(&download.bytes)
    }

    /// 保存整本画廊
    ///
    /// 先加载全部列表页，再并发下载每张图片；任意一张失败则保存失败。
    pub async fn save_gallery(
        &mut self,
        strategy: ConnectionStrategy,
        cancel: &CancelToken,
    ) -> AppResult<()> {
        self.report(SaveGalleryProgress {
            image_loaded: -1,
            image_count: self.meta.record_count,
        });
        self.load_all(cancel).await?;

        let image_count = self.images.len() as u32;
        self.report(SaveGalleryProgress {
            image_loaded: 0,
            image_count,
        });

        let fan_out = cancel.child_token();
        let loaded = Arc::new(Mutex::new(0i32));
        let mut tasks = JoinSet::new();
        for image in &self.images {
            let image = Arc::clone(image);
            let loaded = Arc::clone(&loaded);
            let token = fan_out.clone();
            let events = self.ctx.events.clone();
            let gallery_id = self.meta.id;
            tasks.spawn(async move {
                image.load_image_with(false, strategy, true, &token).await?;
                let image_loaded = {
                    let mut loaded = loaded.lock().unwrap_or_else(PoisonError::into_inner);
                    *loaded += 1;
                    *loaded
                };
                events.emit_typed(
                    GALLERY_SAVE_PROGRESS,
                    &SaveProgressPayload {
                        gallery_id,
                        progress: SaveGalleryProgress {
                            image_loaded,
                            image_count,
                        },
                    },
                );
                Ok::<(), AppError>(())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => Err(AppError::General(format!("下载任务异常: {}", e))),
            };
            if let Err(e) = result {
                fan_out.cancel();
                tasks.abort_all();
                tracing::warn!("保存画廊 {} 失败: {}", self.meta.id, e);
                return Err(e);
            }
        }

        let thumb = self.gallery_thumbnail(cancel).await?;
        self.ctx.db.upsert_gallery(&self.meta)?;
        self.ctx.db.upsert_saved_gallery(self.meta.id, &thumb)?;
        self.saved_at = self.ctx.db.get_saved_gallery(self.meta.id)?.map(|s| s.saved_at);

        tracing::info!("画廊已保存: {} ({} 张图片)", self.meta.id, image_count);
        Ok(())
    }

    /// 画廊封面；下载失败时退回第一张图片的缩略图
    async fn gallery_thumbnail(&self, cancel: &CancelToken) -> AppResult<Vec<u8>> {
        if !self.meta.thumb_uri.is_empty() {
            let fetched = match reqwest::Url::parse(&self.meta.thumb_uri) {
                Ok(url) => self
                    .ctx
                    .client
                    .transport()
                    .download(&url, &mut |_: u64, _: Option<u64>| {}, cancel)
                    .await
                    .map(|d| d.bytes),
                Err(e) => Err(AppError::InvalidResponse(e.to_string())),
            };
            match fetched {
                Ok(bytes) => return Ok(bytes),
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(e) => tracing::warn!("画廊封面下载失败 {}: {}", self.meta.id, e),
            }
        }

        match self.images.first() {
            Some(image) => Ok(image.thumbnail()?.unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    fn report(&self, progress: SaveGalleryProgress) {
        self.ctx.events.emit_typed(
            GALLERY_SAVE_PROGRESS,
            &SaveProgressPayload {
                gallery_id: self.meta.id,
                progress,
            },
        );
    }

    /// 删除本地文件和图片记录，恢复为未加载状态
    pub async fn delete(&mut self) -> AppResult<()> {
        for image in &self.images {
            image.cancel_load().await;
        }

        let dir = self.ctx.paths.gallery_dir(self.meta.id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let removed = self.ctx.db.delete_images_for_gallery(self.meta.id)?;

        self.images.clear();
        self.loaded_pages = 0;
        self.page_count = page_count(self.meta.record_count, PAGE_SIZE);

        tracing::info!("已删除画廊 {} 的缓存: {} 条图片记录", self.meta.id, removed);
        Ok(())
    }
}
