//! 单页图片的加载状态机
//!
//! 每个 [`GalleryImage`] 同一时刻最多只有一个下载任务。任务在后台 spawn，
//! 调用方通过 watch 通道等待结果；重复调用会加入正在进行的任务。

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::events::{
    EventSinkExt, ImageStatePayload, ThumbReadyPayload, IMAGE_STATE_CHANGED, IMAGE_THUMB_READY,
};
use crate::jobs::CancelToken;
use crate::models::{ConnectionStrategy, ImageKey, ImageLoadingState, ImageRecord};
use crate::utils::error::{AppError, AppResult};
use crate::utils::html::html_to_text;
use crate::utils::sanitize::sanitize_extension;

use super::context::ServiceContext;
use super::parser::parse_image_page;
use super::sprite::{thumbnail_from_file, THUMBNAIL_WIDTH};

/// 下载任务的结果，None 表示尚未结束
type Outcome = Option<AppResult<()>>;

struct InFlight {
    generation: u64,
    cancel: CancelToken,
    done: watch::Receiver<Outcome>,
}

#[derive(Default)]
struct Inner {
    state: ImageLoadingState,
    progress: u8,
    file_name: Option<String>,
    original_loaded: bool,
    thumb: Option<Vec<u8>>,
    fail_token: Option<String>,
    in_flight: Option<InFlight>,
    /// 每次开始加载时递增，用于识别过期的任务
    generation: u64,
}

enum Next {
    Wait(watch::Receiver<Outcome>),
    WaitPrevious(watch::Receiver<Outcome>),
    Started(watch::Receiver<Outcome>, ImageStatePayload),
}

/// 画廊中的一页图片
pub struct GalleryImage {
    ctx: ServiceContext,
    owner_id: i64,
    page_id: u32,
    image_key: ImageKey,
    inner: Mutex<Inner>,
}

impl GalleryImage {
    pub fn new(ctx: ServiceContext, owner_id: i64, page_id: u32, image_key: ImageKey) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            owner_id,
            page_id,
            image_key,
            inner: Mutex::new(Inner::default()),
        })
    }

    /// 从缓存记录恢复已加载的图片；记录的文件已不存在时返回 None
    pub fn load_cached(ctx: &ServiceContext, record: &ImageRecord) -> Option<Arc<Self>> {
        let path = ctx.paths.gallery_dir(record.owner_id).join(&record.file_name);
        if !path.is_file() {
            tracing::debug!("缓存文件已丢失: {:?}", path);
            return None;
        }

        let inner = Inner {
            state: ImageLoadingState::Loaded,
            progress: 100,
            file_name: Some(record.file_name.clone()),
            original_loaded: record.original_loaded,
            ..Inner::default()
        };
        Some(Arc::new(Self {
            ctx: ctx.clone(),
            owner_id: record.owner_id,
            page_id: record.page_id,
            image_key: record.image_key,
            inner: Mutex::new(inner),
        }))
    }

    pub fn owner_id(&self) -> i64 {
        self.owner_id
    }

    pub fn page_id(&self) -> u32 {
        self.page_id
    }

    pub fn image_key(&self) -> ImageKey {
        self.image_key
    }

    pub fn state(&self) -> ImageLoadingState {
        self.lock().state
    }

    pub fn progress(&self) -> u8 {
        self.lock().progress
    }

    pub fn original_loaded(&self) -> bool {
        self.lock().original_loaded
    }

    /// 本地文件路径（已加载时）
    pub fn image_path(&self) -> Option<PathBuf> {
        let file_name = self.lock().file_name.clone()?;
        Some(self.ctx.paths.gallery_dir(self.owner_id).join(file_name))
    }

    pub fn snapshot(&self) -> ImageStatePayload {
        self.payload(&self.lock())
    }

    /// 设置从拼图裁剪出的缩略图
    pub fn set_thumbnail(&self, png: Vec<u8>) {
        let payload = ThumbReadyPayload::new(self.owner_id, self.page_id, &png);
        self.lock().thumb = Some(png);
        self.ctx.events.emit_typed(IMAGE_THUMB_READY, &payload);
    }

    /// 缩略图：优先使用裁剪结果，已加载的图片从本地文件生成
    pub fn thumbnail(&self) -> AppResult<Option<Vec<u8>>> {
        let file_name = {
            let inner = self.lock();
            if let Some(thumb) = &inner.thumb {
                return Ok(Some(thumb.clone()));
            }
            if inner.state != ImageLoadingState::Loaded {
                return Ok(None);
            }
            inner.file_name.clone()
        };
        let Some(file_name) = file_name else {
            return Ok(None);
        };

        let path = self.ctx.paths.gallery_dir(self.owner_id).join(file_name);
        let png = thumbnail_from_file(&path, THUMBNAIL_WIDTH)?;
        self.lock().thumb = Some(png.clone());
        Ok(Some(png))
    }

    /// 取消正在进行的加载并等待任务结束
    ///
    /// 返回后不会再有该任务写入文件或缓存记录。
    pub async fn cancel_load(&self) {
        let done = self.lock().in_flight.as_ref().map(|flight| {
            flight.cancel.cancel();
            flight.done.clone()
        });
        if let Some(mut done) = done {
            // 发送端被丢弃（任务 panic）同样表示结束
            let _ = done.wait_for(Option::is_some).await;
        }
    }

    /// 加载图片
    ///
    /// 已加载且不要求重新加载时立即返回；正在加载时等待同一个任务。
    /// 失败时状态为 Failed，`throw_if_failed` 决定是否返回错误；取消总是返回
    /// [`AppError::Cancelled`]。
    pub async fn load_image(
        self: &Arc<Self>,
        reload: bool,
        strategy: ConnectionStrategy,
        throw_if_failed: bool,
    ) -> AppResult<()> {
        self.load_image_with(reload, strategy, throw_if_failed, &CancelToken::new(0))
            .await
    }

    /// 同 [`load_image`](Self::load_image)，由 `cancel` 控制取消
    ///
    /// 新开始的下载使用 `cancel` 的子令牌，取消 `cancel` 会终止该下载。
    pub async fn load_image_with(
        self: &Arc<Self>,
        reload: bool,
        strategy: ConnectionStrategy,
        throw_if_failed: bool,
        cancel: &CancelToken,
    ) -> AppResult<()> {
        let done = loop {
            cancel.check()?;
            let next = {
                let mut inner = self.lock();
                match &inner.in_flight {
                    Some(flight) if reload => {
                        flight.cancel.cancel();
                        Next::WaitPrevious(flight.done.clone())
                    }
                    Some(flight) => Next::Wait(flight.done.clone()),
                    None if !reload && inner.state == ImageLoadingState::Loaded => {
                        return Ok(());
                    }
                    None => {
                        let (done, payload) = self.start(&mut inner, strategy, reload, cancel);
                        Next::Started(done, payload)
                    }
                }
            };

            match next {
                Next::Wait(done) => break done,
                Next::Started(done, payload) => {
                    self.ctx.events.emit_typed(IMAGE_STATE_CHANGED, &payload);
                    break done;
                }
                Next::WaitPrevious(previous) => {
                    // 旧任务被取消后才开始新的下载
                    let _ = wait(previous, cancel).await;
                }
            }
        };

        match wait(done, cancel).await {
            Ok(()) => Ok(()),
            Err(AppError::Cancelled) => Err(AppError::Cancelled),
            Err(e) if throw_if_failed => Err(e),
            Err(_) => Ok(()),
        }
    }

    fn start(
        self: &Arc<Self>,
        inner: &mut Inner,
        strategy: ConnectionStrategy,
        reload: bool,
        cancel: &CancelToken,
    ) -> (watch::Receiver<Outcome>, ImageStatePayload) {
        inner.generation += 1;
        let generation = inner.generation;
        let token = cancel.child_token();
        let (tx, done) = watch::channel(None);

        inner.in_flight = Some(InFlight {
            generation,
            cancel: token.clone(),
            done: done.clone(),
        });
        inner.state = ImageLoadingState::Preparing;
        inner.progress = 0;
        let stale = if reload { inner.file_name.take() } else { None };
        let payload = self.payload(inner);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let guard_owner = Arc::clone(&this);
            scopeguard::defer! {
                guard_owner.abandon(generation);
            }

            if let Some(file_name) = stale {
                this.remove_cached(&file_name).await;
            }
            let result = this.fetch(generation, &token, strategy).await;
            this.finish(generation, &result);
            let _ = tx.send(Some(result));
        });

        (done, payload)
    }

    async fn fetch(
        &self,
        generation: u64,
        token: &CancelToken,
        strategy: ConnectionStrategy,
    ) -> AppResult<()> {
        let client = &self.ctx.client;
        let mut page_url =
            client
                .uris()
                .image_page(&self.image_key.to_string(), self.owner_id, self.page_id)?;
        let fail_token = self.lock().fail_token.clone();
        if let Some(fail_token) = fail_token {
            page_url.query_pairs_mut().append_pair("nl", &fail_token);
        }

        let html = token.run(client.transport().get_text(&page_url)).await?;
        let info = parse_image_page(&html)?;
        // 保留最近一次解析到的令牌，下次加载或重新加载时换源
        {
            let mut inner = self.lock();
            if inner.generation == generation {
                inner.fail_token = info.fail_token.clone();
            }
        }

        let (uri, original_loaded) = if self.ctx.settings.is_lofi_required(strategy) {
            (info.image_uri.as_str(), info.original_uri.is_none())
        } else {
            (
                info.original_uri.as_deref().unwrap_or(&info.image_uri),
                true,
            )
        };
        let image_url = page_url
            .join(uri)
            .map_err(|e| AppError::InvalidResponse(format!("图片地址无效 {}: {}", uri, e)))?;

        self.update(generation, |inner| {
            inner.state = ImageLoadingState::Loading;
            inner.progress = 0;
        });

        let mut last = 0u8;
        let mut on_progress = |received: u64, total: Option<u64>| {
            let percent = match total {
                Some(total) if total > 0 => (received.saturating_mul(100) / total).min(100) as u8,
                _ => 0,
            };
            if percent > last {
                last = percent;
                self.update(generation, |inner| inner.progress = percent);
            }
        };
        let download = client
            .transport()
            .download(&image_url, &mut on_progress, token)
            .await?;

        if download.media_type.as_deref() == Some("text/html") {
            let text = html_to_text(&String::from_utf8_lossy(&download.bytes));
            return Err(AppError::InvalidResponse(text));
        }
        token.check()?;

        let file_name = format!(
            "{}{}",
            self.page_id,
            sanitize_extension(download.final_url.path())
        );
        let dir = self.ctx.paths.gallery_dir(self.owner_id);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&file_name), &download.bytes).await?;

        self.ctx.db.upsert_image_record(&ImageRecord {
            owner_id: self.owner_id,
            page_id: self.page_id,
            image_key: self.image_key,
            file_name: file_name.clone(),
            original_loaded,
        })?;

        {
            let mut inner = self.lock();
            if inner.generation == generation {
                inner.file_name = Some(file_name.clone());
                inner.original_loaded = original_loaded;
            }
        }

        tracing::info!(
            "图片下载完成: {}-{} -> {} ({} bytes)",
            self.owner_id,
            self.page_id,
            file_name,
            download.bytes.len()
        );
        Ok(())
    }

    fn finish(&self, generation: u64, result: &AppResult<()>) {
        let payload = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return;
            }
            inner.in_flight = None;
            match result {
                Ok(()) => {
                    inner.state = ImageLoadingState::Loaded;
                    inner.progress = 100;
                }
                Err(AppError::Cancelled) => {
                    tracing::debug!("图片加载已取消: {}-{}", self.owner_id, self.page_id);
                    inner.state = ImageLoadingState::Waiting;
                    inner.progress = 0;
                }
                Err(e) => {
                    tracing::warn!("图片加载失败: {}-{}: {}", self.owner_id, self.page_id, e);
                    inner.state = ImageLoadingState::Failed;
                    inner.progress = 100;
                }
            }
            self.payload(&inner)
        };
        self.ctx.events.emit_typed(IMAGE_STATE_CHANGED, &payload);
    }

    /// 任务未经 `finish` 就结束（panic）时恢复为 Failed
    fn abandon(&self, generation: u64) {
        let mut inner = self.lock();
        let abandoned = inner
            .in_flight
            .as_ref()
            .is_some_and(|flight| flight.generation == generation);
        if abandoned {
            inner.in_flight = None;
            inner.state = ImageLoadingState::Failed;
            inner.progress = 100;
        }
    }

    async fn remove_cached(&self, file_name: &str) {
        let path = self.ctx.paths.gallery_dir(self.owner_id).join(file_name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!("已删除旧图片: {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("删除旧图片失败 {:?}: {}", path, e),
        }
        if let Err(e) = self.ctx.db.delete_image_record(self.owner_id, self.page_id) {
            tracing::warn!("删除图片记录失败: {}", e);
        }
    }

    /// 修改当前任务的状态并发出事件；任务已过期时忽略
    fn update(&self, generation: u64, f: impl FnOnce(&mut Inner)) {
        let payload = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return;
            }
            f(&mut inner);
            self.payload(&inner)
        };
        self.ctx.events.emit_typed(IMAGE_STATE_CHANGED, &payload);
    }

    fn payload(&self, inner: &Inner) -> ImageStatePayload {
        ImageStatePayload {
            gallery_id: self.owner_id,
            page_id: self.page_id,
            state: inner.state,
            progress: inner.progress,
            original_loaded: inner.original_loaded,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn wait(mut done: watch::Receiver<Outcome>, cancel: &CancelToken) -> AppResult<()> {
    cancel
        .run(async move {
            let outcome = done
                .wait_for(Option::is_some)
                .await
                .map_err(|_| AppError::General("图片加载任务异常退出".to_string()))?;
            match outcome.as_ref() {
                Some(Ok(())) | None => Ok(()),
                Some(Err(e)) => Err(e.to_shared()),
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::models::AppSettings;
    use crate::test_support::{detail_html, png_bytes, TestEnv};

    const GID: i64 = 618395;
    const KEY: &str = "0a1b2c3d4e";
    const PAGE_URL: &str = "https://exhentai.org/s/0a1b2c3d4e/618395-1";
    const DISPLAY: &str = "https://h.example.org/h/abc/keystamp=1/01.png";
    const ORIGINAL: &str = "https://exhentai.org/fullimg.php?gid=618395&page=1&key=x1";

    fn setup() -> (TestEnv, Arc<GalleryImage>) {
        let env = TestEnv::new();
        env.add_gallery_row(GID, "0439fa3666");
        let image = GalleryImage::new(env.ctx.clone(), GID, 1, KEY.parse().unwrap());
        (env, image)
    }

    fn states(env: &TestEnv) -> Vec<(String, u64)> {
        env.events
            .payloads(IMAGE_STATE_CHANGED)
            .iter()
            .map(|p| {
                (
                    p["state"].as_str().unwrap().to_string(),
                    p["progress"].as_u64().unwrap(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn full_strategy_downloads_original() {
        let (env, image) = setup();
        env.fake
            .add_text(PAGE_URL, &detail_html(DISPLAY, Some(ORIGINAL), "28834-430"));
        env.fake.add_redirected_binary(
            ORIGINAL,
            "https://om.example.org/om/618395/01.JPG?dl=1",
            png_bytes(40, 60, [1, 2, 3]),
            "image/jpeg",
        );

        image
            .load_image(false, ConnectionStrategy::AllFull, true)
            .await
            .unwrap();

        assert_eq!(image.state(), ImageLoadingState::Loaded);
        assert_eq!(image.progress(), 100);
        assert!(image.original_loaded());
        let path = image.image_path().unwrap();
        assert!(path.ends_with("618395/1.jpg"));
        assert!(path.is_file());

        let record = env.ctx.db.get_image_record(GID, 1).unwrap().unwrap();
        assert_eq!(record.file_name, "1.jpg");
        assert_eq!(record.image_key, KEY.parse().unwrap());
        assert!(record.original_loaded);
        assert_eq!(env.fake.count_requests_to(DISPLAY), 0);
    }

    #[tokio::test]
    async fn lofi_strategy_downloads_display_image() {
        let (env, image) = setup();
        env.fake
            .add_text(PAGE_URL, &detail_html(DISPLAY, Some(ORIGINAL), "28834-430"));
        env.fake.add_binary(DISPLAY, png_bytes(4, 4, [0, 0, 0]), "image/png");

        image
            .load_image(false, ConnectionStrategy::AllLofi, true)
            .await
            .unwrap();

        assert!(!image.original_loaded());
        assert!(image.image_path().unwrap().ends_with("1.png"));
        assert_eq!(env.fake.count_requests_to(ORIGINAL), 0);
    }

    #[tokio::test]
    async fn metered_connection_decides_lofi() {
        let settings = AppSettings {
            metered_connection: true,
            ..AppSettings::default()
        };
        let env = TestEnv::with_settings(settings);
        env.add_gallery_row(GID, "0439fa3666");
        let image = GalleryImage::new(env.ctx.clone(), GID, 1, KEY.parse().unwrap());
        // 没有原图链接时低清图即原图
        env.fake.add_text(PAGE_URL, &detail_html(DISPLAY, None, "1-1"));
        env.fake.add_binary(DISPLAY, png_bytes(4, 4, [0, 0, 0]), "image/png");

        image
            .load_image(false, ConnectionStrategy::LofiOnMetered, true)
            .await
            .unwrap();

        assert!(image.original_loaded());
        assert_eq!(env.fake.count_requests_to(DISPLAY), 1);
    }

    #[tokio::test]
    async fn progress_is_monotonic_up_to_100() {
        let (env, image) = setup();
        env.fake.add_text(PAGE_URL, &detail_html(DISPLAY, None, "1-1"));
        env.fake.add_binary(DISPLAY, png_bytes(64, 64, [9, 9, 9]), "image/png");

        image
            .load_image(false, ConnectionStrategy::AllLofi, true)
            .await
            .unwrap();

        let states = states(&env);
        assert_eq!(states.first().unwrap(), &("preparing".to_string(), 0));
        assert_eq!(states.last().unwrap(), &("loaded".to_string(), 100));

        let loading: Vec<u64> = states
            .iter()
            .filter(|(s, _)| s == "loading")
            .map(|(_, p)| *p)
            .collect();
        assert_eq!(loading.first(), Some(&0));
        assert!(loading.len() > 2);
        assert!(loading.windows(2).all(|w| w[0] < w[1]));
        assert!(loading.iter().all(|p| *p <= 100));
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_download() {
        let (env, image) = setup();
        env.fake.add_text(PAGE_URL, &detail_html(DISPLAY, None, "1-1"));
        env.fake.add_binary(DISPLAY, png_bytes(8, 8, [5, 5, 5]), "image/png");
        env.fake.set_download_delay(Duration::from_millis(5));

        let (a, b, c) = tokio::join!(
            image.load_image(false, ConnectionStrategy::AllLofi, true),
            image.load_image(false, ConnectionStrategy::AllLofi, true),
            image.load_image(false, ConnectionStrategy::AllFull, true),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        assert_eq!(env.fake.count_requests_to(PAGE_URL), 1);
        assert_eq!(env.fake.count_requests_to(DISPLAY), 1);
        assert_eq!(env.fake.max_concurrent_downloads(), 1);

        // 已加载后再次调用不发请求
        image
            .load_image(false, ConnectionStrategy::AllLofi, true)
            .await
            .unwrap();
        assert_eq!(env.fake.request_count(), 2);
    }

    #[tokio::test]
    async fn reload_removes_previous_file_first() {
        let (env, image) = setup();
        env.fake.add_text(PAGE_URL, &detail_html(DISPLAY, None, "1-1"));
        env.fake.add_binary(DISPLAY, png_bytes(8, 8, [5, 5, 5]), "image/png");
        image
            .load_image(false, ConnectionStrategy::AllLofi, true)
            .await
            .unwrap();
        let old_path = image.image_path().unwrap();
        assert!(old_path.is_file());

        let second = "https://h.example.org/h/def/keystamp=2/01.jpg";
        let retry_page = format!("{}?nl=1-1", PAGE_URL);
        env.fake.add_text(&retry_page, &detail_html(second, None, "1-2"));
        env.fake.add_binary(second, png_bytes(8, 8, [6, 6, 6]), "image/jpeg");
        env.fake.set_download_delay(Duration::from_millis(40));

        let reload = {
            let image = image.clone();
            tokio::spawn(async move {
                image
                    .load_image(true, ConnectionStrategy::AllLofi, true)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(image.state(), ImageLoadingState::Loading);
        assert!(!old_path.exists());
        assert!(image.image_path().is_none());

        reload.await.unwrap().unwrap();
        assert!(image.image_path().unwrap().ends_with("1.jpg"));
        let record = env.ctx.db.get_image_record(GID, 1).unwrap().unwrap();
        assert_eq!(record.file_name, "1.jpg");
    }

    #[tokio::test]
    async fn reload_during_load_keeps_single_download() {
        let (env, image) = setup();
        env.fake.add_text(PAGE_URL, &detail_html(DISPLAY, None, "1-1"));
        // 被取消的首次加载已解析到令牌，重新加载会带上它
        let retry_page = format!("{}?nl=1-1", PAGE_URL);
        env.fake.add_text(&retry_page, &detail_html(DISPLAY, None, "1-2"));
        env.fake.add_binary(DISPLAY, png_bytes(8, 8, [5, 5, 5]), "image/png");
        env.fake.set_download_delay(Duration::from_millis(10));

        let first = {
            let image = image.clone();
            tokio::spawn(async move {
                image
                    .load_image(false, ConnectionStrategy::AllLofi, true)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        image
            .load_image(true, ConnectionStrategy::AllLofi, true)
            .await
            .unwrap();

        // 第一个调用等待的任务被取消
        assert!(matches!(first.await.unwrap(), Err(AppError::Cancelled)));
        assert_eq!(env.fake.max_concurrent_downloads(), 1);
        assert_eq!(env.fake.count_requests_to(DISPLAY), 2);
        assert_eq!(env.fake.count_requests_to(PAGE_URL), 1);
        assert_eq!(env.fake.count_requests_to(&retry_page), 1);
        assert_eq!(image.state(), ImageLoadingState::Loaded);
    }

    #[tokio::test]
    async fn reload_of_loaded_image_uses_last_fail_token() {
        let (env, image) = setup();
        env.fake.add_text(PAGE_URL, &detail_html(DISPLAY, None, "28834-430"));
        env.fake.add_binary(DISPLAY, png_bytes(4, 4, [0, 0, 0]), "image/png");
        image
            .load_image(false, ConnectionStrategy::AllLofi, true)
            .await
            .unwrap();

        let retry_page = format!("{}?nl=28834-430", PAGE_URL);
        let other_host = "https://h2.example.org/h/abc/01.png";
        env.fake.add_text(&retry_page, &detail_html(other_host, None, "28834-431"));
        env.fake.add_binary(other_host, png_bytes(4, 4, [1, 1, 1]), "image/png");

        image
            .load_image(true, ConnectionStrategy::AllLofi, true)
            .await
            .unwrap();

        assert_eq!(env.fake.count_requests_to(PAGE_URL), 1);
        assert_eq!(env.fake.count_requests_to(&retry_page), 1);
        assert_eq!(env.fake.count_requests_to(other_host), 1);
        assert_eq!(image.state(), ImageLoadingState::Loaded);
    }

    #[tokio::test]
    async fn cached_record_needs_no_network() {
        let (env, _) = setup();
        let dir = env.ctx.paths.gallery_dir(GID);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("3.jpg"), png_bytes(360, 500, [1, 1, 1])).unwrap();
        let record = ImageRecord {
            owner_id: GID,
            page_id: 3,
            image_key: KEY.parse().unwrap(),
            file_name: "3.jpg".into(),
            original_loaded: true,
        };

        let image = GalleryImage::load_cached(&env.ctx, &record).unwrap();
        assert_eq!(image.state(), ImageLoadingState::Loaded);
        assert_eq!(image.progress(), 100);
        image
            .load_image(false, ConnectionStrategy::AllFull, true)
            .await
            .unwrap();
        assert_eq!(env.fake.request_count(), 0);

        let thumb = image.thumbnail().unwrap().unwrap();
        let thumb = image::load_from_memory(&thumb).unwrap();
        assert_eq!(image::GenericImageView::dimensions(&thumb), (180, 250));

        let missing = ImageRecord {
            file_name: "4.jpg".into(),
            page_id: 4,
            ..record
        };
        assert!(GalleryImage::load_cached(&env.ctx, &missing).is_none());
    }

    #[tokio::test]
    async fn html_response_marks_failed() {
        let (env, image) = setup();
        env.fake.add_text(PAGE_URL, &detail_html(DISPLAY, None, "1-1"));
        env.fake.add_text(
            DISPLAY,
            "<html><body><p>You have exceeded your image viewing limits.</p></body></html>",
        );

        let err = image
            .load_image(false, ConnectionStrategy::AllLofi, true)
            .await
            .unwrap_err();
        match err {
            AppError::InvalidResponse(text) => assert!(text.contains("exceeded")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(image.state(), ImageLoadingState::Failed);
        assert_eq!(image.progress(), 100);
        assert!(image.image_path().is_none());

        // 不要求抛出时静默失败
        image
            .load_image(false, ConnectionStrategy::AllLofi, false)
            .await
            .unwrap();
        assert_eq!(image.state(), ImageLoadingState::Failed);
    }

    #[tokio::test]
    async fn retry_after_failure_sends_fail_token() {
        let (env, image) = setup();
        env.fake.add_text(PAGE_URL, &detail_html(DISPLAY, None, "28834-430"));
        env.fake.add_error(DISPLAY, "connection reset");

        image
            .load_image(false, ConnectionStrategy::AllLofi, false)
            .await
            .unwrap();
        assert_eq!(image.state(), ImageLoadingState::Failed);

        let retry_page = format!("{}?nl=28834-430", PAGE_URL);
        let other_host = "https://h2.example.org/h/abc/01.png";
        env.fake.add_text(&retry_page, &detail_html(other_host, None, "28834-431"));
        env.fake.add_binary(other_host, png_bytes(4, 4, [0, 0, 0]), "image/png");

        image
            .load_image(false, ConnectionStrategy::AllLofi, true)
            .await
            .unwrap();
        assert_eq!(image.state(), ImageLoadingState::Loaded);
        assert_eq!(env.fake.count_requests_to(&retry_page), 1);
    }

    #[tokio::test]
    async fn cancellation_returns_to_waiting() {
        let (env, image) = setup();
        env.fake.add_text(PAGE_URL, &detail_html(DISPLAY, None, "1-1"));
        env.fake.add_binary(DISPLAY, png_bytes(8, 8, [5, 5, 5]), "image/png");
        env.fake.set_download_delay(Duration::from_millis(50));

        let token = CancelToken::new(1);
        let task = {
            let image = image.clone();
            let token = token.clone();
            tokio::spawn(async move {
                image
                    .load_image_with(false, ConnectionStrategy::AllLofi, true, &token)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        assert!(matches!(task.await.unwrap(), Err(AppError::Cancelled)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(image.state(), ImageLoadingState::Waiting);
        assert_eq!(image.progress(), 0);
        assert!(image.image_path().is_none());
        assert!(env.ctx.db.get_image_record(GID, 1).unwrap().is_none());
    }
}
