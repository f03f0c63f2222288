//! 测试辅助：内存网络实现、事件记录器和图片构造

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use tempfile::TempDir;

use crate::db::Database;
use crate::events::EventSink;
use crate::jobs::CancelToken;
use crate::models::{AppSettings, GalleryMetadata};
use crate::paths::DefaultPathProvider;
use crate::services::client::{Download, ExClient, HttpTransport, ProgressFn, SiteUris};
use crate::services::context::ServiceContext;
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone)]
enum Route {
    Text(String),
    Binary {
        bytes: Vec<u8>,
        media_type: String,
        final_url: Option<String>,
    },
    Error(String),
}

/// 按完整 URL 匹配的假网络，记录所有请求
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<String>>,
    posted: Mutex<Vec<serde_json::Value>>,
    active_downloads: AtomicUsize,
    max_active_downloads: AtomicUsize,
    download_delay: Mutex<Option<Duration>>,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeTransport {
    pub fn add_text(&self, url: &str, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Route::Text(body.to_string()));
    }

    pub fn add_binary(&self, url: &str, bytes: Vec<u8>, media_type: &str) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Route::Binary {
                bytes,
                media_type: media_type.to_string(),
                final_url: None,
            },
        );
    }

    /// 响应带重定向后的最终地址
    pub fn add_redirected_binary(&self, url: &str, final_url: &str, bytes: Vec<u8>, media_type: &str) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Route::Binary {
                bytes,
                media_type: media_type.to_string(),
                final_url: Some(final_url.to_string()),
            },
        );
    }

    pub fn add_error(&self, url: &str, message: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Route::Error(message.to_string()));
    }

    /// 每个下载分块之间的等待时间
    pub fn set_download_delay(&self, delay: Duration) {
        *self.download_delay.lock().unwrap() = Some(delay);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count_requests_to(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn posted_bodies(&self) -> Vec<serde_json::Value> {
        self.posted.lock().unwrap().clone()
    }

    pub fn max_concurrent_downloads(&self) -> usize {
        self.max_active_downloads.load(Ordering::SeqCst)
    }

    fn route(&self, url: &Url) -> AppResult<Route> {
        self.requests.lock().unwrap().push(url.to_string());
        match self.routes.lock().unwrap().get(url.as_str()).cloned() {
            Some(Route::Error(message)) => Err(AppError::General(message)),
            Some(route) => Ok(route),
            None => Err(AppError::General(format!("404 Not Found: {}", url))),
        }
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get_text(&self, url: &Url) -> AppResult<String> {
        match self.route(url)? {
            Route::Text(body) => Ok(body),
            Route::Binary { bytes, .. } => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Route::Error(message) => Err(AppError::General(message)),
        }
    }

    async fn post_json(&self, url: &Url, body: &serde_json::Value) -> AppResult<String> {
        self.posted.lock().unwrap().push(body.clone());
        self.get_text(url).await
    }

    async fn download(
        &self,
        url: &Url,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> AppResult<Download> {
        let (bytes, media_type, final_url) = match self.route(url)? {
            Route::Text(body) => (body.into_bytes(), "text/html".to_string(), None),
            Route::Binary {
                bytes,
                media_type,
                final_url,
            } => (bytes, media_type, final_url),
            Route::Error(message) => return Err(AppError::General(message)),
        };

        let active = self.active_downloads.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_downloads.fetch_max(active, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active_downloads);

        let delay = *self.download_delay.lock().unwrap();
        let total = bytes.len() as u64;
        progress(0, Some(total));
        let chunk = (bytes.len() / 4).max(1);
        let mut received = 0usize;
        while received < bytes.len() {
            if let Some(delay) = delay {
                cancel.run(async { tokio::time::sleep(delay).await; Ok(()) }).await?;
            }
            cancel.check()?;
            received = (received + chunk).min(bytes.len());
            progress(received as u64, Some(total));
        }

        let final_url = match final_url {
            Some(u) => Url::parse(&u).map_err(|e| AppError::General(e.to_string()))?,
            None => url.clone(),
        };
        Ok(Download {
            bytes,
            media_type: Some(media_type),
            final_url,
        })
    }
}

/// 记录所有事件的事件接收器
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<(String, String)>>,
}

impl RecordingEventSink {
    pub fn events(&self) -> Vec<(String, String)> {
        self.events.lock().unwrap().clone()
    }

    pub fn payloads(&self, name: &str) -> Vec<serde_json::Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, p)| serde_json::from_str(p).unwrap())
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event_name: &str, payload_json: &str) {
        self.events
            .lock()
            .unwrap()
            .push((event_name.to_string(), payload_json.to_string()));
    }
}

/// 生成纯色 PNG
pub fn png_bytes(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// 临时目录、内存数据库、假网络和事件记录器组成的测试环境
pub struct TestEnv {
    pub dir: TempDir,
    pub fake: Arc<FakeTransport>,
    pub events: Arc<RecordingEventSink>,
    pub ctx: ServiceContext,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_settings(AppSettings::default())
    }

    pub fn with_settings(settings: AppSettings) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();

        let fake = Arc::new(FakeTransport::default());
        let events = Arc::new(RecordingEventSink::default());
        let client = ExClient::new(fake.clone(), SiteUris::from_settings(&settings).unwrap());
        let ctx = ServiceContext {
            client,
            db,
            paths: Arc::new(DefaultPathProvider::with_base_dir(dir.path().to_path_buf())),
            events: events.clone(),
            settings: Arc::new(settings),
        };

        Self {
            dir,
            fake,
            events,
            ctx,
        }
    }

    /// 写入一条最简画廊记录，图片记录依赖它
    pub fn add_gallery_row(&self, id: i64, token: &str) -> GalleryMetadata {
        let mut meta = GalleryMetadata::unavailable(id, token);
        meta.available = true;
        meta.title = format!("Gallery {}", id);
        self.ctx.db.upsert_gallery(&meta).unwrap();
        meta
    }
}

/// 单页 HTML，`original` 为原图链接
pub fn detail_html(display: &str, original: Option<&str>, fail_token: &str) -> String {
    let original = original
        .map(|o| format!(r#"<a href="{}">Download original</a>"#, o.replace('&', "&amp;")))
        .unwrap_or_default();
    format!(
        r##"<div id="i1"><div id="i3"><a href="#"><img id="img" src="{}" style="height:100px" /></a></div>
<div id="i6" class="if"><a href="#" id="loadfail" onclick="return nl('{}')">Reload broken image</a></div>
<div id="i7" class="if"> &nbsp; {}</div></div>"##,
        display, fail_token, original
    )
}
