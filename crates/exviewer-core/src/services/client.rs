//! 网络访问层
//!
//! `HttpTransport` 是对网络的抽象，正式实现基于 reqwest，
//! 测试中用内存实现替换。`ExClient` 在其上封装站点地址和 API 调用。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE};
use reqwest::Url;
use serde::Deserialize;

use crate::jobs::CancelToken;
use crate::models::{ApiGallery, AppSettings, GalleryInfo, GalleryMetadata};
use crate::utils::error::{AppError, AppResult};

/// 单次 gdata 请求允许的最大画廊数
pub const MAX_GDATA_ENTRIES: usize = 25;

/// 下载进度回调：已接收字节数、总字节数（未知时为 None）
pub type ProgressFn<'a> = &'a mut (dyn FnMut(u64, Option<u64>) + Send);

/// 一次完整下载的结果
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    /// 不含参数的媒体类型，例如 `image/jpeg`
    pub media_type: Option<String>,
    /// 跟随重定向后的最终地址
    pub final_url: Url,
}

/// 网络传输抽象
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// GET 并以文本返回
    async fn get_text(&self, url: &Url) -> AppResult<String>;

    /// POST 一段 JSON 并以文本返回
    async fn post_json(&self, url: &Url, body: &serde_json::Value) -> AppResult<String>;

    /// GET 二进制内容，边接收边回报进度，可被取消
    async fn download(
        &self,
        url: &Url,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> AppResult<Download>;
}

/// 共享的传输实现
pub type SharedTransport = Arc<dyn HttpTransport>;

/// 基于 reqwest 的传输实现
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(settings: &AppSettings) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = settings.cookie.as_deref().filter(|c| !c.is_empty()) {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| AppError::Config(format!("Cookie 无效: {}", e)))?;
            headers.insert(COOKIE, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.request_timeout_secs.max(1)))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_text(&self, url: &Url) -> AppResult<String> {
        let text = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }

    async fn post_json(&self, url: &Url, body: &serde_json::Value) -> AppResult<String> {
        let text = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }

    async fn download(
        &self,
        url: &Url,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> AppResult<Download> {
        let response = cancel
            .run(async { Ok(self.client.get(url.clone()).send().await?.error_for_status()?) })
            .await?;

        let total = response.content_length();
        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type_of);
        let final_url = response.url().clone();

        let mut bytes = Vec::with_capacity(total.unwrap_or(0).min(64 * 1024 * 1024) as usize);
        let mut stream = response.bytes_stream();
        progress(0, total);
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                chunk = stream.next() => chunk,
            };
            match chunk {
                Some(chunk) => {
                    bytes.extend_from_slice(&chunk?);
                    progress(bytes.len() as u64, total);
                }
                None => break,
            }
        }

        Ok(Download {
            bytes,
            media_type,
            final_url,
        })
    }
}

/// 去掉 `; charset=...` 等参数并转为小写
pub fn media_type_of(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// 站点地址
#[derive(Debug, Clone)]
pub struct SiteUris {
    pub root: Url,
    pub api: Url,
}

impl SiteUris {
    pub fn from_settings(settings: &AppSettings) -> AppResult<Self> {
        let parse = |s: &str| {
            Url::parse(s).map_err(|e| AppError::Config(format!("无效的地址 {}: {}", s, e)))
        };
        let mut root = parse(&settings.root_uri)?;
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        Ok(Self {
            root,
            api: parse(&settings.api_uri)?,
        })
    }

    fn join(&self, relative: &str) -> AppResult<Url> {
        self.root
            .join(relative)
            .map_err(|e| AppError::InvalidArgument(format!("{}: {}", relative, e)))
    }

    /// 画廊列表页地址：`<root>/g/<id>/<token>/`
    pub fn gallery(&self, id: i64, token: &str) -> AppResult<Url> {
        self.join(&format!("g/{}/{}/", id, token))
    }

    /// 单页地址：`<root>/s/<key>/<id>-<page>`
    pub fn image_page(&self, image_key: &str, gallery_id: i64, page_id: u32) -> AppResult<Url> {
        self.join(&format!("s/{}/{}-{}", image_key, gallery_id, page_id))
    }

    /// 搜索结果地址：`<root>?f_search=<query>`
    pub fn search(&self, query: &str) -> Url {
        let mut uri = self.root.clone();
        uri.query_pairs_mut().append_pair("f_search", query);
        uri
    }
}

#[derive(Debug, Deserialize)]
struct GdataResponse {
    #[serde(default)]
    gmetadata: Vec<ApiGallery>,
    error: Option<String>,
}

/// 站点客户端
#[derive(Clone)]
pub struct ExClient {
    transport: SharedTransport,
    uris: SiteUris,
}

impl ExClient {
    pub fn new(transport: SharedTransport, uris: SiteUris) -> Self {
        Self { transport, uris }
    }

    /// 按设置构建基于 reqwest 的客户端
    pub fn from_settings(settings: &AppSettings) -> AppResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(settings)?);
        Ok(Self::new(transport, SiteUris::from_settings(settings)?))
    }

    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    pub fn uris(&self) -> &SiteUris {
        &self.uris
    }

    /// 调用 gdata API 获取画廊元数据
    pub async fn fetch_gallery_metadata(
        &self,
        infos: &[GalleryInfo],
    ) -> AppResult<Vec<GalleryMetadata>> {
        if infos.len() > MAX_GDATA_ENTRIES {
            return Err(AppError::InvalidArgument(format!(
                "一次最多请求 {} 个画廊，实际 {}",
                MAX_GDATA_ENTRIES,
                infos.len()
            )));
        }
        if infos.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "method": "gdata",
            "namespace": 1,
            "gidlist": infos,
        });
        let text = self.transport.post_json(&self.uris.api, &body).await?;
        let response: GdataResponse = serde_json::from_str(&text)?;
        if let Some(error) = response.error {
            return Err(AppError::InvalidResponse(error));
        }

        Ok(response
            .gmetadata
            .into_iter()
            .map(ApiGallery::into_metadata)
            .collect())
    }
}
