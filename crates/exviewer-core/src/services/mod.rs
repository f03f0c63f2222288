//! ExViewer 服务模块
//!
//! 网络访问、页面解析、图片状态机和画廊业务逻辑

pub mod client;
pub mod context;
pub mod gallery;
pub mod gallery_image;
pub mod launch;
pub mod parser;
pub mod settings;
pub mod sprite;

// 重新导出常用类型
pub use client::{
    Download, ExClient, HttpTransport, ProgressFn, ReqwestTransport, SharedTransport, SiteUris,
    MAX_GDATA_ENTRIES,
};
pub use context::ServiceContext;
pub use gallery::{Gallery, PAGE_SIZE};
pub use gallery_image::GalleryImage;
pub use launch::SearchLaunch;
pub use parser::{parse_image_page, parse_page_count, parse_thumbnail_sprites, ImagePageInfo};
pub use settings::SettingsManager;
pub use sprite::{SpriteSheet, THUMBNAIL_WIDTH};
