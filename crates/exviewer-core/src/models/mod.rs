//! ExViewer 数据模型模块
//!
//! 包含画廊、图片缓存记录与设置的数据结构

pub mod gallery;
pub mod image;
pub mod settings;

// 重新导出常用类型
pub use gallery::{
    page_count, ApiGallery, Category, GalleryInfo, GalleryMetadata, SaveGalleryProgress,
    SavedGallery,
};
pub use image::{ImageKey, ImageLoadingState, ImageRecord};
pub use settings::{AppSettings, ConnectionStrategy};
