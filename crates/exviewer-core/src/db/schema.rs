//! 数据库 Schema 定义
//!
//! 包含所有表的 CREATE 语句

/// 数据库版本
pub const SCHEMA_VERSION: i32 = 1;

/// 初始化 Schema SQL
pub const INIT_SCHEMA: &str = r#"
-- 画廊表
CREATE TABLE IF NOT EXISTS galleries (
    id              INTEGER PRIMARY KEY,
    token           TEXT NOT NULL,
    available       INTEGER NOT NULL DEFAULT 0,
    archiver_key    TEXT,
    title           TEXT NOT NULL DEFAULT '',
    title_jpn       TEXT,
    category        INTEGER NOT NULL DEFAULT 0,
    uploader        TEXT NOT NULL DEFAULT '',
    posted          INTEGER NOT NULL DEFAULT 0,
    file_size       INTEGER NOT NULL DEFAULT 0,
    expunged        INTEGER NOT NULL DEFAULT 0,
    rating          REAL NOT NULL DEFAULT 0,
    torrent_count   INTEGER NOT NULL DEFAULT 0,
    tags            TEXT NOT NULL DEFAULT '[]',
    record_count    INTEGER NOT NULL DEFAULT 0,
    thumb_uri       TEXT NOT NULL DEFAULT ''
);

-- 已保存画廊表
CREATE TABLE IF NOT EXISTS saved_galleries (
    gallery_id      INTEGER PRIMARY KEY REFERENCES galleries(id) ON DELETE CASCADE,
    saved_at        TEXT NOT NULL,
    thumb_data      BLOB
);

-- 图片缓存表
CREATE TABLE IF NOT EXISTS images (
    owner_id        INTEGER NOT NULL REFERENCES galleries(id) ON DELETE CASCADE,
    page_id         INTEGER NOT NULL,
    image_key       INTEGER NOT NULL,
    file_name       TEXT NOT NULL,
    original_loaded INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (owner_id, page_id)
);

-- 数据库版本表
CREATE TABLE IF NOT EXISTS schema_version (
    version         INTEGER PRIMARY KEY,
    applied_at      TEXT NOT NULL
);

-- 索引
CREATE INDEX IF NOT EXISTS idx_images_owner_id ON images(owner_id);
"#;
