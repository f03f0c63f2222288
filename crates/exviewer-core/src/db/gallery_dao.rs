//! 画廊数据访问层

use chrono::{TimeZone, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::models::{Category, GalleryMetadata};
use crate::utils::error::AppResult;

use super::connection::Database;

/// 从数据库行映射到 GalleryMetadata
fn row_to_gallery(row: &Row<'_>) -> rusqlite::Result<GalleryMetadata> {
    let tags_json: String = row.get("tags")?;
    let posted: i64 = row.get("posted")?;
    Ok(GalleryMetadata {
        id: row.get("id")?,
        token: row.get("token")?,
        available: row.get::<_, i32>("available")? != 0,
        archiver_key: row.get("archiver_key")?,
        title: row.get("title")?,
        title_jpn: row.get("title_jpn")?,
        category: Category::from_bits(row.get::<_, u32>("category")?),
        uploader: row.get("uploader")?,
        posted: Utc.timestamp_opt(posted, 0).single().unwrap_or_default(),
        file_size: row.get("file_size")?,
        expunged: row.get::<_, i32>("expunged")? != 0,
        rating: row.get("rating")?,
        torrent_count: row.get("torrent_count")?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        record_count: row.get("record_count")?,
        thumb_uri: row.get("thumb_uri")?,
    })
}

impl Database {
    /// 插入或更新画廊
    ///
    /// 使用 ON CONFLICT 更新而非 REPLACE，避免级联删除已缓存的图片记录。
    pub fn upsert_gallery(&self, gallery: &GalleryMetadata) -> AppResult<()> {
        let conn = self.connection()?;
        let tags = serde_json::to_string(&gallery.tags)?;

        conn.execute(
            r#"
            INSERT INTO galleries (
                id, token, available, archiver_key, title, title_jpn, category, uploader,
                posted, file_size, expunged, rating, torrent_count, tags, record_count, thumb_uri
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(id) DO UPDATE SET
                token = ?2,
                available = ?3,
                archiver_key = ?4,
                title = ?5,
                title_jpn = ?6,
                category = ?7,
                uploader = ?8,
                posted = ?9,
                file_size = ?10,
                expunged = ?11,
                rating = ?12,
                torrent_count = ?13,
                tags = ?14,
                record_count = ?15,
                thumb_uri = ?16
            "#,
            params![
                gallery.id,
                gallery.token,
                gallery.available,
                gallery.archiver_key,
                gallery.title,
                gallery.title_jpn,
                gallery.category.bits(),
                gallery.uploader,
                gallery.posted.timestamp(),
                gallery.file_size,
                gallery.expunged,
                gallery.rating,
                gallery.torrent_count,
                tags,
                gallery.record_count,
                gallery.thumb_uri,
            ],
        )?;

        Ok(())
    }

    /// 根据 ID 获取画廊
    pub fn get_gallery(&self, id: i64) -> AppResult<Option<GalleryMetadata>> {
        let conn = self.connection()?;

        let gallery = conn
            .query_row(
                "SELECT * FROM galleries WHERE id = ?1",
                params![id],
                row_to_gallery,
            )
            .optional()?;

        Ok(gallery)
    }

    /// 删除画廊（级联删除图片记录和保存记录）
    pub fn delete_gallery(&self, id: i64) -> AppResult<bool> {
        let conn = self.connection()?;
        let rows = conn.execute("DELETE FROM galleries WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}
