//! 图片缓存记录数据访问层

use rusqlite::{params, OptionalExtension, Row};

use crate::models::{ImageKey, ImageRecord};
use crate::utils::error::AppResult;

use super::connection::Database;

fn row_to_image(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        owner_id: row.get("owner_id")?,
        page_id: row.get("page_id")?,
        // SQLite 只有有符号整数，按位存取
        image_key: ImageKey(row.get::<_, i64>("image_key")? as u64),
        file_name: row.get("file_name")?,
        original_loaded: row.get::<_, i32>("original_loaded")? != 0,
    })
}

impl Database {
    /// 查询 (画廊, 页码) 的缓存记录
    pub fn get_image_record(&self, owner_id: i64, page_id: u32) -> AppResult<Option<ImageRecord>> {
        let conn = self.connection()?;

        let record = conn
            .query_row(
                "SELECT * FROM images WHERE owner_id = ?1 AND page_id = ?2",
                params![owner_id, page_id],
                row_to_image,
            )
            .optional()?;

        Ok(record)
    }

    /// 获取画廊的所有缓存记录（按页码排序）
    pub fn get_image_records(&self, owner_id: i64) -> AppResult<Vec<ImageRecord>> {
        let conn = self.connection()?;

        let mut stmt =
            conn.prepare("SELECT * FROM images WHERE owner_id = ?1 ORDER BY page_id ASC")?;
        let records = stmt
            .query_map(params![owner_id], row_to_image)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// 插入或更新缓存记录
    pub fn upsert_image_record(&self, record: &ImageRecord) -> AppResult<()> {
        let conn = self.connection()?;

        conn.execute(
            r#"
            INSERT INTO images (owner_id, page_id, image_key, file_name, original_loaded)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(owner_id, page_id) DO UPDATE SET
                image_key = ?3,
                file_name = ?4,
                original_loaded = ?5
            "#,
            params![
                record.owner_id,
                record.page_id,
                record.image_key.0 as i64,
                record.file_name,
                record.original_loaded,
            ],
        )?;

        Ok(())
    }

    /// 删除单条缓存记录
    pub fn delete_image_record(&self, owner_id: i64, page_id: u32) -> AppResult<bool> {
        let conn = self.connection()?;
        let rows = conn.execute(
            "DELETE FROM images WHERE owner_id = ?1 AND page_id = ?2",
            params![owner_id, page_id],
        )?;
        Ok(rows > 0)
    }

    /// 删除画廊的全部缓存记录，返回删除行数
    pub fn delete_images_for_gallery(&self, owner_id: i64) -> AppResult<usize> {
        let conn = self.connection()?;
        let rows = conn.execute("DELETE FROM images WHERE owner_id = ?1", params![owner_id])?;
        Ok(rows)
    }
}
