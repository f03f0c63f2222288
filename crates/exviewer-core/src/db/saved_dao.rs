//! 已保存画廊数据访问层

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::models::SavedGallery;
use crate::utils::error::AppResult;

use super::connection::Database;

fn row_to_saved(row: &Row<'_>) -> rusqlite::Result<SavedGallery> {
    let saved_at: String = row.get("saved_at")?;
    Ok(SavedGallery {
        gallery_id: row.get("gallery_id")?,
        saved_at: DateTime::parse_from_rfc3339(&saved_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_default(),
        thumb_data: row.get::<_, Option<Vec<u8>>>("thumb_data")?.unwrap_or_default(),
    })
}

impl Database {
    /// 记录画廊已保存（重复保存时刷新时间和封面）
    pub fn upsert_saved_gallery(&self, gallery_id: i64, thumb_data: &[u8]) -> AppResult<()> {
        let conn = self.connection()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO saved_galleries (gallery_id, saved_at, thumb_data)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(gallery_id) DO UPDATE SET
                saved_at = ?2,
                thumb_data = ?3
            "#,
            params![gallery_id, now, thumb_data],
        )?;

        Ok(())
    }

    /// 获取单个已保存画廊
    pub fn get_saved_gallery(&self, gallery_id: i64) -> AppResult<Option<SavedGallery>> {
        let conn = self.connection()?;

        let saved = conn
            .query_row(
                "SELECT * FROM saved_galleries WHERE gallery_id = ?1",
                params![gallery_id],
                row_to_saved,
            )
            .optional()?;

        Ok(saved)
    }

    /// 获取所有已保存画廊（最近保存的在前）
    pub fn get_all_saved_galleries(&self) -> AppResult<Vec<SavedGallery>> {
        let conn = self.connection()?;

        let mut stmt = conn.prepare("SELECT * FROM saved_galleries ORDER BY saved_at DESC")?;
        let saved = stmt
            .query_map([], row_to_saved)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GalleryMetadata;

    #[test]
    fn save_and_list() {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db.upsert_gallery(&GalleryMetadata::unavailable(5, "tok")).unwrap();

        db.upsert_saved_gallery(5, &[1, 2, 3]).unwrap();
        let saved = db.get_saved_gallery(5).unwrap().unwrap();
        assert_eq!(saved.thumb_data, vec![1, 2, 3]);

        db.upsert_saved_gallery(5, &[9]).unwrap();
        let all = db.get_all_saved_galleries().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].thumb_data, vec![9]);

        assert!(db.get_saved_gallery(6).unwrap().is_none());
    }
}
