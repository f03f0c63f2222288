//! ExViewer 数据库模块
//!
//! 包含数据库连接管理和数据访问层

pub mod connection;
pub mod gallery_dao;
pub mod image_dao;
pub mod saved_dao;
pub mod schema;

// 重新导出常用类型
pub use connection::Database;
