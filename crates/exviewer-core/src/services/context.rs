//! 服务共享的运行环境

use std::sync::Arc;

use crate::db::Database;
use crate::events::SharedEventSink;
use crate::models::AppSettings;
use crate::paths::SharedPathProvider;

use super::client::ExClient;

/// 画廊与图片服务共用的依赖
#[derive(Clone)]
pub struct ServiceContext {
    pub client: ExClient,
    pub db: Database,
    pub paths: SharedPathProvider,
    pub events: SharedEventSink,
    pub settings: Arc<AppSettings>,
}
