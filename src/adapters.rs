//! 命令行前端的 exviewer-core trait 实现

use std::sync::Arc;

use exviewer_core::events::{EventSink, GALLERY_SAVE_PROGRESS, IMAGE_STATE_CHANGED};

/// 把核心事件输出到终端的 EventSink
///
/// 保存进度直接打印到 stderr，其余事件只写入调试日志。
#[derive(Debug, Clone, Default)]
pub struct ConsoleEventSink;

impl ConsoleEventSink {
    pub fn shared() -> Arc<dyn EventSink> {
        Arc::new(Self)
    }
}

impl EventSink for ConsoleEventSink {
    fn emit(&self, event_name: &str, payload_json: &str) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(payload_json) else {
            tracing::debug!(event = event_name, payload = payload_json, "事件");
            return;
        };

        match event_name {
            GALLERY_SAVE_PROGRESS => {
                let loaded = value["imageLoaded"].as_i64().unwrap_or(0);
                let count = value["imageCount"].as_u64().unwrap_or(0);
                if loaded < 0 {
                    eprintln!("正在读取列表页... (共 {} 张)", count);
                } else {
                    eprintln!("保存进度: {}/{}", loaded, count);
                }
            }
            IMAGE_STATE_CHANGED => {
                tracing::debug!(
                    page = value["pageId"].as_u64().unwrap_or(0),
                    state = value["state"].as_str().unwrap_or(""),
                    progress = value["progress"].as_u64().unwrap_or(0),
                    "图片状态变化"
                );
            }
            _ => tracing::trace!(event = event_name, "事件"),
        }
    }
}
