//! 标签与上传者链接命令

use serde::Serialize;

use exviewer_core::{CommandError, SearchLaunch};

use crate::AppState;

/// 链接对应的搜索
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchLaunchView {
    #[serde(flatten)]
    pub launch: SearchLaunch,
    pub query: String,
    pub search_uri: String,
}

/// 将标签或上传者链接转为站点搜索
pub fn search_from_uri(state: &AppState, uri: &str) -> Result<SearchLaunchView, CommandError> {
    let launch = SearchLaunch::parse(uri)?;
    let query = launch.query();
    let search_uri = state.core.context().client.uris().search(&query).to_string();
    Ok(SearchLaunchView {
        launch,
        query,
        search_uri,
    })
}
