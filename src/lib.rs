//! ExViewer - 画廊浏览与离线缓存客户端
//!
//! 命令行前端，业务逻辑在 exviewer-core 中

pub mod adapters;
pub mod cli;
pub mod commands;
pub mod logging;

use std::sync::Arc;

use clap::Parser;
use serde::Serialize;

use exviewer_core::{DefaultPathProvider, ExViewerCore, SharedPathProvider};

use cli::{Cli, Command};

/// 应用程序状态
pub struct AppState {
    pub core: ExViewerCore,
}

impl AppState {
    pub fn new(paths: SharedPathProvider) -> anyhow::Result<Self> {
        let core = ExViewerCore::new(paths, adapters::ConsoleEventSink::shared())?;
        Ok(Self { core })
    }
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths: SharedPathProvider = Arc::new(match &cli.data_dir {
        Some(dir) => DefaultPathProvider::with_base_dir(dir.clone()),
        None => DefaultPathProvider::new(),
    });

    // 初始化日志系统
    let _log_guard = logging::init(&paths.logs_dir(), cli.verbose)?;
    tracing::info!("ExViewer 启动中... 数据目录: {:?}", paths.app_data_dir());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(execute(cli.command, paths))
}

async fn execute(command: Command, paths: SharedPathProvider) -> anyhow::Result<()> {
    let state = AppState::new(paths)?;

    // Ctrl-C 取消所有进行中的任务
    let interrupt = {
        let jobs = Arc::clone(state.core.jobs());
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("收到中断信号，正在取消任务");
                jobs.cancel_all();
            }
        })
    };
    let result = dispatch(&state, command).await;
    interrupt.abort();
    result
}

async fn dispatch(state: &AppState, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Info { gid, token } => {
            print_json(&commands::get_gallery_info(state, gid, &token).await?)
        }
        Command::Pages { gid, token, page } => {
            print_json(&commands::get_gallery_page(state, gid, &token, page).await?)
        }
        Command::Image {
            gid,
            token,
            page,
            reload,
            strategy,
        } => print_json(
            &commands::load_image(state, gid, &token, page, reload, strategy.as_deref()).await?,
        ),
        Command::Save {
            gid,
            token,
            strategy,
        } => print_json(&commands::save_gallery(state, gid, &token, strategy.as_deref()).await?),
        Command::Saved => print_json(&commands::get_saved_galleries(state)?),
        Command::Delete { gid } => print_json(&commands::delete_gallery(state, gid).await?),
        Command::Search { uri } => print_json(&commands::search_from_uri(state, &uri)?),
        Command::Settings { reset } => {
            let settings = if reset {
                commands::reset_settings(state)?
            } else {
                commands::get_settings(state)?
            };
            print_json(&settings)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use exviewer_core::models::ImageRecord;
    use exviewer_core::{
        AppSettings, ConnectionStrategy, GalleryMetadata, ImageLoadingState, SettingsManager,
    };
    use tempfile::TempDir;

    fn state(tmp: &TempDir) -> AppState {
        AppState::new(Arc::new(DefaultPathProvider::with_base_dir(tmp.path().to_path_buf()))).unwrap()
    }

    #[test]
    fn test_settings_commands() {
        let tmp = TempDir::new().unwrap();
        let state = state(&tmp);

        let settings = commands::get_settings(&state).unwrap();
        assert_eq!(settings.connection_strategy, ConnectionStrategy::LofiOnMetered);

        commands::reset_settings(&state).unwrap();
        assert!(tmp.path().join("Config").join("settings.json").is_file());
    }

    #[test]
    fn test_strategy_resolution() {
        let tmp = TempDir::new().unwrap();
        let state = state(&tmp);

        assert_eq!(
            commands::resolve_strategy(&state, None).unwrap(),
            ConnectionStrategy::LofiOnMetered
        );
        assert_eq!(
            commands::resolve_strategy(&state, Some("all-full")).unwrap(),
            ConnectionStrategy::AllFull
        );
        let err = commands::resolve_strategy(&state, Some("fast")).unwrap_err();
        assert_eq!(err.code, "E_INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_delete_and_saved_commands() {
        let tmp = TempDir::new().unwrap();
        let state = state(&tmp);

        let err = commands::delete_gallery(&state, 42).await.unwrap_err();
        assert_eq!(err.code, "E_NOT_FOUND");

        let mut meta = GalleryMetadata::unavailable(42, "abcdef0123");
        meta.title = "Cached".into();
        state.core.database().upsert_gallery(&meta).unwrap();
        state.core.database().upsert_saved_gallery(42, &[1, 2, 3]).unwrap();
        let dir = state.core.paths().gallery_dir(42);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("1.jpg"), [0u8; 10]).unwrap();

        let saved = commands::get_saved_galleries(&state).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].title.as_deref(), Some("Cached"));
        assert_eq!(saved[0].thumb_size, 3);

        let removed = commands::delete_gallery(&state, 42).await.unwrap();
        assert_eq!(removed.removed_files, 1);
        assert_eq!(removed.removed_bytes, 10);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_image_page_zero_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let state = state(&tmp);

        let err = commands::load_image(&state, 1, "abcdef0123", 0, false, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, "E_INVALID_ARGUMENT");
    }

    #[test]
    fn test_search_command() {
        let tmp = TempDir::new().unwrap();
        let state = state(&tmp);

        let view = commands::search_from_uri(&state, "https://exhentai.org/uploader/avexotsukaai")
            .unwrap();
        assert_eq!(view.query, "uploader:\"avexotsukaai\"");
        assert!(view.search_uri.ends_with("?f_search=uploader%3A%22avexotsukaai%22"));

        let err = commands::search_from_uri(&state, "https://exhentai.org/g/1/abc/").unwrap_err();
        assert_eq!(err.code, "E_INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_cached_image_skips_network() {
        let tmp = TempDir::new().unwrap();
        let paths = DefaultPathProvider::with_base_dir(tmp.path().to_path_buf());
        // 不可达的地址：任何请求都会失败
        let settings = AppSettings {
            root_uri: "http://127.0.0.1:9/".into(),
            api_uri: "http://127.0.0.1:9/api.php".into(),
            request_timeout_secs: 1,
            ..AppSettings::default()
        };
        SettingsManager::new(&paths).unwrap().save(&settings).unwrap();
        let state = AppState::new(Arc::new(paths)).unwrap();

        state
            .core
            .database()
            .upsert_gallery(&GalleryMetadata::unavailable(42, "abcdef0123"))
            .unwrap();
        let dir = state.core.paths().gallery_dir(42);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("5.jpg"), [0xffu8, 0xd8, 0xff]).unwrap();
        state
            .core
            .database()
            .upsert_image_record(&ImageRecord {
                owner_id: 42,
                page_id: 5,
                image_key: "0a1b2c3d4e".parse().unwrap(),
                file_name: "5.jpg".into(),
                original_loaded: true,
            })
            .unwrap();

        let view = commands::load_image(&state, 42, "abcdef0123", 5, false, None)
            .await
            .unwrap();
        assert_eq!(view.state, ImageLoadingState::Loaded);
        assert_eq!(view.progress, 100);
        assert!(view.path.unwrap().ends_with("5.jpg"));

        // 重新加载必须访问网络，这里会失败
        assert!(commands::load_image(&state, 42, "abcdef0123", 5, true, None)
            .await
            .is_err());
    }
}
