//! 命令行参数定义

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "exviewer")]
#[command(about = "画廊浏览与离线缓存客户端")]
#[command(version)]
pub struct Cli {
    /// 数据目录（默认为系统数据目录下的 ExViewer）
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 通过 API 获取画廊信息
    Info {
        gid: i64,
        token: String,
    },
    /// 列出一个列表页中的图片
    Pages {
        gid: i64,
        token: String,
        /// 列表页序号（从 0 开始）
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
    /// 下载单张图片
    Image {
        gid: i64,
        token: String,
        /// 页码（从 1 开始）
        page: u32,
        /// 删除已缓存的文件并重新下载
        #[arg(long)]
        reload: bool,
        /// 连接策略：all-lofi / lofi-on-metered / all-full
        #[arg(long)]
        strategy: Option<String>,
    },
    /// 保存整本画廊
    Save {
        gid: i64,
        token: String,
        #[arg(long)]
        strategy: Option<String>,
    },
    /// 列出已保存的画廊
    Saved,
    /// 删除画廊的缓存文件和记录
    Delete {
        gid: i64,
    },
    /// 将标签或上传者链接转为搜索关键字
    Search {
        uri: String,
    },
    /// 显示或重置设置
    Settings {
        #[arg(long)]
        reset: bool,
    },
}
