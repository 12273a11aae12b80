//! 小说目录页 → EPUB 下载器。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志等基础设施
//! - `network_parser`：站点 HTTP 访问与字符集解码
//! - `book_parser`：目录页/章节页解析、EPUB 生成、输出文件管理
//! - `download`：并发下载流程编排（工作池、重试、顺序恢复）

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::info;

mod base_system;
mod book_parser;
mod download;
mod network_parser;

use base_system::config::load_or_create;
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "novel-epub-downloader")]
#[command(about = "下载小说目录页中的全部章节并打包为 EPUB")]
struct Cli {
    /// 目录页地址（省略时使用 config.yml 中的 book_url）
    url: Option<String>,

    /// 输出目录（覆盖 config.yml 中的 save_path）
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 并发下载线程数（覆盖 config.yml 中的 max_workers）
    #[arg(short, long)]
    workers: Option<usize>,

    /// 不保存打包前的原始数据（JSON）
    #[arg(long, default_value_t = false)]
    no_dump: bool,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 配置文件路径（默认为数据目录下的 config.yml）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 数据目录路径（用于存放 config.yml 和 logs）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("novel-epub-downloader v{}", VERSION);
        return Ok(());
    }

    let data_dir = cli.data_dir.as_deref();
    let _log = LogSystem::init(
        LogOptions {
            debug: cli.debug,
            ..LogOptions::default()
        },
        data_dir,
    )
    .map_err(|e| anyhow!(e))?;
    info!(target: "startup", "当前版本: v{}", VERSION);

    let mut config =
        load_or_create::<Config>(cli.config.as_deref(), data_dir).map_err(|e| anyhow!(e))?;
    if let Some(workers) = cli.workers {
        config.max_workers = workers;
    }
    if cli.no_dump {
        config.dump_raw_json = false;
    }

    let url = cli.url.unwrap_or_else(|| config.book_url.clone());
    let output_dir = cli.output.unwrap_or_else(|| config.default_save_dir());

    let epub = download::downloader::run(&config, &url, &output_dir)?;
    info!(target: "startup", "EPUB 已保存: {}", epub.display());
    Ok(())
}
