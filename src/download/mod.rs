//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`：数据模型（Book / ChapterRef / Chapter / DownloadResult）
//! - `fetcher`：单章抓取与重试
//! - `worker_pool`：章节并发下载工作池
//! - `progress`：CLI 进度条
//! - `downloader`：下载主流程编排

pub mod downloader;
pub mod fetcher;
pub mod models;
pub(crate) mod progress;
pub(crate) mod worker_pool;
