//! 下载相关的数据模型定义。

use serde::{Deserialize, Serialize};

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const FAILED_TITLE: &str = "Download Failed";

/// 目录页声明的章节。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRef {
    pub title: String,
    pub url: String,
}

/// 已抓取的章节；保留 `url` 用于并发完成后恢复顺序。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub content: String,
    pub url: String,
}

impl Chapter {
    /// 重试耗尽时的占位记录。
    pub fn download_failed(url: &str, attempts: u32) -> Self {
        Self {
            title: FAILED_TITLE.to_string(),
            content: format!("Failed to download chapter from {url} after {attempts} attempts."),
            url: url.to_string(),
        }
    }

    /// 抓取任务异常中止（非网络错误）时的占位记录。
    pub fn task_aborted(url: &str, reason: &str) -> Self {
        Self {
            title: FAILED_TITLE.to_string(),
            content: format!("Chapter task for {url} aborted unexpectedly: {reason}"),
            url: url.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.title == FAILED_TITLE || self.content.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub description: String,
    /// 目录顺序（已按章节序号排序）
    pub chapter_refs: Vec<ChapterRef>,
    /// 抓取结果，排序规则与 `chapter_refs` 一致
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadResult {
    pub success: u32,
    pub failed: u32,
}

impl DownloadResult {
    pub fn tally(chapters: &[Chapter]) -> Self {
        chapters.iter().fold(Self::default(), |mut acc, ch| {
            if ch.is_failed() {
                acc.failed += 1;
            } else {
                acc.success += 1;
            }
            acc
        })
    }
}
