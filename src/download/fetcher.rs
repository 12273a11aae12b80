//! 单章抓取：有限次重试，重试耗尽返回占位记录，不向外抛错。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::models::Chapter;
use crate::base_system::context::Config;
use crate::book_parser::parser::parse_chapter;
use crate::network_parser::network::PageSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数（至少 1 次）
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_retries: cfg.max_retries,
            delay: cfg.retry_delay(),
        }
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

#[derive(Clone)]
pub struct ChapterFetcher {
    source: Arc<dyn PageSource>,
    policy: RetryPolicy,
}

impl ChapterFetcher {
    pub fn new(source: Arc<dyn PageSource>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    pub fn fetch(&self, url: &str) -> Chapter {
        let attempts = self.policy.attempts();
        for attempt in 1..=attempts {
            match self.source.fetch_page(url) {
                Ok(html) => {
                    let page = parse_chapter(&html);
                    debug!(target: "download", "章节下载完成: {} ({})", page.title, url);
                    return Chapter {
                        title: page.title,
                        content: page.content,
                        url: url.to_string(),
                    };
                }
                Err(err) => {
                    warn!(
                        target: "download",
                        "下载章节失败 {}: {} (第 {}/{} 次)",
                        url, err, attempt, attempts
                    );
                    if attempt < attempts && !self.policy.delay.is_zero() {
                        std::thread::sleep(self.policy.delay);
                    }
                }
            }
        }
        Chapter::download_failed(url, attempts)
    }
}
