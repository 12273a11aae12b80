use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use super::fetcher::{ChapterFetcher, RetryPolicy};
use super::models::{Book, Chapter, DownloadResult};
use super::progress::ProgressReporter;
use super::worker_pool::ChapterPool;
use crate::base_system::context::Config;
use crate::book_parser::book_manager::BookManager;
use crate::book_parser::epub_generator::EpubGenerator;
use crate::book_parser::parser::{parse_toc, sort_by_chapter_number};
use crate::network_parser::network::{PageSource, SiteClient};

/// 整书下载：目录 -> 并发抓取各章 -> 按章节序号恢复顺序。
pub struct BookDownloader {
    config: Config,
    source: Arc<dyn PageSource>,
    show_progress: bool,
}

impl BookDownloader {
    pub fn new(config: Config, source: Arc<dyn PageSource>) -> Self {
        Self {
            config,
            source,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, visible: bool) -> Self {
        self.show_progress = visible;
        self
    }

    /// 目录页获取或解析失败直接返回错误；单章失败只体现在对应章节记录里。
    pub fn download(&self, toc_url: &str) -> Result<Book> {
        info!(target: "download", "下载目录页: {}", toc_url);
        let html = self
            .source
            .fetch_page(toc_url)
            .with_context(|| format!("获取目录页失败: {toc_url}"))?;
        let mut book = parse_toc(&html, toc_url).context("解析目录页失败")?;
        info!(
            target: "download",
            "《{}》 作者: {}，共 {} 章",
            book.title,
            book.author,
            book.chapter_refs.len()
        );

        if book.chapter_refs.is_empty() {
            warn!(target: "download", "目录中没有章节");
            return Ok(book);
        }

        let start = Instant::now();
        book.chapters = self.fetch_all(&book)?;

        let result = DownloadResult::tally(&book.chapters);
        info!(
            target: "download",
            "下载完成：《{}》 成功 {} 章，失败 {} 章，用时 {:.1}s",
            book.title,
            result.success,
            result.failed,
            start.elapsed().as_secs_f32()
        );
        Ok(book)
    }

    fn fetch_all(&self, book: &Book) -> Result<Vec<Chapter>> {
        let total = book.chapter_refs.len();
        let workers = self.config.worker_count().min(total);
        let fetcher = ChapterFetcher::new(
            Arc::clone(&self.source),
            RetryPolicy::from_config(&self.config),
        );
        let mut pool = ChapterPool::new(fetcher, workers).context("启动下载线程失败")?;

        for (index, chapter) in book.chapter_refs.iter().enumerate() {
            pool.submit(index, chapter.clone());
        }
        pool.close();

        let mut progress = ProgressReporter::new(total, self.show_progress);
        let mut slots: Vec<Option<Chapter>> = vec![None; total];
        for outcome in pool.results() {
            let chapter = outcome.chapter;
            if chapter.content.is_empty() {
                warn!(target: "download", "章节正文为空: {} ({})", chapter.title, chapter.url);
            }
            progress.tick(&chapter.title);
            if let Some(slot) = slots.get_mut(outcome.index) {
                *slot = Some(chapter);
            }
        }
        debug!(target: "download", received = progress.done(), total, "结果收集完毕");
        progress.finish();
        pool.shutdown();

        let mut chapters: Vec<Chapter> = slots
            .into_iter()
            .zip(&book.chapter_refs)
            .map(|(slot, declared)| {
                slot.unwrap_or_else(|| {
                    error!(target: "download", "章节结果丢失: {}", declared.url);
                    Chapter::task_aborted(&declared.url, "result lost")
                })
            })
            .collect();
        // 收集顺序是目录顺序，这里按 URL 序号重新排序，序号相同保持目录顺序
        sort_by_chapter_number(&mut chapters, |c| c.url.as_str());
        Ok(chapters)
    }
}

/// 完整流程：下载 -> （可选）保存原始数据 -> 生成 EPUB，返回 EPUB 路径。
pub fn run(config: &Config, toc_url: &str, output_dir: &Path) -> Result<PathBuf> {
    let manager = BookManager::new(output_dir)
        .with_context(|| format!("创建输出目录失败: {}", output_dir.display()))?;
    let client = SiteClient::new(config).context("初始化 HTTP 客户端失败")?;
    debug!(target: "download", "输出目录: {}", manager.output_dir().display());

    let book = BookDownloader::new(config.clone(), Arc::new(client))
        .with_progress(true)
        .download(toc_url)?;

    if config.dump_raw_json
        && let Err(err) = manager.write_raw_dump(&book)
    {
        warn!(target: "download", "保存原始数据失败: {:#}", err);
    }

    let output = manager.epub_path(&book.title);
    EpubGenerator::from_book(&book, config)?
        .generate(&output)
        .with_context(|| format!("写入 EPUB 失败: {}", output.display()))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book_parser::parser::chapter_number;
    use crate::network_parser::network::NetworkError;
    use std::collections::HashMap;
    use std::time::Duration;

    const TOC_URL: &str = "https://www.aouchina.com/shu/6/";

    #[derive(Default)]
    struct FakeSite {
        pages: HashMap<String, String>,
        delays: HashMap<String, Duration>,
        panics: Vec<String>,
    }

    impl FakeSite {
        fn page(mut self, url: &str, html: String) -> Self {
            self.pages.insert(url.to_string(), html);
            self
        }

        fn delay(mut self, url: &str, ms: u64) -> Self {
            self.delays
                .insert(url.to_string(), Duration::from_millis(ms));
            self
        }

        fn panic_on(mut self, url: &str) -> Self {
            self.panics.push(url.to_string());
            self
        }
    }

    impl PageSource for FakeSite {
        fn fetch_page(&self, url: &str) -> Result<String, NetworkError> {
            if let Some(d) = self.delays.get(url) {
                std::thread::sleep(*d);
            }
            if self.panics.iter().any(|u| u == url) {
                panic!("parser blew up");
            }
            self.pages.get(url).cloned().ok_or(NetworkError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn toc(hrefs: &[&str]) -> String {
        let dds: String = hrefs
            .iter()
            .map(|h| format!("<dd><a href=\"{h}\">{h}</a></dd>"))
            .collect();
        format!(
            "<div id=\"info\"><h1>测试之书</h1><p>作者：某人</p></div>\
             <div id=\"intro\">简介</div><div id=\"list\"><dl>{dds}</dl></div>"
        )
    }

    fn chapter_page(title: &str) -> String {
        format!(
            "<div class=\"bookname\"><h1>{title}</h1></div><div id=\"content\">{title}正文</div>"
        )
    }

    fn url(n: &str) -> String {
        format!("{TOC_URL}{n}.html")
    }

    fn config() -> Config {
        Config {
            max_workers: 3,
            max_retries: 2,
            retry_delay_ms: 1,
            ..Config::default()
        }
    }

    fn downloader(site: FakeSite) -> BookDownloader {
        BookDownloader::new(config(), Arc::new(site))
    }

    #[test]
    fn chapters_are_reordered_regardless_of_completion_order() {
        let site = FakeSite::default()
            .page(TOC_URL, toc(&["1.html", "3.html", "2.html"]))
            .page(&url("1"), chapter_page("第一章"))
            .page(&url("2"), chapter_page("第二章"))
            .page(&url("3"), chapter_page("第三章"))
            .delay(&url("1"), 120)
            .delay(&url("2"), 60);

        let book = downloader(site).download(TOC_URL).unwrap();
        let declared: Vec<u64> = book
            .chapter_refs
            .iter()
            .map(|c| chapter_number(&c.url))
            .collect();
        assert_eq!(declared, vec![1, 2, 3]);

        let titles: Vec<&str> = book.chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["第一章", "第二章", "第三章"]);
        assert_eq!(book.chapters[0].content, "第一章正文");
        assert_eq!(book.title, "测试之书");
        assert_eq!(book.author, "某人");
    }

    #[test]
    fn failed_chapter_becomes_sentinel_and_run_continues() {
        let site = FakeSite::default()
            .page(TOC_URL, toc(&["1.html", "2.html"]))
            .page(&url("1"), chapter_page("第一章"));

        let book = downloader(site).download(TOC_URL).unwrap();
        assert_eq!(book.chapters.len(), 2);
        assert_eq!(book.chapters[0].title, "第一章");
        assert_eq!(book.chapters[1], Chapter::download_failed(&url("2"), 2));
    }

    #[test]
    fn panicking_task_is_recorded_not_dropped() {
        let site = FakeSite::default()
            .page(TOC_URL, toc(&["1.html", "2.html", "3.html"]))
            .page(&url("1"), chapter_page("第一章"))
            .page(&url("3"), chapter_page("第三章"))
            .panic_on(&url("2"));

        let book = downloader(site).download(TOC_URL).unwrap();
        assert_eq!(book.chapters.len(), 3);
        assert_eq!(book.chapters[1].title, "Download Failed");
        assert_eq!(book.chapters[1].url, url("2"));
        assert!(book.chapters[1].content.contains("parser blew up"));
        assert_eq!(book.chapters[2].title, "第三章");
    }

    #[test]
    fn missing_content_region_keeps_chapter_with_empty_text() {
        let site = FakeSite::default()
            .page(TOC_URL, toc(&["1.html"]))
            .page(
                &url("1"),
                "<div class=\"bookname\"><h1>第一章</h1></div>".to_string(),
            );

        let book = downloader(site).download(TOC_URL).unwrap();
        assert_eq!(book.chapters.len(), 1);
        assert_eq!(book.chapters[0].title, "第一章");
        assert_eq!(book.chapters[0].content, "");
        assert_eq!(
            DownloadResult::tally(&book.chapters),
            DownloadResult {
                success: 0,
                failed: 1
            }
        );
    }

    #[test]
    fn unnumbered_chapters_keep_declared_order_at_front() {
        let site = FakeSite::default()
            .page(TOC_URL, toc(&["2.html", "b.html", "1.html", "a.html"]))
            .page(&url("1"), chapter_page("一"))
            .page(&url("2"), chapter_page("二"))
            .page(&url("a"), chapter_page("甲"))
            .page(&url("b"), chapter_page("乙"))
            .delay(&url("b"), 80);

        let book = downloader(site).download(TOC_URL).unwrap();
        let titles: Vec<&str> = book.chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["乙", "甲", "一", "二"]);
    }

    #[test]
    fn toc_fetch_failure_aborts() {
        let err = downloader(FakeSite::default())
            .download(TOC_URL)
            .unwrap_err();
        assert!(err.to_string().contains("获取目录页失败"));
    }

    #[test]
    fn toc_without_listing_aborts() {
        let site = FakeSite::default().page(
            TOC_URL,
            "<div id=\"info\"><h1>书</h1></div>".to_string(),
        );
        let err = downloader(site).download(TOC_URL).unwrap_err();
        assert!(format!("{err:#}").contains("div#list"));
    }

    #[test]
    fn empty_listing_yields_book_without_chapters() {
        let site = FakeSite::default().page(TOC_URL, toc(&[]));
        let book = downloader(site).download(TOC_URL).unwrap();
        assert!(book.chapters.is_empty());
        assert!(book.chapter_refs.is_empty());
    }
}
