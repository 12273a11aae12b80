//! 目录页与章节页解析。
//!
//! 站点布局固定：
//! - 目录页：`div#info`（书名 h1 + 作者 p）、`div#intro`（简介）、`div#list dd a`（章节链接）
//! - 章节页：`div.bookname h1`（标题）、`div#content`（正文）

use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, warn};

use crate::download::models::{Book, ChapterRef, UNKNOWN_TITLE};

const AUTHOR_LABELS: [&str; 2] = ["作者：", "作者:"];

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("目录页缺少必需区域: {0}")]
    MissingRegion(&'static str),
    #[error("无效的目录页地址 {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// 章节页解析结果（尚未关联 URL）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterPage {
    pub title: String,
    pub content: String,
}

macro_rules! cached_selector {
    ($name:ident, $css:literal) => {
        fn $name() -> &'static Selector {
            static S: OnceLock<Selector> = OnceLock::new();
            S.get_or_init(|| Selector::parse($css).unwrap())
        }
    };
}

cached_selector!(sel_info, "div#info");
cached_selector!(sel_h1, "h1");
cached_selector!(sel_p, "p");
cached_selector!(sel_intro, "div#intro");
cached_selector!(sel_list, "div#list");
cached_selector!(sel_dd, "dd");
cached_selector!(sel_link, "a[href]");
cached_selector!(sel_chapter_title, "div.bookname h1");
cached_selector!(sel_content, "div#content");

macro_rules! cached_regex {
    ($name:ident, $pattern:literal) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pattern).unwrap())
        }
    };
}

cached_regex!(re_chapter_number, r"/(\d+)\.html$");
cached_regex!(re_script, r"(?is)<script\b[^>]*>.*?</script\s*>");
cached_regex!(re_br, r"(?i)<br\s*/?>");
cached_regex!(re_p_open, r"(?i)<p\b[^>]*>");
cached_regex!(re_p_close, r"(?i)</p\s*>");
cached_regex!(re_any_tag, r"</?[^>]+>");
cached_regex!(re_newlines, r"\n+");
cached_regex!(re_spaces, r" {2,}");

/// 章节 URL 中文件名前的序号，如 `/shu/6/123.html` -> 123；没有序号时为 0。
pub fn chapter_number(url: &str) -> u64 {
    re_chapter_number()
        .captures(url)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// 解析目录页，得到书籍信息与按序号排好序的章节列表。
pub fn parse_toc(html: &str, base_url: &str) -> Result<Book, ParseError> {
    let base = Url::parse(base_url).map_err(|err| ParseError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason: err.to_string(),
    })?;
    let doc = Html::parse_document(html);

    let info = doc
        .select(sel_info())
        .next()
        .ok_or(ParseError::MissingRegion("div#info"))?;
    let title = info
        .select(sel_h1())
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .ok_or(ParseError::MissingRegion("div#info h1"))?;
    let author = info
        .select(sel_p())
        .next()
        .map(|p| strip_author_label(&element_text(p)))
        .unwrap_or_default();
    let description = doc
        .select(sel_intro())
        .next()
        .map(element_text)
        .unwrap_or_default();

    let list = doc
        .select(sel_list())
        .next()
        .ok_or(ParseError::MissingRegion("div#list"))?;

    let mut chapter_refs = Vec::new();
    for dd in list.select(sel_dd()) {
        let Some(link) = dd.select(sel_link()).next() else {
            continue;
        };
        let href = link.value().attr("href").unwrap_or_default().trim();
        match base.join(href) {
            Ok(url) => chapter_refs.push(ChapterRef {
                title: element_text(link),
                url: url.to_string(),
            }),
            Err(err) => warn!(target: "parser", "跳过无法解析的章节链接 {:?}: {}", href, err),
        }
    }
    sort_by_chapter_number(&mut chapter_refs, |c| c.url.as_str());

    debug!(
        target: "parser",
        title = %title,
        author = %author,
        chapters = chapter_refs.len(),
        "目录解析完成"
    );

    Ok(Book {
        title,
        author,
        description,
        chapter_refs,
        chapters: Vec::new(),
    })
}

/// 解析章节页；缺标题用占位标题，缺正文返回空内容，不会失败。
pub fn parse_chapter(html: &str) -> ChapterPage {
    let doc = Html::parse_document(html);

    let title = doc
        .select(sel_chapter_title())
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    let content = doc
        .select(sel_content())
        .next()
        .map(|el| clean_content(&el.html()))
        .unwrap_or_default();

    ChapterPage { title, content }
}

/// 正文清洗：HTML 片段 -> 以空行分段的纯文本。
pub fn clean_content(raw: &str) -> String {
    let s = re_script().replace_all(raw, "");
    let s = re_br().replace_all(&s, "\n");
    let s = re_p_open().replace_all(&s, "");
    let s = re_p_close().replace_all(&s, "\n");
    let s = re_any_tag().replace_all(&s, "");
    let s = s.replace("&nbsp;", " ");
    let s = re_newlines().replace_all(&s, "\n\n");
    let s = re_spaces().replace_all(&s, " ");
    s.trim().to_string()
}

/// 按 URL 中的章节序号稳定排序，序号相同（含无序号）保持原有先后。
pub fn sort_by_chapter_number<T>(items: &mut [T], url_of: impl Fn(&T) -> &str) {
    items.sort_by_cached_key(|item| chapter_number(url_of(item)));
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn strip_author_label(text: &str) -> String {
    AUTHOR_LABELS
        .iter()
        .find_map(|label| text.strip_prefix(label))
        .unwrap_or(text)
        .trim()
        .to_string()
}
