//! EPUB 生成器。

use std::fs;
use std::io::Cursor;
use std::path::Path;

use anyhow::{Result, anyhow};
use epub_builder::{EpubBuilder, EpubContent, EpubVersion, ReferenceType, ZipLibrary};
use tracing::{debug, info};

use crate::base_system::context::Config;
use crate::download::models::Book;

const LANG: &str = "zh";
const INTRO_TITLE: &str = "简介";
const INTRO_FILE: &str = "intro.xhtml";
/// 段首缩进标记，与样式表的 text-indent 一起使用
const PARAGRAPH_INDENT: &str = "    ";
const EMPTY_CHAPTER_NOTICE: &str = "本章内容未下载完成或为空（可能是网络错误或页面结构变化）。";

/// 一个 XHTML 内容片段；片段按加入顺序进入目录与阅读顺序（spine）。
#[derive(Debug, Clone)]
pub struct Fragment {
    pub file_name: String,
    pub title: String,
    pub html: String,
}

pub struct EpubGenerator {
    book: EpubBuilder<ZipLibrary>,
    fragments: Vec<Fragment>,
    style: String,
}

impl EpubGenerator {
    pub fn new(title: &str, author: &str, description: &str, cfg: &Config) -> Result<Self> {
        let zip = ZipLibrary::new().map_err(|e| anyhow!(e.to_string()))?;
        let mut book = EpubBuilder::new(zip).map_err(|e| anyhow!(e.to_string()))?;

        book.epub_version(EpubVersion::V30);
        // 每次生成随机标识
        book.set_uuid(uuid::Uuid::new_v4());
        book.metadata("title", title).map_err(|e| anyhow!(e.to_string()))?;
        book.metadata("lang", LANG).map_err(|e| anyhow!(e.to_string()))?;
        // 让 nav/toc.ncx 显示书名而非默认的 "Table Of Contents"
        book.metadata("toc_name", title).ok();
        book.metadata("generator", env!("CARGO_PKG_NAME")).ok();

        let author = author.trim();
        if !author.is_empty() {
            book.metadata("author", author)
                .map_err(|e| anyhow!(e.to_string()))?;
        }
        let description = description.trim();
        if !description.is_empty() {
            book.metadata("description", description).ok();
        }

        let indent_em = cfg.first_line_indent_em.max(0.0);
        let style = format!(
            "body {{ font-family: serif; line-height:1.5; }}
             h1 {{ font-size:1.4em; text-align:center; }}
             h2 {{ font-size:1.1em; text-align:center; color:#333; }}
             p {{ text-indent:{indent_em}em; margin:0 0 .8em 0; line-height:1.5; }}
             p.no-indent {{ text-indent:0; }}"
        );

        Ok(Self {
            book,
            fragments: Vec::new(),
            style,
        })
    }

    /// 由完整书籍构建：简介页 + 每章一个片段。
    pub fn from_book(book: &Book, cfg: &Config) -> Result<Self> {
        let mut generator = Self::new(&book.title, &book.author, &book.description, cfg)?;
        generator.add_intro(&book.title, &book.author, &book.description);
        for chapter in &book.chapters {
            generator.add_chapter(&chapter.title, &chapter.content);
        }
        debug!(target: "epub", fragments = generator.fragments().len(), "内容片段已准备");
        Ok(generator)
    }

    pub fn add_intro(&mut self, title: &str, author: &str, description: &str) {
        let body = format!(
            "<h1>{}</h1>\n<h2>作者: {}</h2>\n{}",
            xml_escape(title),
            xml_escape(author),
            render_paragraphs(description)
        );
        self.fragments.push(Fragment {
            file_name: INTRO_FILE.to_string(),
            title: INTRO_TITLE.to_string(),
            html: wrap_xhtml(INTRO_TITLE, &body),
        });
    }

    pub fn add_chapter(&mut self, title: &str, content: &str) {
        let chapter_no = self
            .fragments
            .iter()
            .filter(|f| f.file_name != INTRO_FILE)
            .count()
            + 1;
        let paragraphs = if content.trim().is_empty() {
            format!("<p class=\"no-indent\">{EMPTY_CHAPTER_NOTICE}</p>")
        } else {
            render_paragraphs(&unescape_basic_entities(content))
        };
        let body = format!("<h1>{}</h1>\n{}", xml_escape(title), paragraphs);
        self.fragments.push(Fragment {
            file_name: format!("chap_{chapter_no}.xhtml"),
            title: title.to_string(),
            html: wrap_xhtml(title, &body),
        });
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// 打包并写入 `output_path`；任何错误都直接返回，不重试。
    pub fn generate(&mut self, output_path: &Path) -> Result<()> {
        self.book
            .stylesheet(Cursor::new(self.style.clone()))
            .map_err(|e| anyhow!(e.to_string()))?;
        // 目录页进入阅读顺序，位于所有正文片段之前
        self.book.inline_toc();

        for fragment in &self.fragments {
            self.book
                .add_content(
                    EpubContent::new(fragment.file_name.clone(), Cursor::new(fragment.html.clone()))
                        .title(fragment.title.clone())
                        .reftype(ReferenceType::Text),
                )
                .map_err(|e| anyhow!(e.to_string()))?;
        }

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut buffer = Vec::new();
        self.book
            .generate(&mut buffer)
            .map_err(|e| anyhow!(e.to_string()))?;
        fs::write(output_path, buffer)?;

        info!(
            target: "epub",
            fragments = self.fragments.len(),
            "EPUB 已生成: {}",
            output_path.display()
        );
        Ok(())
    }
}

/// 纯文本 -> 段落：空行视为普通换行，每个非空行一个 `<p>`。
fn render_paragraphs(text: &str) -> String {
    text.replace("\n\n", "\n")
        .replace('\u{a0}', "")
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| format!("<p>{PARAGRAPH_INDENT}{}</p>", xml_escape(line)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 章节正文来自 HTML 序列化，可能残留基本实体；先还原再统一转义。
/// 简介取自节点文本，实体已解码，不经过这一步。
fn unescape_basic_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn wrap_xhtml(title: &str, body: &str) -> String {
    format!(
        "<?xml version='1.0' encoding='utf-8'?>\n<!DOCTYPE html>\n<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{LANG}\" xml:lang=\"{LANG}\">\n  <head>\n    <title>{}</title>\n    <link href=\"stylesheet.css\" rel=\"stylesheet\" type=\"text/css\"/>\n  </head>\n  <body>\n{}\n  </body>\n</html>",
        xml_escape(title),
        body
    )
}
