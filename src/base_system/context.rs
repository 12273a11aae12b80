//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::path::PathBuf;
use std::time::Duration;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use super::config::{ConfigError, ConfigSpec, FieldMeta};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 书籍配置
    #[serde(default = "default_book_url")]
    pub book_url: String,

    // 网络配置
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_site_encoding")]
    pub site_encoding: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    // 保存配置
    #[serde(default)]
    pub save_path: String,
    #[serde(default = "default_true")]
    pub dump_raw_json: bool,
    #[serde(default = "default_first_line_indent_em")]
    pub first_line_indent_em: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            book_url: default_book_url(),
            max_workers: default_max_workers(),
            request_timeout: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            site_encoding: default_site_encoding(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            save_path: String::new(),
            dump_raw_json: default_true(),
            first_line_indent_em: default_first_line_indent_em(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 11] = [
            FieldMeta {
                name: "book_url",
                description: "默认目录页地址（命令行未指定 URL 时使用）",
            },
            FieldMeta {
                name: "max_workers",
                description: "最大并发线程数",
            },
            FieldMeta {
                name: "request_timeout",
                description: "请求超时时间（秒）",
            },
            FieldMeta {
                name: "max_retries",
                description: "单章最大尝试次数",
            },
            FieldMeta {
                name: "retry_delay_ms",
                description: "重试间隔, 单位ms",
            },
            FieldMeta {
                name: "site_encoding",
                description: "站点页面字符集（站点未正确声明时强制使用）",
            },
            FieldMeta {
                name: "user_agent",
                description: "请求使用的 User-Agent",
            },
            FieldMeta {
                name: "accept_language",
                description: "请求使用的 Accept-Language",
            },
            FieldMeta {
                name: "save_path",
                description: "保存路径，留空为当前目录",
            },
            FieldMeta {
                name: "dump_raw_json",
                description: "打包前是否保存原始书籍数据（JSON）",
            },
            FieldMeta {
                name: "first_line_indent_em",
                description: "EPUB 段首缩进（em）",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.encoding()?;
        if self.request_timeout == 0 {
            return Err(ConfigError::Validation(
                "request_timeout 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn default_save_dir(&self) -> PathBuf {
        if self.save_path.trim().is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(&self.save_path)
        }
    }

    /// 站点字符集；站点响应头不可信，解码时一律以此为准。
    pub fn encoding(&self) -> Result<&'static Encoding, ConfigError> {
        Encoding::for_label(self.site_encoding.trim().as_bytes()).ok_or_else(|| {
            ConfigError::Validation(format!("未知的字符集: {}", self.site_encoding))
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn worker_count(&self) -> usize {
        self.max_workers.clamp(1, 64)
    }
}

/// 清理文件名中各平台不允许的字符，并限制字节长度。
pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let mut cleaned: String = name
        .trim()
        .chars()
        .map(|ch| match ch {
            ':' => '：',
            '"' => '＂',
            '<' => '《',
            '>' => '》',
            '/' | '\\' => '、',
            '|' => '｜',
            '?' => '？',
            '*' => '＊',
            c if (c as u32) < 32 => replacement.chars().next().unwrap_or('_'),
            _ => ch,
        })
        .collect();

    trim_trailing_dots(&mut cleaned);

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    if RESERVED.contains(&cleaned.to_uppercase().as_str()) {
        cleaned.insert(0, '_');
    }

    if cleaned.len() > max_len {
        // 不能在多字节字符中间截断
        let mut end = max_len;
        while end > 0 && !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
        trim_trailing_dots(&mut cleaned);
    }

    cleaned
}

fn trim_trailing_dots(s: &mut String) {
    while s.ends_with(' ') || s.ends_with('.') {
        s.pop();
    }
    if s.is_empty() {
        s.push_str("unnamed");
    }
}

fn default_true() -> bool {
    true
}

fn default_book_url() -> String {
    "https://www.aouchina.com/shu/6/".to_string()
}

fn default_max_workers() -> usize {
    5
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_site_encoding() -> String {
    "gb18030".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()
}

fn default_accept_language() -> String {
    "zh-CN".to_string()
}

fn default_first_line_indent_em() -> f32 {
    2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_fs_name_replaces_forbidden_chars() {
        assert_eq!(safe_fs_name("第一卷: 开始?", "_", 120), "第一卷： 开始？");
        assert_eq!(safe_fs_name("a/b\\c", "_", 120), "a、b、c");
        assert_eq!(safe_fs_name("  ...  ", "_", 120), "unnamed");
        assert_eq!(safe_fs_name("con", "_", 120), "_con");
    }

    #[test]
    fn safe_fs_name_truncates_on_char_boundary() {
        let name = "测试测试测试";
        let out = safe_fs_name(name, "_", 7);
        assert_eq!(out, "测试");
    }

    #[test]
    fn default_encoding_is_gb18030() {
        let cfg = Config::default();
        assert_eq!(cfg.encoding().unwrap(), encoding_rs::GB18030);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn unknown_encoding_fails_validation() {
        let cfg = Config {
            site_encoding: "not-a-charset".to_string(),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn worker_count_is_clamped() {
        let cfg = Config {
            max_workers: 0,
            ..Config::default()
        };
        assert_eq!(cfg.worker_count(), 1);
    }
}
