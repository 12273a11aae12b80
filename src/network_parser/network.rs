//! 站点 HTTP 访问：浏览器风格请求头 + 强制字符集解码。

use encoding_rs::Encoding;
use reqwest::blocking::Client;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONNECTION, HeaderMap, HeaderValue,
    UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::base_system::config::ConfigError;
use crate::base_system::context::Config;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// 页面来源：给定 URL 返回已解码的 HTML 文本。
///
/// 下载流程只依赖这个 trait，测试时可以替换为内存实现。
pub trait PageSource: Send + Sync {
    fn fetch_page(&self, url: &str) -> Result<String, NetworkError>;
}

pub struct SiteClient {
    client: Client,
    encoding: &'static Encoding,
}

impl SiteClient {
    pub fn new(config: &Config) -> Result<Self, NetworkError> {
        let encoding = config.encoding()?;
        let client = Client::builder()
            .default_headers(browser_headers(config))
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client, encoding })
    }
}

impl PageSource for SiteClient {
    fn fetch_page(&self, url: &str) -> Result<String, NetworkError> {
        debug!(target: "network", "GET {}", url);
        let resp = self.client.get(url).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NetworkError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = resp.bytes()?;
        Ok(decode_body(&bytes, self.encoding))
    }
}

/// 站点声明的字符集不可靠，忽略响应头与 BOM，按配置的字符集解码。
pub fn decode_body(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        warn!(target: "network", "页面包含无法按 {} 解码的字节", encoding.name());
    }
    text.into_owned()
}

fn browser_headers(config: &Config) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&config.user_agent)
            .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_str(&config.accept_language)
            .unwrap_or(HeaderValue::from_static("zh-CN")),
    );
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_gb18030_regardless_of_declared_charset() {
        // “测试” 的 GBK/GB18030 编码
        let bytes = [0xB2, 0xE2, 0xCA, 0xD4];
        assert_eq!(decode_body(&bytes, encoding_rs::GB18030), "测试");
    }

    #[test]
    fn headers_follow_config() {
        let cfg = Config {
            accept_language: "en-US".to_string(),
            ..Config::default()
        };
        let headers = browser_headers(&cfg);
        assert_eq!(headers[ACCEPT_LANGUAGE], "en-US");
        assert!(
            headers[USER_AGENT]
                .to_str()
                .unwrap()
                .starts_with("Mozilla/5.0")
        );
        assert_eq!(headers[UPGRADE_INSECURE_REQUESTS], "1");
    }
}
