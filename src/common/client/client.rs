use std::io::Read;
use std::{sync::Arc, time::Duration};

use cookie::Cookie;
use cookie_store::CookieStore;
use flate2::read::GzDecoder;
use reqwest::{
    Client, ClientBuilder, StatusCode, Url,
    header::{
        ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, AUTHORIZATION, HOST, HeaderMap, HeaderValue,
        ORIGIN, REFERER, USER_AGENT,
    },
};
use reqwest_cookie_store::CookieStoreMutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::common::client::error::{ApiError, IsRetryable};
use crate::common::constants;

/// 课程所在的门户：普通站点为 www，企业版为各自的子域名
#[derive(Debug, Clone)]
pub struct Portal {
    pub name: String,
    base_url: Url,
}

impl Portal {
    pub fn new(name: &str) -> Result<Self, ApiError> {
        Self::with_base_url(name, &format!("https://{}.udemy.com", name))
    }

    // 测试或代理场景下可以指定根地址
    pub fn with_base_url(name: &str, base_url: &str) -> Result<Self, ApiError> {
        Ok(Self {
            name: name.to_string(),
            base_url: Url::parse(base_url)?,
        })
    }

    pub fn base(&self) -> String {
        self.base_url.as_str().trim_end_matches('/').to_string()
    }

    pub fn host(&self) -> String {
        let host = self.base_url.host_str().unwrap_or_default();
        match self.base_url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    pub fn origin(&self) -> String {
        self.base_url.origin().ascii_serialization()
    }

    pub fn is_enterprise(&self) -> bool {
        self.name != "www"
    }

    pub fn owns(&self, url: &Url) -> bool {
        url.host_str() == self.base_url.host_str() && url.port() == self.base_url.port()
    }
}

/// 认证信息，至少需要其中一种
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub bearer_token: Option<String>,
    pub cookie: Option<String>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.bearer_token.as_deref().is_none_or(str::is_empty)
            && self.cookie.as_deref().is_none_or(str::is_empty)
    }
}

/// 固定间隔的有限次重试
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_millis(800),
        }
    }
}

// 支持自动携带认证状态的客户端
#[derive(Debug, Clone)]
pub struct UdemyClient {
    pub inner: Client,
    pub cookie_store: Arc<CookieStoreMutex>,
    portal: Portal,
    bearer_token: Option<String>,
    retry: RetryPolicy,
}

impl UdemyClient {
    pub fn new(
        portal: Portal,
        credentials: &Credentials,
        retry: RetryPolicy,
    ) -> Result<Self, ApiError> {
        if credentials.is_empty() {
            error!("未提供 Bearer Token 或 Cookie，无法访问课程接口");
            return Err(ApiError::AuthRequired);
        }

        let cookie_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let inner = ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .cookie_provider(Arc::clone(&cookie_store))
            .default_headers(Self::get_default_headers())
            .build()?;

        let client = Self {
            inner,
            cookie_store,
            portal,
            bearer_token: credentials.bearer_token.clone().filter(|t| !t.is_empty()),
            retry,
        };

        if let Some(raw) = credentials.cookie.as_deref().filter(|c| !c.is_empty()) {
            client.set_cookies(raw)?;
        }
        Ok(client)
    }

    pub fn portal(&self) -> &Portal {
        &self.portal
    }

    pub fn get_default_headers() -> HeaderMap {
        // 创建默认请求头
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
        headers.insert(USER_AGENT, HeaderValue::from_static(constants::USER_AGENT));
        headers
    }

    // 只有发往门户本身的请求才带上 Host/Origin/认证头，CDN 地址不需要
    fn portal_headers(&self, referer: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(&self.portal.host()) {
            headers.insert(HOST, v);
        }
        if let Ok(v) = HeaderValue::from_str(&self.portal.origin()) {
            headers.insert(ORIGIN, v);
        }
        if let Some(v) = referer.and_then(|r| HeaderValue::from_str(r).ok()) {
            headers.insert(REFERER, v);
        }
        if let Some(token) = &self.bearer_token {
            if let Ok(v) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, v.clone());
                headers.insert("X-Udemy-Authorization", v);
            }
        }
        headers
    }

    /// 把 "a=1; b=2" 形式的 Cookie 字符串写入 CookieStore
    pub fn set_cookies(&self, raw: &str) -> Result<(), ApiError> {
        let url = Url::parse(&self.portal.base())?;
        let mut store = self
            .cookie_store
            .lock()
            .map_err(|_| ApiError::InvalidResponse("CookieStore 加锁失败".to_string()))?;

        for parsed in Cookie::split_parse(raw.to_string()) {
            match parsed {
                Ok(cookie) => {
                    let cookie = cookie.into_owned();
                    if let Err(e) = store.insert_raw(&cookie, &url) {
                        warn!("忽略无法保存的Cookie {}: {}", cookie.name(), e);
                    }
                }
                Err(e) => warn!("忽略格式错误的Cookie片段: {}", e),
            }
        }
        debug!("已加载 {} 个Cookie", store.iter_any().count());
        Ok(())
    }

    // 通用 JSON 请求
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        referer: Option<&str>,
    ) -> Result<T, ApiError> {
        let body = self.send_with_retry(url, query, referer).await?;
        Self::handle_response::<T>(url, &body)
    }

    pub async fn get_text(&self, url: &str, referer: Option<&str>) -> Result<String, ApiError> {
        let body = self.send_with_retry(url, &[], referer).await?;
        Ok(String::from_utf8_lossy(&body).to_string())
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        self.send_with_retry(url, &[], None).await
    }

    async fn send_with_retry(
        &self,
        url: &str,
        query: &[(&str, &str)],
        referer: Option<&str>,
    ) -> Result<Vec<u8>, ApiError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.send_once(url, query, referer).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() => {
                    error!("请求失败 {}: {}，重试 ({}/{})", url, e, attempt, max_attempts);
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(ApiError::RetryExhausted {
            attempts: max_attempts,
            last: last_error,
        })
    }

    async fn send_once(
        &self,
        url: &str,
        query: &[(&str, &str)],
        referer: Option<&str>,
    ) -> Result<Vec<u8>, ApiError> {
        let parsed = Url::parse(url)?;
        let mut request = self.inner.get(parsed.clone());
        if !query.is_empty() {
            request = request.query(query);
        }
        if self.portal.owns(&parsed) {
            request = request.headers(self.portal_headers(referer));
        }

        let resp = request.send().await?;
        let status = resp.status();
        debug!("GET {} -> {}", url, status);

        if status.is_server_error() {
            return Err(ApiError::RetryLater(status.as_u16()));
        }
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ApiError::AccessDenied(status.as_u16()));
            }
            StatusCode::NOT_FOUND => return Err(ApiError::NotFound(url.to_string())),
            s if !s.is_success() => {
                return Err(ApiError::Status {
                    status: s.as_u16(),
                    url: url.to_string(),
                });
            }
            _ => {}
        }

        let raw_body = resp.bytes().await?;
        Ok(match Self::try_decompress(&raw_body) {
            Ok(data) => data,
            Err(_) => raw_body.to_vec(), // 解压失败则原样使用
        })
    }

    fn try_decompress(raw: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        let mut decoder = GzDecoder::new(raw);
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded)?;
        Ok(decoded)
    }

    fn handle_response<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, ApiError> {
        let text = String::from_utf8_lossy(body);

        // 首先尝试解析 JSON
        match serde_json::from_str::<Value>(&text) {
            Ok(json_value) => match serde_json::from_value::<T>(json_value) {
                Ok(data) => Ok(data),
                Err(e) => {
                    error!("失败的请求的URL: {}", url);
                    error!("JSON 结构匹配失败: {}", e);
                    error!("期望的结构 可能是: {}", std::any::type_name::<T>());
                    Err(ApiError::InvalidResponse(format!("结构匹配失败: {}", e)))
                }
            },
            Err(_) => {
                // 不是 JSON，可能是 HTML 页面（通常意味着登录失效）
                if text.contains("<!DOCTYPE html>") || text.contains("<html") {
                    return Err(ApiError::HtmlResponse(url.to_string()));
                }
                Err(ApiError::InvalidResponse(text.chars().take(200).collect()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portal_headers_follow_the_portal() {
        let portal = Portal::new("acme").unwrap();
        assert!(portal.is_enterprise());
        assert_eq!(portal.host(), "acme.udemy.com");
        assert_eq!(portal.origin(), "https://acme.udemy.com");
        assert_eq!(portal.base(), "https://acme.udemy.com");

        let www = Portal::new("www").unwrap();
        assert!(!www.is_enterprise());
        assert!(www.owns(&Url::parse("https://www.udemy.com/api-2.0/x").unwrap()));
        assert!(!www.owns(&Url::parse("https://mp4-c.udemycdn.com/a.m3u8").unwrap()));
    }

    #[test]
    fn client_requires_credentials() {
        let portal = Portal::new("www").unwrap();
        let err = UdemyClient::new(portal, &Credentials::default(), RetryPolicy::default())
            .unwrap_err();
        assert!(matches!(err, ApiError::AuthRequired));
    }

    #[test]
    fn cookie_string_is_loaded_into_store() {
        let portal = Portal::new("www").unwrap();
        let credentials = Credentials {
            bearer_token: None,
            cookie: Some("access_token=abc; client_id=xyz".to_string()),
        };
        let client = UdemyClient::new(portal, &credentials, RetryPolicy::default()).unwrap();
        let store = client.cookie_store.lock().unwrap();
        let names: Vec<_> = store.iter_any().map(|c| c.name().to_string()).collect();
        assert!(names.contains(&"access_token".to_string()));
        assert!(names.contains(&"client_id".to_string()));
    }

    #[test]
    fn html_body_is_reported_as_html() {
        let err = UdemyClient::handle_response::<Value>("u", b"<!DOCTYPE html><html></html>")
            .unwrap_err();
        assert!(matches!(err, ApiError::HtmlResponse(_)));
    }
}
