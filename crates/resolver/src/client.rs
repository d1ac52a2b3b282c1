//! HTTP access to the upstream content APIs.

use std::sync::LazyLock;

use rand::seq::IndexedRandom;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, COOKIE, REFERER, USER_AGENT};
use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::ResolverConfig;
use crate::error::ResolveError;

/// Desktop client UA; several endpoints gate features on it.
const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) bilibili_pc/1.16.5 Chrome/108.0.5359.215 Electron/22.3.27 Safari/537.36 build/1001016005";

/// Desktop build number sent to the polymer dynamic endpoint.
pub(crate) const DESKTOP_BUILD: &str = "11605";

static BUVID_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&buvid=[^&]+").unwrap());
static URL_HOST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^/]+/").unwrap());

/// Shared HTTP client with the platform headers, a generated `buvid3`
/// cookie, and API-prefix fallback.
#[derive(Clone)]
pub struct BiliClient {
    http: reqwest::Client,
    api_prefixes: Vec<String>,
    upos_domains: Vec<String>,
}

impl BiliClient {
    pub fn new(config: &ResolverConfig) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DESKTOP_UA));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.8,en-US;q=0.5,en;q=0.3"),
        );
        let buvid = format!("buvid3={}infoc", Uuid::new_v4());
        if let Ok(value) = HeaderValue::from_str(&buvid) {
            headers.insert(COOKIE, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.http_timeout)
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            api_prefixes: config.api_prefixes.clone(),
            upos_domains: config.upos_domains.clone(),
        }
    }

    /// GET an API path, trying each configured prefix in order.
    ///
    /// A prefix answer counts only when it is 2xx and its body reports
    /// `code == 0`; everything else falls through to the next prefix.
    pub async fn api_get(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value, ResolveError> {
        for prefix in &self.api_prefixes {
            let url = format!("{}/{}", prefix.trim_end_matches('/'), path.trim_start_matches('/'));
            match self.get_json(&url, params).await {
                Ok(value) => {
                    if value.get("code").and_then(Value::as_i64) == Some(0) {
                        debug!(url, "api request ok");
                        return Ok(value);
                    }
                    warn!(url, code = ?value.get("code"), "api request refused");
                }
                Err(e) => error!(url, error = %e, "api request failed"),
            }
        }
        Err(ResolveError::fetch(path, "no api prefix produced a result"))
    }

    /// GET a full URL and parse the JSON body. 2xx is required; `code` is
    /// the caller's concern.
    pub async fn get_json(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<Value, ResolveError> {
        let response = self
            .http
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| ResolveError::fetch(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::fetch(url, format!("status {status}")));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| ResolveError::fetch(url, e))
    }

    /// GET a page body as text (for embedded-state extraction).
    pub async fn get_text(&self, url: &str) -> Result<String, ResolveError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ResolveError::fetch(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::fetch(url, format!("status {status}")));
        }
        response.text().await.map_err(|e| ResolveError::fetch(url, e))
    }

    /// Follow redirects once and return the canonical URL the input lands on.
    pub async fn resolve_redirect(&self, url: &str) -> Result<String, ResolveError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ResolveError::fetch(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::fetch(url, format!("status {status}")));
        }
        Ok(response.url().to_string())
    }

    /// Check that a media URL is actually fetchable.
    ///
    /// Issues a streamed GET (optionally through a random UPOS mirror) and
    /// returns `(content_length, effective_url)` on a 2xx. Probe failures
    /// are reported as size 0, never as errors.
    pub async fn probe(&self, url: &str, referer: &str) -> (u64, String) {
        let mut candidates = Vec::with_capacity(2);
        if let Some(domain) = self.upos_domains.choose(&mut rand::rng()) {
            candidates.push(
                URL_HOST_RE
                    .replace(url, format!("https://{domain}/"))
                    .into_owned(),
            );
        }
        candidates.push(url.to_string());

        for candidate in candidates {
            // The per-session buvid in rendition URLs breaks mirror fetches.
            let candidate = BUVID_PARAM_RE.replace(&candidate, "&buvid=").into_owned();
            let request = self.http.get(&candidate).header(REFERER, referer);
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    let size = response.content_length().unwrap_or(0);
                    return (size, candidate);
                }
                Ok(response) => {
                    debug!(url = candidate, status = %response.status(), "probe rejected");
                }
                Err(e) => {
                    error!(url = candidate, error = %e, "probe failed");
                }
            }
        }
        (0, url.to_string())
    }
}
