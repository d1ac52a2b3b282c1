//! Publishing mirror for long-form article bodies.
//!
//! Articles are too long for a message caption, so the body is re-published
//! to a mirror and the feed links the permalink. Re-publication is cached by
//! the article resolver through the regular cache store; no read endpoint is
//! assumed here.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::ResolveError;

/// One page to publish: title, attribution, and body content as mirror
/// nodes (strings or `{tag, children}` objects).
pub struct PageDraft<'a> {
    pub title: &'a str,
    pub author_name: &'a str,
    pub author_url: &'a str,
    pub nodes: Vec<Value>,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a page and return its permalink.
    async fn publish(&self, draft: PageDraft<'_>) -> Result<String, ResolveError>;
}

const TELEGRAPH_API: &str = "https://api.telegra.ph";

/// Telegraph-backed publisher. Creates a throwaway account on first use
/// unless an access token is supplied.
pub struct TelegraphPublisher {
    http: reqwest::Client,
    access_token: Mutex<Option<String>>,
}

impl TelegraphPublisher {
    pub fn new(access_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token: Mutex::new(access_token),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("TELEGRAPH_ACCESS_TOKEN").ok())
    }

    async fn ensure_token(&self) -> Result<String, ResolveError> {
        if let Some(token) = self.access_token.lock().clone() {
            return Ok(token);
        }
        info!("creating publisher account");
        let response: Value = self
            .http
            .post(format!("{TELEGRAPH_API}/createAccount"))
            .form(&[("short_name", "bilifeedbot"), ("author_name", "bilifeedbot")])
            .send()
            .await
            .map_err(|e| ResolveError::fetch(TELEGRAPH_API, e))?
            .json()
            .await
            .map_err(|e| ResolveError::fetch(TELEGRAPH_API, e))?;
        let token = response
            .pointer("/result/access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ResolveError::shape_with_payload(TELEGRAPH_API, "no access token", &response)
            })?
            .to_string();
        *self.access_token.lock() = Some(token.clone());
        Ok(token)
    }
}

#[async_trait]
impl Publisher for TelegraphPublisher {
    async fn publish(&self, draft: PageDraft<'_>) -> Result<String, ResolveError> {
        let token = self.ensure_token().await?;
        let content = serde_json::to_string(&draft.nodes)
            .map_err(|e| ResolveError::fetch(TELEGRAPH_API, e))?;
        let response: Value = self
            .http
            .post(format!("{TELEGRAPH_API}/createPage"))
            .form(&[
                ("access_token", token.as_str()),
                ("title", draft.title),
                ("author_name", draft.author_name),
                ("author_url", draft.author_url),
                ("content", content.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ResolveError::fetch(TELEGRAPH_API, e))?
            .json()
            .await
            .map_err(|e| ResolveError::fetch(TELEGRAPH_API, e))?;
        let url = response
            .pointer("/result/url")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ResolveError::shape_with_payload(TELEGRAPH_API, "no page url", &response)
            })?;
        debug!(url, "page published");
        Ok(url.to_string())
    }
}
