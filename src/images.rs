//! Cache-first image proxy for catalog pictures
//!
//! Only hosts that appear in catalog image urls (or are configured) are
//! fetched, redirects included. Bodies and the entry count are capped.

use bytes::{Bytes, BytesMut};
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ImageSettings;

const MAX_REDIRECTS: usize = 5;

#[derive(Clone, Debug)]
pub struct CachedImage { pub content_type: String, pub body: Bytes }

pub struct ImageCache {
    http: reqwest::Client,
    allowed: Arc<DashSet<String>>,
    entries: DashMap<String, CachedImage>,
    max_entries: usize,
    max_bytes: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("only http(s) image urls are proxied")]
    UnsupportedUrl,
    #[error("host {0} is not a catalog image host")]
    HostNotAllowed(String),
    #[error("image larger than {0} bytes")]
    TooLarge(usize),
    #[error("upstream is not an image ({0})")]
    NotAnImage(String),
    #[error("image fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
}

fn host_of(url: &url::Url) -> Option<String> {
    matches!(url.scheme(), "http" | "https").then(|| url.host_str().map(str::to_lowercase)).flatten()
}

impl ImageCache {
    /// Builds the proxy's own client so redirects are held to the allowlist.
    pub fn new(settings: &ImageSettings, timeout: Duration) -> Result<Self, reqwest::Error> {
        let allowed: Arc<DashSet<String>> = Arc::new(settings.allowed_hosts.iter().map(|h| h.to_lowercase()).collect());
        let trusted = allowed.clone();
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.error("too many redirects");
            }
            match host_of(attempt.url()) {
                Some(host) if trusted.contains(&host) => attempt.follow(),
                _ => {
                    let refused = format!("redirect to {} refused", attempt.url());
                    attempt.error(refused)
                }
            }
        });
        let http = reqwest::Client::builder().timeout(timeout).redirect(policy).user_agent("vape-storefront").build()?;
        Ok(Self { http, allowed, entries: DashMap::new(), max_entries: settings.max_entries.max(1), max_bytes: settings.max_bytes })
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn is_allowed(&self, host: &str) -> bool { self.allowed.contains(&host.to_lowercase()) }

    /// Trusts the hosts of the given http(s) urls; anything else is ignored.
    pub fn allow_urls<'a>(&self, urls: impl IntoIterator<Item = &'a str>) {
        let mut added = 0usize;
        for host in urls.into_iter().filter_map(|u| url::Url::parse(u).ok()).filter_map(|u| host_of(&u)) {
            if self.allowed.insert(host) { added += 1; }
        }
        if added > 0 { tracing::debug!(added, total = self.allowed.len(), "image hosts allowed"); }
    }

    pub fn get(&self, url: &str) -> Option<CachedImage> { self.entries.get(url).map(|e| e.value().clone()) }

    /// Evicts an arbitrary entry once the cache is full.
    pub fn put(&self, url: &str, image: CachedImage) {
        if !self.entries.contains_key(url) && self.entries.len() >= self.max_entries {
            let victim = self.entries.iter().next().map(|e| e.key().clone());
            if let Some(victim) = victim { self.entries.remove(&victim); }
        }
        self.entries.insert(url.to_string(), image);
    }

    /// Serves from cache, otherwise fetches and populates it.
    pub async fn fetch(&self, url: &str) -> Result<CachedImage, ImageError> {
        if let Some(hit) = self.get(url) { return Ok(hit); }
        let parsed = url::Url::parse(url).map_err(|_| ImageError::UnsupportedUrl)?;
        let host = host_of(&parsed).ok_or(ImageError::UnsupportedUrl)?;
        if !self.allowed.contains(&host) { return Err(ImageError::HostNotAllowed(host)); }

        let mut response = self.http.get(parsed).send().await?.error_for_status()?;
        let content_type = response.headers().get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()).unwrap_or("application/octet-stream").to_string();
        if !content_type.starts_with("image/") { return Err(ImageError::NotAnImage(content_type)); }
        if response.content_length().is_some_and(|n| n > self.max_bytes as u64) {
            return Err(ImageError::TooLarge(self.max_bytes));
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_bytes { return Err(ImageError::TooLarge(self.max_bytes)); }
            body.extend_from_slice(&chunk);
        }
        let image = CachedImage { content_type, body: body.freeze() };
        self.put(url, image.clone());
        tracing::debug!(url, bytes = image.body.len(), "image cached");
        Ok(image)
    }
}
