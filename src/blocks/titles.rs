use lazy_static::lazy_static;
use regex::Regex;
use reqwest::blocking::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

lazy_static! {
    static ref TITLE_TAG: Regex = Regex::new(r"(?is)<title[^>]*>([^<]+)</title>").expect("valid title regex");
    static ref SITE_SUFFIX: Regex = Regex::new(r"\s*[|\-–—]\s*[^|\-–—]+$").expect("valid suffix regex");
}

/// Fetches and caches HTML page titles used as link text for bare URLs.
pub struct LinkTitles {
    http: Client,
    cache: Mutex<HashMap<String, Option<String>>>,
}

impl LinkTitles {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent("Mozilla/5.0 (compatible; vault-to-notion)")
            .build()?;
        Ok(Self {
            http,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Page title for `url`, or `None` when it cannot be fetched. Failures are cached too.
    pub fn title_for(&self, url: &str) -> Option<String> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(cached) = cache.get(url) {
                return cached.clone();
            }
        }

        let title = self.fetch(url);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(url.to_string(), title.clone());
        }
        title
    }

    fn fetch(&self, url: &str) -> Option<String> {
        let response = match self.http.get(url).send() {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!("Title fetch for {} returned {}", url, response.status());
                return None;
            }
            Err(err) => {
                debug!("Title fetch for {} failed: {}", url, err);
                return None;
            }
        };
        let html = response.text().ok()?;
        extract_title(&html)
    }
}

/// Pull the `<title>` out of an HTML document, dropping a trailing site name.
pub fn extract_title(html: &str) -> Option<String> {
    let raw = TITLE_TAG.captures(html)?.get(1)?.as_str().trim();
    let title = SITE_SUFFIX.replace(raw, "").trim().to_string();
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title_drops_site_suffix() {
        let html = "<html><head><TITLE>Release notes | Example Blog</TITLE></head></html>";
        assert_eq!(extract_title(html).as_deref(), Some("Release notes"));
    }

    #[test]
    fn test_extract_title_missing() {
        assert_eq!(extract_title("<html><body>no head</body></html>"), None);
        assert_eq!(extract_title("<title>   </title>"), None);
    }
}
