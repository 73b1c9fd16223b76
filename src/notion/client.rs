use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::header::RETRY_AFTER;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::{retry_with_backoff, ApiError, RetryPolicy, WorkspaceApi};
use crate::blocks::Block;
use crate::config::AppConfig;
use crate::error::Error;

/// Blocking Notion REST client. Every request goes through `retry_with_backoff`.
pub struct NotionClient {
    http: Client,
    base_url: String,
    token: String,
    notion_version: String,
    retry: RetryPolicy,
    max_upload_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: String,
}

impl NotionClient {
    pub fn new(token: &str, config: &AppConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("vault-to-notion/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            notion_version: config.notion_version.clone(),
            retry: config.retry_policy(),
            max_upload_bytes: config.max_upload_bytes,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.notion_version)
    }

    fn send_for_id(&self, label: &str, build: impl Fn() -> RequestBuilder) -> Result<String, ApiError> {
        retry_with_backoff(&self.retry, label, |_| {
            let response = check_status(build().send()?)?;
            let created: CreatedObject = response
                .json()
                .map_err(|e| ApiError::Decode(e.to_string()))?;
            Ok(created.id)
        })
    }
}

fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().unwrap_or_default();

    Err(ApiError::status_with_retry_after(
        status.as_u16(),
        &body,
        retry_after,
    ))
}

impl WorkspaceApi for NotionClient {
    fn create_page(&self, parent_id: &str, title: &str, icon: Option<&str>) -> Result<String, ApiError> {
        let mut body = json!({
            "parent": { "page_id": parent_id },
            "properties": {
                "title": { "title": [{ "text": { "content": title } }] }
            },
        });
        if let Some(emoji) = icon {
            body["icon"] = json!({ "type": "emoji", "emoji": emoji });
        }

        let page_id = self.send_for_id("create page", || self.request(Method::POST, "pages").json(&body))?;
        info!("Created page: {}", title);
        Ok(page_id)
    }

    fn append_blocks(&self, page_id: &str, blocks: &[Block]) -> Result<(), ApiError> {
        let body = json!({ "children": blocks });
        let path = format!("blocks/{}/children", page_id);

        retry_with_backoff(&self.retry, "append blocks", |_| {
            check_status(self.request(Method::PATCH, &path).json(&body).send()?)?;
            Ok(())
        })?;
        debug!("Added {} blocks to page {}", blocks.len(), page_id);
        Ok(())
    }

    fn upload_file(&self, path: &Path) -> Result<String, ApiError> {
        let size = fs::metadata(path)?.len();
        if size > self.max_upload_bytes {
            return Err(ApiError::TooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }

        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let data = fs::read(path)?;

        let start = json!({ "filename": file_name, "content_type": content_type });
        let upload_id = self.send_for_id("file upload start", || {
            self.request(Method::POST, "file_uploads").json(&start)
        })?;

        let send_path = format!("file_uploads/{}/send", upload_id);
        retry_with_backoff(&self.retry, "file upload send", |_| {
            let part = multipart::Part::bytes(data.clone())
                .file_name(file_name.clone())
                .mime_str(&content_type)?;
            let form = multipart::Form::new().part("file", part);
            check_status(self.request(Method::POST, &send_path).multipart(form).send()?)?;
            Ok(())
        })?;

        info!("Uploaded: {}", file_name);
        Ok(upload_id)
    }
}
