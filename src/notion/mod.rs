//! Remote workspace collaborator: the `WorkspaceApi` seam, the HTTP client
//! behind it, a dry-run stand-in, and retry handling.

mod client;
mod dry_run;
mod error;
mod retry;

pub use client::NotionClient;
pub use dry_run::DryRunApi;
pub use error::{ApiError, TRANSIENT_STATUSES};
pub use retry::{retry_with_backoff, RetryPolicy};

use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

use crate::blocks::Block;
use crate::error::Error;

/// Operations the migration needs from the document workspace.
pub trait WorkspaceApi {
    /// Create a child page under `parent_id` and return the new page id.
    fn create_page(&self, parent_id: &str, title: &str, icon: Option<&str>) -> Result<String, ApiError>;

    /// Append blocks to a page in a single request.
    fn append_blocks(&self, page_id: &str, blocks: &[Block]) -> Result<(), ApiError>;

    /// Start and finish a file upload, returning the upload id to reference from blocks.
    fn upload_file(&self, path: &Path) -> Result<String, ApiError>;
}

lazy_static! {
    static ref UUID_PATTERN: Regex = Regex::new(
        r"(?i)([a-f0-9]{8}-?[a-f0-9]{4}-?[a-f0-9]{4}-?[a-f0-9]{4}-?[a-f0-9]{12})"
    )
    .expect("valid uuid regex");
}

/// Extract a page id from a Notion URL or a bare id, formatted as 8-4-4-4-12.
pub fn extract_page_id(destination: &str) -> Result<String, Error> {
    let url = destination
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim();
    let last_segment = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);

    let hex = match UUID_PATTERN.captures_iter(last_segment).last() {
        Some(caps) => caps[1].replace('-', "").to_lowercase(),
        None => {
            let hex_only: String = last_segment
                .to_lowercase()
                .chars()
                .filter(|c| c.is_ascii_hexdigit())
                .collect();
            if hex_only.len() < 32 {
                return Err(Error::InvalidDestination(destination.to_string()));
            }
            hex_only[hex_only.len() - 32..].to_string()
        }
    };

    Ok(format!(
        "{}-{}-{}-{}-{}",
        &hex[..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..]
    ))
}
