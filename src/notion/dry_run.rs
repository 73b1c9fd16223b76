use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use super::{ApiError, WorkspaceApi};
use crate::blocks::Block;

/// Stand-in for the remote API that only logs what would happen.
#[derive(Default)]
pub struct DryRunApi {
    pages: AtomicUsize,
    files: AtomicUsize,
}

impl DryRunApi {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkspaceApi for DryRunApi {
    fn create_page(&self, _parent_id: &str, title: &str, _icon: Option<&str>) -> Result<String, ApiError> {
        let n = self.pages.fetch_add(1, Ordering::Relaxed);
        info!("[DRY RUN] Would create page: {}", title);
        Ok(format!("dry-run-page-{}", n))
    }

    fn append_blocks(&self, page_id: &str, blocks: &[Block]) -> Result<(), ApiError> {
        debug!("[DRY RUN] Would add {} blocks to {}", blocks.len(), page_id);
        Ok(())
    }

    fn upload_file(&self, path: &Path) -> Result<String, ApiError> {
        let n = self.files.fetch_add(1, Ordering::Relaxed);
        info!("[DRY RUN] Would upload: {}", path.display());
        Ok(format!("dry-run-file-{}", n))
    }
}
