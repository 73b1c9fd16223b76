use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::blocks::{Block, ContentBlock, FileKind, LinkTitles};
use crate::config::{AppConfig, MigrationOptions};
use crate::error::Error;
use crate::notion::{ApiError, WorkspaceApi};
use crate::progress::ProgressReporter;
use crate::report::{write_reports, FileCategory, FileRecord, FileStatus, Ledger, ReportPaths};
use crate::vault::{plan_migration, IgnoreRules, Inventory, MigrationPlan, PageKind, PageNode};

pub struct MigrationEngine<'a> {
    config: AppConfig,
    options: MigrationOptions,
    api: &'a dyn WorkspaceApi,
}

#[derive(Debug, Default, Clone)]
pub struct MigrationSummary {
    pub total_files: usize,
    pub folders_created: usize,
    pub notes_created: usize,
    pub page_errors: usize,
    pub append_errors: usize,
    pub files_uploaded: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
    pub unresolved_references: usize,
    pub scan_duration: Duration,
    pub plan_duration: Duration,
    pub submit_duration: Duration,
}

#[derive(Debug)]
pub struct MigrationResult {
    pub summary: MigrationSummary,
    pub ledger: Ledger,
    pub reports: ReportPaths,
}

impl<'a> MigrationEngine<'a> {
    pub fn new(config: AppConfig, options: MigrationOptions, api: &'a dyn WorkspaceApi) -> Self {
        Self { config, options, api }
    }

    /// Run the whole migration:
    /// 1. Scan the vault into a classified inventory
    /// 2. Plan the page tree and convert notes (parallel)
    /// 3. Submit pages, uploads and blocks top-down (serial)
    /// 4. Reconcile and write the reports
    pub fn run(&self, progress: &dyn ProgressReporter) -> Result<MigrationResult, Error> {
        info!("Scanning vault: {}", self.options.source.display());
        progress.on_scan_start();
        let scan_start = Instant::now();
        let inventory = Inventory::scan(
            &self.options.source,
            IgnoreRules::new(&self.config.ignore_patterns),
        )?;
        let scan_duration = scan_start.elapsed();
        progress.on_scan_complete(inventory.len(), scan_duration.as_secs_f64());
        debug!(
            "Scan completed in {:.2}s: {} files",
            scan_duration.as_secs_f64(),
            inventory.len()
        );

        info!("Planning pages...");
        progress.on_plan_start();
        let plan_start = Instant::now();
        let titles = if self.options.fetch_link_titles {
            match LinkTitles::new() {
                Ok(titles) => Some(titles),
                Err(err) => {
                    warn!("Link titles disabled, HTTP client failed to start: {}", err);
                    None
                }
            }
        } else {
            None
        };
        let plan = plan_migration(&inventory, self.options.reverse_sort, titles.as_ref());
        let plan_duration = plan_start.elapsed();
        progress.on_plan_complete(plan.page_count(), plan_duration.as_secs_f64());

        let mut ledger = Ledger::new();
        for unresolved in &plan.unresolved {
            ledger.record_unresolved(&unresolved.note, &unresolved.reference);
        }

        info!("Creating {} pages...", plan.page_count());
        progress.on_submit_start(plan.page_count());
        let submit_start = Instant::now();
        let mut submission = Submission::new(self, &plan, ledger, progress);
        submission.submit_root(&plan.root);
        let submit_duration = submit_start.elapsed();
        progress.on_submit_complete(
            submission.folders_created + submission.notes_created,
            submit_duration.as_secs_f64(),
        );

        let Submission {
            mut ledger,
            folders_created,
            notes_created,
            page_errors,
            append_errors,
            ..
        } = submission;

        ledger.reconcile(&inventory, &plan.references);
        let reports = write_reports(&ledger, inventory.root(), &self.options.report_dir)?;

        let summary = MigrationSummary {
            total_files: inventory.len(),
            folders_created,
            notes_created,
            page_errors,
            append_errors,
            files_uploaded: ledger.count(FileStatus::Uploaded),
            files_failed: ledger.failures().count(),
            files_skipped: ledger.count(FileStatus::Skipped),
            unresolved_references: ledger.unresolved().len(),
            scan_duration,
            plan_duration,
            submit_duration,
        };
        info!(
            "Migration complete: {} folders, {} notes, {} files uploaded, {} failed, {} page errors",
            summary.folders_created,
            summary.notes_created,
            summary.files_uploaded,
            summary.files_failed,
            summary.page_errors
        );

        Ok(MigrationResult {
            summary,
            ledger,
            reports,
        })
    }
}

/// Mutable state of the top-down submit pass.
struct Submission<'e> {
    api: &'e dyn WorkspaceApi,
    destination: String,
    skip_files: bool,
    batch_size: usize,
    batch_pause: Duration,
    references: &'e BTreeMap<PathBuf, PathBuf>,
    progress: &'e dyn ProgressReporter,
    total_pages: usize,
    pages_done: usize,
    /// Upload id, or the failure status and reason, per file already attempted.
    uploads: HashMap<PathBuf, Result<String, (FileStatus, String)>>,
    /// Folder pages whose orphans are uploaded after the tree pass.
    orphan_queue: Vec<(String, Vec<PathBuf>)>,
    ledger: Ledger,
    folders_created: usize,
    notes_created: usize,
    page_errors: usize,
    append_errors: usize,
}

/// A block ready to append, with the record to write once the append succeeds.
struct Staged {
    block: Block,
    record: Option<FileRecord>,
}

impl<'e> Submission<'e> {
    fn new(
        engine: &MigrationEngine<'e>,
        plan: &'e MigrationPlan,
        ledger: Ledger,
        progress: &'e dyn ProgressReporter,
    ) -> Self {
        let batch_pause = if engine.options.dry_run {
            Duration::ZERO
        } else {
            Duration::from_millis(engine.config.batch_pause_ms)
        };
        Self {
            api: engine.api,
            destination: engine.options.destination_page_id.clone(),
            skip_files: engine.options.skip_files,
            batch_size: engine.config.block_batch_size(),
            batch_pause,
            references: &plan.references,
            progress,
            total_pages: plan.page_count(),
            pages_done: 0,
            uploads: HashMap::new(),
            orphan_queue: Vec::new(),
            ledger,
            folders_created: 0,
            notes_created: 0,
            page_errors: 0,
            append_errors: 0,
        }
    }

    /// The root folder is the destination page itself.
    fn submit_root(&mut self, root: &PageNode) {
        let destination = self.destination.clone();
        for child in &root.children {
            self.submit_node(child, &destination);
        }
        if !root.orphans.is_empty() {
            self.orphan_queue.push((destination, root.orphans.clone()));
        }

        let queue = std::mem::take(&mut self.orphan_queue);
        for (page_id, files) in queue {
            self.submit_orphans(&page_id, &files);
        }
    }

    fn submit_node(&mut self, node: &PageNode, parent_id: &str) {
        let page_id = match self.api.create_page(parent_id, &node.title, Some(node.icon.as_str())) {
            Ok(page_id) => page_id,
            Err(err) => {
                error!("Failed to create page '{}': {}", node.title, err);
                self.page_errors += 1;
                self.fail_subtree(node, &err);
                return;
            }
        };
        self.pages_done += 1;
        self.progress
            .on_page_done(&node.title, self.pages_done, self.total_pages);

        match node.kind {
            PageKind::Folder => {
                self.folders_created += 1;
                for child in &node.children {
                    self.submit_node(child, &page_id);
                }
                if !node.orphans.is_empty() {
                    self.orphan_queue.push((page_id, node.orphans.clone()));
                }
            }
            PageKind::Note => {
                self.notes_created += 1;
                let staged = self.stage_note_blocks(node, &page_id);
                let record = FileRecord::new(&node.path, FileStatus::Uploaded, FileCategory::Orphaned)
                    .with_page(&page_id);
                let record = match self.append(&page_id, staged) {
                    None => record,
                    Some((status, reason)) => FileRecord {
                        status,
                        ..record.with_reason(reason)
                    },
                };
                self.ledger.record(record);
            }
        }
    }

    fn stage_note_blocks(&mut self, node: &PageNode, page_id: &str) -> Vec<Staged> {
        let mut staged = Vec::with_capacity(node.blocks.len());
        for block in &node.blocks {
            match block {
                ContentBlock::Ready(block) => staged.push(Staged {
                    block: block.clone(),
                    record: None,
                }),
                ContentBlock::Attachment { path } => {
                    staged.push(self.stage_file(path, page_id, FileCategory::Referenced));
                }
                ContentBlock::MissingAttachment { reference } => staged.push(Staged {
                    block: Block::callout(&format!("Missing attachment: {}", reference), "⚠️"),
                    record: None,
                }),
            }
        }
        staged
    }

    /// Upload a file (once per run) and stage the block that shows it.
    fn stage_file(&mut self, path: &Path, page_id: &str, category: FileCategory) -> Staged {
        let name = file_name(path);
        let note = self.references.get(path).map(PathBuf::as_path);

        if self.skip_files {
            self.ledger.record(
                FileRecord::new(path, FileStatus::Skipped, category)
                    .with_reason("Uploads disabled (--skip-files)")
                    .with_note(note),
            );
            return Staged {
                block: Block::callout(&format!("Attachment: {}", name), "📎"),
                record: None,
            };
        }

        let outcome = match self.uploads.get(path) {
            Some(outcome) => outcome.clone(),
            None => {
                let outcome = self.api.upload_file(path).map_err(|err| {
                    warn!("Upload failed for {}: {}", path.display(), err);
                    (failure_status(&err), err.to_string())
                });
                self.uploads.insert(path.to_path_buf(), outcome.clone());
                outcome
            }
        };

        match outcome {
            Ok(upload_id) => Staged {
                block: Block::uploaded_file(FileKind::from_path(path), &upload_id),
                record: Some(
                    FileRecord::new(path, FileStatus::Uploaded, category)
                        .with_page(page_id)
                        .with_upload(&upload_id)
                        .with_note(note),
                ),
            },
            Err((status, reason)) => {
                self.ledger.record(
                    FileRecord::new(path, status, category)
                        .with_reason(reason)
                        .with_note(note),
                );
                Staged {
                    block: Block::callout(&format!("Attachment: {} (upload failed)", name), "📎"),
                    record: None,
                }
            }
        }
    }

    fn submit_orphans(&mut self, page_id: &str, files: &[PathBuf]) {
        debug!("Attaching {} orphaned files to {}", files.len(), page_id);
        let mut staged = Vec::new();
        for path in files {
            let item = self.stage_file(path, page_id, FileCategory::Orphaned);
            // Placeholders only make sense inside a note.
            if item.record.is_some() {
                staged.push(item);
            }
        }
        self.append(page_id, staged);
    }

    /// Append blocks in batches; file records become final when their batch lands.
    /// Returns the status and reason of the first failed batch.
    fn append(&mut self, page_id: &str, staged: Vec<Staged>) -> Option<(FileStatus, String)> {
        let mut batches = staged.into_iter().peekable();
        let mut first = true;
        let mut failure = None;

        while batches.peek().is_some() {
            let batch: Vec<Staged> = batches.by_ref().take(self.batch_size).collect();
            if !first && !self.batch_pause.is_zero() {
                thread::sleep(self.batch_pause);
            }
            first = false;

            let blocks: Vec<Block> = batch.iter().map(|s| s.block.clone()).collect();
            match self.api.append_blocks(page_id, &blocks) {
                Ok(()) => {
                    for record in batch.into_iter().filter_map(|s| s.record) {
                        self.ledger.record(record);
                    }
                }
                Err(err) => {
                    error!("Failed to add {} blocks to {}: {}", blocks.len(), page_id, err);
                    self.append_errors += 1;
                    let status = failure_status(&err);
                    let reason = format!("Block append failed: {}", err);
                    for record in batch.into_iter().filter_map(|s| s.record) {
                        let mut failed = record;
                        failed.status = status;
                        failed.destination_page_id = None;
                        self.ledger.record(failed.with_reason(reason.clone()));
                    }
                    failure.get_or_insert((status, reason));
                }
            }
        }
        failure
    }

    /// Record every note and file below a page that could not be created.
    fn fail_subtree(&mut self, node: &PageNode, err: &ApiError) {
        let skipped = node.descendant_count();
        if skipped > 0 {
            warn!("Skipping {} pages below '{}'", skipped, node.title);
        }
        self.pages_done += skipped + 1;
        self.progress
            .on_page_done(&node.title, self.pages_done, self.total_pages);

        let status = failure_status(err);
        let reason = format!("Page '{}' could not be created: {}", node.title, err);
        let mut notes = Vec::new();
        node.walk(&mut |page| {
            if page.kind == PageKind::Note {
                notes.push(page.path.clone());
            }
        });
        for path in notes {
            self.ledger.record(
                FileRecord::new(&path, status, FileCategory::Orphaned).with_reason(reason.clone()),
            );
        }

        for path in node.files() {
            let note = self.references.get(&path).map(PathBuf::as_path);
            let category = if note.is_some() {
                FileCategory::Referenced
            } else {
                FileCategory::Orphaned
            };
            // Nothing would have been uploaded.
            let record = if self.skip_files {
                FileRecord::new(&path, FileStatus::Skipped, category)
                    .with_reason("Uploads disabled (--skip-files)")
            } else {
                FileRecord::new(&path, status, category).with_reason(reason.clone())
            };
            self.ledger.record(record.with_note(note));
        }
    }
}

fn failure_status(err: &ApiError) -> FileStatus {
    if err.is_transient() {
        FileStatus::ApiError
    } else {
        FileStatus::UploadFailed
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
