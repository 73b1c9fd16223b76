use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::{tempdir, TempDir};

use vault_to_notion::blocks::Block;
use vault_to_notion::notion::{ApiError, DryRunApi, WorkspaceApi};
use vault_to_notion::report::{FileCategory, FileStatus};
use vault_to_notion::{AppConfig, MigrationEngine, MigrationOptions, MigrationResult, SilentReporter};

const DESTINATION: &str = "0123abcd-4567-89ef-0123-456789abcdef";

#[derive(Debug, Clone)]
enum Call {
    CreatePage { parent: String, title: String, id: String },
    Append { page: String, blocks: Vec<Block> },
    Upload(PathBuf),
}

/// Records every call; fails the pages, appends and uploads it is told to.
#[derive(Default)]
struct MockApi {
    calls: Mutex<Vec<Call>>,
    fail_pages: Vec<String>,
    fail_appends: Vec<(String, u16)>,
    fail_uploads: Vec<(String, u16)>,
}

impl MockApi {
    fn failing_page(mut self, title: &str) -> Self {
        self.fail_pages.push(title.to_string());
        self
    }

    fn failing_append(mut self, page_title: &str, status: u16) -> Self {
        self.fail_appends.push((page_title.to_string(), status));
        self
    }

    fn failing_upload(mut self, file_name: &str, status: u16) -> Self {
        self.fail_uploads.push((file_name.to_string(), status));
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn children_of(&self, parent_id: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::CreatePage { parent, title, .. } if parent == parent_id => Some(title),
                _ => None,
            })
            .collect()
    }

    fn page_id(&self, page_title: &str) -> String {
        self.calls()
            .into_iter()
            .find_map(|call| match call {
                Call::CreatePage { title, id, .. } if title == page_title => Some(id),
                _ => None,
            })
            .unwrap()
    }

    fn blocks_for(&self, page_id: &str) -> Vec<Block> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Append { page, blocks } if page == page_id => Some(blocks),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn uploads(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Upload(path) => Some(path),
                _ => None,
            })
            .collect()
    }
}

impl WorkspaceApi for MockApi {
    fn create_page(&self, parent_id: &str, title: &str, _icon: Option<&str>) -> Result<String, ApiError> {
        if self.fail_pages.iter().any(|t| t == title) {
            return Err(ApiError::status(400, "validation_error"));
        }
        let mut calls = self.calls.lock().unwrap();
        let id = format!("page-{}", calls.len());
        calls.push(Call::CreatePage {
            parent: parent_id.to_string(),
            title: title.to_string(),
            id: id.clone(),
        });
        Ok(id)
    }

    fn append_blocks(&self, page_id: &str, blocks: &[Block]) -> Result<(), ApiError> {
        let mut calls = self.calls.lock().unwrap();
        let failure = calls.iter().find_map(|call| match call {
            Call::CreatePage { title, id, .. } if id == page_id => self
                .fail_appends
                .iter()
                .find(|(t, _)| t == title)
                .map(|(_, status)| *status),
            _ => None,
        });
        if let Some(status) = failure {
            return Err(ApiError::status(status, "append rejected"));
        }
        calls.push(Call::Append {
            page: page_id.to_string(),
            blocks: blocks.to_vec(),
        });
        Ok(())
    }

    fn upload_file(&self, path: &Path) -> Result<String, ApiError> {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        if let Some((_, status)) = self.fail_uploads.iter().find(|(n, _)| *n == name) {
            return Err(ApiError::status(*status, "upload rejected"));
        }
        let mut calls = self.calls.lock().unwrap();
        calls.push(Call::Upload(path.to_path_buf()));
        Ok(format!("upload-{}", name))
    }
}

/// Layout:
///   vault/
///     .obsidian/app.json          (hidden, skipped)
///     Templates/Daily.md          (ignored by glob, skipped)
///     Projects/
///       Plan.md                   (embeds diagram.png, links spec.pdf, embeds missing.png)
///       files/diagram.png
///       files/spec.pdf
///       files/unused.txt          (orphan of Projects)
///     2024-01-05 Standup.md
///     Alpha.md
///     loose.csv                   (orphan of the root)
fn create_vault() -> (TempDir, PathBuf) {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("vault");
    let write = |relative: &str, content: &str| {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    };

    write(".obsidian/app.json", "{}");
    write("Templates/Daily.md", "# {{date}}");
    write(
        "Projects/Plan.md",
        "# Plan\n\n![[diagram.png]]\n\nRead [the spec](files/spec.pdf).\n\n![[missing.png]]\n",
    );
    write("Projects/files/diagram.png", "png");
    write("Projects/files/spec.pdf", "%PDF");
    write("Projects/files/unused.txt", "orphan");
    write("2024-01-05 Standup.md", "Standup notes");
    write("Alpha.md", "alpha");
    write("loose.csv", "a,b");

    let root = fs::canonicalize(root).unwrap();
    (tmp, root)
}

fn test_config() -> AppConfig {
    AppConfig {
        batch_pause_ms: 0,
        ignore_patterns: vec!["Templates".to_string()],
        ..AppConfig::default()
    }
}

fn options(root: &Path, reports: &Path) -> MigrationOptions {
    let mut options = MigrationOptions::new(root.to_path_buf(), DESTINATION.to_string());
    options.report_dir = reports.to_path_buf();
    options
}

fn run(api: &dyn WorkspaceApi, options: MigrationOptions) -> MigrationResult {
    MigrationEngine::new(test_config(), options, api)
        .run(&SilentReporter)
        .unwrap()
}

#[test]
fn test_every_file_has_exactly_one_record() {
    let (_tmp, root) = create_vault();
    let reports = tempdir().unwrap();
    let api = MockApi::default();

    let result = run(&api, options(&root, reports.path()));

    let expected: Vec<PathBuf> = [
        ".obsidian/app.json",
        "2024-01-05 Standup.md",
        "Alpha.md",
        "Projects/Plan.md",
        "Projects/files/diagram.png",
        "Projects/files/spec.pdf",
        "Projects/files/unused.txt",
        "Templates/Daily.md",
        "loose.csv",
    ]
    .iter()
    .map(|p| root.join(p))
    .collect();

    let recorded: Vec<PathBuf> = result
        .ledger
        .records()
        .map(|r| r.file_path.clone().unwrap())
        .collect();
    let mut sorted_expected = expected.clone();
    sorted_expected.sort();
    assert_eq!(recorded, sorted_expected);

    let status = |p: &str| result.ledger.get(&root.join(p)).unwrap().clone();
    assert_eq!(status(".obsidian/app.json").status, FileStatus::Skipped);
    assert_eq!(status("Templates/Daily.md").category, FileCategory::Skipped);
    assert_eq!(status("Projects/files/diagram.png").category, FileCategory::Referenced);
    assert_eq!(status("Projects/files/unused.txt").category, FileCategory::Orphaned);
    assert_eq!(status("loose.csv").status, FileStatus::Uploaded);
    let plan = status("Projects/Plan.md");
    assert_eq!(plan.status, FileStatus::Uploaded);
    assert_eq!(plan.destination_page_id, Some(api.page_id("Plan")));

    assert_eq!(result.ledger.unresolved().len(), 1);
    assert_eq!(result.ledger.unresolved()[0].file_name, "missing.png");
    assert_eq!(result.summary.files_uploaded, 7);
    assert_eq!(result.summary.files_skipped, 2);
    assert_eq!(result.summary.folders_created, 1);
    assert_eq!(result.summary.notes_created, 3);
}

#[test]
fn test_referenced_files_attach_to_their_note() {
    let (_tmp, root) = create_vault();
    let reports = tempdir().unwrap();
    let api = MockApi::default();

    let result = run(&api, options(&root, reports.path()));

    let plan_page = api.page_id("Plan");
    let diagram = result
        .ledger
        .get(&root.join("Projects/files/diagram.png"))
        .unwrap();
    assert_eq!(diagram.destination_page_id.as_deref(), Some(plan_page.as_str()));
    assert_eq!(diagram.uploaded_file_id.as_deref(), Some("upload-diagram.png"));
    assert_eq!(
        diagram.referencing_note.as_deref(),
        Some(root.join("Projects/Plan.md").as_path())
    );

    let types: Vec<&str> = api
        .blocks_for(&plan_page)
        .iter()
        .map(|b| b.type_name())
        .collect();
    assert_eq!(
        types,
        vec!["heading_1", "image", "paragraph", "pdf", "callout"]
    );

    let projects_page = api.page_id("Projects");
    let orphan_blocks = api.blocks_for(&projects_page);
    assert_eq!(orphan_blocks.len(), 1);
    assert_eq!(orphan_blocks[0].type_name(), "file");
}

#[test]
fn test_sibling_order() {
    let (_tmp, root) = create_vault();
    let reports = tempdir().unwrap();

    let api = MockApi::default();
    run(&api, options(&root, reports.path()));
    assert_eq!(
        api.children_of(DESTINATION),
        vec!["Projects", "2024-01-05 Standup", "Alpha"]
    );

    let api = MockApi::default();
    let mut reversed = options(&root, reports.path());
    reversed.reverse_sort = true;
    run(&api, reversed);
    assert_eq!(
        api.children_of(DESTINATION),
        vec!["Projects", "Alpha", "2024-01-05 Standup"]
    );
}

#[test]
fn test_failed_folder_page_records_its_files() {
    let (_tmp, root) = create_vault();
    let reports = tempdir().unwrap();
    let api = MockApi::default().failing_page("Projects");

    let result = run(&api, options(&root, reports.path()));

    assert_eq!(result.summary.page_errors, 1);
    assert!(!api.children_of(DESTINATION).contains(&"Projects".to_string()));
    for name in ["Plan.md", "files/diagram.png", "files/spec.pdf", "files/unused.txt"] {
        let record = result.ledger.get(&root.join("Projects").join(name)).unwrap();
        assert_eq!(record.status, FileStatus::UploadFailed, "{name}");
        assert!(record.error_reason.as_deref().unwrap().contains("Projects"));
    }
    assert_eq!(
        result.ledger.get(&root.join("loose.csv")).unwrap().status,
        FileStatus::Uploaded
    );
    assert!(result.reports.failed.is_some());
}

#[test]
fn test_upload_failures_are_classified() {
    let (_tmp, root) = create_vault();
    let reports = tempdir().unwrap();
    let api = MockApi::default()
        .failing_upload("spec.pdf", 503)
        .failing_upload("diagram.png", 400);

    let result = run(&api, options(&root, reports.path()));

    let spec = result.ledger.get(&root.join("Projects/files/spec.pdf")).unwrap();
    assert_eq!(spec.status, FileStatus::ApiError);
    let diagram = result
        .ledger
        .get(&root.join("Projects/files/diagram.png"))
        .unwrap();
    assert_eq!(diagram.status, FileStatus::UploadFailed);
    assert_eq!(result.summary.files_failed, 2);

    let placeholders: Vec<String> = api
        .blocks_for(&api.page_id("Plan"))
        .iter()
        .filter(|b| b.type_name() == "callout")
        .map(|b| b.plain_text())
        .collect();
    assert!(placeholders.contains(&"Attachment: spec.pdf (upload failed)".to_string()));
    assert!(placeholders.contains(&"Missing attachment: missing.png".to_string()));
}

#[test]
fn test_skip_files_uploads_nothing() {
    let (_tmp, root) = create_vault();
    let reports = tempdir().unwrap();
    let api = MockApi::default();
    let mut opts = options(&root, reports.path());
    opts.skip_files = true;

    let result = run(&api, opts);

    assert!(api.uploads().is_empty());
    assert_eq!(result.summary.files_uploaded, result.summary.notes_created);
    assert_eq!(
        result
            .ledger
            .get(&root.join("Projects/files/diagram.png"))
            .unwrap()
            .status,
        FileStatus::Skipped
    );
    assert_eq!(
        result.ledger.get(&root.join("loose.csv")).unwrap().category,
        FileCategory::Orphaned
    );
    assert!(api
        .blocks_for(&api.page_id("Plan"))
        .iter()
        .any(|b| b.plain_text() == "Attachment: diagram.png"));
}

#[test]
fn test_dry_run_writes_reports() {
    let (_tmp, root) = create_vault();
    let reports = tempdir().unwrap();
    let api = DryRunApi::new();
    let mut opts = options(&root, reports.path());
    opts.dry_run = true;

    let result = run(&api, opts);

    let csv = fs::read_to_string(&result.reports.csv).unwrap();
    assert!(csv.starts_with("file_path,file_name,status,category,"));
    assert!(csv.contains("dry-run-file-"));
    assert!(csv.contains("missing.png,not_found,unresolved_reference"));

    let failed = fs::read_to_string(result.reports.failed.unwrap()).unwrap();
    assert!(failed.contains("UNRESOLVED FILE REFERENCES (1)"));
    assert!(failed.contains("Reference: missing.png"));
}

#[test]
fn test_long_notes_append_in_batches() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("vault");
    fs::create_dir_all(&root).unwrap();
    let body: String = (0..250).map(|i| format!("Paragraph {}\n\n", i)).collect();
    fs::write(root.join("Long.md"), body).unwrap();
    let reports = tempdir().unwrap();
    let api = MockApi::default();

    let result = run(&api, options(&root, reports.path()));

    let page = api.page_id("Long");
    let batches: Vec<usize> = api
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Append { page: p, blocks } if p == page => Some(blocks.len()),
            _ => None,
        })
        .collect();
    assert_eq!(batches, vec![100, 100, 50]);
    assert!(result.reports.failed.is_none());
}

#[test]
fn test_failed_note_page_is_reported() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("vault");
    fs::create_dir_all(root.join("files")).unwrap();
    fs::write(root.join("Broken.md"), "![[shared.png]]").unwrap();
    fs::write(root.join("Good.md"), "![[shared.png]]").unwrap();
    fs::write(root.join("files/shared.png"), "png").unwrap();
    let root = fs::canonicalize(root).unwrap();
    let reports = tempdir().unwrap();
    let api = MockApi::default().failing_page("Broken");

    let result = run(&api, options(&root, reports.path()));

    assert_eq!(result.summary.page_errors, 1);
    let broken = result.ledger.get(&root.join("Broken.md")).unwrap();
    assert_eq!(broken.status, FileStatus::UploadFailed);
    assert!(broken.error_reason.as_deref().unwrap().contains("'Broken'"));

    let good = result.ledger.get(&root.join("Good.md")).unwrap();
    assert_eq!(good.status, FileStatus::Uploaded);
    assert_eq!(good.destination_page_id, Some(api.page_id("Good")));

    // Uploaded by the second note after the first one failed.
    let shared = result.ledger.get(&root.join("files/shared.png")).unwrap();
    assert_eq!(shared.status, FileStatus::Uploaded);
    assert_eq!(shared.destination_page_id, Some(api.page_id("Good")));
    assert_eq!(result.ledger.len(), 3);

    let failed = fs::read_to_string(result.reports.failed.unwrap()).unwrap();
    assert!(failed.contains("FAILED UPLOADS (1)"));
    assert!(failed.contains("Broken.md"));
}

#[test]
fn test_failed_append_marks_staged_uploads() {
    let (_tmp, root) = create_vault();
    let reports = tempdir().unwrap();
    let api = MockApi::default().failing_append("Plan", 503);

    let result = run(&api, options(&root, reports.path()));

    assert_eq!(result.summary.append_errors, 1);
    for name in ["Plan.md", "files/diagram.png", "files/spec.pdf"] {
        let record = result.ledger.get(&root.join("Projects").join(name)).unwrap();
        assert_eq!(record.status, FileStatus::ApiError, "{name}");
        assert!(record
            .error_reason
            .as_deref()
            .unwrap()
            .starts_with("Block append failed"));
    }
    let diagram = result
        .ledger
        .get(&root.join("Projects/files/diagram.png"))
        .unwrap();
    assert_eq!(diagram.destination_page_id, None);
    assert_eq!(
        result
            .ledger
            .get(&root.join("Projects/files/unused.txt"))
            .unwrap()
            .status,
        FileStatus::Uploaded
    );
}

#[test]
fn test_skip_files_under_failed_page_stay_skipped() {
    let (_tmp, root) = create_vault();
    let reports = tempdir().unwrap();
    let api = MockApi::default().failing_page("Projects");
    let mut opts = options(&root, reports.path());
    opts.skip_files = true;

    let result = run(&api, opts);

    for name in ["diagram.png", "spec.pdf", "unused.txt"] {
        let record = result
            .ledger
            .get(&root.join("Projects/files").join(name))
            .unwrap();
        assert_eq!(record.status, FileStatus::Skipped, "{name}");
    }
    assert_eq!(
        result.ledger.get(&root.join("Projects/Plan.md")).unwrap().status,
        FileStatus::UploadFailed
    );
}
