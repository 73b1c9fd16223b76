use chrono::Local;
use csv::Writer;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::Error;
use crate::vault::{EntryKind, Inventory};

pub const CSV_HEADERS: [&str; 8] = [
    "file_path",
    "file_name",
    "status",
    "category",
    "destination_page_id",
    "uploaded_file_id",
    "error_reason",
    "referencing_note",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Uploaded,
    UploadFailed,
    Skipped,
    ApiError,
    NotFound,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Uploaded => "uploaded",
            FileStatus::UploadFailed => "upload_failed",
            FileStatus::Skipped => "skipped",
            FileStatus::ApiError => "api_error",
            FileStatus::NotFound => "not_found",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FileStatus::UploadFailed | FileStatus::ApiError)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Referenced,
    Orphaned,
    Skipped,
    UnresolvedReference,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Referenced => "referenced",
            FileCategory::Orphaned => "orphaned",
            FileCategory::Skipped => "skipped",
            FileCategory::UnresolvedReference => "unresolved_reference",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one discovered or referenced file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    /// Empty for unresolved references.
    pub file_path: Option<PathBuf>,
    pub file_name: String,
    pub status: FileStatus,
    pub category: FileCategory,
    pub destination_page_id: Option<String>,
    pub uploaded_file_id: Option<String>,
    pub error_reason: Option<String>,
    pub referencing_note: Option<PathBuf>,
}

impl FileRecord {
    pub fn new(path: &Path, status: FileStatus, category: FileCategory) -> Self {
        Self {
            file_path: Some(path.to_path_buf()),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            status,
            category,
            destination_page_id: None,
            uploaded_file_id: None,
            error_reason: None,
            referencing_note: None,
        }
    }

    pub fn unresolved(note: &Path, reference: &str) -> Self {
        Self {
            file_path: None,
            file_name: reference.to_string(),
            status: FileStatus::NotFound,
            category: FileCategory::UnresolvedReference,
            destination_page_id: None,
            uploaded_file_id: None,
            error_reason: Some("File not found in vault".to_string()),
            referencing_note: Some(note.to_path_buf()),
        }
    }

    pub fn with_page(mut self, page_id: &str) -> Self {
        self.destination_page_id = Some(page_id.to_string());
        self
    }

    pub fn with_upload(mut self, upload_id: &str) -> Self {
        self.uploaded_file_id = Some(upload_id.to_string());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.error_reason = Some(reason.into());
        self
    }

    pub fn with_note(mut self, note: Option<&Path>) -> Self {
        self.referencing_note = note.map(Path::to_path_buf);
        self
    }

    fn to_row(&self) -> [String; 8] {
        [
            display_path(self.file_path.as_deref()),
            self.file_name.clone(),
            self.status.to_string(),
            self.category.to_string(),
            self.destination_page_id.clone().unwrap_or_default(),
            self.uploaded_file_id.clone().unwrap_or_default(),
            self.error_reason.clone().unwrap_or_default(),
            display_path(self.referencing_note.as_deref()),
        ]
    }
}

fn display_path(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string()).unwrap_or_default()
}

/// One record per file. An upload success replaces an earlier failure; any
/// other later record for the same file is ignored.
#[derive(Debug, Default)]
pub struct Ledger {
    files: BTreeMap<PathBuf, FileRecord>,
    unresolved: Vec<FileRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: FileRecord) {
        let Some(path) = record.file_path.clone() else {
            self.unresolved.push(record);
            return;
        };

        let keep_existing = match self.files.get(&path) {
            Some(existing) => {
                existing.status == FileStatus::Uploaded || record.status != FileStatus::Uploaded
            }
            None => false,
        };
        if !keep_existing {
            self.files.insert(path, record);
        }
    }

    pub fn record_unresolved(&mut self, note: &Path, reference: &str) {
        self.unresolved.push(FileRecord::unresolved(note, reference));
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.files.get(path)
    }

    /// Give every inventoried file a record if it has none.
    pub fn reconcile(&mut self, inventory: &Inventory, references: &BTreeMap<PathBuf, PathBuf>) {
        for (path, kind) in inventory.iter() {
            if self.files.contains_key(path) {
                continue;
            }
            let record = match kind {
                EntryKind::Note => {
                    warn!("No page recorded for {}", path.display());
                    FileRecord::new(path, FileStatus::UploadFailed, FileCategory::Orphaned)
                        .with_reason("Not processed")
                }
                EntryKind::Skipped => FileRecord::new(path, FileStatus::Skipped, FileCategory::Skipped)
                    .with_reason("Excluded from migration"),
                EntryKind::Attachment => {
                    warn!("No outcome recorded for {}", path.display());
                    let note = references.get(path);
                    let category = if note.is_some() {
                        FileCategory::Referenced
                    } else {
                        FileCategory::Orphaned
                    };
                    FileRecord::new(path, FileStatus::UploadFailed, category)
                        .with_reason("Not processed")
                        .with_note(note.map(PathBuf::as_path))
                }
            };
            self.files.insert(path.to_path_buf(), record);
        }
    }

    /// File records in path order.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    pub fn unresolved(&self) -> &[FileRecord] {
        &self.unresolved
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn count(&self, status: FileStatus) -> usize {
        self.records().filter(|r| r.status == status).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileRecord> {
        self.records().filter(|r| r.status.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        !self.unresolved.is_empty() || self.failures().next().is_some()
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), Error> {
        let mut writer = Writer::from_path(path)?;
        writer.write_record(CSV_HEADERS)?;
        for record in self.records().chain(self.unresolved.iter()) {
            writer.write_record(record.to_row())?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Human-readable list of unresolved references and failed uploads.
    pub fn write_failed_report(&self, path: &Path) -> Result<(), Error> {
        let failures: Vec<&FileRecord> = self.failures().collect();
        let mut out = BufWriter::new(File::create(path)?);
        let rule = "=".repeat(60);

        writeln!(out, "{}", rule)?;
        writeln!(out, "Vault to Notion Migration - Failed Files Report")?;
        writeln!(out, "Generated: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(out, "{}\n", rule)?;

        if !self.unresolved.is_empty() {
            writeln!(out, "UNRESOLVED FILE REFERENCES ({})", self.unresolved.len())?;
            writeln!(out, "{}", "-".repeat(40))?;
            writeln!(out, "These files were referenced but could not be found:\n")?;
            for record in &self.unresolved {
                writeln!(out, "  Note: {}", display_path(record.referencing_note.as_deref()))?;
                writeln!(out, "  Reference: {}\n", record.file_name)?;
            }
        }

        if !failures.is_empty() {
            writeln!(out, "\nFAILED UPLOADS ({})", failures.len())?;
            writeln!(out, "{}", "-".repeat(40))?;
            writeln!(out, "These files were found but could not be uploaded:\n")?;
            for record in failures {
                writeln!(out, "  File: {}", display_path(record.file_path.as_deref()))?;
                writeln!(out, "  Status: {}", record.status)?;
                writeln!(
                    out,
                    "  Reason: {}\n",
                    record.error_reason.as_deref().unwrap_or("Unknown")
                )?;
            }
        }

        out.flush()?;
        Ok(())
    }
}

/// Where the reports of one run were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub csv: PathBuf,
    /// Only written when something failed.
    pub failed: Option<PathBuf>,
}

/// `{source}-{timestamp}-files_report.csv` and `{source}-{timestamp}-failed_files.txt`.
pub fn report_file_names(source: &Path, timestamp: &str) -> (String, String) {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "vault".to_string());
    (
        format!("{}-{}-files_report.csv", name, timestamp),
        format!("{}-{}-failed_files.txt", name, timestamp),
    )
}

pub fn write_reports(ledger: &Ledger, source: &Path, dir: &Path) -> Result<ReportPaths, Error> {
    fs::create_dir_all(dir)?;
    let timestamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let (csv_name, failed_name) = report_file_names(source, &timestamp);

    let csv = dir.join(csv_name);
    ledger.write_csv(&csv)?;
    info!("CSV report written to: {}", csv.display());

    let failed = if ledger.has_failures() {
        let path = dir.join(failed_name);
        ledger.write_failed_report(&path)?;
        info!("Failure report written to: {}", path.display());
        Some(path)
    } else {
        None
    };

    Ok(ReportPaths { csv, failed })
}
