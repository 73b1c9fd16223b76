use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

lazy_static! {
    static ref DATE_PREFIX: Regex = Regex::new(r"^(\d{4}-\d{2}-\d{2})").expect("valid date regex");
}

/// Extensions that make a plain Markdown link point at a local file.
const FILE_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "png", "jpg", "jpeg", "gif", "webp", "svg",
    "bmp", "mp4", "mov", "webm", "avi", "mkv", "mp3", "wav", "ogg", "m4a", "flac", "zip", "tar",
    "gz", "rar", "7z", "txt", "csv", "json", "xml", "yaml", "yml", "html", "htm", "ipynb",
];

/// Title and optional date derived from a note's file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteTitle {
    pub title: String,
    pub date: Option<NaiveDate>,
}

impl NoteTitle {
    /// `2024-03-01 Standup` yields date 2024-03-01 and title `Standup`. A date
    /// prefix that is not a real calendar date is left in the title.
    pub fn from_stem(stem: &str) -> Self {
        let date = DATE_PREFIX
            .captures(stem)
            .and_then(|caps| NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok());

        match date {
            Some(date) => {
                let rest = stem[10..].trim();
                let title = if rest.is_empty() {
                    date.format("%Y-%m-%d").to_string()
                } else {
                    rest.to_string()
                };
                Self {
                    title,
                    date: Some(date),
                }
            }
            None => Self {
                title: stem.trim().to_string(),
                date: None,
            },
        }
    }

    pub fn from_path(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_stem(&stem)
    }

    /// Page title: the date stays visible in front of dated notes.
    pub fn display_title(&self) -> String {
        match self.date {
            Some(date) => {
                let prefix = date.format("%Y-%m-%d").to_string();
                if self.title == prefix {
                    prefix
                } else {
                    format!("{} {}", prefix, self.title)
                }
            }
            None => self.title.clone(),
        }
    }
}

/// Link targets that never name a file in the vault.
pub fn is_remote_target(target: &str) -> bool {
    let lower = target.trim().to_ascii_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("data:")
        || lower.starts_with("mailto:")
        || lower.starts_with('#')
}

fn target_extension(target: &str) -> Option<String> {
    let without_fragment = target.split(['#', '?']).next().unwrap_or(target);
    Path::new(without_fragment.trim())
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Embeds without an extension, or of `.md` files, transclude another note.
pub fn is_note_target(target: &str) -> bool {
    match target_extension(target) {
        None => true,
        Some(ext) => ext == "md",
    }
}

/// Plain links count as file references only for known document and media types.
pub fn has_file_extension(target: &str) -> bool {
    target_extension(target)
        .map(|ext| FILE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Display name of a transcluded note: `folder/Note.md#Part` becomes `Note`.
pub fn note_target_name(target: &str) -> String {
    let without_fragment = target.split('#').next().unwrap_or(target).trim();
    let name = Path::new(without_fragment)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| without_fragment.to_string());
    name.strip_suffix(".md").map(str::to_string).unwrap_or(name)
}
