use glob::Pattern;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, trace};
use walkdir::WalkDir;

use crate::error::Error;

/// Name of the per-folder attachment directory. It is never a page itself.
pub const ATTACHMENT_DIR: &str = "files";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Markdown file migrated as a page.
    Note,
    /// Any other file outside hidden or ignored directories.
    Attachment,
    /// Inside a hidden directory, hidden itself, or matching an ignore glob.
    Skipped,
}

/// Glob ignore patterns, matched against vault-relative paths.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
}

impl IgnoreRules {
    pub fn new(globs: &[String]) -> Self {
        let patterns = globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    /// True when `relative` or any of its ancestors is hidden or matches a pattern.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        let hidden = relative.components().any(|component| match component {
            Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        });
        if hidden {
            return true;
        }

        relative
            .ancestors()
            .filter(|ancestor| !ancestor.as_os_str().is_empty())
            .any(|ancestor| self.patterns.iter().any(|pattern| pattern.matches_path(ancestor)))
    }
}

pub fn is_attachment_dir(name: &str) -> bool {
    name.eq_ignore_ascii_case(ATTACHMENT_DIR)
}

pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}

/// Every regular file under the vault root, classified once.
#[derive(Debug)]
pub struct Inventory {
    root: PathBuf,
    ignore: IgnoreRules,
    entries: BTreeMap<PathBuf, EntryKind>,
    by_name: HashMap<String, Vec<PathBuf>>,
}

impl Inventory {
    /// Walk `root` (canonicalized first). Symlinks are not followed or recorded.
    pub fn scan(root: &Path, ignore: IgnoreRules) -> Result<Self, Error> {
        let root = fs::canonicalize(root)?;
        let mut entries = BTreeMap::new();

        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if err
                        .io_error()
                        .map(|e| e.kind() == std::io::ErrorKind::PermissionDenied)
                        .unwrap_or(false)
                    {
                        error!("Access denied while scanning: {}", err);
                        continue;
                    }
                    return Err(err.into());
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.into_path();
            let kind = classify(&root, &path, &ignore);
            trace!("{:?} {}", kind, path.display());
            entries.insert(path, kind);
        }

        Ok(Self::from_entries(root, ignore, entries))
    }

    fn from_entries(root: PathBuf, ignore: IgnoreRules, entries: BTreeMap<PathBuf, EntryKind>) -> Self {
        let mut by_name: HashMap<String, Vec<PathBuf>> = HashMap::new();
        for (path, kind) in &entries {
            if *kind != EntryKind::Attachment {
                continue;
            }
            if let Some(name) = path.file_name() {
                by_name
                    .entry(name.to_string_lossy().into_owned())
                    .or_default()
                    .push(path.clone());
            }
        }

        debug!(
            "Inventory of {}: {} files ({} notes)",
            root.display(),
            entries.len(),
            entries.values().filter(|k| **k == EntryKind::Note).count()
        );

        Self {
            root,
            ignore,
            entries,
            by_name,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ignore_rules(&self) -> &IgnoreRules {
        &self.ignore
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn kind(&self, path: &Path) -> Option<EntryKind> {
        self.entries.get(path).copied()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// All entries in sorted path order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, EntryKind)> {
        self.entries.iter().map(|(path, kind)| (path.as_path(), *kind))
    }

    pub fn of_kind(&self, kind: EntryKind) -> impl Iterator<Item = &Path> {
        self.iter().filter(move |(_, k)| *k == kind).map(|(path, _)| path)
    }

    /// Path relative to the vault root, for display and ignore matching.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    /// Full-tree fallback: first attachment, in sorted path order, with this file name.
    pub fn find_by_name(&self, name: &str) -> Option<&Path> {
        self.by_name
            .get(name)
            .and_then(|paths| paths.first())
            .map(|path| path.as_path())
    }
}

fn classify(root: &Path, path: &Path, ignore: &IgnoreRules) -> EntryKind {
    let relative = path.strip_prefix(root).unwrap_or(path);

    if ignore.is_excluded(relative) {
        return EntryKind::Skipped;
    }

    let in_attachment_dir = relative
        .parent()
        .map(|parent| {
            parent
                .components()
                .any(|c| matches!(c, Component::Normal(name) if is_attachment_dir(&name.to_string_lossy())))
        })
        .unwrap_or(false);

    if is_markdown(path) && !in_attachment_dir {
        EntryKind::Note
    } else {
        EntryKind::Attachment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_components_are_excluded() {
        let rules = IgnoreRules::default();
        assert!(rules.is_excluded(Path::new(".obsidian/app.json")));
        assert!(rules.is_excluded(Path::new("notes/.trash/old.md")));
        assert!(rules.is_excluded(Path::new("notes/.DS_Store")));
        assert!(!rules.is_excluded(Path::new("notes/files/image.png")));
    }

    #[test]
    fn test_glob_matches_ancestor_directories() {
        let rules = IgnoreRules::new(&["Templates".to_string(), "*.tmp".to_string()]);
        assert!(rules.is_excluded(Path::new("Templates/daily.md")));
        assert!(rules.is_excluded(Path::new("scratch.tmp")));
        assert!(!rules.is_excluded(Path::new("Projects/plan.md")));
    }

    #[test]
    fn test_classify() {
        let root = Path::new("/vault");
        let rules = IgnoreRules::default();
        assert_eq!(classify(root, Path::new("/vault/a.md"), &rules), EntryKind::Note);
        assert_eq!(classify(root, Path::new("/vault/x/b.MD"), &rules), EntryKind::Note);
        assert_eq!(
            classify(root, Path::new("/vault/x/files/c.md"), &rules),
            EntryKind::Attachment
        );
        assert_eq!(
            classify(root, Path::new("/vault/x/img.png"), &rules),
            EntryKind::Attachment
        );
        assert_eq!(
            classify(root, Path::new("/vault/.git/config"), &rules),
            EntryKind::Skipped
        );
    }
}
