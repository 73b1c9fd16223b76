use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

use super::scan::{is_attachment_dir, EntryKind, Inventory, ATTACHMENT_DIR};

/// Locates the vault file a note reference points to.
///
/// Order: the note's `files/` folder, the note's own folder, the vault root,
/// then any attachment with the same file name anywhere in the vault. The
/// reference is tried URL-decoded first, then raw.
pub struct Resolver<'a> {
    inventory: &'a Inventory,
}

impl<'a> Resolver<'a> {
    pub fn new(inventory: &'a Inventory) -> Self {
        Self { inventory }
    }

    pub fn resolve(&self, reference: &str, note_path: &Path) -> Option<PathBuf> {
        let reference = reference.trim().trim_start_matches('/');
        if reference.is_empty() {
            return None;
        }

        let candidates = reference_variants(reference);
        let note_dir = note_path.parent().unwrap_or(self.inventory.root());

        for candidate in &candidates {
            if let Some(found) = self.search_directories(candidate, note_dir) {
                trace!("Resolved '{}' to {}", reference, found.display());
                return Some(found);
            }
        }

        for candidate in &candidates {
            let name = basename(candidate);
            if let Some(found) = self.inventory.find_by_name(name) {
                trace!("Resolved '{}' by name to {}", reference, found.display());
                return Some(found.to_path_buf());
            }
        }

        None
    }

    fn search_directories(&self, reference: &str, note_dir: &Path) -> Option<PathBuf> {
        let files_dir = note_dir.join(ATTACHMENT_DIR);
        let name = basename(reference);

        self.existing(&files_dir.join(reference))
            .or_else(|| self.existing(&files_dir.join(name)))
            .or_else(|| self.scan_attachment_dir(note_dir, name))
            .or_else(|| self.existing(&note_dir.join(reference)))
            .or_else(|| self.existing(&self.inventory.root().join(reference)))
    }

    /// First entry of the note's attachment folder, sorted, whose name or stem matches.
    fn scan_attachment_dir(&self, note_dir: &Path, name: &str) -> Option<PathBuf> {
        let dir = fs::read_dir(note_dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .find(|entry| is_attachment_dir(&entry.file_name().to_string_lossy()))?
            .path();

        let mut entries: Vec<PathBuf> = fs::read_dir(dir)
            .ok()?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        let wanted_stem = Path::new(name).file_stem();
        let by_name = entries
            .iter()
            .filter(|path| path.file_name().map(|n| n.to_string_lossy()).as_deref() == Some(name))
            .find_map(|path| self.existing(path));
        by_name.or_else(|| {
            entries
                .iter()
                .filter(|path| wanted_stem.is_some() && path.file_stem() == wanted_stem)
                .find_map(|path| self.existing(path))
        })
    }

    /// Canonical path of `candidate` when it is an attachment tracked by the inventory.
    fn existing(&self, candidate: &Path) -> Option<PathBuf> {
        let canonical = fs::canonicalize(candidate).ok()?;
        if canonical.is_file() && self.inventory.kind(&canonical) == Some(EntryKind::Attachment) {
            Some(canonical)
        } else {
            None
        }
    }
}

fn reference_variants(reference: &str) -> Vec<String> {
    let mut variants = Vec::with_capacity(2);
    if let Ok(decoded) = urlencoding::decode(reference) {
        variants.push(decoded.into_owned());
    }
    if variants.first().map(String::as_str) != Some(reference) {
        variants.push(reference.to_string());
    }
    variants
}

fn basename(reference: &str) -> &str {
    reference
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(reference)
}
