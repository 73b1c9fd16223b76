use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::note::NoteTitle;
use super::resolve::Resolver;
use super::scan::{is_attachment_dir, EntryKind, Inventory};
use crate::blocks::{convert_note, Block, ContentBlock, LinkTitles, NoteConversion};

pub const NOTE_ICON: &str = "📄";
const DEFAULT_FOLDER_ICON: &str = "📁";

const FOLDER_ICONS: &[(&str, &str)] = &[
    ("journal", "📓"),
    ("journals", "📓"),
    ("area", "📋"),
    ("areas", "📋"),
    ("note", "📝"),
    ("notes", "📝"),
    ("resource", "📚"),
    ("resources", "📚"),
    ("archive", "🗄️"),
    ("archives", "🗄️"),
    ("reference", "📖"),
    ("references", "📖"),
    ("project", "📂"),
    ("projects", "📂"),
    ("inbox", "📥"),
    ("templates", "📋"),
    ("daily", "📅"),
    ("daily notes", "📅"),
    ("weekly", "📆"),
];

/// Emoji for a folder page, chosen by its lowercased name.
pub fn folder_icon(name: &str) -> &'static str {
    let name = name.to_lowercase();
    FOLDER_ICONS
        .iter()
        .find(|(folder, _)| *folder == name)
        .map(|(_, icon)| *icon)
        .unwrap_or(DEFAULT_FOLDER_ICON)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Folder,
    Note,
}

/// One page to create: a folder or a note, with its children in submit order.
#[derive(Debug, Clone)]
pub struct PageNode {
    pub path: PathBuf,
    pub kind: PageKind,
    pub title: String,
    pub icon: String,
    pub children: Vec<PageNode>,
    pub blocks: Vec<ContentBlock>,
    /// Unreferenced attachments appended to this folder page.
    pub orphans: Vec<PathBuf>,
}

impl PageNode {
    fn folder(path: PathBuf) -> Self {
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let icon = folder_icon(&title).to_string();
        Self {
            path,
            kind: PageKind::Folder,
            title,
            icon,
            children: Vec::new(),
            blocks: Vec::new(),
            orphans: Vec::new(),
        }
    }

    fn note(path: PathBuf) -> Self {
        let title = NoteTitle::from_path(&path).display_title();
        Self {
            path,
            kind: PageKind::Note,
            title,
            icon: NOTE_ICON.to_string(),
            children: Vec::new(),
            blocks: Vec::new(),
            orphans: Vec::new(),
        }
    }

    /// Pages in this subtree, excluding this node.
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| 1 + child.descendant_count())
            .sum()
    }

    pub fn count_kind(&self, kind: PageKind) -> usize {
        let own = usize::from(self.kind == kind);
        own + self
            .children
            .iter()
            .map(|child| child.count_kind(kind))
            .sum::<usize>()
    }

    /// Visit this node and its descendants in submit order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a PageNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    fn walk_mut(&mut self, visit: &mut impl FnMut(&mut PageNode)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }

    /// Files whose upload depends on this subtree: attachments referenced by its
    /// notes and orphans attached to its folders.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        self.walk(&mut |node| {
            for block in &node.blocks {
                if let ContentBlock::Attachment { path } = block {
                    files.push(path.clone());
                }
            }
            files.extend(node.orphans.iter().cloned());
        });
        files
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub note: PathBuf,
    pub reference: String,
}

/// The page tree plus the reference bookkeeping the report needs.
#[derive(Debug)]
pub struct MigrationPlan {
    /// The vault root. Its page is the destination page and is never created.
    pub root: PageNode,
    /// Each referenced attachment, mapped to the first note referencing it.
    pub references: BTreeMap<PathBuf, PathBuf>,
    pub unresolved: Vec<UnresolvedReference>,
}

impl MigrationPlan {
    pub fn page_count(&self) -> usize {
        self.root.descendant_count()
    }

    pub fn folder_count(&self) -> usize {
        self.root.count_kind(PageKind::Folder).saturating_sub(1)
    }

    pub fn note_count(&self) -> usize {
        self.root.count_kind(PageKind::Note)
    }
}

/// Build the page tree for an inventoried vault and convert every note.
pub fn plan_migration(
    inventory: &Inventory,
    reverse_sort: bool,
    titles: Option<&LinkTitles>,
) -> MigrationPlan {
    let mut notes_by_dir: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();
    for note in inventory.of_kind(EntryKind::Note) {
        if let Some(parent) = note.parent() {
            notes_by_dir
                .entry(parent.to_path_buf())
                .or_default()
                .push(note.to_path_buf());
        }
    }

    let mut root = build_skeleton(inventory, inventory.root(), &notes_by_dir, reverse_sort);

    let mut note_paths = Vec::new();
    root.walk(&mut |node| {
        if node.kind == PageKind::Note {
            note_paths.push(node.path.clone());
        }
    });
    info!("Converting {} notes", note_paths.len());

    let resolver = Resolver::new(inventory);
    let conversions: Vec<(PathBuf, NoteConversion)> = note_paths
        .par_iter()
        .map(|path| (path.clone(), read_and_convert(path, &resolver, titles)))
        .collect();

    let mut references = BTreeMap::new();
    let mut unresolved = Vec::new();
    let mut by_path: HashMap<PathBuf, NoteConversion> = HashMap::with_capacity(conversions.len());
    for (path, conversion) in conversions {
        for attachment in &conversion.attachments {
            references
                .entry(attachment.clone())
                .or_insert_with(|| path.clone());
        }
        for reference in &conversion.unresolved {
            unresolved.push(UnresolvedReference {
                note: path.clone(),
                reference: reference.clone(),
            });
        }
        by_path.insert(path, conversion);
    }

    let orphans = collect_orphans(inventory, &root, &references);

    root.walk_mut(&mut |node| {
        if let Some(conversion) = by_path.remove(&node.path) {
            node.blocks = conversion.blocks;
        }
        if node.kind == PageKind::Folder {
            if let Some(files) = orphans.get(&node.path) {
                node.orphans = files.clone();
            }
        }
    });

    let plan = MigrationPlan {
        root,
        references,
        unresolved,
    };
    debug!(
        "Planned {} folders, {} notes, {} referenced files, {} unresolved references",
        plan.folder_count(),
        plan.note_count(),
        plan.references.len(),
        plan.unresolved.len()
    );
    plan
}

fn build_skeleton(
    inventory: &Inventory,
    dir: &Path,
    notes_by_dir: &HashMap<PathBuf, Vec<PathBuf>>,
    reverse_sort: bool,
) -> PageNode {
    let mut node = PageNode::folder(dir.to_path_buf());

    let mut subdirs: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.path())
            .filter(|path| is_page_dir(inventory, path))
            .collect(),
        Err(err) => {
            warn!("Cannot list {}: {}", dir.display(), err);
            Vec::new()
        }
    };
    let mut notes = notes_by_dir.get(dir).cloned().unwrap_or_default();

    sort_siblings(&mut subdirs, reverse_sort);
    sort_siblings(&mut notes, reverse_sort);

    for subdir in subdirs {
        node.children
            .push(build_skeleton(inventory, &subdir, notes_by_dir, reverse_sort));
    }
    for note in notes {
        node.children.push(PageNode::note(note));
    }
    node
}

fn is_page_dir(inventory: &Inventory, path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    !is_attachment_dir(&name) && !inventory.ignore_rules().is_excluded(inventory.relative(path))
}

/// Alphabetical by file name, or reverse-alphabetical.
pub fn sort_siblings(paths: &mut [PathBuf], reverse: bool) {
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    if reverse {
        paths.reverse();
    }
}

fn read_and_convert(path: &Path, resolver: &Resolver<'_>, titles: Option<&LinkTitles>) -> NoteConversion {
    match fs::read(path) {
        Ok(bytes) => {
            let source = String::from_utf8_lossy(&bytes);
            convert_note(&source, path, resolver, titles)
        }
        Err(err) => {
            warn!("Cannot read note {}: {}", path.display(), err);
            NoteConversion {
                blocks: vec![ContentBlock::Ready(Block::callout(
                    &format!("Could not read note: {}", err),
                    "⚠️",
                ))],
                ..NoteConversion::default()
            }
        }
    }
}

/// Group unreferenced attachments under the nearest folder page above them.
fn collect_orphans(
    inventory: &Inventory,
    root: &PageNode,
    references: &BTreeMap<PathBuf, PathBuf>,
) -> HashMap<PathBuf, Vec<PathBuf>> {
    let mut folders = HashSet::new();
    root.walk(&mut |node| {
        if node.kind == PageKind::Folder {
            folders.insert(node.path.clone());
        }
    });

    let mut orphans: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();
    for file in inventory.of_kind(EntryKind::Attachment) {
        if references.contains_key(file) {
            continue;
        }
        let owner = file
            .ancestors()
            .skip(1)
            .find(|ancestor| folders.contains(*ancestor))
            .unwrap_or_else(|| inventory.root());
        orphans
            .entry(owner.to_path_buf())
            .or_default()
            .push(file.to_path_buf());
    }
    orphans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_icons() {
        assert_eq!(folder_icon("Journal"), "📓");
        assert_eq!(folder_icon("projects"), "📂");
        assert_eq!(folder_icon("Daily Notes"), "📅");
        assert_eq!(folder_icon("Misc"), "📁");
    }

    #[test]
    fn test_sort_siblings() {
        let mut paths = vec![
            PathBuf::from("/v/b.md"),
            PathBuf::from("/v/c.md"),
            PathBuf::from("/v/a.md"),
        ];
        sort_siblings(&mut paths, false);
        assert_eq!(paths[0], PathBuf::from("/v/a.md"));
        sort_siblings(&mut paths, true);
        assert_eq!(paths[0], PathBuf::from("/v/c.md"));
    }
}
