//! The source side: inventory of the vault, reference resolution and the page tree.

pub mod note;
mod resolve;
mod scan;
mod tree;

pub use note::NoteTitle;
pub use resolve::Resolver;
pub use scan::{is_attachment_dir, is_markdown, EntryKind, IgnoreRules, Inventory, ATTACHMENT_DIR};
pub use tree::{
    folder_icon, plan_migration, sort_siblings, MigrationPlan, PageKind, PageNode, UnresolvedReference,
    NOTE_ICON,
};
