use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "migrate")]
#[command(about = "Migrate an Obsidian vault into a Notion page tree", long_about = None)]
pub struct Cli {
    /// Vault directory to migrate
    pub source: PathBuf,

    /// Destination Notion page URL or page id
    pub destination: String,

    /// Notion integration token
    #[arg(long, env = "NOTION_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Plan and report without calling the API
    #[arg(long)]
    pub dry_run: bool,

    /// Create pages and blocks only; leave attachments out
    #[arg(long)]
    pub skip_files: bool,

    /// Order sibling pages reverse-alphabetically
    #[arg(long)]
    pub reverse_sort: bool,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Use fetched page titles as the text of bare URLs
    #[arg(long)]
    pub fetch_link_titles: bool,

    /// Directory for the CSV and failed-files reports
    #[arg(long)]
    pub report_dir: Option<PathBuf>,
}
