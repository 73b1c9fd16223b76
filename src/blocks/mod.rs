//! Typed Notion block payloads and the Markdown converter that produces them.

mod convert;
mod rich_text;
mod titles;

pub use convert::{convert_note, NoteConversion};
pub use rich_text::{sanitize_url, split_bare_urls};
pub use titles::LinkTitles;

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Maximum characters in one rich text item.
pub const MAX_TEXT_CHARS: usize = 2000;
/// Maximum rich text items in one block.
pub const MAX_RICH_TEXT_ITEMS: usize = 100;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "ico", "tiff"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "avi", "mkv"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "flac"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Paragraph {
        paragraph: TextBody,
    },
    #[serde(rename = "heading_1")]
    Heading1 {
        heading_1: TextBody,
    },
    #[serde(rename = "heading_2")]
    Heading2 {
        heading_2: TextBody,
    },
    #[serde(rename = "heading_3")]
    Heading3 {
        heading_3: TextBody,
    },
    BulletedListItem {
        bulleted_list_item: TextBody,
    },
    NumberedListItem {
        numbered_list_item: TextBody,
    },
    ToDo {
        to_do: TodoBody,
    },
    Quote {
        quote: TextBody,
    },
    Code {
        code: CodeBody,
    },
    Divider {
        divider: Empty,
    },
    Callout {
        callout: CalloutBody,
    },
    Image {
        image: FileSource,
    },
    Video {
        video: FileSource,
    },
    Audio {
        audio: FileSource,
    },
    Pdf {
        pdf: FileSource,
    },
    File {
        file: FileSource,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextBody {
    pub rich_text: Vec<RichText>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodoBody {
    pub rich_text: Vec<RichText>,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeBody {
    pub rich_text: Vec<RichText>,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalloutBody {
    pub rich_text: Vec<RichText>,
    pub icon: Emoji,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Emoji {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub emoji: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileSource {
    FileUpload { file_upload: UploadRef },
    External { external: ExternalRef },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalRef {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RichText {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: TextContent,
    #[serde(skip_serializing_if = "Annotations::is_plain")]
    pub annotations: Annotations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextContent {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Annotations {
    #[serde(skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub strikethrough: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub code: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Annotations {
    pub fn is_plain(&self) -> bool {
        *self == Annotations::default()
    }
}

impl RichText {
    pub fn new(content: impl Into<String>, annotations: Annotations, link: Option<String>) -> Self {
        Self {
            kind: "text",
            text: TextContent {
                content: content.into(),
                link: link.map(|url| Link { url }),
            },
            annotations,
        }
    }

    pub fn plain(content: impl Into<String>) -> Self {
        Self::new(content, Annotations::default(), None)
    }

    pub fn link_url(&self) -> Option<&str> {
        self.text.link.as_ref().map(|link| link.url.as_str())
    }

    /// Split into items that respect the per-item character limit.
    pub fn into_chunks(self) -> Vec<RichText> {
        if self.text.content.chars().count() <= MAX_TEXT_CHARS {
            return vec![self];
        }
        let chars: Vec<char> = self.text.content.chars().collect();
        chars
            .chunks(MAX_TEXT_CHARS)
            .map(|chunk| RichText {
                kind: self.kind,
                text: TextContent {
                    content: chunk.iter().collect(),
                    link: self.text.link.clone(),
                },
                annotations: self.annotations,
            })
            .collect()
    }
}

/// Build rich text items for plain content, splitting at the character limit.
pub fn plain_text(content: &str) -> Vec<RichText> {
    if content.is_empty() {
        return Vec::new();
    }
    RichText::plain(content).into_chunks()
}

impl Block {
    pub fn paragraph(rich_text: Vec<RichText>) -> Self {
        Block::Paragraph {
            paragraph: TextBody { rich_text },
        }
    }

    pub fn heading(level: u8, rich_text: Vec<RichText>) -> Self {
        let body = TextBody { rich_text };
        match level {
            1 => Block::Heading1 { heading_1: body },
            2 => Block::Heading2 { heading_2: body },
            _ => Block::Heading3 { heading_3: body },
        }
    }

    pub fn bulleted(rich_text: Vec<RichText>) -> Self {
        Block::BulletedListItem {
            bulleted_list_item: TextBody { rich_text },
        }
    }

    pub fn numbered(rich_text: Vec<RichText>) -> Self {
        Block::NumberedListItem {
            numbered_list_item: TextBody { rich_text },
        }
    }

    pub fn todo(rich_text: Vec<RichText>, checked: bool) -> Self {
        Block::ToDo {
            to_do: TodoBody { rich_text, checked },
        }
    }

    pub fn quote(rich_text: Vec<RichText>) -> Self {
        Block::Quote {
            quote: TextBody { rich_text },
        }
    }

    pub fn code(content: &str, language: &str) -> Self {
        Block::Code {
            code: CodeBody {
                rich_text: plain_text(content),
                language: code_language(language),
            },
        }
    }

    pub fn divider() -> Self {
        Block::Divider { divider: Empty {} }
    }

    pub fn callout(text: &str, emoji: &str) -> Self {
        Block::Callout {
            callout: CalloutBody {
                rich_text: plain_text(text),
                icon: Emoji {
                    kind: "emoji",
                    emoji: emoji.to_string(),
                },
                color: "gray_background".to_string(),
            },
        }
    }

    pub fn uploaded_file(kind: FileKind, upload_id: &str) -> Self {
        kind.block(FileSource::FileUpload {
            file_upload: UploadRef {
                id: upload_id.to_string(),
            },
        })
    }

    pub fn external_image(url: &str) -> Self {
        FileKind::Image.block(FileSource::External {
            external: ExternalRef {
                url: url.to_string(),
            },
        })
    }

    /// The API type name of this block.
    pub fn type_name(&self) -> &'static str {
        match self {
            Block::Paragraph { .. } => "paragraph",
            Block::Heading1 { .. } => "heading_1",
            Block::Heading2 { .. } => "heading_2",
            Block::Heading3 { .. } => "heading_3",
            Block::BulletedListItem { .. } => "bulleted_list_item",
            Block::NumberedListItem { .. } => "numbered_list_item",
            Block::ToDo { .. } => "to_do",
            Block::Quote { .. } => "quote",
            Block::Code { .. } => "code",
            Block::Divider { .. } => "divider",
            Block::Callout { .. } => "callout",
            Block::Image { .. } => "image",
            Block::Video { .. } => "video",
            Block::Audio { .. } => "audio",
            Block::Pdf { .. } => "pdf",
            Block::File { .. } => "file",
        }
    }

    /// Rich text of text-bearing blocks.
    pub fn rich_text(&self) -> Option<&[RichText]> {
        match self {
            Block::Paragraph { paragraph: body }
            | Block::Heading1 { heading_1: body }
            | Block::Heading2 { heading_2: body }
            | Block::Heading3 { heading_3: body }
            | Block::BulletedListItem {
                bulleted_list_item: body,
            }
            | Block::NumberedListItem {
                numbered_list_item: body,
            }
            | Block::Quote { quote: body } => Some(&body.rich_text),
            Block::ToDo { to_do } => Some(&to_do.rich_text),
            Block::Code { code } => Some(&code.rich_text),
            Block::Callout { callout } => Some(&callout.rich_text),
            _ => None,
        }
    }

    /// Concatenated text content, for logging and tests.
    pub fn plain_text(&self) -> String {
        self.rich_text()
            .map(|items| items.iter().map(|item| item.text.content.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Which file block an attachment becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Video,
    Audio,
    Pdf,
    File,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let ext = ext.as_str();

        if IMAGE_EXTENSIONS.contains(&ext) {
            FileKind::Image
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            FileKind::Video
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            FileKind::Audio
        } else if ext == "pdf" {
            FileKind::Pdf
        } else {
            FileKind::File
        }
    }

    fn block(self, source: FileSource) -> Block {
        match self {
            FileKind::Image => Block::Image { image: source },
            FileKind::Video => Block::Video { video: source },
            FileKind::Audio => Block::Audio { audio: source },
            FileKind::Pdf => Block::Pdf { pdf: source },
            FileKind::File => Block::File { file: source },
        }
    }
}

/// A planned block: finished, or waiting on an attachment upload.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Ready(Block),
    /// A resolved file reference, uploaded when the note's page exists.
    Attachment { path: PathBuf },
    /// A reference that could not be found on disk.
    MissingAttachment { reference: String },
}

const NOTION_LANGUAGES: &[&str] = &[
    "abap", "arduino", "bash", "basic", "c", "clojure", "coffeescript", "c++", "c#", "css",
    "dart", "diff", "docker", "elixir", "elm", "erlang", "flow", "fortran", "f#", "gherkin",
    "glsl", "go", "graphql", "groovy", "haskell", "html", "java", "javascript", "json", "julia",
    "kotlin", "latex", "less", "lisp", "livescript", "lua", "makefile", "markdown", "markup",
    "matlab", "mermaid", "nix", "objective-c", "ocaml", "pascal", "perl", "php", "plain text",
    "powershell", "prolog", "protobuf", "python", "r", "reason", "ruby", "rust", "sass",
    "scala", "scheme", "scss", "shell", "sql", "swift", "typescript", "vb.net", "verilog",
    "vhdl", "visual basic", "webassembly", "xml", "yaml",
];

/// Map a fence info string onto a language name the API accepts.
pub fn code_language(info: &str) -> String {
    let lang = info.split_whitespace().next().unwrap_or_default().to_lowercase();
    let mapped = match lang.as_str() {
        "" | "text" | "txt" | "plain" => "plain text",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" => "python",
        "rb" => "ruby",
        "rs" => "rust",
        "yml" => "yaml",
        "sh" | "zsh" | "fish" => "shell",
        "cpp" | "cc" | "hpp" => "c++",
        "cs" | "csharp" => "c#",
        "md" => "markdown",
        "dockerfile" => "docker",
        "ps1" | "pwsh" => "powershell",
        "kt" => "kotlin",
        "tex" => "latex",
        other => other,
    };

    if NOTION_LANGUAGES.contains(&mapped) {
        mapped.to_string()
    } else {
        "plain text".to_string()
    }
}
