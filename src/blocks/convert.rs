use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, LinkType, Options, Parser, Tag, TagEnd};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use super::rich_text::{sanitize_url, split_bare_urls};
use super::titles::LinkTitles;
use super::{Annotations, Block, ContentBlock, RichText, MAX_RICH_TEXT_ITEMS};
use crate::vault::note::{has_file_extension, is_note_target, is_remote_target, note_target_name};
use crate::vault::Resolver;

/// Blocks planned for one note, plus the file references it made.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NoteConversion {
    pub blocks: Vec<ContentBlock>,
    /// Resolved attachments in first-reference order, without duplicates.
    pub attachments: Vec<PathBuf>,
    /// Reference text that matched no file in the vault.
    pub unresolved: Vec<String>,
}

/// Convert Obsidian-flavoured Markdown into planned Notion blocks.
pub fn convert_note(
    source: &str,
    note_path: &Path,
    resolver: &Resolver<'_>,
    titles: Option<&LinkTitles>,
) -> NoteConversion {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_WIKILINKS);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);

    let mut converter = Converter::new(note_path, resolver, titles);
    for event in Parser::new_ext(source, options) {
        converter.handle(event);
    }
    converter.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    Paragraph,
    Heading(u8),
    Bulleted,
    Numbered,
    Todo(bool),
    Quote,
}

struct TextTarget {
    kind: TargetKind,
    spans: Vec<RichText>,
}

enum LinkFrame {
    /// Inner text is kept, linked when a URL is present.
    Text(Option<String>),
    /// Inner text is dropped (image alt text, embedded attachments).
    Hidden,
}

struct Converter<'a> {
    note_path: &'a Path,
    resolver: &'a Resolver<'a>,
    titles: Option<&'a LinkTitles>,
    result: NoteConversion,
    target: Option<TextTarget>,
    /// File blocks waiting for the surrounding text block to close.
    pending: Vec<ContentBlock>,
    bold: u32,
    italic: u32,
    strikethrough: u32,
    links: Vec<LinkFrame>,
    lists: Vec<bool>,
    quote_depth: u32,
    code: Option<(String, String)>,
    in_metadata: bool,
}

impl<'a> Converter<'a> {
    fn new(note_path: &'a Path, resolver: &'a Resolver<'a>, titles: Option<&'a LinkTitles>) -> Self {
        Self {
            note_path,
            resolver,
            titles,
            result: NoteConversion::default(),
            target: None,
            pending: Vec::new(),
            bold: 0,
            italic: 0,
            strikethrough: 0,
            links: Vec::new(),
            lists: Vec::new(),
            quote_depth: 0,
            code: None,
            in_metadata: false,
        }
    }

    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if self.in_metadata {
                    return;
                }
                if let Some((_, buffer)) = self.code.as_mut() {
                    buffer.push_str(&text);
                    return;
                }
                self.text(&text);
            }
            Event::Code(code) => self.span(&code, None, true),
            Event::InlineMath(math) | Event::DisplayMath(math) => self.span(&math, None, true),
            Event::Html(html) | Event::InlineHtml(html) => {
                if !self.in_metadata {
                    self.span(&html, None, false);
                }
            }
            Event::FootnoteReference(name) => self.span(&format!("[^{}]", name), None, false),
            Event::SoftBreak | Event::HardBreak => self.span("\n", None, false),
            Event::Rule => {
                self.flush();
                self.result.blocks.push(ContentBlock::Ready(Block::divider()));
            }
            Event::TaskListMarker(checked) => {
                if let Some(target) = self.target.as_mut() {
                    if matches!(target.kind, TargetKind::Bulleted | TargetKind::Numbered) {
                        target.kind = TargetKind::Todo(checked);
                    }
                }
            }
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::MetadataBlock(_) => self.in_metadata = true,
            Tag::Paragraph => {
                let reuse = self
                    .target
                    .as_ref()
                    .map(|target| target.spans.is_empty())
                    .unwrap_or(false);
                if !reuse {
                    self.flush();
                    self.open(self.body_kind());
                }
            }
            Tag::Heading { level, .. } => {
                self.flush();
                self.open(TargetKind::Heading(heading_level(level)));
            }
            Tag::BlockQuote(_) => {
                self.flush();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.flush();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => info.to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                self.code = Some((language, String::new()));
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start.is_some());
            }
            Tag::Item => {
                self.flush();
                let ordered = self.lists.last().copied().unwrap_or(false);
                self.open(if ordered {
                    TargetKind::Numbered
                } else {
                    TargetKind::Bulleted
                });
            }
            Tag::TableHead | Tag::TableRow => {
                self.flush();
                self.open(self.body_kind());
            }
            Tag::TableCell => {
                let has_cells = self
                    .target
                    .as_ref()
                    .map(|target| !target.spans.is_empty())
                    .unwrap_or(false);
                if has_cells {
                    self.span(" | ", None, false);
                }
            }
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Strikethrough => self.strikethrough += 1,
            Tag::Link {
                link_type, dest_url, ..
            } => {
                let frame = self.link(link_type, &dest_url);
                self.links.push(frame);
            }
            Tag::Image { dest_url, .. } => {
                self.embed(&dest_url);
                self.links.push(LinkFrame::Hidden);
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::MetadataBlock(_) => self.in_metadata = false,
            TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item => self.flush(),
            TagEnd::TableHead | TagEnd::TableRow | TagEnd::Table => self.flush(),
            TagEnd::BlockQuote(_) => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::CodeBlock => {
                if let Some((language, buffer)) = self.code.take() {
                    let content = buffer.strip_suffix('\n').unwrap_or(&buffer);
                    self.result
                        .blocks
                        .push(ContentBlock::Ready(Block::code(content, &language)));
                }
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
            }
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Strikethrough => self.strikethrough = self.strikethrough.saturating_sub(1),
            TagEnd::Link | TagEnd::Image => {
                self.links.pop();
            }
            _ => {}
        }
    }

    fn body_kind(&self) -> TargetKind {
        if self.quote_depth > 0 {
            TargetKind::Quote
        } else {
            TargetKind::Paragraph
        }
    }

    fn open(&mut self, kind: TargetKind) {
        self.target = Some(TextTarget {
            kind,
            spans: Vec::new(),
        });
    }

    fn hidden(&self) -> bool {
        self.links.iter().any(|frame| matches!(frame, LinkFrame::Hidden))
    }

    fn current_link(&self) -> Option<String> {
        self.links.iter().rev().find_map(|frame| match frame {
            LinkFrame::Text(url) => url.clone(),
            LinkFrame::Hidden => None,
        })
    }

    fn link(&mut self, link_type: LinkType, dest: &str) -> LinkFrame {
        if matches!(link_type, LinkType::WikiLink { .. }) {
            if !is_note_target(dest) && has_file_extension(dest) {
                self.attach(dest);
                return LinkFrame::Hidden;
            }
            return LinkFrame::Text(None);
        }

        if is_remote_target(dest) {
            return LinkFrame::Text(sanitize_url(dest));
        }
        if has_file_extension(dest) {
            self.attach(dest);
        }
        LinkFrame::Text(None)
    }

    fn embed(&mut self, dest: &str) {
        if self.hidden() {
            return;
        }
        if is_remote_target(dest) {
            if let Some(url) = sanitize_url(dest) {
                self.pending.push(ContentBlock::Ready(Block::external_image(&url)));
            }
            return;
        }
        if is_note_target(dest) {
            self.span(&note_target_name(dest), None, false);
            return;
        }
        self.attach(dest);
    }

    /// Resolve a file reference and queue its block after the current text.
    fn attach(&mut self, reference: &str) {
        let reference = reference.trim();
        match self.resolver.resolve(reference, self.note_path) {
            Some(path) => {
                trace!("{} references {}", self.note_path.display(), path.display());
                if !self.result.attachments.contains(&path) {
                    self.result.attachments.push(path.clone());
                }
                self.pending.push(ContentBlock::Attachment { path });
            }
            None => {
                debug!(
                    "Unresolved reference '{}' in {}",
                    reference,
                    self.note_path.display()
                );
                if !self.result.unresolved.iter().any(|r| r == reference) {
                    self.result.unresolved.push(reference.to_string());
                }
                self.pending.push(ContentBlock::MissingAttachment {
                    reference: reference.to_string(),
                });
            }
        }
    }

    fn text(&mut self, text: &str) {
        if self.hidden() {
            return;
        }
        if let Some(url) = self.current_link() {
            self.span(text, Some(url), false);
            return;
        }
        for (fragment, url) in split_bare_urls(text) {
            match url {
                Some(url) => {
                    let label = self
                        .titles
                        .and_then(|titles| titles.title_for(&url))
                        .unwrap_or(fragment);
                    self.span(&label, Some(url), false);
                }
                None => self.span(&fragment, None, false),
            }
        }
    }

    /// Append a styled span, merging it into the previous one when the style matches.
    fn span(&mut self, content: &str, link: Option<String>, code: bool) {
        if content.is_empty() || self.in_metadata || self.hidden() {
            return;
        }
        if self.target.is_none() {
            self.open(self.body_kind());
        }

        let annotations = Annotations {
            bold: self.bold > 0,
            italic: self.italic > 0,
            strikethrough: self.strikethrough > 0,
            code,
        };

        let Some(target) = self.target.as_mut() else {
            return;
        };
        if let Some(last) = target.spans.last_mut() {
            if last.annotations == annotations && last.link_url() == link.as_deref() {
                last.text.content.push_str(content);
                return;
            }
        }
        target.spans.push(RichText::new(content, annotations, link));
    }

    /// Close the open text block, then emit the file blocks it referenced.
    fn flush(&mut self) {
        if let Some(target) = self.target.take() {
            for block in finish_target(target) {
                self.result.blocks.push(ContentBlock::Ready(block));
            }
        }
        self.result.blocks.append(&mut self.pending);
    }

    fn finish(mut self) -> NoteConversion {
        self.flush();
        if let Some((language, buffer)) = self.code.take() {
            self.result
                .blocks
                .push(ContentBlock::Ready(Block::code(buffer.trim_end(), &language)));
        }
        self.result
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        _ => 3,
    }
}

fn finish_target(target: TextTarget) -> Vec<Block> {
    let mut spans = target.spans;

    if spans.iter().all(|span| span.text.content.trim().is_empty()) {
        return Vec::new();
    }
    if let Some(first) = spans.first_mut() {
        first.text.content = first.text.content.trim_start().to_string();
    }
    if let Some(last) = spans.last_mut() {
        last.text.content = last.text.content.trim_end().to_string();
    }

    let items: Vec<RichText> = spans
        .into_iter()
        .filter(|span| !span.text.content.is_empty())
        .flat_map(RichText::into_chunks)
        .collect();

    items
        .chunks(MAX_RICH_TEXT_ITEMS)
        .map(|chunk| {
            let rich_text = chunk.to_vec();
            match target.kind {
                TargetKind::Paragraph => Block::paragraph(rich_text),
                TargetKind::Heading(level) => Block::heading(level, rich_text),
                TargetKind::Bulleted => Block::bulleted(rich_text),
                TargetKind::Numbered => Block::numbered(rich_text),
                TargetKind::Todo(checked) => Block::todo(rich_text, checked),
                TargetKind::Quote => Block::quote(rich_text),
            }
        })
        .collect()
}
