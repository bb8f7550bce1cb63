//! Markdown → block model, on top of `pulldown-cmark`.
//!
//! The parser's event stream is folded into a small tree of [`Block`]s with
//! styled [`Inline`] content. Anything the layout engine cannot draw (raw
//! HTML, footnote definitions, images) degrades to plain text or is dropped;
//! parsing itself never fails.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag};

/// Inline styling flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
    pub link: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(String, TextStyle),
    Math { tex: String, display: bool },
    Break,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading { level: u8, content: Vec<Inline> },
    Paragraph(Vec<Inline>),
    /// Language tag is not kept; it does not change rendering.
    CodeBlock(Vec<String>),
    List {
        /// First number for ordered lists.
        start: Option<u64>,
        items: Vec<Vec<Block>>,
    },
    Quote(Vec<Block>),
    Table {
        header: Vec<Vec<Inline>>,
        rows: Vec<Vec<Vec<Inline>>>,
    },
    Rule,
}

/// Parse Markdown source into blocks.
pub fn parse(source: &str) -> Vec<Block> {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_MATH;
    let mut builder = Builder::default();
    for event in Parser::new_ext(source, options) {
        builder.event(event);
    }
    builder.finish()
}

/// Plain text of the first heading, used as the document title.
pub fn title(blocks: &[Block]) -> Option<String> {
    blocks.iter().find_map(|b| match b {
        Block::Heading { content, .. } => {
            let text = plain_text(content);
            (!text.trim().is_empty()).then(|| text.trim().to_string())
        }
        _ => None,
    })
}

pub fn plain_text(inlines: &[Inline]) -> String {
    inlines
        .iter()
        .map(|i| match i {
            Inline::Text(t, _) => t.as_str(),
            Inline::Math { tex, .. } => tex.as_str(),
            Inline::Break => " ",
        })
        .collect()
}

// ── Event folding ────────────────────────────────────────────────────────

/// Tags we have seen a Start for; popped on the matching End.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Open {
    Paragraph,
    Heading(u8),
    CodeBlock,
    Quote,
    List,
    Item,
    Table,
    TableHead,
    TableRow,
    TableCell,
    Emphasis,
    Strong,
    Link,
    Image,
    Other,
}

enum Container {
    Root(Vec<Block>),
    Quote(Vec<Block>),
    List {
        start: Option<u64>,
        items: Vec<Vec<Block>>,
    },
    Item(Vec<Block>),
}

#[derive(Default)]
struct TableBuilder {
    header: Vec<Vec<Inline>>,
    rows: Vec<Vec<Vec<Inline>>>,
    row: Vec<Vec<Inline>>,
    in_head: bool,
}

struct Builder {
    containers: Vec<Container>,
    open: Vec<Open>,
    inlines: Vec<Inline>,
    code: Option<String>,
    table: Option<TableBuilder>,
    bold: u32,
    italic: u32,
    link: u32,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            containers: vec![Container::Root(Vec::new())],
            open: Vec::new(),
            inlines: Vec::new(),
            code: None,
            table: None,
            bold: 0,
            italic: 0,
            link: 0,
        }
    }
}

impl Builder {
    fn style(&self) -> TextStyle {
        TextStyle {
            bold: self.bold > 0,
            italic: self.italic > 0,
            code: false,
            link: self.link > 0,
        }
    }

    fn push_text(&mut self, text: &str, style: TextStyle) {
        if let Some(code) = self.code.as_mut() {
            code.push_str(text);
            return;
        }
        if let Some(Inline::Text(prev, prev_style)) = self.inlines.last_mut() {
            if *prev_style == style {
                prev.push_str(text);
                return;
            }
        }
        self.inlines.push(Inline::Text(text.to_string(), style));
    }

    fn push_block(&mut self, block: Block) {
        match self.containers.last_mut() {
            Some(Container::Root(blocks))
            | Some(Container::Quote(blocks))
            | Some(Container::Item(blocks)) => blocks.push(block),
            Some(Container::List { items, .. }) => items.push(vec![block]),
            None => self.containers.push(Container::Root(vec![block])),
        }
    }

    /// Tight list items carry text without a paragraph; wrap it in one.
    fn flush_loose_text(&mut self) {
        if self.table.is_some() || self.inlines.is_empty() {
            return;
        }
        let inlines = std::mem::take(&mut self.inlines);
        self.push_block(Block::Paragraph(inlines));
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(_) => {
                if let Some(open) = self.open.pop() {
                    self.end(open);
                }
            }
            Event::Text(text) => {
                let style = self.style();
                self.push_text(&text, style);
            }
            Event::Code(text) => {
                let style = TextStyle {
                    code: true,
                    ..self.style()
                };
                self.push_text(&text, style);
            }
            Event::InlineMath(tex) => self.inlines.push(Inline::Math {
                tex: tex.to_string(),
                display: false,
            }),
            Event::DisplayMath(tex) => self.inlines.push(Inline::Math {
                tex: tex.to_string(),
                display: true,
            }),
            Event::SoftBreak => {
                let style = self.style();
                self.push_text(" ", style);
            }
            Event::HardBreak => self.inlines.push(Inline::Break),
            Event::Rule => {
                self.flush_loose_text();
                self.push_block(Block::Rule);
            }
            Event::TaskListMarker(done) => {
                let style = self.style();
                self.push_text(if done { "[x] " } else { "[ ] " }, style);
            }
            Event::InlineHtml(html) => {
                let tag = html.trim().to_ascii_lowercase();
                if tag.starts_with("<br") {
                    self.inlines.push(Inline::Break);
                }
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        let open = match tag {
            Tag::Paragraph => {
                self.flush_loose_text();
                Open::Paragraph
            }
            Tag::Heading { level, .. } => {
                self.flush_loose_text();
                Open::Heading(heading_level(level))
            }
            Tag::CodeBlock(_) => {
                self.flush_loose_text();
                self.code = Some(String::new());
                Open::CodeBlock
            }
            Tag::BlockQuote(_) => {
                self.flush_loose_text();
                self.containers.push(Container::Quote(Vec::new()));
                Open::Quote
            }
            Tag::List(start) => {
                self.flush_loose_text();
                self.containers.push(Container::List {
                    start,
                    items: Vec::new(),
                });
                Open::List
            }
            Tag::Item => {
                self.containers.push(Container::Item(Vec::new()));
                Open::Item
            }
            Tag::Table(_) => {
                self.flush_loose_text();
                self.table = Some(TableBuilder::default());
                Open::Table
            }
            Tag::TableHead => {
                if let Some(t) = self.table.as_mut() {
                    t.in_head = true;
                }
                Open::TableHead
            }
            Tag::TableRow => Open::TableRow,
            Tag::TableCell => {
                self.inlines.clear();
                Open::TableCell
            }
            Tag::Emphasis => {
                self.italic += 1;
                Open::Emphasis
            }
            Tag::Strong => {
                self.bold += 1;
                Open::Strong
            }
            Tag::Link { .. } => {
                self.link += 1;
                Open::Link
            }
            Tag::Image { .. } => {
                let style = TextStyle {
                    italic: true,
                    ..self.style()
                };
                self.push_text("[image: ", style);
                self.italic += 1;
                Open::Image
            }
            _ => Open::Other,
        };
        self.open.push(open);
    }

    fn end(&mut self, open: Open) {
        match open {
            Open::Paragraph => {
                let inlines = std::mem::take(&mut self.inlines);
                if !inlines.is_empty() {
                    self.push_block(Block::Paragraph(inlines));
                }
            }
            Open::Heading(level) => {
                let content = std::mem::take(&mut self.inlines);
                self.push_block(Block::Heading { level, content });
            }
            Open::CodeBlock => {
                let code = self.code.take().unwrap_or_default();
                let lines = code.trim_end_matches('\n').lines().map(str::to_string).collect();
                self.push_block(Block::CodeBlock(lines));
            }
            Open::Quote => {
                self.flush_loose_text();
                if let Some(Container::Quote(blocks)) = self.containers.pop() {
                    self.push_block(Block::Quote(blocks));
                }
            }
            Open::Item => {
                self.flush_loose_text();
                if let Some(Container::Item(blocks)) = self.containers.pop() {
                    if let Some(Container::List { items, .. }) = self.containers.last_mut() {
                        items.push(blocks);
                    }
                }
            }
            Open::List => {
                if let Some(Container::List { start, items }) = self.containers.pop() {
                    self.push_block(Block::List { start, items });
                }
            }
            Open::TableCell => {
                let cell = std::mem::take(&mut self.inlines);
                if let Some(t) = self.table.as_mut() {
                    t.row.push(cell);
                }
            }
            Open::TableHead => {
                if let Some(t) = self.table.as_mut() {
                    // Header cells arrive directly under TableHead.
                    if !t.row.is_empty() {
                        t.header = std::mem::take(&mut t.row);
                    }
                    t.in_head = false;
                }
            }
            Open::TableRow => {
                if let Some(t) = self.table.as_mut() {
                    let row = std::mem::take(&mut t.row);
                    if t.in_head {
                        t.header = row;
                    } else {
                        t.rows.push(row);
                    }
                }
            }
            Open::Table => {
                if let Some(t) = self.table.take() {
                    self.push_block(Block::Table {
                        header: t.header,
                        rows: t.rows,
                    });
                }
            }
            Open::Emphasis => self.italic = self.italic.saturating_sub(1),
            Open::Strong => self.bold = self.bold.saturating_sub(1),
            Open::Link => self.link = self.link.saturating_sub(1),
            Open::Image => {
                self.italic = self.italic.saturating_sub(1);
                let style = TextStyle {
                    italic: true,
                    ..self.style()
                };
                self.push_text("]", style);
            }
            Open::Other => {}
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush_loose_text();
        // Unwind anything left open so no content is lost.
        while self.containers.len() > 1 {
            match self.containers.pop() {
                Some(Container::Quote(blocks)) => self.push_block(Block::Quote(blocks)),
                Some(Container::Item(blocks)) => {
                    if let Some(Container::List { items, .. }) = self.containers.last_mut() {
                        items.push(blocks);
                    }
                }
                Some(Container::List { start, items }) => {
                    self.push_block(Block::List { start, items })
                }
                Some(Container::Root(blocks)) => {
                    for b in blocks {
                        self.push_block(b);
                    }
                }
                None => break,
            }
        }
        match self.containers.pop() {
            Some(Container::Root(blocks)) => blocks,
            _ => Vec::new(),
        }
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Inline {
        Inline::Text(s.into(), TextStyle::default())
    }

    #[test]
    fn headings_and_emphasis() {
        let blocks = parse("# Title\n\nSome **bold** and *italic*.\n");
        assert_eq!(
            blocks[0],
            Block::Heading {
                level: 1,
                content: vec![text("Title")]
            }
        );
        let Block::Paragraph(inlines) = &blocks[1] else {
            panic!("expected paragraph, got {:?}", blocks[1]);
        };
        assert!(inlines.contains(&Inline::Text(
            "bold".into(),
            TextStyle {
                bold: true,
                ..TextStyle::default()
            }
        )));
        assert_eq!(title(&blocks).as_deref(), Some("Title"));
    }

    #[test]
    fn fenced_code_keeps_lines_and_drops_language() {
        let blocks = parse("```rust\nfn main() {}\nlet x = 1;\n```\n");
        assert_eq!(
            blocks[0],
            Block::CodeBlock(vec!["fn main() {}".into(), "let x = 1;".into()])
        );
    }

    #[test]
    fn tight_and_nested_lists() {
        let blocks = parse("1. one\n2. two\n   - inner\n");
        let Block::List { start, items } = &blocks[0] else {
            panic!("expected list, got {:?}", blocks[0]);
        };
        assert_eq!(*start, Some(1));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], vec![Block::Paragraph(vec![text("one")])]);
        assert!(matches!(items[1][1], Block::List { start: None, .. }));
    }

    #[test]
    fn blockquote_and_rule() {
        let blocks = parse("> quoted\n\n---\n");
        assert_eq!(
            blocks[0],
            Block::Quote(vec![Block::Paragraph(vec![text("quoted")])])
        );
        assert_eq!(blocks[1], Block::Rule);
    }

    #[test]
    fn tables_split_header_and_rows() {
        let blocks = parse("| A | B |\n|---|---|\n| 1 | 2 |\n| 3 | 4 |\n");
        let Block::Table { header, rows } = &blocks[0] else {
            panic!("expected table, got {:?}", blocks[0]);
        };
        assert_eq!(header.len(), 2);
        assert_eq!(plain_text(&header[0]), "A");
        assert_eq!(rows.len(), 2);
        assert_eq!(plain_text(&rows[1][1]), "4");
    }

    #[test]
    fn math_inline_and_display() {
        let blocks = parse("Energy $E = mc^2$ here.\n\n$$\\sum_i x_i$$\n");
        let Block::Paragraph(first) = &blocks[0] else {
            panic!("expected paragraph");
        };
        assert!(first.contains(&Inline::Math {
            tex: "E = mc^2".into(),
            display: false
        }));
        let Block::Paragraph(second) = &blocks[1] else {
            panic!("expected paragraph");
        };
        assert!(matches!(second[0], Inline::Math { display: true, .. }));
    }
}
