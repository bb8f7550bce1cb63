//! Block model → positioned drawing operations, page by page.
//!
//! Text is broken into words ("pieces"), filled greedily into lines of the
//! available width, and lines are stacked down the page until the bottom
//! margin forces a new page. Coordinates are PDF user space: origin at the
//! bottom-left corner, y growing upwards.

use super::markdown::{Block, Inline, TextStyle};
use super::math::{self, MathFace};
use super::metrics::{encode_winansi, Family, Font};
use super::style::DocumentStyle;
use crate::error::ConversionError;

/// An RGB colour with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

impl Rgb {
    pub const TEXT: Rgb = Rgb(0.14, 0.16, 0.18);
    pub const MUTED: Rgb = Rgb(0.38, 0.40, 0.43);
    pub const LINK: Rgb = Rgb(0.01, 0.40, 0.84);
    pub const RULE: Rgb = Rgb(0.82, 0.84, 0.86);
    pub const CODE_BG: Rgb = Rgb(0.96, 0.97, 0.97);
    pub const HEADER_BG: Rgb = Rgb(0.93, 0.94, 0.95);
}

/// One drawing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Text {
        x: f32,
        y: f32,
        font: Font,
        size: f32,
        rise: f32,
        color: Rgb,
        bytes: Vec<u8>,
    },
    Rect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        color: Rgb,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: f32,
        color: Rgb,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub ops: Vec<Op>,
}

/// Lay out `blocks` into pages.
pub fn layout(blocks: &[Block], style: &DocumentStyle) -> Result<Vec<Page>, ConversionError> {
    let style = style.sanitized();
    let mut engine = Layout::new(&style);
    engine.blocks(blocks)?;
    Ok(engine.finish())
}

// ── Pieces and lines ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct Run {
    bytes: Vec<u8>,
    font: Font,
    size: f32,
    rise: f32,
    color: Rgb,
    width: f32,
}

impl Run {
    fn new(bytes: Vec<u8>, font: Font, size: f32, rise: f32, color: Rgb) -> Self {
        let width = font.text_width(&bytes, size);
        Self {
            bytes,
            font,
            size,
            rise,
            color,
            width,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PieceKind {
    Word,
    Break,
    Display,
}

/// An unbreakable unit of inline content.
#[derive(Debug, Clone)]
struct Piece {
    runs: Vec<Run>,
    width: f32,
    space_before: bool,
    kind: PieceKind,
}

impl Piece {
    fn new(runs: Vec<Run>, space_before: bool, kind: PieceKind) -> Self {
        let width = runs.iter().map(|r| r.width).sum();
        Self {
            runs,
            width,
            space_before,
            kind,
        }
    }

    /// Width of the inter-word space preceding this piece.
    fn gap(&self) -> f32 {
        if !self.space_before {
            return 0.0;
        }
        self.runs
            .first()
            .map(|r| r.font.text_width(b" ", r.size))
            .unwrap_or(0.0)
    }

    fn max_size(&self) -> f32 {
        self.runs.iter().map(|r| r.size).fold(0.0, f32::max)
    }
}

#[derive(Debug, Clone, Default)]
struct Line {
    pieces: Vec<Piece>,
    centered: bool,
}

impl Line {
    fn width(&self) -> f32 {
        self.pieces
            .iter()
            .enumerate()
            .map(|(i, p)| if i == 0 { p.width } else { p.gap() + p.width })
            .sum()
    }

    fn max_size(&self, fallback: f32) -> f32 {
        let size = self.pieces.iter().map(Piece::max_size).fold(0.0, f32::max);
        if size > 0.0 {
            size
        } else {
            fallback
        }
    }
}

/// Font choices for one run of inline content.
#[derive(Debug, Clone, Copy)]
struct InlineFonts {
    family: Family,
    size: f32,
    color: Rgb,
    bold: bool,
    italic: bool,
}

impl InlineFonts {
    fn for_text(&self, style: &TextStyle) -> (Font, f32, Rgb) {
        if style.code {
            let font = Font::styled(Family::Mono, style.bold || self.bold, false);
            return (font, self.size * 0.92, self.color);
        }
        let font = Font::styled(
            self.family,
            style.bold || self.bold,
            style.italic || self.italic,
        );
        let color = if style.link { Rgb::LINK } else { self.color };
        (font, self.size, color)
    }

    fn for_math(&self, face: MathFace) -> Font {
        match face {
            MathFace::Italic => Font::TimesItalic,
            MathFace::Roman => Font::TimesRoman,
            MathFace::Bold => Font::TimesBold,
            MathFace::Symbol => Font::Symbol,
        }
    }
}

fn push_piece(out: &mut Vec<Piece>, piece: Piece) {
    if !piece.space_before && piece.kind == PieceKind::Word {
        if let Some(last) = out.last_mut() {
            if last.kind == PieceKind::Word {
                last.width += piece.width;
                last.runs.extend(piece.runs);
                return;
            }
        }
    }
    out.push(piece);
}

fn pieces(inlines: &[Inline], fonts: &InlineFonts) -> Result<Vec<Piece>, ConversionError> {
    let mut out = Vec::new();
    let mut pending_space = false;

    for inline in inlines {
        match inline {
            Inline::Break => {
                out.push(Piece::new(Vec::new(), false, PieceKind::Break));
                pending_space = false;
            }
            Inline::Math { tex, display } => {
                let runs = math::typeset(tex)?
                    .into_iter()
                    .map(|m| {
                        Run::new(
                            m.bytes,
                            fonts.for_math(m.face),
                            fonts.size * m.scale,
                            fonts.size * m.rise,
                            fonts.color,
                        )
                    })
                    .collect();
                let kind = if *display {
                    PieceKind::Display
                } else {
                    PieceKind::Word
                };
                push_piece(&mut out, Piece::new(runs, pending_space, kind));
                pending_space = false;
            }
            Inline::Text(text, style) => {
                let (font, size, color) = fonts.for_text(style);
                let mut word = String::new();
                for c in text.chars() {
                    if c.is_whitespace() && c != '\u{A0}' {
                        if !word.is_empty() {
                            let run = Run::new(encode_winansi(&word), font, size, 0.0, color);
                            push_piece(&mut out, Piece::new(vec![run], pending_space, PieceKind::Word));
                            word.clear();
                        }
                        pending_space = true;
                    } else {
                        word.push(c);
                    }
                }
                if !word.is_empty() {
                    let run = Run::new(encode_winansi(&word), font, size, 0.0, color);
                    push_piece(&mut out, Piece::new(vec![run], pending_space, PieceKind::Word));
                    pending_space = false;
                }
            }
        }
    }
    Ok(out)
}

/// Cut a piece wider than `width` into chunks that fit.
fn split_piece(piece: Piece, width: f32) -> Vec<Piece> {
    let mut chunks = Vec::new();
    let mut current: Vec<Run> = Vec::new();
    let mut current_w = 0.0;

    for run in piece.runs {
        let mut bytes = Vec::new();
        for b in run.bytes {
            let w = run.font.text_width(&[b], run.size);
            if current_w + w > width && (current_w > 0.0 || !bytes.is_empty()) {
                if !bytes.is_empty() {
                    current.push(Run::new(std::mem::take(&mut bytes), run.font, run.size, run.rise, run.color));
                }
                chunks.push(Piece::new(std::mem::take(&mut current), false, PieceKind::Word));
                current_w = 0.0;
            }
            bytes.push(b);
            current_w += w;
        }
        if !bytes.is_empty() {
            current.push(Run::new(bytes, run.font, run.size, run.rise, run.color));
        }
    }
    if !current.is_empty() {
        chunks.push(Piece::new(current, false, PieceKind::Word));
    }
    if let Some(first) = chunks.first_mut() {
        first.space_before = piece.space_before;
    }
    chunks
}

/// Greedy line filling.
fn wrap(pieces: Vec<Piece>, width: f32) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut current = Line::default();
    let mut current_w = 0.0;

    for piece in pieces {
        match piece.kind {
            PieceKind::Break => {
                lines.push(std::mem::take(&mut current));
                current_w = 0.0;
            }
            PieceKind::Display => {
                if !current.pieces.is_empty() {
                    lines.push(std::mem::take(&mut current));
                    current_w = 0.0;
                }
                lines.push(Line {
                    pieces: vec![Piece {
                        space_before: false,
                        ..piece
                    }],
                    centered: true,
                });
            }
            PieceKind::Word => {
                let gap = if current.pieces.is_empty() { 0.0 } else { piece.gap() };
                if !current.pieces.is_empty() && current_w + gap + piece.width > width {
                    lines.push(std::mem::take(&mut current));
                    current_w = 0.0;
                }
                if current.pieces.is_empty() && piece.width > width {
                    let mut chunks = split_piece(piece, width);
                    let last = chunks.pop();
                    for chunk in chunks {
                        lines.push(Line {
                            pieces: vec![chunk],
                            centered: false,
                        });
                    }
                    if let Some(last) = last {
                        current_w = last.width;
                        current.pieces.push(last);
                    }
                } else {
                    current_w += if current.pieces.is_empty() { 0.0 } else { piece.gap() };
                    current_w += piece.width;
                    current.pieces.push(piece);
                }
            }
        }
    }
    if !current.pieces.is_empty() {
        lines.push(current);
    }
    lines
}

// ── Page layout ──────────────────────────────────────────────────────────

struct Layout<'a> {
    style: &'a DocumentStyle,
    pages: Vec<Page>,
    /// y of the top of the next line.
    cursor: f32,
    top: f32,
    bottom: f32,
    left: f32,
    right: f32,
    indent: f32,
    /// x positions of active blockquote bars.
    bars: Vec<f32>,
    /// List marker waiting for the next drawn line.
    marker: Option<Vec<u8>>,
    list_depth: usize,
}

impl<'a> Layout<'a> {
    fn new(style: &'a DocumentStyle) -> Self {
        let top = style.page_height - style.margin;
        Self {
            style,
            pages: vec![Page::default()],
            cursor: top,
            top,
            bottom: style.margin,
            left: style.margin,
            right: style.page_width - style.margin,
            indent: 0.0,
            bars: Vec::new(),
            marker: None,
            list_depth: 0,
        }
    }

    fn finish(mut self) -> Vec<Page> {
        while self.pages.len() > 1 && self.pages.last().is_some_and(|p| p.ops.is_empty()) {
            self.pages.pop();
        }
        self.pages
    }

    fn base(&self) -> f32 {
        self.style.font_size
    }

    fn x0(&self) -> f32 {
        self.left + self.indent
    }

    fn avail(&self) -> f32 {
        (self.right - self.x0()).max(self.base() * 4.0)
    }

    fn at_page_top(&self) -> bool {
        self.cursor >= self.top
    }

    fn push_op(&mut self, op: Op) {
        match self.pages.last_mut() {
            Some(page) => page.ops.push(op),
            None => self.pages.push(Page { ops: vec![op] }),
        }
    }

    fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.cursor = self.top;
    }

    /// Start a new page unless `height` still fits.
    fn ensure(&mut self, height: f32) {
        if self.cursor - height < self.bottom && !self.at_page_top() {
            self.new_page();
        }
    }

    fn space(&mut self, amount: f32) {
        if !self.at_page_top() {
            self.cursor -= amount;
        }
    }

    fn para_gap(&self) -> f32 {
        if self.list_depth > 0 {
            self.base() * 0.25
        } else {
            self.base() * 0.6
        }
    }

    fn body_fonts(&self) -> InlineFonts {
        let quoted = !self.bars.is_empty();
        InlineFonts {
            family: self.style.theme.body_family(),
            size: self.base(),
            color: if quoted { Rgb::MUTED } else { Rgb::TEXT },
            bold: false,
            italic: quoted,
        }
    }

    /// Quote bars and any pending list marker for a line spanning `top..top-h`.
    fn decorate(&mut self, top: f32, height: f32, baseline: f32) {
        for x in self.bars.clone() {
            self.push_op(Op::Line {
                x1: x,
                y1: top,
                x2: x,
                y2: top - height,
                width: 2.5,
                color: Rgb::RULE,
            });
        }
        if let Some(marker) = self.marker.take() {
            let font = self.style.body_font(false, false);
            let size = self.base();
            let width = font.text_width(&marker, size);
            self.push_op(Op::Text {
                x: self.x0() - 5.0 - width,
                y: baseline,
                font,
                size,
                rise: 0.0,
                color: Rgb::TEXT,
                bytes: marker,
            });
        }
    }

    fn draw_line(&mut self, line: &Line, x: f32, avail: f32, baseline: f32) {
        let mut x = if line.centered {
            x + ((avail - line.width()) / 2.0).max(0.0)
        } else {
            x
        };
        for (i, piece) in line.pieces.iter().enumerate() {
            if i > 0 {
                x += piece.gap();
            }
            for run in &piece.runs {
                if !run.bytes.is_empty() {
                    self.push_op(Op::Text {
                        x,
                        y: baseline,
                        font: run.font,
                        size: run.size,
                        rise: run.rise,
                        color: run.color,
                        bytes: run.bytes.clone(),
                    });
                }
                x += run.width;
            }
        }
    }

    fn emit_lines(&mut self, lines: &[Line], size: f32) {
        for line in lines {
            let max = line.max_size(size);
            let height = max * self.style.line_height;
            self.ensure(height);
            let top = self.cursor;
            let baseline = top - (height - max) / 2.0 - max * 0.8;
            self.decorate(top, height, baseline);
            let (x, avail) = (self.x0(), self.avail());
            self.draw_line(line, x, avail, baseline);
            self.cursor -= height;
        }
    }

    fn blocks(&mut self, blocks: &[Block]) -> Result<(), ConversionError> {
        for block in blocks {
            self.block(block)?;
        }
        Ok(())
    }

    fn block(&mut self, block: &Block) -> Result<(), ConversionError> {
        match block {
            Block::Heading { level, content } => self.heading(*level, content),
            Block::Paragraph(inlines) => {
                let fonts = self.body_fonts();
                let lines = wrap(pieces(inlines, &fonts)?, self.avail());
                self.emit_lines(&lines, fonts.size);
                let gap = self.para_gap();
                self.space(gap);
                Ok(())
            }
            Block::CodeBlock(lines) => {
                self.code_block(lines);
                Ok(())
            }
            Block::List { start, items } => self.list(*start, items),
            Block::Quote(inner) => {
                let bar = self.x0() + 3.0;
                self.bars.push(bar);
                self.indent += 14.0;
                let result = self.blocks(inner);
                self.indent -= 14.0;
                self.bars.pop();
                result
            }
            Block::Table { header, rows } => self.table(header, rows),
            Block::Rule => {
                let base = self.base();
                self.space(base * 0.4);
                self.ensure(base);
                let y = self.cursor - base * 0.5;
                let (x1, x2) = (self.x0(), self.right);
                self.push_op(Op::Line {
                    x1,
                    y1: y,
                    x2,
                    y2: y,
                    width: 1.0,
                    color: Rgb::RULE,
                });
                self.cursor -= base;
                Ok(())
            }
        }
    }

    fn heading(&mut self, level: u8, content: &[Inline]) -> Result<(), ConversionError> {
        let theme = self.style.theme;
        let size = self.base() * theme.heading_scale(level);
        self.space(size * 0.5);

        let fonts = InlineFonts {
            bold: true,
            italic: false,
            size,
            ..self.body_fonts()
        };
        let mut lines = wrap(pieces(content, &fonts)?, self.avail());
        if level == 1 && theme.centre_title() {
            for line in &mut lines {
                line.centered = true;
            }
        }
        self.emit_lines(&lines, size);

        if level <= 2 && theme.rules_under_headings() {
            let y = self.cursor - 2.0;
            let (x1, x2) = (self.x0(), self.right);
            self.push_op(Op::Line {
                x1,
                y1: y,
                x2,
                y2: y,
                width: 0.75,
                color: Rgb::RULE,
            });
            self.cursor -= 6.0;
        }
        self.space(size * 0.25);
        Ok(())
    }

    fn code_block(&mut self, lines: &[String]) {
        let size = self.base() * 0.9;
        let height = size * 1.35;
        let pad = 4.0;
        let char_w = Font::Courier.text_width(b" ", size);
        let max_chars = (((self.avail() - 2.0 * pad) / char_w).floor() as usize).max(8);

        let mut chunks: Vec<Vec<u8>> = Vec::new();
        for line in lines {
            let bytes = encode_winansi(&line.replace('\t', "    "));
            if bytes.is_empty() {
                chunks.push(Vec::new());
            }
            for chunk in bytes.chunks(max_chars) {
                chunks.push(chunk.to_vec());
            }
        }
        if chunks.is_empty() {
            chunks.push(Vec::new());
        }

        let last = chunks.len() - 1;
        for (i, bytes) in chunks.into_iter().enumerate() {
            let top_pad = if i == 0 { pad } else { 0.0 };
            let bottom_pad = if i == last { pad } else { 0.0 };
            let row_h = height + top_pad + bottom_pad;
            self.ensure(row_h);
            let top = self.cursor;
            let (x, avail) = (self.x0(), self.avail());
            self.push_op(Op::Rect {
                x,
                y: top - row_h,
                w: avail,
                h: row_h,
                color: Rgb::CODE_BG,
            });
            let baseline = top - top_pad - height * 0.75;
            self.decorate(top, row_h, baseline);
            if !bytes.is_empty() {
                self.push_op(Op::Text {
                    x: x + pad,
                    y: baseline,
                    font: Font::Courier,
                    size,
                    rise: 0.0,
                    color: Rgb::TEXT,
                    bytes,
                });
            }
            self.cursor -= row_h;
        }
        let gap = self.para_gap();
        self.space(gap);
    }

    fn list(&mut self, start: Option<u64>, items: &[Vec<Block>]) -> Result<(), ConversionError> {
        self.indent += 18.0;
        self.list_depth += 1;
        for (i, item) in items.iter().enumerate() {
            self.marker = Some(match start {
                Some(n) => format!("{}.", n + i as u64).into_bytes(),
                None => vec![0x95],
            });
            if item.is_empty() {
                self.emit_lines(&[Line::default()], self.base());
            } else {
                self.blocks(item)?;
            }
        }
        self.marker = None;
        self.list_depth -= 1;
        self.indent -= 18.0;
        if self.list_depth == 0 {
            let gap = self.base() * 0.4;
            self.space(gap);
        }
        Ok(())
    }

    fn table(
        &mut self,
        header: &[Vec<Inline>],
        rows: &[Vec<Vec<Inline>>],
    ) -> Result<(), ConversionError> {
        let ncols = rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(header.len()))
            .max()
            .unwrap_or(0);
        if ncols == 0 {
            return Ok(());
        }

        let pad = 4.0;
        let size = self.base() * 0.95;
        let line_h = size * self.style.line_height;
        let x0 = self.x0();
        let avail = self.avail();
        let col_w = avail / ncols as f32;

        let mut all: Vec<(&[Vec<Inline>], bool)> = Vec::new();
        if !header.is_empty() {
            all.push((header, true));
        }
        all.extend(rows.iter().map(|r| (r.as_slice(), false)));

        let mut first_row = true;
        for (cells, is_header) in all {
            let fonts = InlineFonts {
                bold: is_header,
                size,
                ..self.body_fonts()
            };
            let cell_lines = (0..ncols)
                .map(|c| match cells.get(c) {
                    Some(inlines) => Ok(wrap(pieces(inlines, &fonts)?, col_w - 2.0 * pad)),
                    None => Ok(Vec::new()),
                })
                .collect::<Result<Vec<Vec<Line>>, ConversionError>>()?;

            let n_lines = cell_lines.iter().map(Vec::len).max().unwrap_or(0).max(1);
            let row_h = n_lines as f32 * line_h + 2.0 * pad;
            let page_before = self.pages.len();
            self.ensure(row_h);
            let top = self.cursor;

            if is_header {
                self.push_op(Op::Rect {
                    x: x0,
                    y: top - row_h,
                    w: avail,
                    h: row_h,
                    color: Rgb::HEADER_BG,
                });
            }
            self.decorate(top, row_h, top - pad - line_h * 0.75);

            for (c, lines) in cell_lines.iter().enumerate() {
                let cx = x0 + c as f32 * col_w + pad;
                let mut y = top - pad;
                for line in lines {
                    let max = line.max_size(size);
                    let baseline = y - (line_h - max) / 2.0 - max * 0.8;
                    self.draw_line(line, cx, col_w - 2.0 * pad, baseline);
                    y -= line_h;
                }
            }

            // Grid: top edge on the first row of each page, then bottom and verticals.
            if first_row || self.pages.len() != page_before {
                self.grid_line(x0, top, x0 + avail, top);
            }
            self.grid_line(x0, top - row_h, x0 + avail, top - row_h);
            for c in 0..=ncols {
                let x = x0 + c as f32 * col_w;
                self.grid_line(x, top, x, top - row_h);
            }

            self.cursor -= row_h;
            first_row = false;
        }
        let gap = self.para_gap();
        self.space(gap);
        Ok(())
    }

    fn grid_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.push_op(Op::Line {
            x1,
            y1,
            x2,
            y2,
            width: 0.5,
            color: Rgb::RULE,
        });
    }
}
