//! Templated HTML to PDF.
//!
//! The HTML is reduced to a flat list of text blocks (headings, paragraphs,
//! list items, quotes, code, table rows) which are then laid out on A4
//! pages with builtin fonts. Only the allow-listed structure matters here;
//! styling in the template is ignored.
//!
//! Builtin fonts are WinAnsi-encoded: Latin text (Spanish included) prints
//! as-is, but characters outside that set (CJK, Cyrillic, most symbols)
//! cannot be shown. They are counted and logged; the HTML preview keeps
//! them intact.

use std::io::BufWriter;
use std::sync::LazyLock;

use printpdf::*;
use regex::Regex;

use crate::pipeline::HistoryError;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_LEFT_MM: f32 = 20.0;
const MARGIN_TOP_MM: f32 = 20.0;
const MARGIN_BOTTOM_MM: f32 = 20.0;
const USABLE_WIDTH_MM: f32 = PAGE_WIDTH_MM - 2.0 * MARGIN_LEFT_MM;

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph(String),
    ListItem { marker: String, depth: usize, text: String },
    Quote(String),
    Code(String),
    TableRow(String),
}

// ═══════════════════════════════════════════════════════════
// HTML scanning
// ═══════════════════════════════════════════════════════════

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--.*?-->|<![^>]*>|<(/?)([A-Za-z][A-Za-z0-9]*)[^>]*>").expect("valid regex")
});

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z]+);").expect("valid regex"));

fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            let decoded = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ if name.starts_with("#x") || name.starts_with("#X") => {
                    u32::from_str_radix(&name[2..], 16).ok().and_then(char::from_u32)
                }
                _ if name.starts_with('#') => name[1..].parse::<u32>().ok().and_then(char::from_u32),
                _ => None,
            };
            decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct ListState {
    ordered: bool,
    counter: usize,
}

#[derive(Default)]
struct BlockScanner {
    blocks: Vec<Block>,
    buf: String,
    skip_depth: usize,
    heading: Option<u8>,
    lists: Vec<ListState>,
    pending_marker: Option<String>,
    quote_depth: usize,
    in_pre: bool,
    row: Option<Vec<String>>,
}

impl BlockScanner {
    fn text(&mut self, raw: &str) {
        if self.skip_depth > 0 {
            return;
        }
        let decoded = decode_entities(raw);
        if self.in_pre {
            self.buf.push_str(&decoded);
        } else {
            // Source newlines are layout noise; only <br> breaks a line.
            for ch in decoded.chars() {
                self.buf.push(if ch.is_whitespace() { ' ' } else { ch });
            }
        }
    }

    fn take_text(&mut self) -> String {
        let raw = std::mem::take(&mut self.buf);
        if self.in_pre {
            return raw.trim_matches('\n').to_string();
        }
        raw.split('\n')
            .map(collapse_whitespace)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn flush(&mut self) {
        if self.row.is_some() {
            // Stray text between cells.
            self.buf.clear();
            return;
        }
        let text = self.take_text();
        if text.is_empty() {
            return;
        }
        let block = if self.in_pre {
            Block::Code(text)
        } else if let Some(level) = self.heading {
            Block::Heading { level, text }
        } else if let Some(marker) = self.pending_marker.take() {
            Block::ListItem {
                marker,
                depth: self.lists.len().max(1),
                text,
            }
        } else if self.quote_depth > 0 {
            Block::Quote(text)
        } else {
            Block::Paragraph(text)
        };
        self.blocks.push(block);
    }

    fn open(&mut self, tag: &str) {
        if matches!(tag, "head" | "style" | "title" | "script") {
            self.skip_depth += 1;
            return;
        }
        if self.skip_depth > 0 {
            return;
        }
        match tag {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush();
                self.heading = tag[1..].parse().ok();
            }
            "p" | "div" | "header" | "main" | "footer" | "section" | "article" => self.flush(),
            "ul" | "ol" => {
                self.flush();
                self.lists.push(ListState {
                    ordered: tag == "ol",
                    counter: 0,
                });
            }
            "li" => {
                self.flush();
                let marker = match self.lists.last_mut() {
                    Some(list) if list.ordered => {
                        list.counter += 1;
                        format!("{}.", list.counter)
                    }
                    _ => "\u{2022}".to_string(),
                };
                self.pending_marker = Some(marker);
            }
            "blockquote" => {
                self.flush();
                self.quote_depth += 1;
            }
            "pre" => {
                self.flush();
                self.in_pre = true;
            }
            "tr" => {
                self.flush();
                self.row = Some(Vec::new());
            }
            "td" | "th" => self.buf.clear(),
            "br" => self.buf.push('\n'),
            _ => {}
        }
    }

    fn close(&mut self, tag: &str) {
        if matches!(tag, "head" | "style" | "title" | "script") {
            self.skip_depth = self.skip_depth.saturating_sub(1);
            return;
        }
        if self.skip_depth > 0 {
            return;
        }
        match tag {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush();
                self.heading = None;
            }
            "p" | "div" | "header" | "main" | "footer" | "section" | "article" | "li" => self.flush(),
            "ul" | "ol" => {
                self.flush();
                self.lists.pop();
            }
            "blockquote" => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            "pre" => {
                self.flush();
                self.in_pre = false;
            }
            "td" | "th" => {
                let cell = collapse_whitespace(&std::mem::take(&mut self.buf));
                if let Some(row) = self.row.as_mut() {
                    row.push(cell);
                }
            }
            "tr" => {
                if let Some(cells) = self.row.take() {
                    if cells.iter().any(|c| !c.is_empty()) {
                        self.blocks.push(Block::TableRow(cells.join(" | ")));
                    }
                }
                self.buf.clear();
            }
            _ => {}
        }
    }
}

/// Reduce HTML to layout blocks, skipping `<head>`, `<style>`, `<title>`
/// and `<script>` content.
pub fn scan_blocks(html: &str) -> Vec<Block> {
    let mut scanner = BlockScanner::default();
    let mut last = 0;

    for caps in TAG_RE.captures_iter(html) {
        let Some(whole) = caps.get(0) else { continue };
        scanner.text(&html[last..whole.start()]);
        last = whole.end();

        let Some(name) = caps.get(2) else { continue };
        let tag = name.as_str().to_ascii_lowercase();
        if caps.get(1).is_some_and(|m| !m.as_str().is_empty()) {
            scanner.close(&tag);
        } else {
            scanner.open(&tag);
        }
    }
    scanner.text(&html[last..]);
    scanner.flush();
    scanner.blocks
}

// ═══════════════════════════════════════════════════════════
// Layout
// ═══════════════════════════════════════════════════════════

/// Greedy word wrap on character counts.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len + word_len + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Characters per line for a font size over `width_mm`, assuming an
/// average glyph width of half an em.
fn chars_per_line(font_size: f32, width_mm: f32) -> usize {
    let glyph_mm = font_size * 0.5 * 0.3528;
    ((width_mm / glyph_mm) as usize).max(10)
}

fn line_height(font_size: f32) -> f32 {
    font_size * 0.5
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
    mono: IndirectFontRef,
}

/// Characters WinAnsiEncoding places in 0x80..=0x9F, beyond Latin-1.
const WIN_ANSI_EXTRAS: &[char] = &[
    '€', '‚', 'ƒ', '„', '…', '†', '‡', 'ˆ', '‰', 'Š', '‹', 'Œ', 'Ž', '\u{2018}', '\u{2019}',
    '\u{201C}', '\u{201D}', '•', '–', '—', '˜', '™', 'š', '›', 'œ', 'ž', 'Ÿ',
];

/// Whether a builtin (WinAnsi) font can show `c`.
pub fn win_ansi_encodable(c: char) -> bool {
    matches!(c as u32, 0x20..=0x7E | 0xA0..=0xFF) || c == '\n' || WIN_ANSI_EXTRAS.contains(&c)
}

/// Number of characters in `text` a builtin font cannot show.
pub fn unencodable_chars(text: &str) -> usize {
    text.chars().filter(|c| !win_ansi_encodable(*c)).count()
}

struct PdfWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    fonts: Fonts,
    y: Mm,
    unencodable: usize,
}

fn font_error(e: impl std::fmt::Display) -> HistoryError {
    HistoryError::Rendering(format!("PDF font error: {e}"))
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self, HistoryError> {
        let (doc, page1, layer1) =
            PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
        let layer = doc.get_page(page1).get_layer(layer1);
        let fonts = Fonts {
            regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(font_error)?,
            bold: doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(font_error)?,
            italic: doc.add_builtin_font(BuiltinFont::HelveticaOblique).map_err(font_error)?,
            mono: doc.add_builtin_font(BuiltinFont::Courier).map_err(font_error)?,
        };
        Ok(Self {
            doc,
            layer,
            fonts,
            y: Mm(PAGE_HEIGHT_MM - MARGIN_TOP_MM),
            unencodable: 0,
        })
    }

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = Mm(PAGE_HEIGHT_MM - MARGIN_TOP_MM);
    }

    fn space(&mut self, mm: f32) {
        self.y -= Mm(mm);
    }

    fn font(&self, kind: FontKind) -> &IndirectFontRef {
        match kind {
            FontKind::Regular => &self.fonts.regular,
            FontKind::Bold => &self.fonts.bold,
            FontKind::Italic => &self.fonts.italic,
            FontKind::Mono => &self.fonts.mono,
        }
    }

    /// Move down one line, breaking the page first if it would overflow.
    fn advance(&mut self, size: f32) {
        let height = line_height(size);
        if self.y - Mm(height) < Mm(MARGIN_BOTTOM_MM) {
            self.new_page();
        }
        self.y -= Mm(height);
    }

    fn line(&mut self, text: &str, size: f32, x_mm: f32, kind: FontKind) {
        self.advance(size);
        self.unencodable += unencodable_chars(text);
        self.layer.use_text(text, size, Mm(x_mm), self.y, self.font(kind));
    }

    fn wrapped(&mut self, text: &str, size: f32, indent_mm: f32, font: FontKind) {
        let max_chars = chars_per_line(size, USABLE_WIDTH_MM - indent_mm);
        for source_line in text.split('\n') {
            for line in wrap_text(source_line, max_chars) {
                self.line(&line, size, MARGIN_LEFT_MM + indent_mm, font);
            }
        }
    }

    fn write_block(&mut self, block: &Block) {
        match block {
            Block::Heading { level, text } => {
                let size = match level {
                    1 => 16.0,
                    2 => 14.0,
                    _ => 12.0,
                };
                self.space(3.0);
                self.wrapped(text, size, 0.0, FontKind::Bold);
                self.space(1.5);
            }
            Block::Paragraph(text) => {
                self.wrapped(text, 10.0, 0.0, FontKind::Regular);
                self.space(2.0);
            }
            Block::ListItem { marker, depth, text } => {
                let indent = 5.0 * (*depth as f32);
                let hanging = indent + 2.0 * marker.chars().count() as f32 + 2.0;
                let max_chars = chars_per_line(10.0, USABLE_WIDTH_MM - hanging);
                let mut lines = text.split('\n').flat_map(|l| wrap_text(l, max_chars));
                if let Some(first) = lines.next() {
                    // Marker and first line share a baseline.
                    self.advance(10.0);
                    self.unencodable += unencodable_chars(&first);
                    let font = self.font(FontKind::Regular);
                    self.layer
                        .use_text(marker.as_str(), 10.0, Mm(MARGIN_LEFT_MM + indent), self.y, font);
                    self.layer.use_text(first, 10.0, Mm(MARGIN_LEFT_MM + hanging), self.y, font);
                }
                for line in lines {
                    self.line(&line, 10.0, MARGIN_LEFT_MM + hanging, FontKind::Regular);
                }
                self.space(1.0);
            }
            Block::Quote(text) => {
                self.wrapped(text, 10.0, 8.0, FontKind::Italic);
                self.space(2.0);
            }
            Block::Code(text) => {
                // Courier glyphs are 0.6 em wide.
                let max_chars = chars_per_line(9.0, USABLE_WIDTH_MM - 4.0) * 5 / 6;
                for source_line in text.lines() {
                    let chars: Vec<char> = source_line.chars().collect();
                    if chars.is_empty() {
                        self.line("", 9.0, MARGIN_LEFT_MM + 4.0, FontKind::Mono);
                    }
                    for chunk in chars.chunks(max_chars.max(1)) {
                        let line: String = chunk.iter().collect();
                        self.line(&line, 9.0, MARGIN_LEFT_MM + 4.0, FontKind::Mono);
                    }
                }
                self.space(2.0);
            }
            Block::TableRow(text) => {
                self.wrapped(text, 9.0, 0.0, FontKind::Regular);
                self.space(1.0);
            }
        }
    }

    fn finish(self) -> Result<Vec<u8>, HistoryError> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|e| HistoryError::Rendering(format!("PDF save error: {e}")))?;
        buf.into_inner()
            .map_err(|e| HistoryError::Rendering(format!("PDF buffer error: {e}")))
    }
}

#[derive(Clone, Copy)]
enum FontKind {
    Regular,
    Bold,
    Italic,
    Mono,
}

/// Lay out `html` as a PDF document titled `title`.
pub fn html_to_pdf(html: &str, title: &str) -> Result<Vec<u8>, HistoryError> {
    let blocks = scan_blocks(html);
    let mut writer = PdfWriter::new(title)?;
    for block in &blocks {
        writer.write_block(block);
    }
    if writer.unencodable > 0 {
        tracing::debug!(
            title,
            unencodable = writer.unencodable,
            "PDF text has characters the builtin fonts cannot show"
        );
    }
    writer.finish()
}
