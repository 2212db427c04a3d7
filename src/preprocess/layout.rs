//! Turns rendered HTML into positioned lines of text on pages.
//!
//! The document is first flattened into [`Block`]s, then each block is
//! word-wrapped with the built-in font metrics and placed top-down, starting a
//! new page whenever the next line would cross the bottom margin.

use scraper::{ElementRef, Html, Node};

use super::metrics::{fold_to_ascii, text_width, FontFace};
use super::sanitize::{parse_dimension, MAX_NESTING};
use super::stylesheet::Stylesheet;

/// Marks a `<br>` inside collected inline text.
const HARD_BREAK: char = '\u{2028}';
const INDENT_PT: f32 = 18.0;
const RULE_TEXT: &str = "*   *   *";

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Heading(u8),
    Paragraph,
    ListItem { marker: String },
    Quote,
    Preformatted,
    Image,
    Rule,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub text: String,
    /// Nesting level of lists and quotes.
    pub indent: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub face: FontFace,
    pub size_pt: f32,
    pub x_pt: f32,
    /// Baseline, measured from the bottom edge.
    pub y_pt: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub lines: Vec<PlacedLine>,
}

#[derive(Debug, Clone, Copy)]
enum ListKind {
    Bullet,
    Ordered(u32),
}

pub fn extract_blocks(html: &str) -> Vec<Block> {
    let document = Html::parse_document(html);
    let mut builder = BlockBuilder::default();
    builder.visit_children(document.root_element());
    builder.flush();
    builder.blocks
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    inline: String,
    quote_depth: u8,
    lists: Vec<ListKind>,
    pending_marker: Option<String>,
    depth: usize,
}

impl BlockBuilder {
    fn indent(&self) -> u8 {
        u8::try_from(self.lists.len())
            .unwrap_or(u8::MAX)
            .saturating_add(self.quote_depth)
    }

    fn push(&mut self, kind: BlockKind, text: String) {
        let indent = self.indent();
        self.blocks.push(Block { kind, text, indent });
    }

    fn flush(&mut self) {
        let text = collapse_inline(&self.inline);
        self.inline.clear();
        if text.is_empty() {
            return;
        }
        let kind = match self.pending_marker.take() {
            Some(marker) => BlockKind::ListItem { marker },
            None if self.quote_depth > 0 => BlockKind::Quote,
            None => BlockKind::Paragraph,
        };
        self.push(kind, text);
    }

    fn visit_children(&mut self, element: ElementRef<'_>) {
        self.depth += 1;
        for child in element.children() {
            if let Some(child) = ElementRef::wrap(child) {
                self.visit(child);
            } else if let Node::Text(text) = child.value() {
                self.inline.push_str(text);
            }
        }
        self.depth -= 1;
    }

    fn visit(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();
        if self.depth > MAX_NESTING {
            self.inline.extend(element.text());
            return;
        }
        match name {
            "head" | "title" | "style" | "script" | "template" | "noscript" => {}
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush();
                let level = name.as_bytes()[1] - b'0';
                let text = collapse_inline(&element.text().collect::<String>());
                if !text.is_empty() {
                    self.push(BlockKind::Heading(level), text);
                }
            }
            "br" => self.inline.push(HARD_BREAK),
            "hr" => {
                self.flush();
                self.push(BlockKind::Rule, RULE_TEXT.to_string());
            }
            "img" => {
                self.flush();
                let alt = element.value().attr("alt").map(str::trim).unwrap_or_default();
                let alt = if alt.is_empty() { "image" } else { alt };
                let dimension = |name: &str| element.value().attr(name).and_then(parse_dimension);
                let label = match (dimension("width"), dimension("height")) {
                    (Some(w), Some(h)) => format!("[Image: {alt} ({w}x{h})]"),
                    (Some(w), None) => format!("[Image: {alt} ({w}px wide)]"),
                    _ => format!("[Image: {alt}]"),
                };
                self.push(BlockKind::Image, fold_to_ascii(&label));
            }
            "pre" | "listing" => {
                self.flush();
                let raw: String = element.text().collect();
                let text = fold_to_ascii(raw.trim_end_matches(['\n', ' ']));
                if !text.trim().is_empty() {
                    self.push(BlockKind::Preformatted, text);
                }
            }
            "ul" | "ol" | "menu" | "dir" => {
                self.flush();
                self.lists.push(if name == "ol" {
                    ListKind::Ordered(0)
                } else {
                    ListKind::Bullet
                });
                self.visit_children(element);
                self.flush();
                self.lists.pop();
            }
            "li" => {
                self.flush();
                let marker = match self.lists.last_mut() {
                    Some(ListKind::Ordered(n)) => {
                        *n += 1;
                        format!("{n}.")
                    }
                    Some(ListKind::Bullet) | None => "-".to_string(),
                };
                self.pending_marker = Some(marker);
                self.visit_children(element);
                self.flush();
                self.pending_marker = None;
            }
            "blockquote" | "dd" => {
                self.flush();
                let outer = self.quote_depth;
                self.quote_depth = outer.saturating_add(1);
                self.visit_children(element);
                self.flush();
                self.quote_depth = outer;
            }
            "tr" => {
                self.flush();
                let cells: Vec<String> = element
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|cell| matches!(cell.value().name(), "td" | "th"))
                    .map(|cell| collapse_inline(&cell.text().collect::<String>()))
                    .collect();
                let row = cells.join(" | ");
                if !row.trim().is_empty() {
                    self.push(BlockKind::Paragraph, row);
                }
            }
            _ if is_block(name) => {
                self.flush();
                self.visit_children(element);
                self.flush();
            }
            _ => self.visit_children(element),
        }
    }
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "html" | "body" | "p" | "div" | "section" | "article" | "aside" | "header" | "footer"
            | "nav" | "main" | "address" | "center" | "details" | "summary" | "hgroup"
            | "fieldset" | "legend" | "figure" | "figcaption" | "table" | "thead" | "tbody"
            | "tfoot" | "caption" | "dl" | "dt" | "search" | "form"
    )
}

/// Collapse whitespace runs, keep `<br>` breaks as `\n`, fold to ASCII.
fn collapse_inline(raw: &str) -> String {
    let lines: Vec<String> = raw
        .split(HARD_BREAK)
        .map(|segment| segment.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();
    let joined = lines.join("\n");
    fold_to_ascii(joined.trim_matches('\n'))
}

/// Greedy word wrap. Words wider than `width` are split by character.
pub fn wrap_words(text: &str, face: FontFace, size_pt: f32, width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for hard_line in text.split('\n') {
        let mut current = String::new();
        for word in hard_line.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if text_width(&candidate, face, size_pt) <= width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if text_width(word, face, size_pt) <= width {
                current = word.to_string();
            } else {
                let mut pieces = split_to_width(word, face, size_pt, width);
                current = pieces.pop().unwrap_or_default();
                lines.extend(pieces);
            }
        }
        lines.push(current);
    }
    lines
}

/// Break `text` into chunks that each fit `width`. Whitespace is preserved.
fn split_to_width(text: &str, face: FontFace, size_pt: f32, width: f32) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if current.chars().count() > 1 && text_width(&current, face, size_pt) > width {
            current.pop();
            chunks.push(std::mem::take(&mut current));
            current.push(c);
        }
    }
    chunks.push(current);
    chunks
}

struct Cursor<'a> {
    style: &'a Stylesheet,
    pages: Vec<Page>,
    y: f32,
}

impl<'a> Cursor<'a> {
    fn new(style: &'a Stylesheet) -> Self {
        Self {
            style,
            pages: vec![Page::default()],
            y: style.page.height_pt - style.page.margin_pt,
        }
    }

    fn top(&self) -> f32 {
        self.style.page.height_pt - self.style.page.margin_pt
    }

    fn page_is_empty(&self) -> bool {
        self.pages.last().map_or(true, |p| p.lines.is_empty())
    }

    fn space(&mut self, amount: f32) {
        if !self.page_is_empty() {
            self.y -= amount;
        }
    }

    /// Reserve one line box and return its baseline.
    fn next_baseline(&mut self, size_pt: f32) -> f32 {
        let line_height = size_pt * self.style.line_height.max(1.0);
        if self.y - line_height < self.style.page.margin_pt && !self.page_is_empty() {
            self.pages.push(Page::default());
            self.y = self.top();
        }
        let baseline = self.y - size_pt;
        self.y -= line_height;
        baseline
    }

    fn place(&mut self, text: String, face: FontFace, size_pt: f32, x_pt: f32) {
        let y_pt = self.next_baseline(size_pt);
        if let Some(page) = self.pages.last_mut() {
            page.lines.push(PlacedLine {
                text,
                face,
                size_pt,
                x_pt,
                y_pt,
            });
        }
    }
}

/// Lay `blocks` out onto pages. Always yields at least one page.
pub fn paginate(blocks: &[Block], style: &Stylesheet) -> Vec<Page> {
    let mut cursor = Cursor::new(style);
    let left = style.page.margin_pt;
    let full_width = style.page.content_width();
    let body = style.body_font_pt;

    for block in blocks {
        let indent = (f32::from(block.indent) * INDENT_PT).min(full_width / 2.0);
        let x = left + indent;
        let width = full_width - indent;

        match &block.kind {
            BlockKind::Heading(level) => {
                let size = style.heading_size(*level);
                cursor.space(size * 0.5);
                for line in wrap_words(&block.text, FontFace::Bold, size, width) {
                    cursor.place(line, FontFace::Bold, size, x);
                }
                cursor.space(size * 0.25);
            }
            BlockKind::Paragraph | BlockKind::Quote | BlockKind::Image => {
                let face = match block.kind {
                    BlockKind::Paragraph => FontFace::Regular,
                    _ => FontFace::Oblique,
                };
                for line in wrap_words(&block.text, face, body, width) {
                    cursor.place(line, face, body, x);
                }
                cursor.space(body * 0.6);
            }
            BlockKind::ListItem { marker } => {
                let hang = text_width(marker, FontFace::Regular, body) + body * 0.5;
                let lines = wrap_words(&block.text, FontFace::Regular, body, (width - hang).max(body));
                for (i, line) in lines.into_iter().enumerate() {
                    if i == 0 {
                        let baseline_y = cursor.next_baseline(body);
                        if let Some(page) = cursor.pages.last_mut() {
                            page.lines.push(PlacedLine {
                                text: marker.clone(),
                                face: FontFace::Regular,
                                size_pt: body,
                                x_pt: x,
                                y_pt: baseline_y,
                            });
                            page.lines.push(PlacedLine {
                                text: line,
                                face: FontFace::Regular,
                                size_pt: body,
                                x_pt: x + hang,
                                y_pt: baseline_y,
                            });
                        }
                    } else {
                        cursor.place(line, FontFace::Regular, body, x + hang);
                    }
                }
                cursor.space(body * 0.3);
            }
            BlockKind::Preformatted => {
                let size = body * 0.9;
                for source_line in block.text.split('\n') {
                    let expanded = source_line.replace('\t', "    ");
                    for chunk in split_to_width(&expanded, FontFace::Mono, size, width) {
                        cursor.place(chunk, FontFace::Mono, size, x);
                    }
                }
                cursor.space(body * 0.6);
            }
            BlockKind::Rule => {
                let rule_width = text_width(&block.text, FontFace::Regular, body);
                let centered = left + ((full_width - rule_width) / 2.0).max(0.0);
                cursor.space(body * 0.3);
                cursor.place(block.text.clone(), FontFace::Regular, body, centered);
                cursor.space(body * 0.6);
            }
        }
    }

    for page in &mut cursor.pages {
        page.lines.retain(|line| !line.text.is_empty());
    }
    cursor.pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::stylesheet::parse_stylesheet;

    fn style() -> Stylesheet {
        parse_stylesheet("@page { size: A5; margin: 0.5in }", 13).unwrap()
    }

    #[test]
    fn extracts_structural_blocks() {
        let html = r#"<html><head><title>T</title><style>p{}</style></head><body>
            <h1>Title</h1>
            <p>First  paragraph<br>second line</p>
            <ul><li>one</li><li>two</li></ul>
            <ol><li>alpha</li><li>beta</li></ol>
            <blockquote><p>quoted</p></blockquote>
            <pre>let x = 1;
let y = 2;</pre>
            <img src="a.png" alt="Diagram">
            <hr>
            <table><tr><th>k</th><td>v</td></tr></table>
        </body></html>"#;
        let blocks = extract_blocks(html);
        let kinds: Vec<_> = blocks.iter().map(|b| b.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Heading(1),
                BlockKind::Paragraph,
                BlockKind::ListItem { marker: "-".into() },
                BlockKind::ListItem { marker: "-".into() },
                BlockKind::ListItem { marker: "1.".into() },
                BlockKind::ListItem { marker: "2.".into() },
                BlockKind::Quote,
                BlockKind::Preformatted,
                BlockKind::Image,
                BlockKind::Rule,
                BlockKind::Paragraph,
            ]
        );
        assert_eq!(blocks[1].text, "First paragraph\nsecond line");
        assert_eq!(blocks[2].indent, 1);
        assert_eq!(blocks[7].text, "let x = 1;\nlet y = 2;");
        assert_eq!(blocks[8].text, "[Image: Diagram]");
        assert_eq!(blocks[10].text, "k | v");
    }

    #[test]
    fn image_placeholder_carries_dimensions() {
        let blocks = extract_blocks(
            r#"<img src="a.png" alt="Chart" width="400" height="300"><img src="b.png" width="120px">"#,
        );
        let texts: Vec<_> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, ["[Image: Chart (400x300)]", "[Image: image (120px wide)]"]);
    }

    #[test]
    fn quotes_nested_past_the_indent_range() {
        let depth = 300;
        let html = format!(
            "{}<p>inner</p>{}<p>after</p>",
            "<blockquote>".repeat(depth),
            "</blockquote>".repeat(depth)
        );
        let blocks = extract_blocks(&html);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "inner");
        assert_eq!(blocks[0].kind, BlockKind::Quote);
        assert_eq!(blocks[1].kind, BlockKind::Paragraph);
        assert_eq!(blocks[1].indent, 0);
        assert_eq!(paginate(&blocks, &style()).len(), 1);
    }

    #[test]
    fn deeply_nested_divs_are_flattened() {
        let depth = 10_000;
        let html = format!("{}deep text{}<p>tail</p>", "<div>".repeat(depth), "</div>".repeat(depth));
        let blocks = extract_blocks(&html);
        let texts: Vec<_> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, ["deep text", "tail"]);
    }

    #[test]
    fn wraps_within_width() {
        let text = "The quick brown fox jumps over the lazy dog ".repeat(20);
        let lines = wrap_words(&text, FontFace::Regular, 10.0, 200.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(text_width(line, FontFace::Regular, 10.0) <= 200.0, "{line}");
        }
        let rejoined = lines.join(" ");
        assert_eq!(rejoined.split_whitespace().count(), text.split_whitespace().count());
    }

    #[test]
    fn splits_overlong_words() {
        let word = "x".repeat(300);
        let lines = wrap_words(&word, FontFace::Regular, 10.0, 100.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), word);
    }

    #[test]
    fn empty_document_still_has_a_page() {
        let pages = paginate(&[], &style());
        assert_eq!(pages.len(), 1);
        assert!(pages[0].lines.is_empty());
    }

    #[test]
    fn long_content_spans_pages_inside_margins() {
        let style = style();
        let blocks: Vec<Block> = (0..120)
            .map(|i| Block {
                kind: BlockKind::Paragraph,
                text: format!("Paragraph {i} with enough words to wrap across a line or two of the page."),
                indent: 0,
            })
            .collect();
        let pages = paginate(&blocks, &style);
        assert!(pages.len() > 1);

        let top = style.page.height_pt - style.page.margin_pt;
        let right = style.page.width_pt - style.page.margin_pt;
        for page in &pages {
            assert!(!page.lines.is_empty());
            for line in &page.lines {
                assert!(line.y_pt >= style.page.margin_pt - 0.01, "{line:?}");
                assert!(line.y_pt <= top);
                assert!(line.x_pt + text_width(&line.text, line.face, line.size_pt) <= right + 0.01);
            }
        }
    }
}
