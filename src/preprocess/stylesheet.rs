//! The CSS subset the renderer understands.
//!
//! Recognised: `@page { size; margin }`, `body { line-height }` and
//! `h1`-`h3 { font-size }`. Other rules and properties are accepted and
//! ignored; only malformed syntax is an error.

use crate::error::RenderError;

const PT_PER_PX: f32 = 0.75;
const PT_PER_IN: f32 = 72.0;
const PT_PER_MM: f32 = 72.0 / 25.4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width_pt: f32,
    pub height_pt: f32,
    pub margin_pt: f32,
}

impl PageGeometry {
    pub const A4: (f32, f32) = (595.28, 841.89);
    pub const A5: (f32, f32) = (419.53, 595.28);
    pub const LETTER: (f32, f32) = (612.0, 792.0);

    pub fn content_width(&self) -> f32 {
        self.width_pt - 2.0 * self.margin_pt
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stylesheet {
    pub page: PageGeometry,
    pub body_font_pt: f32,
    /// Multiple of the font size.
    pub line_height: f32,
    /// Font sizes of `h1`, `h2` and `h3`; deeper levels use `h3`.
    pub heading_pt: [f32; 3],
}

impl Stylesheet {
    pub fn heading_size(&self, level: u8) -> f32 {
        let idx = usize::from(level.clamp(1, 3)) - 1;
        self.heading_pt[idx]
    }
}

#[derive(Debug, Clone, Copy)]
enum FontSize {
    Absolute(f32),
    Relative(f32),
}

/// Parse `css`. `font_size_px` is the configured base font size and takes
/// precedence over any `body { font-size }` in the stylesheet.
pub fn parse_stylesheet(css: &str, font_size_px: u32) -> Result<Stylesheet, RenderError> {
    let css = strip_comments(css)?;
    let body_font_pt = font_size_px as f32 * PT_PER_PX;

    let mut page = PageGeometry {
        width_pt: PageGeometry::A4.0,
        height_pt: PageGeometry::A4.1,
        margin_pt: 0.375 * PT_PER_IN,
    };
    let mut line_height = 1.5;
    let mut headings = [
        FontSize::Relative(1.85),
        FontSize::Relative(1.5),
        FontSize::Relative(1.25),
    ];

    for rule in split_rules(&css)? {
        match rule {
            Rule::At { name, body } if name.eq_ignore_ascii_case("page") => {
                for (prop, value) in declarations(body)? {
                    match prop.as_str() {
                        "size" => apply_page_size(&mut page, &value),
                        "margin" => {
                            if let Some(margin) = value.split_whitespace().next().and_then(absolute_length) {
                                page.margin_pt = margin;
                            }
                        }
                        _ => {}
                    }
                }
            }
            Rule::At { .. } => {}
            Rule::Style { selectors, body } => {
                let decls = declarations(body)?;
                for selector in selectors.split(',').map(|s| s.trim().to_ascii_lowercase()) {
                    for (prop, value) in &decls {
                        match (selector.as_str(), prop.as_str()) {
                            ("body" | "html", "line-height") => {
                                if let Some(lh) = parse_line_height(value) {
                                    line_height = lh;
                                }
                            }
                            ("h1", "font-size") | ("h2", "font-size") | ("h3", "font-size") => {
                                let idx = usize::from(selector.as_bytes()[1] - b'1');
                                if let Some(size) = parse_font_size(value) {
                                    headings[idx] = size;
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
    }

    let heading_pt = headings.map(|size| match size {
        FontSize::Absolute(pt) => pt,
        FontSize::Relative(factor) => factor * body_font_pt,
    });

    Ok(Stylesheet {
        page,
        body_font_pt,
        line_height,
        heading_pt,
    })
}

enum Rule<'a> {
    At { name: &'a str, body: &'a str },
    Style { selectors: &'a str, body: &'a str },
}

fn strip_comments(css: &str) -> Result<String, RenderError> {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        let end = rest[start + 2..]
            .find("*/")
            .ok_or_else(|| RenderError::Stylesheet("unterminated comment".into()))?;
        out.push(' ');
        rest = &rest[start + 2 + end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn split_rules(css: &str) -> Result<Vec<Rule<'_>>, RenderError> {
    let mut rules = Vec::new();
    let mut rest = css.trim_start();

    while !rest.is_empty() {
        let open = rest.find('{');
        let close = rest.find('}');
        let semi = rest.find(';');

        if let Some(close) = close {
            if open.map_or(true, |o| close < o) {
                return Err(RenderError::Stylesheet("unbalanced braces: unexpected '}'".into()));
            }
        }

        // `@import ...;` and similar statements without a block.
        if rest.starts_with('@') && semi.is_some_and(|s| open.map_or(true, |o| s < o)) {
            let s = semi.unwrap_or(rest.len() - 1);
            rest = rest[s + 1..].trim_start();
            continue;
        }

        let Some(open) = open else {
            return Err(RenderError::Stylesheet(format!(
                "expected '{{' after '{}'",
                rest.trim()
            )));
        };
        let prelude = rest[..open].trim();
        let body_end = matching_brace(&rest[open..])
            .ok_or_else(|| RenderError::Stylesheet("unbalanced braces: missing '}'".into()))?;
        let body = &rest[open + 1..open + body_end];

        if let Some(at) = prelude.strip_prefix('@') {
            let name = at.split_whitespace().next().unwrap_or_default();
            rules.push(Rule::At { name, body });
        } else if body.contains('{') {
            return Err(RenderError::Stylesheet(format!(
                "unexpected '{{' inside rule '{prelude}'"
            )));
        } else {
            rules.push(Rule::Style {
                selectors: prelude,
                body,
            });
        }
        rest = rest[open + body_end + 1..].trim_start();
    }
    Ok(rules)
}

/// Offset of the `}` closing the `{` at the start of `s`.
fn matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn declarations(body: &str) -> Result<Vec<(String, String)>, RenderError> {
    body.split(';')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|decl| {
            let (prop, value) = decl.split_once(':').ok_or_else(|| {
                RenderError::Stylesheet(format!("declaration without ':': '{decl}'"))
            })?;
            let value = value.trim();
            let value = value.strip_suffix("!important").unwrap_or(value).trim();
            Ok((prop.trim().to_ascii_lowercase(), value.to_string()))
        })
        .collect()
}

fn apply_page_size(page: &mut PageGeometry, value: &str) {
    let mut landscape = false;
    for word in value.split_whitespace().map(str::to_ascii_lowercase) {
        let dims = match word.as_str() {
            "a4" => PageGeometry::A4,
            "a5" => PageGeometry::A5,
            "letter" => PageGeometry::LETTER,
            "landscape" => {
                landscape = true;
                continue;
            }
            _ => continue,
        };
        page.width_pt = dims.0;
        page.height_pt = dims.1;
    }
    if landscape && page.width_pt < page.height_pt {
        std::mem::swap(&mut page.width_pt, &mut page.height_pt);
    }
}

fn split_number(value: &str) -> Option<(f32, &str)> {
    let value = value.trim();
    let end = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(value.len());
    let number = value[..end].parse::<f32>().ok()?;
    Some((number, value[end..].trim()))
}

fn absolute_length(value: &str) -> Option<f32> {
    let (number, unit) = split_number(value)?;
    match unit.to_ascii_lowercase().as_str() {
        "px" => Some(number * PT_PER_PX),
        "pt" => Some(number),
        "in" => Some(number * PT_PER_IN),
        "mm" => Some(number * PT_PER_MM),
        "cm" => Some(number * PT_PER_MM * 10.0),
        "" if number == 0.0 => Some(0.0),
        _ => None,
    }
}

fn parse_font_size(value: &str) -> Option<FontSize> {
    let (number, unit) = split_number(value)?;
    match unit.to_ascii_lowercase().as_str() {
        "em" | "rem" => Some(FontSize::Relative(number)),
        "%" => Some(FontSize::Relative(number / 100.0)),
        _ => absolute_length(value).map(FontSize::Absolute),
    }
}

fn parse_line_height(value: &str) -> Option<f32> {
    let (number, unit) = split_number(value)?;
    let factor = match unit.to_ascii_lowercase().as_str() {
        "" | "em" => number,
        "%" => number / 100.0,
        _ => return None,
    };
    (factor > 0.0).then_some(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUILTIN: &str = include_str!("../../templates/style.css");

    #[test]
    fn builtin_stylesheet_parses_to_defaults() {
        let style = parse_stylesheet(BUILTIN, 13).unwrap();
        assert_eq!(style.page.width_pt, PageGeometry::A4.0);
        assert!((style.page.margin_pt - 27.0).abs() < 0.01);
        assert!((style.body_font_pt - 9.75).abs() < 0.01);
        assert!((style.line_height - 1.5).abs() < f32::EPSILON);
        assert!((style.heading_size(1) - 18.0).abs() < 0.01);
        assert!((style.heading_size(2) - 9.75 * 1.5).abs() < 0.01);
    }

    #[test]
    fn recognises_page_size_and_margin() {
        let style = parse_stylesheet("@page { size: Letter landscape; margin: 10mm }", 12).unwrap();
        assert_eq!(style.page.width_pt, 792.0);
        assert_eq!(style.page.height_pt, 612.0);
        assert!((style.page.margin_pt - 28.35).abs() < 0.01);
    }

    #[test]
    fn configured_font_size_overrides_body() {
        let style = parse_stylesheet("body { font-size: 30px; line-height: 120% }", 16).unwrap();
        assert!((style.body_font_pt - 12.0).abs() < 0.01);
        assert!((style.line_height - 1.2).abs() < 0.001);
    }

    #[test]
    fn ignores_media_and_import_rules() {
        let css = "@import url(x.css);\n@media print { a { color: red } }\np { color: #333 }";
        assert!(parse_stylesheet(css, 13).is_ok());
    }

    #[test]
    fn malformed_css_is_an_error() {
        for css in ["body { color: red", "body { color red }", "} body {}", "/* open", "body"] {
            let err = parse_stylesheet(css, 13).unwrap_err();
            assert!(matches!(err, RenderError::Stylesheet(_)), "{css:?} gave {err:?}");
        }
    }
}
