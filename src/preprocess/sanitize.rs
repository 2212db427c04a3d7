//! HTML sanitizer for entry bodies.
//!
//! The fragment is parsed with `scraper` (html5ever) and re-serialized from an
//! allow-list. Removed elements fall in three groups: dropped with their
//! subtree, kept, or unwrapped (children kept, tag removed). Output is stable
//! under re-sanitization.

use html_escape::{encode_double_quoted_attribute_to_string, encode_text_to_string};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node};
use url::Url;

/// Elements removed together with everything inside them.
const DROPPED: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "form", "button",
    "input", "select", "textarea", "svg", "math", "video", "audio", "canvas", "link", "meta",
    "colgroup", "col", "applet", "marquee", "noembed", "noframes", "frame", "frameset", "param",
    "source", "track", "area", "base", "basefont", "bgsound", "keygen", "title", "head", "xmp",
    "plaintext", "wbr",
];

/// Elements kept as-is. Structural containers stay so the parser rebuilds
/// the same tree on a second pass.
const ALLOWED: &[&str] = &[
    "p", "br", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "dl", "dt", "dd", "a", "em",
    "strong", "b", "i", "blockquote", "pre", "code", "img", "figure", "figcaption", "hr", "table",
    "thead", "tbody", "tfoot", "tr", "th", "td", "caption", "div", "section", "article", "aside",
    "header", "footer", "nav", "main", "address", "center", "details", "summary", "hgroup", "menu",
    "dir", "fieldset", "legend", "listing", "search",
];

const VOID: &[&str] = &["br", "img", "hr"];

/// Upper bound on reparse passes; see [`sanitize`].
const MAX_PASSES: usize = 4;

/// Elements nested deeper than this are flattened to their text.
pub const MAX_NESTING: usize = 256;

static TRACKER_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(feeds\.feedburner\.com|/~r/|pixel|tracking|stats\.wordpress\.com|/beacon)")
        .expect("valid tracker regex")
});

#[derive(Debug, Clone)]
pub struct SanitizeOptions<'a> {
    /// Maximum `img` width; wider images are scaled down.
    pub max_image_width: u32,
    /// Base for resolving relative `href`/`src` (the entry link).
    pub base_url: Option<&'a str>,
}

/// Clean an entry body. Never fails; empty output is valid.
///
/// Pruning can leave a tree that html5ever restructures on reparse, so the
/// pass is repeated until the output reaches a fixed point.
pub fn sanitize(raw: &str, options: &SanitizeOptions<'_>) -> String {
    let base = options.base_url.and_then(|b| Url::parse(b).ok());
    let mut current = sanitize_pass(raw, options.max_image_width, base.as_ref());
    for _ in 1..MAX_PASSES {
        let next = sanitize_pass(&current, options.max_image_width, base.as_ref());
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn sanitize_pass(raw: &str, max_image_width: u32, base: Option<&Url>) -> String {
    let fragment = Html::parse_fragment(raw);
    let mut out = String::with_capacity(raw.len());
    let writer = Writer {
        max_image_width,
        base,
    };
    writer.children(fragment.root_element(), 0, &mut out);
    out.trim().to_string()
}

struct Writer<'a> {
    max_image_width: u32,
    base: Option<&'a Url>,
}

impl Writer<'_> {
    fn children(&self, parent: ElementRef<'_>, depth: usize, out: &mut String) {
        for child in parent.children() {
            if let Some(element) = ElementRef::wrap(child) {
                self.element(element, depth + 1, out);
            } else if let Node::Text(text) = child.value() {
                encode_text_to_string(&**text, out);
            }
        }
    }

    fn element(&self, element: ElementRef<'_>, depth: usize, out: &mut String) {
        let name = element.value().name();
        if DROPPED.contains(&name) {
            return;
        }
        if depth > MAX_NESTING {
            flatten_text(element, out);
            return;
        }
        if !ALLOWED.contains(&name) {
            self.children(element, depth, out);
            return;
        }

        let attrs = match name {
            "a" => self.link_attrs(element),
            "img" => match self.image_attrs(element) {
                Some(attrs) => attrs,
                None => return,
            },
            _ => Vec::new(),
        };

        out.push('<');
        out.push_str(name);
        for (key, value) in attrs
            .iter()
            .map(|(k, v)| (*k, v.as_str()))
            .chain(element.value().attr("title").map(|t| ("title", t)))
        {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            encode_double_quoted_attribute_to_string(value, out);
            out.push('"');
        }
        out.push('>');

        if VOID.contains(&name) {
            return;
        }
        if matches!(name, "pre" | "listing") && starts_with_newline(element) {
            // The parser drops one newline right after the start tag.
            out.push('\n');
        }
        self.children(element, depth, out);
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }

    fn link_attrs(&self, element: ElementRef<'_>) -> Vec<(&'static str, String)> {
        let Some(href) = element.value().attr("href") else {
            return Vec::new();
        };
        let href = href.trim();
        if href.to_ascii_lowercase().starts_with("javascript:") {
            return Vec::new();
        }
        vec![("href", self.resolve(href))]
    }

    /// `None` drops the image: no `src`, or a tracking pixel.
    fn image_attrs(&self, element: ElementRef<'_>) -> Option<Vec<(&'static str, String)>> {
        let img = element.value();
        let src = img.attr("src").map(str::trim).filter(|s| !s.is_empty())?;
        let width = img.attr("width").and_then(parse_dimension);
        let height = img.attr("height").and_then(parse_dimension);

        if TRACKER_SRC.is_match(src) {
            return None;
        }
        if matches!((width, height), (Some(w), Some(h)) if w <= 1 && h <= 1) {
            return None;
        }

        let mut attrs = vec![("src", self.resolve(src))];
        if let Some(alt) = img.attr("alt") {
            attrs.push(("alt", alt.to_string()));
        }
        let (width, height) = match width {
            Some(w) if w > self.max_image_width => {
                let scaled = height.map(|h| {
                    ((u64::from(h) * u64::from(self.max_image_width) + u64::from(w) / 2)
                        / u64::from(w)) as u32
                });
                (Some(self.max_image_width), scaled)
            }
            _ => (width, height),
        };
        if let Some(w) = width {
            attrs.push(("width", w.to_string()));
        }
        if let Some(h) = height {
            attrs.push(("height", h.to_string()));
        }
        Some(attrs)
    }

    fn resolve(&self, reference: &str) -> String {
        match self.base.and_then(|base| base.join(reference).ok()) {
            Some(url) => url.to_string(),
            None => reference.to_string(),
        }
    }
}

/// Text of `root`'s subtree outside dropped elements, walked without
/// recursion.
fn flatten_text(root: ElementRef<'_>, out: &mut String) {
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let dropped = node
            .ancestors()
            .take_while(|ancestor| ancestor.id() != root.id())
            .filter_map(ElementRef::wrap)
            .any(|ancestor| DROPPED.contains(&ancestor.value().name()));
        if !dropped {
            encode_text_to_string(&**text, out);
        }
    }
}

fn starts_with_newline(element: ElementRef<'_>) -> bool {
    match element.children().next().map(|c| c.value()) {
        Some(Node::Text(text)) => text.starts_with('\n'),
        _ => false,
    }
}

/// Integer pixel value of a `width`/`height` attribute (`"640"`, `"640px"`).
pub(super) fn parse_dimension(value: &str) -> Option<u32> {
    let value = value.trim();
    let digits = value.strip_suffix("px").unwrap_or(value).trim();
    digits.parse::<u32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn clean(raw: &str) -> String {
        sanitize(
            raw,
            &SanitizeOptions {
                max_image_width: 400,
                base_url: Some("https://realpython.com/intro/"),
            },
        )
    }

    #[test]
    fn removes_scripts_styles_and_comments() {
        let out = clean("<p>Hi<script>alert(1)</script></p><style>p{}</style><!-- note --><iframe src=x></iframe>");
        assert_eq!(out, "<p>Hi</p>");
    }

    #[test]
    fn unwraps_unknown_elements() {
        let out = clean(r#"<p><span class="x">a <font color=red>b</font></span></p>"#);
        assert_eq!(out, "<p>a b</p>");
    }

    #[test]
    fn keeps_only_allowed_attributes() {
        let out = clean(r#"<p class="lead" onclick="x()"><a href="/docs" target="_blank" title="Docs">d</a></p>"#);
        assert_eq!(
            out,
            r#"<p><a href="https://realpython.com/docs" title="Docs">d</a></p>"#
        );
    }

    #[test]
    fn drops_javascript_links() {
        let out = clean(r#"<a href="JavaScript:alert(1)">x</a>"#);
        assert_eq!(out, "<a>x</a>");
    }

    #[test]
    fn scales_wide_images() {
        let out = clean(r#"<img src="img/a.png" width="800" height="600" alt="Chart">"#);
        assert_eq!(
            out,
            r#"<img src="https://realpython.com/intro/img/a.png" alt="Chart" width="400" height="300">"#
        );
    }

    #[test]
    fn drops_tracking_and_sourceless_images() {
        let out = clean(concat!(
            r#"<p>a<img src="https://x.test/p.gif" width="1" height="1">"#,
            r#"<img src="https://feeds.feedburner.com/~r/foo/~4/bar">"#,
            r#"<img alt="no source">b</p>"#
        ));
        assert_eq!(out, "<p>ab</p>");
    }

    #[test]
    fn escapes_text() {
        assert_eq!(clean("<p>1 &lt; 2 &amp;&amp; 3 &gt; 2</p>"), "<p>1 &lt; 2 &amp;&amp; 3 &gt; 2</p>");
    }

    #[test]
    fn plain_text_and_empty_input() {
        assert_eq!(clean(""), "");
        assert_eq!(clean("just text"), "just text");
    }

    #[test]
    fn preformatted_leading_newline_survives() {
        let once = clean("<pre>\n\nfn main() {}\n</pre>");
        assert_eq!(clean(&once), once);
        assert!(once.starts_with("<pre>\n\n"));
    }

    #[test]
    fn without_base_url_references_are_kept() {
        let out = sanitize(
            r#"<a href="/x">x</a>"#,
            &SanitizeOptions {
                max_image_width: 400,
                base_url: None,
            },
        );
        assert_eq!(out, r#"<a href="/x">x</a>"#);
    }

    #[test]
    fn deeply_nested_markup_is_flattened() {
        let depth = 10_000;
        let raw = format!(
            "{}deep<script>x()</script> text{}",
            "<div>".repeat(depth),
            "</div>".repeat(depth)
        );
        let once = clean(&raw);
        assert!(once.contains("deep text"));
        assert!(!once.contains("x()"));
        assert!(once.matches("<div>").count() <= MAX_NESTING);
        assert_eq!(clean(&once), once);
    }

    const TOKENS: &[&str] = &[
        "<p>", "</p>", "<b>", "</b>", "<em>", "</em>", "<div>", "</div>", "<span>", "</span>",
        "<section>", "</section>", "<ul><li>", "</li>", "</ul>", "<h2>", "</h2>", "<br>", "<hr>",
        "<script>x()</script>", "<!-- c -->", "<pre>\n", "</pre>", "<blockquote>", "</blockquote>",
        r#"<a href="/x">link</a>"#, r#"<img src="/a.png" width="800" height="600">"#,
        r#"<img src="/t.gif" width="1" height="1">"#, "text", " & ", "\n", "<font>", "</font>",
    ];

    proptest! {
        #[test]
        fn sanitize_is_idempotent(picks in proptest::collection::vec(0..TOKENS.len(), 0..24)) {
            let raw: String = picks.iter().map(|&i| TOKENS[i]).collect();
            let once = clean(&raw);
            prop_assert_eq!(clean(&once), once);
        }
    }
}
