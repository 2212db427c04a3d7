//! `{{ name }}` placeholder substitution for the article template.

use html_escape::encode_safe;

use crate::error::RenderError;

/// Values available to the template. Everything except `content` is
/// HTML-escaped on insertion.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    pub entry_title: String,
    pub feed_title: String,
    pub author: String,
    pub link: String,
    pub published: String,
    pub generated_date: String,
    /// Sanitized markup, inserted verbatim.
    pub content: String,
}

impl TemplateVars {
    fn lookup(&self, name: &str) -> Option<(&str, bool)> {
        let value: &str = match name {
            "entry_title" => &self.entry_title,
            "feed_title" => &self.feed_title,
            "author" => &self.author,
            "link" => &self.link,
            "published" => &self.published,
            "generated_date" => &self.generated_date,
            "content" => return Some((self.content.as_str(), false)),
            _ => return None,
        };
        Some((value, true))
    }
}

pub fn render_template(template: &str, vars: &TemplateVars) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len() + vars.content.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open.find("}}").ok_or_else(|| {
            RenderError::Template(format!(
                "unterminated placeholder at byte {}",
                template.len() - rest.len() + start
            ))
        })?;
        let name = after_open[..end].trim();
        match vars.lookup(name) {
            Some((value, true)) => out.push_str(&encode_safe(value)),
            Some((value, false)) => out.push_str(value),
            None => {
                return Err(RenderError::Template(format!("unknown variable '{name}'")));
            }
        }
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> TemplateVars {
        TemplateVars {
            entry_title: "Tom & Jerry <3".into(),
            feed_title: "Real Python".into(),
            content: "<p>body</p>".into(),
            ..Default::default()
        }
    }

    #[test]
    fn substitutes_and_escapes() {
        let out = render_template("<h1>{{ entry_title }}</h1>{{feed_title}}{{ content }}", &vars()).unwrap();
        assert_eq!(out, "<h1>Tom &amp; Jerry &lt;3</h1>Real Python<p>body</p>");
    }

    #[test]
    fn quotes_in_metadata_cannot_break_attributes() {
        let vars = TemplateVars {
            link: r#"https://x.test/?q="a"&r='b'"#.into(),
            ..vars()
        };
        let out = render_template(r#"<a href="{{ link }}">x</a>"#, &vars).unwrap();
        assert!(out.contains("&quot;a&quot;"), "{out}");
        assert!(out.contains("&amp;r="), "{out}");
        assert_eq!(out.matches('"').count(), 2, "{out}");
        assert!(!out.contains('\''), "{out}");
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let err = render_template("{{ nope }}", &vars()).unwrap_err();
        assert!(matches!(err, RenderError::Template(msg) if msg.contains("nope")));
    }

    #[test]
    fn unterminated_placeholder_is_an_error() {
        let err = render_template("<p>{{ entry_title </p>", &vars()).unwrap_err();
        assert!(matches!(err, RenderError::Template(_)));
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        assert_eq!(render_template("<p>static</p>", &vars()).unwrap(), "<p>static</p>");
    }
}
