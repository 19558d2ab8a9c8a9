//! Report rendering pipeline
//!
//! Turns the raw markdown-flavored report payload into a sanitized, styled
//! HTML fragment. The markdown engine is a capability injected at
//! construction and resolved once; when it fails, the renderer falls back
//! to the raw text rather than failing the pipeline.

use super::markdown::{escape_html, markdown_to_html};
use std::sync::Arc;
use tracing::warn;

/// Markdown-to-HTML capability injected into the renderer
pub type MarkdownEngine = Arc<dyn Fn(&str) -> anyhow::Result<String> + Send + Sync>;

/// A rendered report fragment: sanitized markup plus its plain-text form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFragment {
    pub html: String,
    pub text: String,
}

/// Renders report payloads into display fragments
pub struct Renderer {
    engine: MarkdownEngine,
}

impl Renderer {
    pub fn new(engine: MarkdownEngine) -> Self {
        Self { engine }
    }

    /// Renderer backed by the builtin markdown engine
    pub fn builtin() -> Self {
        Self::new(Arc::new(|raw: &str| markdown_to_html(raw)))
    }

    /// Render a raw report payload
    ///
    /// Never fails: engine errors fall back to the escaped raw text so the
    /// caregiver always sees the report content.
    pub fn render(&self, raw_report: &str) -> DisplayFragment {
        let html = match (self.engine)(raw_report) {
            Ok(html) => decorate(&html),
            Err(e) => {
                warn!("Markdown engine failed, falling back to raw text: {}", e);
                escape_html(raw_report)
            }
        };
        let text = extract_text(&html);
        DisplayFragment { html, text }
    }
}

/// Apply the deterministic styling pass, in order: section-title class on
/// level-2 headings, warning and info token spans, full-width-bracket
/// highlight spans, emoji spans, and bordered-table classes.
fn decorate(html: &str) -> String {
    let html = html.replace("<h2>", "<h2 class=\"report-section-title\">");
    let html = html.replace("[警告]", "<span class=\"report-warning\">[警告]</span>");
    let html = html.replace("[提醒]", "<span class=\"report-info\">[提醒]</span>");
    let html = wrap_highlights(&html);
    let html = wrap_emoji(&html);
    html.replace("<table>", "<table class=\"table table-bordered\">")
}

/// Wrap each `【…】` occurrence in a highlight span, non-greedy
///
/// A pair never spans a line break: the span would otherwise open inside
/// one block element and close inside the next. Brackets whose closer sits
/// on a later line stay undecorated.
fn wrap_highlights(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(start) = rest.find('【') {
        let after = start + '【'.len_utf8();
        let tail = &rest[after..];
        let close = tail.find('】');
        let newline = tail.find('\n');
        match close {
            Some(close) if newline.map_or(true, |n| close < n) => {
                let end = after + close + '】'.len_utf8();
                out.push_str(&rest[..start]);
                out.push_str("<span class=\"report-highlight\">");
                out.push_str(&rest[start..end]);
                out.push_str("</span>");
                rest = &rest[end..];
            }
            _ => {
                out.push_str(&rest[..after]);
                rest = &rest[after..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Wrap astral-plane characters (emoji) in spans for consistent sizing
fn wrap_emoji(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    for c in html.chars() {
        if (c as u32) >= 0x1_0000 {
            out.push_str("<span class=\"emoji\">");
            out.push(c);
            out.push_str("</span>");
        } else {
            out.push(c);
        }
    }
    out
}

/// Plain-text extraction of a rendered fragment
///
/// Strips markup, keeps line structure, and unescapes HTML entities; this
/// is the report text that travels with a handover dispatch.
fn extract_text(html: &str) -> String {
    let html = html.replace("<br>", "\n");
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decorations_co_occur() {
        let renderer = Renderer::builtin();
        let fragment = renderer.render("## Title\n[警告] danger\n【highlight me】");

        assert!(fragment
            .html
            .contains("<h2 class=\"report-section-title\">Title</h2>"));
        assert!(fragment
            .html
            .contains("<span class=\"report-warning\">[警告]</span> danger"));
        assert!(fragment
            .html
            .contains("<span class=\"report-highlight\">【highlight me】</span>"));
    }

    #[test]
    fn test_info_token_wrapped() {
        let renderer = Renderer::builtin();
        let fragment = renderer.render("[提醒] 下午復健");
        assert!(fragment
            .html
            .contains("<span class=\"report-info\">[提醒]</span>"));
    }

    #[test]
    fn test_highlight_is_non_greedy_per_occurrence() {
        let renderer = Renderer::builtin();
        let fragment = renderer.render("【a】 between 【b】");
        assert!(fragment
            .html
            .contains("<span class=\"report-highlight\">【a】</span> between <span class=\"report-highlight\">【b】</span>"));
    }

    #[test]
    fn test_highlight_never_spans_paragraphs() {
        let renderer = Renderer::builtin();
        let fragment = renderer.render("【head\n\ntail】");
        // The pair straddles two blocks; wrapping it would open the span
        // inside one <p> and close it inside the next.
        assert!(!fragment.html.contains("report-highlight"));
        assert!(fragment.html.contains("<p>【head</p>"));
        assert!(fragment.html.contains("<p>tail】</p>"));
    }

    #[test]
    fn test_highlight_resumes_after_cross_block_opener() {
        let renderer = Renderer::builtin();
        let fragment = renderer.render("【a\n\nthen 【b】");
        assert!(!fragment.html.contains("<span class=\"report-highlight\">【a"));
        assert!(fragment
            .html
            .contains("<span class=\"report-highlight\">【b】</span>"));
    }

    #[test]
    fn test_unclosed_bracket_left_alone() {
        let renderer = Renderer::builtin();
        let fragment = renderer.render("【no closing");
        assert!(!fragment.html.contains("report-highlight"));
        assert!(fragment.html.contains("【no closing"));
    }

    #[test]
    fn test_emoji_wrapped_for_sizing() {
        let renderer = Renderer::builtin();
        let fragment = renderer.render("狀況良好 👍");
        assert!(fragment.html.contains("<span class=\"emoji\">👍</span>"));
    }

    #[test]
    fn test_render_never_fails_and_preserves_text() {
        let renderer = Renderer::builtin();
        let malformed = "||| **unterminated <script>alert(1)</script> 【";
        let fragment = renderer.render(malformed);
        assert!(fragment.text.contains("unterminated"));
        assert!(!fragment.html.contains("<script>"));
    }

    #[test]
    fn test_engine_failure_falls_back_to_raw_text() {
        let renderer = Renderer::new(Arc::new(|_: &str| anyhow::bail!("engine unavailable")));
        let fragment = renderer.render("## Note\nok & <done>");
        assert_eq!(fragment.html, "## Note\nok &amp; &lt;done&gt;");
        assert!(fragment.text.contains("## Note"));
        assert!(fragment.text.contains("ok & <done>"));
    }

    #[test]
    fn test_injected_engine_tables_get_bordered_classes() {
        let renderer = Renderer::new(Arc::new(|_: &str| {
            Ok("<table><tr><td>x</td></tr></table>".to_string())
        }));
        let fragment = renderer.render("ignored");
        assert!(fragment
            .html
            .starts_with("<table class=\"table table-bordered\">"));
    }

    #[test]
    fn test_plain_text_extraction_keeps_line_structure() {
        let renderer = Renderer::builtin();
        let fragment = renderer.render("## 摘要\n第一行\n第二行");
        assert!(fragment.text.contains("摘要"));
        assert!(fragment.text.contains("第一行\n第二行"));
        assert!(!fragment.text.contains('<'));
    }
}
