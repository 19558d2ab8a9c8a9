//! Builtin markdown engine
//!
//! Line-based parsing of the markdown-flavored report payload into HTML.
//! Supports headers (H1-H3), bullet lists, bold text, pipe tables, and
//! GFM-style line breaks (a single newline becomes `<br>`). All source
//! text is HTML-escaped on the way through; the engine never passes input
//! characters into markup positions.

/// Escape text for safe use in HTML content
pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Convert markdown-flavored text to HTML
///
/// Infallible in practice; the `Result` is the engine seam's contract so
/// injected replacements can fail over to the raw-text fallback.
pub fn markdown_to_html(text: &str) -> anyhow::Result<String> {
    let mut html = String::new();
    let mut paragraph: Vec<String> = Vec::new();
    let mut list_items: Vec<String> = Vec::new();
    let mut table_lines: Vec<String> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start();

        if trimmed.starts_with('|') {
            flush_paragraph(&mut html, &mut paragraph);
            flush_list(&mut html, &mut list_items);
            table_lines.push(trimmed.to_string());
            continue;
        }
        flush_table(&mut html, &mut table_lines);

        if let Some(content) = trimmed.strip_prefix("### ") {
            flush_paragraph(&mut html, &mut paragraph);
            flush_list(&mut html, &mut list_items);
            html.push_str(&format!("<h3>{}</h3>\n", render_inline(content)));
        } else if let Some(content) = trimmed.strip_prefix("## ") {
            flush_paragraph(&mut html, &mut paragraph);
            flush_list(&mut html, &mut list_items);
            html.push_str(&format!("<h2>{}</h2>\n", render_inline(content)));
        } else if let Some(content) = trimmed.strip_prefix("# ") {
            flush_paragraph(&mut html, &mut paragraph);
            flush_list(&mut html, &mut list_items);
            html.push_str(&format!("<h1>{}</h1>\n", render_inline(content)));
        } else if let Some(content) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
        {
            flush_paragraph(&mut html, &mut paragraph);
            list_items.push(render_inline(content));
        } else if trimmed.is_empty() {
            flush_paragraph(&mut html, &mut paragraph);
            flush_list(&mut html, &mut list_items);
        } else {
            flush_list(&mut html, &mut list_items);
            paragraph.push(render_inline(line));
        }
    }

    flush_paragraph(&mut html, &mut paragraph);
    flush_list(&mut html, &mut list_items);
    flush_table(&mut html, &mut table_lines);

    Ok(html)
}

/// Render inline `**bold**` formatting within an escaped line
fn render_inline(text: &str) -> String {
    let mut rendered = String::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if let Some(start) = remaining.find("**") {
            rendered.push_str(&escape_html(&remaining[..start]));

            let after_start = &remaining[start + 2..];
            if let Some(end) = after_start.find("**") {
                rendered.push_str("<strong>");
                rendered.push_str(&escape_html(&after_start[..end]));
                rendered.push_str("</strong>");
                remaining = &after_start[end + 2..];
            } else {
                // Unbalanced marker; keep it literal.
                rendered.push_str(&escape_html(&remaining[start..]));
                break;
            }
        } else {
            rendered.push_str(&escape_html(remaining));
            break;
        }
    }

    rendered
}

/// Close an open paragraph, joining its lines with `<br>`
fn flush_paragraph(html: &mut String, paragraph: &mut Vec<String>) {
    if paragraph.is_empty() {
        return;
    }
    html.push_str("<p>");
    html.push_str(&paragraph.join("<br>"));
    html.push_str("</p>\n");
    paragraph.clear();
}

/// Close an open bullet list
fn flush_list(html: &mut String, list_items: &mut Vec<String>) {
    if list_items.is_empty() {
        return;
    }
    html.push_str("<ul>\n");
    for item in list_items.drain(..) {
        html.push_str(&format!("<li>{item}</li>\n"));
    }
    html.push_str("</ul>\n");
}

/// Close an open pipe table, honoring a `|---|` header separator row
fn flush_table(html: &mut String, table_lines: &mut Vec<String>) {
    if table_lines.is_empty() {
        return;
    }
    let rows: Vec<Vec<&str>> = table_lines.iter().map(|line| split_row(line)).collect();

    let (header, body): (Option<&Vec<&str>>, &[Vec<&str>]) =
        if rows.len() >= 2 && is_separator_row(&rows[1]) {
            (Some(&rows[0]), &rows[2..])
        } else {
            (None, &rows[..])
        };

    html.push_str("<table class=\"table table-bordered\">\n");
    if let Some(cells) = header {
        html.push_str("<thead><tr>");
        for cell in cells {
            html.push_str(&format!("<th>{}</th>", render_inline(cell)));
        }
        html.push_str("</tr></thead>\n");
    }
    html.push_str("<tbody>\n");
    for cells in body {
        html.push_str("<tr>");
        for cell in cells {
            html.push_str(&format!("<td>{}</td>", render_inline(cell)));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>\n");

    table_lines.clear();
}

/// Split a `| a | b |` line into trimmed cells
fn split_row(line: &str) -> Vec<&str> {
    line.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .map(str::trim)
        .collect()
}

/// Whether a row is a `|---|:---:|` header separator
fn is_separator_row(cells: &[&str]) -> bool {
    !cells.is_empty()
        && cells.iter().all(|cell| {
            !cell.is_empty() && cell.chars().all(|c| matches!(c, '-' | ':')) && cell.contains('-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headings() {
        let html = markdown_to_html("# A\n## B\n### C").unwrap();
        assert!(html.contains("<h1>A</h1>"));
        assert!(html.contains("<h2>B</h2>"));
        assert!(html.contains("<h3>C</h3>"));
    }

    #[test]
    fn test_bullet_list_groups_consecutive_items() {
        let html = markdown_to_html("- one\n* two\ntext").unwrap();
        assert!(html.contains("<ul>\n<li>one</li>\n<li>two</li>\n</ul>"));
        assert!(html.contains("<p>text</p>"));
    }

    #[test]
    fn test_bold_inline() {
        let html = markdown_to_html("care for **Mrs. Chen** today").unwrap();
        assert!(html.contains("care for <strong>Mrs. Chen</strong> today"));
    }

    #[test]
    fn test_unbalanced_bold_kept_literal() {
        let html = markdown_to_html("a ** b").unwrap();
        assert!(html.contains("a ** b"));
    }

    #[test]
    fn test_single_newline_becomes_line_break() {
        let html = markdown_to_html("line one\nline two").unwrap();
        assert!(html.contains("<p>line one<br>line two</p>"));
    }

    #[test]
    fn test_blank_line_separates_paragraphs() {
        let html = markdown_to_html("first\n\nsecond").unwrap();
        assert!(html.contains("<p>first</p>"));
        assert!(html.contains("<p>second</p>"));
    }

    #[test]
    fn test_table_with_header_separator() {
        let html = markdown_to_html("| 時間 | 事項 |\n|---|---|\n| 08:00 | 用藥 |").unwrap();
        assert!(html.contains("<table class=\"table table-bordered\">"));
        assert!(html.contains("<th>時間</th>"));
        assert!(html.contains("<td>08:00</td>"));
    }

    #[test]
    fn test_table_without_separator_has_no_header() {
        let html = markdown_to_html("| a | b |\n| c | d |").unwrap();
        assert!(!html.contains("<th>"));
        assert!(html.contains("<td>a</td>"));
        assert!(html.contains("<td>d</td>"));
    }

    #[test]
    fn test_script_input_is_escaped() {
        let html = markdown_to_html("<script>alert('x')</script>").unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_heading_content_is_escaped() {
        let html = markdown_to_html("## <b>title</b>").unwrap();
        assert!(html.contains("<h2>&lt;b&gt;title&lt;/b&gt;</h2>"));
    }
}
