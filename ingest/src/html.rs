use ego_tree::NodeRef;
use scraper::{Html, Node, Selector};

/// Extracts the visible text of an HTML document.
///
/// The markup is parsed with a real HTML parser rather than scanned for
/// angle brackets, so attribute values, comments, and raw-text elements
/// never leak into the output. `<script>`/`<style>` bodies are dropped,
/// entities arrive already decoded, and block-level elements become
/// paragraph breaks so the chunker's separators still see document
/// structure.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body = Selector::parse("body").unwrap();
    let mut out = String::with_capacity(html.len() / 2);
    if let Some(root) = document.select(&body).next() {
        collect_text(*root, &mut out);
    }
    collapse_blank_runs(&out)
}

fn collect_text(node: NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => {
                // Non-breaking spaces behave like plain spaces downstream.
                out.extend(text.chars().map(|c| if c == '\u{a0}' { ' ' } else { c }));
            }
            Node::Element(element) => match element.name() {
                "script" | "style" => {}
                "br" => out.push('\n'),
                name if is_block(name) => {
                    collect_text(child, out);
                    if !out.ends_with("\n\n") {
                        out.push_str("\n\n");
                    }
                }
                _ => collect_text(child, out),
            },
            _ => {}
        }
    }
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "section"
            | "article"
            | "li"
            | "tr"
            | "table"
            | "ul"
            | "ol"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "pre"
            | "blockquote"
    )
}

/// Collapses runs of three or more newlines into paragraph breaks and trims
/// trailing whitespace from each line.
fn collapse_blank_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run < 2 {
                out.push('\n');
            }
        } else {
            if blank_run > 0 && !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            blank_run = 0;
            out.push_str(trimmed);
            out.push('\n');
        }
    }
    out.trim().to_string()
}
