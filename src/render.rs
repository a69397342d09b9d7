//! HTML → Telegram rich-text conversion.
//!
//! Feed bodies arrive as loose HTML fragments from the RSS bridge. This
//! module converts them into either MarkdownV2 or Telegram's restricted
//! HTML dialect, preserving inline emphasis, links and list structure while
//! collapsing arbitrary block nesting into blank-line-separated paragraphs.
//!
//! The converter is total: malformed or unclosed HTML is handled
//! permissively by the parser and never produces an error.

use once_cell::sync::OnceCell;
use regex::Regex;
use ego_tree::{NodeId, NodeRef};
use scraper::{ElementRef, Html, Node};

/// Right-to-left mark, prepended to bullets so Persian list items render
/// with correct direction.
pub const RLM: char = '\u{200F}';

/// Target output dialect for the messaging platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    MarkdownV2,
    Html,
}

/// Closed set of node kinds the converter understands. Anything else is
/// unwrapped: children kept, markup dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
    Pre,
    Link,
    LineBreak,
    Block,
    ListItem,
    Unwrap,
}

impl NodeKind {
    fn classify(tag: &str) -> Self {
        match tag {
            "b" | "strong" => Self::Bold,
            "i" | "em" => Self::Italic,
            "u" | "ins" => Self::Underline,
            "s" | "del" | "strike" => Self::Strikethrough,
            "code" => Self::Code,
            "pre" => Self::Pre,
            "a" => Self::Link,
            "br" => Self::LineBreak,
            "p" | "div" | "section" | "article" | "header" | "footer" | "h1" | "h2" | "h3"
            | "h4" | "h5" | "h6" | "blockquote" | "hr" | "table" | "tr" | "ul" | "ol"
            | "figure" | "figcaption" => Self::Block,
            "li" => Self::ListItem,
            _ => Self::Unwrap,
        }
    }
}

/// Convert an HTML fragment to rich text in the given output mode.
///
/// A leading top-level `<p>` whose text starts with "forwarded from"
/// (case-insensitive) is an RSS-bridge attribution artifact and is dropped
/// entirely before conversion.
pub fn convert(html: &str, mode: OutputMode) -> String {
    let doc = Html::parse_fragment(html);
    let root = doc.root_element();
    let skip = forwarded_attribution(root);

    let mut out = String::new();
    for child in root.children() {
        if Some(child.id()) == skip {
            continue;
        }
        render_node(child, mode, false, &mut out);
    }
    normalize(&out)
}

/// Extract plain text from an HTML fragment, with the forwarded-from
/// attribution stripped. Block boundaries become newlines. Used by the
/// event detector and for semantic (pre-conversion) truncation.
pub fn plain_text(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let root = doc.root_element();
    let skip = forwarded_attribution(root);

    let mut out = String::new();
    for child in root.children() {
        if Some(child.id()) == skip {
            continue;
        }
        collect_text(child, &mut out);
    }
    normalize(&out)
}

/// Escape literal text per the output mode's rules.
pub fn escape(text: &str, mode: OutputMode) -> String {
    match mode {
        OutputMode::MarkdownV2 => escape_markdown(text),
        OutputMode::Html => html_escape::encode_text(text).into_owned(),
    }
}

// Reserved by Telegram MarkdownV2 in literal text.
const MARKDOWN_RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if MARKDOWN_RESERVED.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Locate the first top-level `<p>` if it is a "Forwarded From ..."
/// attribution header.
fn forwarded_attribution(root: ElementRef<'_>) -> Option<NodeId> {
    for child in root.children() {
        let Some(el) = ElementRef::wrap(child) else {
            continue;
        };
        if el.value().name() != "p" {
            continue;
        }
        let text: String = el.text().collect();
        if text.trim().to_lowercase().starts_with("forwarded from") {
            return Some(child.id());
        }
        // Only the first paragraph can carry the attribution.
        return None;
    }
    None
}

fn render_children(node: NodeRef<'_, Node>, mode: OutputMode, in_code: bool) -> String {
    let mut buf = String::new();
    for child in node.children() {
        render_node(child, mode, in_code, &mut buf);
    }
    buf
}

fn render_node(node: NodeRef<'_, Node>, mode: OutputMode, in_code: bool, out: &mut String) {
    match node.value() {
        Node::Text(t) => {
            let text: &str = &t;
            if in_code {
                out.push_str(text);
            } else {
                out.push_str(&escape(text, mode));
            }
        }
        Node::Element(el) => match NodeKind::classify(el.name()) {
            NodeKind::Bold => wrap_inline(node, mode, in_code, ("*", "*"), ("<b>", "</b>"), out),
            NodeKind::Italic => wrap_inline(node, mode, in_code, ("_", "_"), ("<i>", "</i>"), out),
            NodeKind::Underline => {
                wrap_inline(node, mode, in_code, ("__", "__"), ("<u>", "</u>"), out)
            }
            NodeKind::Strikethrough => {
                wrap_inline(node, mode, in_code, ("~", "~"), ("<s>", "</s>"), out)
            }
            NodeKind::Code => {
                let inner = render_children(node, mode, true);
                if inner.is_empty() {
                    return;
                }
                match mode {
                    OutputMode::MarkdownV2 => {
                        out.push('`');
                        out.push_str(&inner);
                        out.push('`');
                    }
                    OutputMode::Html => {
                        out.push_str("<code>");
                        out.push_str(&inner);
                        out.push_str("</code>");
                    }
                }
            }
            NodeKind::Pre => {
                let inner = render_children(node, mode, true);
                if inner.is_empty() {
                    return;
                }
                match mode {
                    OutputMode::MarkdownV2 => {
                        out.push_str("```\n");
                        out.push_str(&inner);
                        out.push_str("\n```\n\n");
                    }
                    OutputMode::Html => {
                        out.push_str("<pre>");
                        out.push_str(&inner);
                        out.push_str("</pre>\n\n");
                    }
                }
            }
            NodeKind::Link => {
                let inner = render_children(node, mode, in_code);
                match el.attr("href").filter(|href| allowed_scheme(href)) {
                    Some(href) if !inner.is_empty() => match mode {
                        OutputMode::MarkdownV2 => {
                            out.push('[');
                            out.push_str(&inner);
                            out.push_str("](");
                            out.push_str(&encode_markdown_url(href));
                            out.push(')');
                        }
                        OutputMode::Html => {
                            out.push_str("<a href=\"");
                            out.push_str(&html_escape::encode_double_quoted_attribute(href));
                            out.push_str("\">");
                            out.push_str(&inner);
                            out.push_str("</a>");
                        }
                    },
                    // Disallowed scheme or empty label: keep children, drop markup.
                    _ => out.push_str(&inner),
                }
            }
            NodeKind::LineBreak => out.push('\n'),
            NodeKind::Block => {
                let inner = render_children(node, mode, in_code);
                out.push_str(&inner);
                out.push_str("\n\n");
            }
            NodeKind::ListItem => {
                let inner = render_children(node, mode, in_code);
                out.push(RLM);
                out.push_str("• ");
                out.push_str(&inner);
                out.push('\n');
            }
            NodeKind::Unwrap => out.push_str(&render_children(node, mode, in_code)),
        },
        _ => {}
    }
}

fn wrap_inline(
    node: NodeRef<'_, Node>,
    mode: OutputMode,
    in_code: bool,
    md: (&str, &str),
    html: (&str, &str),
    out: &mut String,
) {
    let inner = render_children(node, mode, in_code);
    if inner.is_empty() {
        return;
    }
    let (open, close) = match mode {
        OutputMode::MarkdownV2 => md,
        OutputMode::Html => html,
    };
    out.push_str(open);
    out.push_str(&inner);
    out.push_str(close);
}

fn allowed_scheme(href: &str) -> bool {
    let h = href.trim_start();
    h.starts_with("http://") || h.starts_with("https://") || h.starts_with("tg://")
}

// Bare parentheses inside a URL break MarkdownV2 link syntax.
fn encode_markdown_url(href: &str) -> String {
    href.replace('(', "%28").replace(')', "%29")
}

fn collect_text(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(t) => {
            let text: &str = &t;
            out.push_str(text);
        }
        Node::Element(el) => match NodeKind::classify(el.name()) {
            NodeKind::LineBreak => out.push('\n'),
            NodeKind::Block => {
                for child in node.children() {
                    collect_text(child, out);
                }
                out.push_str("\n\n");
            }
            NodeKind::ListItem => {
                for child in node.children() {
                    collect_text(child, out);
                }
                out.push('\n');
            }
            _ => {
                for child in node.children() {
                    collect_text(child, out);
                }
            }
        },
        _ => {}
    }
}

/// Normalize converter output: unify line endings, trim each line, empty
/// out lines that are only direction marks, collapse 3+ newlines to a
/// single blank line, and trim the document. Lines inside a code fence
/// keep their indentation.
fn normalize(s: &str) -> String {
    static RE_MULTI_NL: OnceCell<Regex> = OnceCell::new();
    let re = RE_MULTI_NL.get_or_init(|| Regex::new(r"\n{3,}").unwrap());

    let unified = s.replace("\r\n", "\n").replace('\r', "\n");
    let mut in_fence = false;
    let lines: Vec<&str> = unified
        .split('\n')
        .map(|line| {
            let trimmed = line.trim();
            if trimmed == "```" {
                in_fence = !in_fence;
                return trimmed;
            }
            if in_fence {
                return line;
            }
            if trimmed.chars().all(|c| c == RLM) {
                ""
            } else {
                trimmed
            }
        })
        .collect();
    let joined = lines.join("\n");
    re.replace_all(&joined, "\n\n").trim().to_string()
}
