//! Caption formatting (Markdown subset → Telegram HTML).

use std::sync::OnceLock;

use regex::Regex;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Convert the Markdown subset used in build captions to Telegram HTML.
///
/// Supported: ```` ```pre``` ````, `` `code` ``, `**bold**`, `__italic__`,
/// `~~strike~~` and `[text](url)`. Anything else is sent as escaped text.
pub fn markdown_to_html(input: &str) -> String {
    let (text, blocks) = stash_spans(input, "```", "\0PRE");
    let (text, codes) = stash_spans(&text, "`", "\0CODE");

    let mut text = escape_html(&text);

    // Line-oriented so an unclosed delimiter cannot swallow the rest of the caption.
    text = text
        .split('\n')
        .map(|line| {
            let line = wrap_delimited(line, "**", "b");
            let line = wrap_delimited(&line, "__", "i");
            wrap_delimited(&line, "~~", "s")
        })
        .collect::<Vec<_>>()
        .join("\n");

    text = link_regex()
        .replace_all(&text, r#"<a href="$2">$1</a>"#)
        .to_string();

    for (i, block) in blocks.iter().enumerate() {
        let body = block.strip_prefix('\n').unwrap_or(block);
        text = text.replace(
            &format!("\0PRE{i}\0"),
            &format!("<pre>{}</pre>", escape_html(body)),
        );
    }
    for (i, code) in codes.iter().enumerate() {
        text = text.replace(
            &format!("\0CODE{i}\0"),
            &format!("<code>{}</code>", escape_html(code)),
        );
    }

    text
}

/// Number of characters Telegram displays for an HTML caption: tags are
/// dropped and each entity counts as one character.
pub fn visible_len(html: &str) -> usize {
    let mut len = 0usize;
    let mut chars = html.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '<' => {
                for c in chars.by_ref() {
                    if c == '>' {
                        break;
                    }
                }
            }
            '&' => {
                len += 1;
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                }
            }
            _ => len += 1,
        }
    }
    len
}

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]\n]+)\]\(([^)\s]+)\)").expect("valid regex"))
}

/// Replace `fence ... fence` spans with numbered placeholders so their
/// contents escape the inline transforms.
fn stash_spans(input: &str, fence: &str, tag: &str) -> (String, Vec<String>) {
    let mut spans = Vec::new();
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find(fence) {
        let after = &rest[start + fence.len()..];
        let Some(end) = after.find(fence) else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(&format!("{tag}{}\0", spans.len()));
        spans.push(after[..end].to_string());
        rest = &after[end + fence.len()..];
    }

    out.push_str(rest);
    (out, spans)
}

fn wrap_delimited(line: &str, delim: &str, tag: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(start) = rest.find(delim) {
        let after = &rest[start + delim.len()..];
        match after.find(delim) {
            Some(end) if end > 0 => {
                out.push_str(&rest[..start]);
                out.push_str(&format!("<{tag}>{}</{tag}>", &after[..end]));
                rest = &after[end + delim.len()..];
            }
            _ => break,
        }
    }

    out.push_str(rest);
    out
}
