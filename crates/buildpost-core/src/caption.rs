//! Build caption templating.

use crate::formatting::{escape_html, markdown_to_html};

/// Bot API limit for media captions.
pub const MAX_CAPTION_CHARS: usize = 1024;

pub const DEFAULT_TEMPLATE: &str = "✅ **Build Completed**\n\n\
📱 **Module:** {module}\n\
🔢 **Version:** `{version}`\n\
⏰ **Time:** `{build_time}`\n\n\
#Module #Update";

const UNKNOWN: &str = "Unknown";

/// Values interpolated into the caption template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptionVars {
    pub module: String,
    pub version: String,
    pub build_time: String,
}

impl Default for CaptionVars {
    fn default() -> Self {
        Self {
            module: UNKNOWN.to_string(),
            version: UNKNOWN.to_string(),
            build_time: UNKNOWN.to_string(),
        }
    }
}

impl CaptionVars {
    /// Missing or blank values render as `Unknown`.
    pub fn new(module: Option<String>, version: Option<String>, build_time: Option<String>) -> Self {
        let or_unknown = |v: Option<String>| {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNKNOWN.to_string())
        };
        Self {
            module: or_unknown(module),
            version: or_unknown(version),
            build_time: or_unknown(build_time),
        }
    }
}

/// Render `template` to Telegram HTML.
///
/// The template's Markdown is converted first and `{module}`, `{version}` and
/// `{build_time}` are filled in afterwards in a single left-to-right pass, so
/// values are always shown literally. The template is capped at
/// [`MAX_CAPTION_CHARS`] before conversion.
pub fn render(template: &str, vars: &CaptionVars) -> String {
    let html = markdown_to_html(&truncate_chars(template, MAX_CAPTION_CHARS));
    substitute(&html, vars)
}

fn substitute(html: &str, vars: &CaptionVars) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = [
            ("{module}", &vars.module),
            ("{version}", &vars.version),
            ("{build_time}", &vars.build_time),
        ]
        .into_iter()
        .find(|(placeholder, _)| tail.starts_with(placeholder));

        match value {
            Some((placeholder, value)) => {
                out.push_str(&escape_html(value));
                rest = &tail[placeholder.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
