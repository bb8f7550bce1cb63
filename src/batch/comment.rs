//! Submission comment composition.

use crate::gateway::FileRef;
use crate::manifest::AttachmentKind;
use std::fmt::Write as _;

/// Build the HTML comment posted with a grade.
///
/// The text comment comes first (newlines → `<br>`), followed by one
/// view/download block per uploaded attachment. Returns `None` when there
/// is nothing to say.
pub fn compose_comment(text: Option<&str>, uploaded: &[(AttachmentKind, &FileRef)]) -> Option<String> {
    let text = text.map(str::trim).filter(|t| !t.is_empty());
    if text.is_none() && uploaded.is_empty() {
        return None;
    }

    let mut html = String::new();
    if let Some(text) = text {
        html.push_str(&escape(text).replace("\r\n", "\n").replace('\n', "<br>"));
        if !uploaded.is_empty() {
            html.push_str("<br>");
        }
    }
    for (kind, file) in uploaded {
        let _ = write!(
            html,
            "<p>📄 <strong>{}</strong></p>\
             <p><a href=\"{}\" target=\"_blank\">🔍 View</a><br>\
             <a href=\"{}\">💾 Download File</a></p>",
            kind.label(),
            escape(&file.url),
            escape(&file.download_url)
        );
    }
    Some(html)
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
