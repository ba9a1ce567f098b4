//! HTML rendering of slots.
//!
//! Every piece of server-provided text goes through [`escape`] before it is
//! placed in markup, attribute values included.

use crate::session::StreamSession;
use crate::slots::{Slot, SlotState};

/// Escape text for use in HTML element content or a quoted attribute.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Markup for a single slot.
pub fn render_slot(slot: &Slot) -> String {
    let id = slot.unit_id;
    let body = match &slot.state {
        SlotState::Waiting => "<p>Waiting for results...</p>".to_string(),
        SlotState::Rendered { record } => format!(
            "<img src=\"{src}\" alt=\"Generated Image {id}\" class=\"responsive-image\">\n  <p>{description}</p>",
            src = escape(&record.payload_url),
            description = escape(&record.description),
        ),
        SlotState::Errored { message } => format!("<p>Error: {}</p>", escape(message)),
    };
    format!(
        "<div class=\"iteration-placeholder\" data-iteration=\"{id}\">\n  <h3>Iteration {id}</h3>\n  {body}\n</div>\n"
    )
}

/// Standalone page with the session's final status and every slot.
pub fn render_report(session: &StreamSession) -> String {
    let mut page = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>iterview results</title>\n</head>\n<body>\n",
    );
    page.push_str(&format!(
        "<p id=\"status-message\">{}</p>\n",
        escape(session.status())
    ));
    page.push_str(&format!(
        "<p id=\"overall-progress\">{}</p>\n",
        escape(&session.progress().display())
    ));
    page.push_str("<section class=\"results-section\">\n");
    for slot in session.slots().slots() {
        page.push_str(&render_slot(slot));
    }
    page.push_str("</section>\n</body>\n</html>\n");
    page
}
