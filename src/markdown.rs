//! Markdown rendering for transcript messages.

use pulldown_cmark::{html, Event, Options, Parser};

/// Renders `text` as an HTML fragment.
///
/// Raw HTML in the source is emitted as escaped text, so the result is safe to
/// embed in the page whoever wrote the message.
pub fn to_html(text: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let events = Parser::new_ext(text, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}
