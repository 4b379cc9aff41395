//! Embedded pages served to preview browsers.
//!
//! - `serve::PREVIEW_HTML` - one preview surface, talks to the host over a WebSocket
//! - `serve::INDEX_HTML` - listing of live surfaces

mod template;

use std::borrow::Cow;

pub use template::{Template, TemplateVars};

/// Escape HTML special characters.
///
/// Uses `Cow` to avoid allocation when no escaping is needed.
pub fn escape(s: &str) -> Cow<'_, str> {
    const ESCAPE_CHARS: [char; 5] = ['<', '>', '&', '"', '\''];

    if !s.contains(ESCAPE_CHARS) {
        return Cow::Borrowed(s);
    }

    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            _ => result.push(c),
        }
    }
    Cow::Owned(result)
}

pub mod serve {
    use super::{Template, TemplateVars, escape};

    /// Variables for preview.html.
    pub struct PreviewVars<'a> {
        pub title: &'a str,
        pub surface_id: u64,
        pub ws_port: u16,
    }

    impl TemplateVars for PreviewVars<'_> {
        fn apply(&self, content: &str) -> String {
            content
                .replace("__DOTVIEW_TITLE__", &escape(self.title))
                .replace("__DOTVIEW_SURFACE_ID__", &self.surface_id.to_string())
                .replace("__DOTVIEW_WS_PORT__", &self.ws_port.to_string())
        }
    }

    /// Preview surface page.
    pub const PREVIEW_HTML: Template<PreviewVars<'static>> =
        Template::new(include_str!("serve/preview.html"));

    /// Variables for index.html. `surfaces` is pre-rendered markup.
    pub struct IndexVars<'a> {
        pub surfaces: &'a str,
        pub version: &'a str,
    }

    impl TemplateVars for IndexVars<'_> {
        fn apply(&self, content: &str) -> String {
            content
                .replace("__DOTVIEW_SURFACES__", self.surfaces)
                .replace("__DOTVIEW_VERSION__", &escape(self.version))
        }
    }

    /// Surface listing page.
    pub const INDEX_HTML: Template<IndexVars<'static>> =
        Template::new(include_str!("serve/index.html"));
}
