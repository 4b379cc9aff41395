//! Config field path.

use std::fmt;

use owo_colors::OwoColorize;

/// Dotted path of a config field, e.g. `preview.debounce_ms`.
///
/// Sections expose their paths as associated constants so diagnostics
/// never spell a field name twice:
///
/// ```ignore
/// diag.error(PreviewConfig::DEBOUNCE_MS, "too large");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPath(pub &'static str);

impl FieldPath {
    #[inline]
    pub const fn new(path: &'static str) -> Self {
        Self(path)
    }

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_args!("`{}`", self.0).bright_blue())
    }
}

impl AsRef<str> for FieldPath {
    fn as_ref(&self) -> &str {
        self.0
    }
}
