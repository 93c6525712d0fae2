//! Shared output layer for human/JSON parity across CLI commands.
//!
//! Every command handler receives an [`OutputMode`] and formats its output
//! accordingly: pretty text for humans, stable JSON for scripts.

use std::io::{self, Write};

/// The output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-optimized output.
    Human,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    /// Returns `true` if JSON output was requested.
    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by pretty human output.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

#[cfg(test)]
mod tests {
    use super::{OutputMode, pretty_kv, pretty_section};

    #[test]
    fn kv_lines_align() {
        let mut buf = Vec::new();
        pretty_kv(&mut buf, "case", "Odessa").expect("write");
        pretty_kv(&mut buf, "kind", "proposal").expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("case:        Odessa"));
        assert!(text.contains("kind:        proposal"));
    }

    #[test]
    fn sections_have_rules() {
        let mut buf = Vec::new();
        pretty_section(&mut buf, "Queue").expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("Queue\n"));
        assert!(text.contains("----"));
    }

    #[test]
    fn json_mode_detection() {
        assert!(OutputMode::Json.is_json());
        assert!(!OutputMode::Human.is_json());
    }
}
