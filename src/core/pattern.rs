//! core::pattern
//!
//! Value patterns used in mapping configs.
//!
//! Patterns are handlebars templates rendered against the source values of
//! one mapping:
//!
//! ```text
//! {{maps_to.[0]}}                    the first source value
//! {{maps_to.[1]}}, {{maps_to.[0]}}   several values
//! {{date_isoformat maps_to.[0]}}     a date rewritten as ISO-8601
//! ```
//!
//! Rendering is strict: naming a value that does not exist is an error, not
//! an empty string. Output is never HTML-escaped.
//!
//! # Example
//!
//! ```
//! use flatweave::core::pattern::Renderer;
//!
//! let renderer = Renderer::new();
//! let values = vec!["Ada".to_string(), "Lovelace".to_string()];
//! let text = renderer
//!     .render("{{maps_to.[1]}}, {{maps_to.[0]}} <{{date_isoformat \"2021-03-09\"}}>", &values)
//!     .unwrap();
//! assert_eq!(text, "Lovelace, Ada <2021-03-09T00:00:00>");
//! ```

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use handlebars::{Handlebars, RenderErrorReason};
use serde::Serialize;
use thiserror::Error;

/// Name of the date helper available in patterns.
pub const DATE_HELPER: &str = "date_isoformat";

/// Placeholder used for every slot when checking a pattern; it is also a
/// valid date so the date helper accepts it.
const SAMPLE_VALUE: &str = "1970-01-01";

/// Errors from pattern compilation and rendering.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("invalid pattern '{pattern}': {reason}")]
    Syntax { pattern: String, reason: String },

    #[error("cannot render '{pattern}': {reason}")]
    Render { pattern: String, reason: String },
}

/// Data a pattern is rendered against.
#[derive(Debug, Serialize)]
struct PatternData<'a> {
    maps_to: &'a [String],
}

/// Handlebars registry configured for value patterns.
pub struct Renderer {
    registry: Handlebars<'static>,
}

impl Renderer {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_helper(DATE_HELPER, Box::new(date_isoformat_helper));
        Self { registry }
    }

    /// Check that `pattern` compiles and only names values among the first
    /// `available` sources.
    ///
    /// # Errors
    ///
    /// Returns `PatternError::Syntax` for malformed templates and
    /// `PatternError::Render` when the pattern names a missing value or an
    /// unknown helper.
    pub fn check(&self, pattern: &str, available: usize) -> Result<(), PatternError> {
        handlebars::Template::compile(pattern).map_err(|e| PatternError::Syntax {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let sample = vec![SAMPLE_VALUE.to_string(); available];
        self.render(pattern, &sample).map(|_| ())
    }

    /// Render `pattern` with `values` as `maps_to`.
    pub fn render(&self, pattern: &str, values: &[String]) -> Result<String, PatternError> {
        self.registry
            .render_template(pattern, &PatternData { maps_to: values })
            .map_err(|e| PatternError::Render {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer").finish_non_exhaustive()
    }
}

fn date_isoformat_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let text = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .ok_or_else(|| RenderErrorReason::Other(format!("{DATE_HELPER} needs a text argument")))?;
    let formatted = date_isoformat(text)
        .ok_or_else(|| RenderErrorReason::Other(format!("'{text}' is not a recognizable date")))?;
    out.write(&formatted)?;
    Ok(())
}

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d", "%d/%m/%Y", "%d.%m.%Y"];

/// Reformat a loosely formatted date as ISO-8601.
///
/// Offsets are kept; naive values render without one, and plain dates get
/// a midnight time.
pub fn date_isoformat(text: &str) -> Option<String> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.to_rfc3339());
    }
    for format in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .map(|date| format!("{}T00:00:00", date.format("%Y-%m-%d")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn literal_only() {
        let renderer = Renderer::new();
        assert!(renderer.check("local", 0).is_ok());
        assert_eq!(renderer.render("local", &[]).unwrap(), "local");
    }

    #[test]
    fn indexed_values() {
        let renderer = Renderer::new();
        assert_eq!(
            renderer
                .render("{{maps_to.[0]}}-{{maps_to.[1]}}", &values(&["a", "b"]))
                .unwrap(),
            "a-b"
        );
    }

    #[test]
    fn output_is_not_escaped() {
        let renderer = Renderer::new();
        assert_eq!(
            renderer.render("{{maps_to.[0]}}", &values(&["<a & b>"])).unwrap(),
            "<a & b>"
        );
    }

    #[test]
    fn missing_value_is_an_error() {
        let renderer = Renderer::new();
        assert!(matches!(
            renderer.render("{{maps_to.[2]}}", &values(&["a"])),
            Err(PatternError::Render { .. })
        ));
        assert!(matches!(
            renderer.check("{{maps_to.[1]}}", 1),
            Err(PatternError::Render { .. })
        ));
        assert!(renderer.check("{{maps_to.[0]}}", 1).is_ok());
    }

    #[test]
    fn syntax_errors() {
        let renderer = Renderer::new();
        for bad in ["{{maps_to.[0]", "{{#if}}", "{{/each}}"] {
            assert!(
                matches!(renderer.check(bad, 1), Err(PatternError::Syntax { .. })),
                "{bad} should not compile"
            );
        }
    }

    #[test]
    fn date_helper() {
        let renderer = Renderer::new();
        let pattern = "{{date_isoformat maps_to.[0]}}";
        assert!(renderer.check(pattern, 1).is_ok());
        assert_eq!(
            renderer.render(pattern, &values(&["2021-03-09"])).unwrap(),
            "2021-03-09T00:00:00"
        );
        assert_eq!(
            renderer.render(pattern, &values(&["09.03.2021"])).unwrap(),
            "2021-03-09T00:00:00"
        );
        assert_eq!(
            renderer
                .render(pattern, &values(&["2021-03-09 10:15:00"]))
                .unwrap(),
            "2021-03-09T10:15:00"
        );
        assert!(renderer.render(pattern, &values(&["yesterday"])).is_err());
    }

    #[test]
    fn date_keeps_offset() {
        assert_eq!(
            date_isoformat("2021-03-09T10:15:00+01:00").as_deref(),
            Some("2021-03-09T10:15:00+01:00")
        );
        assert_eq!(date_isoformat("nope"), None);
    }
}
