//! YAML frontmatter and the page-level island options it carries.

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

const FENCE: &str = "---";
const BOM: char = '\u{feff}';

/// Frontmatter of a page plus where its body begins.
#[derive(Debug)]
pub struct FrontmatterExtraction {
    /// Frontmatter mapping as JSON; empty when the page has none.
    pub value: JsonValue,
    /// Byte offset of the first body byte in the original source.
    pub body_start: usize,
}

/// Why a frontmatter block could not be read.
#[derive(Debug, Error)]
pub enum FrontmatterError {
    /// Opening `---` without a closing one.
    #[error("Unterminated YAML frontmatter block: expected closing '---'")]
    Unterminated,
    /// The block is not valid YAML.
    #[error("Frontmatter parse error: {0}")]
    Parse(String),
    /// The block parsed to a scalar or a sequence.
    #[error("Frontmatter must be a YAML mapping at the top level")]
    InvalidRootType,
}

/// Reads the leading `---` fenced YAML block of a page, if any.
///
/// A byte-order mark and blank lines may precede the opening fence. Any other
/// first line means the page has no frontmatter.
pub fn extract_frontmatter(input: &str) -> Result<FrontmatterExtraction, FrontmatterError> {
    let offset = if input.starts_with(BOM) { BOM.len_utf8() } else { 0 };
    let mut lines = Lines::new(input, offset).skip_while(|line| line.text.trim().is_empty());

    let Some(open) = lines.next().filter(|line| line.is_fence()) else {
        return Ok(FrontmatterExtraction {
            value: empty_mapping(),
            body_start: 0,
        });
    };
    let close = lines
        .find(|line| line.is_fence())
        .ok_or(FrontmatterError::Unterminated)?;

    let block = input[open.next..close.start].trim_end_matches(['\r', '\n']);
    Ok(FrontmatterExtraction {
        value: parse_mapping(block)?,
        body_start: close.next,
    })
}

/// Page-level options read from the `islands` frontmatter key.
///
/// ```yaml
/// islands:
///   spaSync: false
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageOptions {
    /// Spa-sync default for containers without an explicit marker; `None`
    /// keeps the compiler-wide default.
    pub spa_sync: Option<bool>,
}

impl PageOptions {
    /// Reads options from extracted frontmatter; malformed values fall back to defaults.
    pub fn from_frontmatter(frontmatter: &JsonValue) -> Self {
        let Some(value) = frontmatter.get("islands") else {
            return Self::default();
        };
        Self::deserialize(value).unwrap_or_else(|err| {
            log::warn!("Ignoring malformed `islands` frontmatter: {}", err);
            Self::default()
        })
    }
}

fn empty_mapping() -> JsonValue {
    JsonValue::Object(Map::new())
}

fn parse_mapping(block: &str) -> Result<JsonValue, FrontmatterError> {
    if block.trim().is_empty() {
        return Ok(empty_mapping());
    }
    let parsed: JsonValue =
        serde_yaml::from_str(block).map_err(|err| FrontmatterError::Parse(err.to_string()))?;
    match parsed {
        JsonValue::Null => Ok(empty_mapping()),
        JsonValue::Object(_) => Ok(parsed),
        _ => Err(FrontmatterError::InvalidRootType),
    }
}

/// One line of the source with its byte bounds.
struct Line<'a> {
    text: &'a str,
    start: usize,
    /// Offset just past the line terminator.
    next: usize,
}

impl Line<'_> {
    fn is_fence(&self) -> bool {
        self.text.trim_end_matches('\r') == FENCE
    }
}

struct Lines<'a> {
    source: &'a str,
    cursor: usize,
}

impl<'a> Lines<'a> {
    fn new(source: &'a str, cursor: usize) -> Self {
        Self { source, cursor }
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = Line<'a>;

    fn next(&mut self) -> Option<Line<'a>> {
        let start = self.cursor;
        if start >= self.source.len() {
            return None;
        }
        let rest = &self.source[start..];
        let (text, next) = match rest.find('\n') {
            Some(pos) => (&rest[..pos], start + pos + 1),
            None => (rest, self.source.len()),
        };
        self.cursor = next;
        Some(Line { text, start, next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(input: &str) -> FrontmatterExtraction {
        extract_frontmatter(input).expect("frontmatter extraction should succeed")
    }

    #[test]
    fn pages_without_a_fence_have_no_frontmatter() {
        let result = extract("# Title\n---\nnot: yaml\n---\n");
        assert_eq!(result.body_start, 0);
        assert_eq!(result.value, empty_mapping());
    }

    #[test]
    fn reads_a_mapping_and_body_offset() {
        let input = "---\ntitle: Counter demo\ntags:\n  - react\n  - islands\n---\n# Content";
        let result = extract(input);
        assert_eq!(result.body_start, input.find("# Content").unwrap());
        assert_eq!(result.value["title"], "Counter demo");
        assert_eq!(result.value["tags"][1], "islands");
    }

    #[test]
    fn empty_block_is_an_empty_mapping() {
        let input = "---\n---\n# Body";
        let result = extract(input);
        assert_eq!(result.value, empty_mapping());
        assert_eq!(result.body_start, input.find("# Body").unwrap());
    }

    #[test]
    fn skips_bom_and_leading_blank_lines() {
        let input = "\u{feff}\n   \n---\r\nfoo: bar\r\n---\r\nBody";
        let result = extract(input);
        assert_eq!(result.value["foo"], "bar");
        assert_eq!(result.body_start, input.find("Body").unwrap());
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let err = extract_frontmatter("---\ninvalid: [unterminated\n---\n").unwrap_err();
        assert!(matches!(err, FrontmatterError::Parse(_)), "{err:?}");
    }

    #[test]
    fn sequences_are_rejected_at_the_root() {
        let err = extract_frontmatter("---\n- a\n- b\n---\n").unwrap_err();
        assert!(matches!(err, FrontmatterError::InvalidRootType));
    }

    #[test]
    fn missing_closing_fence_is_unterminated() {
        let err = extract_frontmatter("---\ntitle: test").unwrap_err();
        assert!(matches!(err, FrontmatterError::Unterminated));
    }

    #[test]
    fn page_options_default_to_compiler_setting() {
        let result = extract("---\ntitle: x\n---\n");
        assert_eq!(PageOptions::from_frontmatter(&result.value), PageOptions::default());
        assert_eq!(PageOptions::default().spa_sync, None);
    }

    #[test]
    fn page_options_read_islands_key() {
        let result = extract("---\nislands:\n  spaSync: false\n---\n# Body");
        assert_eq!(PageOptions::from_frontmatter(&result.value).spa_sync, Some(false));
    }

    #[test]
    fn malformed_page_options_fall_back() {
        let result = extract("---\nislands:\n  spaSync: [1]\n---\n");
        assert_eq!(PageOptions::from_frontmatter(&result.value).spa_sync, None);
    }
}
