//! Markdown tokenization restricted to what the tag compiler needs: the byte
//! spans of raw-HTML nodes, plus offset/line bookkeeping.

use crate::{IslandsError, SourceLocation};
use markdown::mdast::Node;
use markdown::message::{Message, Place};

/// Parser options for building markdown-rs parse options.
#[derive(Clone, Copy, Debug)]
pub struct ParseOptions {
    /// Enable GitHub Flavored Markdown constructs.
    pub gfm: bool,
    /// Enable YAML frontmatter parsing.
    pub frontmatter: bool,
    /// Enable indented code blocks.
    pub code_indented: bool,
    /// Enable math constructs ($inline$ and $$block$$).
    pub math: bool,
}

impl ParseOptions {
    /// Documentation-page defaults.
    pub const fn docs() -> Self {
        Self {
            gfm: true,
            frontmatter: true,
            code_indented: true,
            math: false,
        }
    }

    /// Convert to markdown-rs `ParseOptions`. Raw HTML is always on: the
    /// component tags live in HTML nodes.
    pub fn to_markdown(self) -> markdown::ParseOptions {
        let mut constructs = markdown::Constructs {
            frontmatter: self.frontmatter,
            code_indented: self.code_indented,
            html_flow: true,
            html_text: true,
            ..Default::default()
        };

        if self.gfm {
            constructs.gfm_autolink_literal = true;
            constructs.gfm_footnote_definition = true;
            constructs.gfm_label_start_footnote = true;
            constructs.gfm_strikethrough = true;
            constructs.gfm_table = true;
            constructs.gfm_task_list_item = true;
        }

        if self.math {
            constructs.math_flow = true;
            constructs.math_text = true;
        }

        markdown::ParseOptions {
            constructs,
            math_text_single_dollar: self.math,
            ..markdown::ParseOptions::default()
        }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::docs()
    }
}

/// Byte span of one raw-HTML node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HtmlSpan {
    /// Start offset (inclusive).
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
}

/// Parse markdown into an MDAST tree using markdown-rs `ParseOptions`.
pub fn parse_mdast_with_options(
    input: &str,
    options: &markdown::ParseOptions,
) -> Result<Node, IslandsError> {
    markdown::to_mdast(input, options).map_err(|err| IslandsError::MarkdownAdapter {
        message: err.to_string(),
        location: message_location(&err),
    })
}

/// Collects the spans of every raw-HTML node, in document order.
pub fn html_spans(input: &str, options: &ParseOptions) -> Result<Vec<HtmlSpan>, IslandsError> {
    let root = parse_mdast_with_options(input, &options.to_markdown())?;
    let mut spans = Vec::new();
    collect_html(&root, &mut spans);
    spans.sort_by_key(|s| s.start);
    Ok(spans)
}

fn collect_html(node: &Node, spans: &mut Vec<HtmlSpan>) {
    if let Node::Html(html) = node {
        if let Some(position) = &html.position {
            spans.push(HtmlSpan {
                start: position.start.offset,
                end: position.end.offset,
            });
        }
        return;
    }
    if let Some(children) = node.children() {
        for child in children {
            collect_html(child, spans);
        }
    }
}

fn message_location(message: &Message) -> SourceLocation {
    match &message.place {
        Some(place) => match place.as_ref() {
            Place::Point(point) => SourceLocation::new(point.line, point.column),
            Place::Position(position) => {
                SourceLocation::new(position.start.line, position.start.column)
            }
        },
        None => SourceLocation::new(1, 1),
    }
}

/// Maps byte offsets to 1-indexed line/column pairs.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Indexes `input`.
    pub fn new(input: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            input
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { line_starts }
    }

    /// Location of `offset`.
    pub fn location(&self, offset: usize) -> SourceLocation {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert) => insert - 1,
        };
        SourceLocation::new(line + 1, offset - self.line_starts[line] + 1)
    }

    /// Number of lines.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(input: &str) -> Vec<&str> {
        html_spans(input, &ParseOptions::docs())
            .unwrap()
            .into_iter()
            .map(|s| &input[s.start..s.end])
            .collect()
    }

    #[test]
    fn finds_block_and_inline_html() {
        let input = "# Title\n\n<Counter client:load />\n\nSome <Badge /> text.\n";
        let found = spans(input);
        assert_eq!(found.len(), 2);
        assert!(found[0].starts_with("<Counter"));
        assert_eq!(found[1], "<Badge />");
    }

    #[test]
    fn ignores_code_fences_and_spans() {
        let input = "```md\n<Counter />\n```\n\n`<Badge />`\n";
        assert!(spans(input).is_empty());
    }

    #[test]
    fn frontmatter_is_not_html() {
        let input = "---\ntitle: <b>x</b>\n---\n\n<Counter />\n";
        let found = spans(input);
        assert_eq!(found.len(), 1);
        assert!(found[0].starts_with("<Counter"));
    }

    #[test]
    fn line_index_locations() {
        let index = LineIndex::new("ab\ncd\n");
        assert_eq!(index.location(0), SourceLocation::new(1, 1));
        assert_eq!(index.location(1), SourceLocation::new(1, 2));
        assert_eq!(index.location(3), SourceLocation::new(2, 1));
        assert_eq!(index.location(4), SourceLocation::new(2, 2));
        assert_eq!(index.line_count(), 3);
    }
}
