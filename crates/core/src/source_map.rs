//! Line-level v3 source maps for rewritten documents.

use serde::Serialize;

/// One replacement applied to the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    /// Start offset in the original text.
    pub start: usize,
    /// End offset (exclusive) in the original text.
    pub end: usize,
    /// Replacement text.
    pub replacement: String,
}

/// Applies edits from the highest offset to the lowest so earlier offsets
/// stay valid. Edits must not overlap.
pub fn apply_edits(source: &str, edits: &[Edit]) -> String {
    let mut ordered: Vec<&Edit> = edits.iter().collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start));
    let mut output = source.to_string();
    for edit in ordered {
        output.replace_range(edit.start..edit.end, &edit.replacement);
    }
    output
}

/// For every output line, the original line (0-indexed) it came from.
pub fn line_map(source: &str, edits: &[Edit]) -> Vec<usize> {
    let mut ordered: Vec<&Edit> = edits.iter().collect();
    ordered.sort_by_key(|e| e.start);

    let mut lines = vec![0usize];
    let mut current = 0usize;
    let mut cursor = 0usize;
    for edit in ordered {
        for _ in source[cursor..edit.start].matches('\n') {
            current += 1;
            lines.push(current);
        }
        let original = source[edit.start..edit.end].matches('\n').count();
        let produced = edit.replacement.matches('\n').count();
        for i in 1..=produced {
            lines.push(current + i.min(original));
        }
        current += original;
        cursor = edit.end;
    }
    for _ in source[cursor..].matches('\n') {
        current += 1;
        lines.push(current);
    }
    lines
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceMapV3<'a> {
    version: u8,
    file: &'a str,
    sources: [&'a str; 1],
    sources_content: [&'a str; 1],
    names: [&'a str; 0],
    mappings: String,
}

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn encode_vlq(value: i64, out: &mut String) {
    let signed = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    let mut vlq = signed as u64;
    loop {
        let mut digit = (vlq & 0b11111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b100000;
        }
        out.push(BASE64[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

/// Serializes a line map as a v3 source map JSON string.
pub fn to_source_map(file: &str, source: &str, lines: &[usize]) -> String {
    let mut mappings = String::new();
    let mut previous = 0i64;
    for (i, original) in lines.iter().enumerate() {
        if i > 0 {
            mappings.push(';');
        }
        // [generated column, source index, original line, original column]
        encode_vlq(0, &mut mappings);
        encode_vlq(0, &mut mappings);
        encode_vlq(*original as i64 - previous, &mut mappings);
        encode_vlq(0, &mut mappings);
        previous = *original as i64;
    }
    let map = SourceMapV3 {
        version: 3,
        file,
        sources: [file],
        sources_content: [source],
        names: [],
        mappings,
    };
    serde_json::to_string(&map).unwrap_or_default()
}
