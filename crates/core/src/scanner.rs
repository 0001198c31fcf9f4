//! HTML fragment scanning with exact byte offsets.
//!
//! The markdown tokenizer hands us raw-HTML spans; this scanner finds the
//! start tags inside one span so they can be rewritten in place.

/// One attribute of a scanned start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedAttribute {
    /// Attribute name exactly as written.
    pub name: String,
    /// Entity-decoded value; `None` for bare attributes.
    pub value: Option<String>,
}

/// A start tag found in a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedTag {
    /// Byte offset of `<`, relative to the scanned fragment.
    pub start: usize,
    /// Byte offset just past `>`, relative to the scanned fragment.
    pub end: usize,
    /// Tag name exactly as written.
    pub name: String,
    /// Attributes in source order.
    pub attributes: Vec<ScannedAttribute>,
    /// Whether the tag ends in `/>`.
    pub self_closing: bool,
}

/// Scans every start tag in `fragment`.
///
/// Comments, end tags and declarations are skipped. A tag without a closing
/// `>` ends the scan.
pub fn scan_start_tags(fragment: &str) -> Vec<ScannedTag> {
    let bytes = fragment.as_bytes();
    let mut tags = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        let rest = &fragment[i..];
        if rest.starts_with("<!--") {
            match rest.find("-->") {
                Some(close) => {
                    i += close + 3;
                    continue;
                }
                None => break,
            }
        }
        match bytes.get(i + 1) {
            Some(b) if b.is_ascii_alphabetic() => match parse_start_tag(fragment, i) {
                Some(tag) => {
                    i = tag.end;
                    tags.push(tag);
                }
                None => break,
            },
            _ => i += 1,
        }
    }

    tags
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':')
}

fn parse_start_tag(fragment: &str, start: usize) -> Option<ScannedTag> {
    let bytes = fragment.as_bytes();
    let mut i = start + 1;
    let name_start = i;
    while i < bytes.len() && is_name_byte(bytes[i]) {
        i += 1;
    }
    let name = fragment[name_start..i].to_string();
    let mut attributes = Vec::new();

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i)? {
            b'>' => {
                return Some(ScannedTag {
                    start,
                    end: i + 1,
                    name,
                    attributes,
                    self_closing: false,
                });
            }
            b'/' => {
                if bytes.get(i + 1) == Some(&b'>') {
                    return Some(ScannedTag {
                        start,
                        end: i + 2,
                        name,
                        attributes,
                        self_closing: true,
                    });
                }
                // Stray slash inside the tag.
                i += 1;
            }
            _ => {
                let (attribute, next) = parse_attribute(fragment, i)?;
                attributes.push(attribute);
                i = next;
            }
        }
    }
}

fn parse_attribute(fragment: &str, start: usize) -> Option<(ScannedAttribute, usize)> {
    let bytes = fragment.as_bytes();
    let mut i = start;
    while i < bytes.len()
        && !bytes[i].is_ascii_whitespace()
        && !matches!(bytes[i], b'=' | b'>')
        && !(bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'>'))
    {
        i += 1;
    }
    let name = fragment[start..i].to_string();

    let mut lookahead = i;
    while lookahead < bytes.len() && bytes[lookahead].is_ascii_whitespace() {
        lookahead += 1;
    }
    if bytes.get(lookahead) != Some(&b'=') {
        return Some((ScannedAttribute { name, value: None }, i));
    }

    i = lookahead + 1;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let raw = match *bytes.get(i)? {
        quote @ (b'"' | b'\'') => {
            let value_start = i + 1;
            let close = fragment[value_start..].find(quote as char)?;
            i = value_start + close + 1;
            &fragment[value_start..value_start + close]
        }
        b'{' => {
            let value_start = i;
            let mut depth = 0usize;
            while i < bytes.len() {
                match bytes[i] {
                    b'{' => depth += 1,
                    b'}' => {
                        depth -= 1;
                        if depth == 0 {
                            i += 1;
                            break;
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            if depth != 0 {
                return None;
            }
            &fragment[value_start..i]
        }
        _ => {
            let value_start = i;
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'>') {
                    break;
                }
                i += 1;
            }
            &fragment[value_start..i]
        }
    };

    let value = html_escape::decode_html_entities(raw).into_owned();
    Some((
        ScannedAttribute {
            name,
            value: Some(value),
        },
        i,
    ))
}

/// Finds the first `</name>` (case-insensitive) at or after `from`.
pub fn find_end_tag(fragment: &str, name: &str, from: usize) -> Option<usize> {
    let lower = fragment.to_ascii_lowercase();
    let needle = format!("</{}", name.to_ascii_lowercase());
    let mut cursor = from;
    while let Some(pos) = lower[cursor..].find(&needle) {
        let at = cursor + pos;
        let after = at + needle.len();
        match lower.as_bytes().get(after) {
            Some(b) if is_name_byte(*b) => cursor = after,
            _ => return Some(at),
        }
    }
    None
}
