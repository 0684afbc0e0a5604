//! Plain-text helpers for scraped pages: visible text extraction and chunking.

use std::collections::VecDeque;

/// Elements whose content never renders as text.
const INVISIBLE_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Elements that start a new line when rendered.
const LINE_BREAKING_ELEMENTS: [&str; 16] = [
    "br", "p", "div", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "title", "section",
    "article", "header", "footer",
];

/// Separators tried in order when splitting text into chunks.
pub const SPLIT_SEPARATORS: [&str; 2] = ["\n\n", "\n"];

/// Extract the human visible text of an HTML document.
///
/// Markup, comments and the content of script/style elements are dropped, common entities
/// are decoded, whitespace is tidied per line and blank-line runs collapse to one.
pub fn extract_visible_text(html: &str) -> String {
    // ASCII lowercasing keeps byte offsets identical between the two strings.
    let lower = html.to_ascii_lowercase();
    let mut raw = String::with_capacity(html.len() / 2);
    let mut pos = 0;

    while pos < html.len() {
        let Some(offset) = html[pos..].find('<') else {
            raw.push_str(&decode_entities(&html[pos..]));
            break;
        };
        let tag_start = pos + offset;
        raw.push_str(&decode_entities(&html[pos..tag_start]));

        let after = &html[tag_start + 1..];
        if lower[tag_start..].starts_with("<!--") {
            pos = match lower[tag_start + 4..].find("-->") {
                Some(end) => tag_start + 4 + end + 3,
                None => html.len(),
            };
            continue;
        }

        let opens_tag = after
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '/' || c == '!' || c == '?')
            .unwrap_or(false);
        if !opens_tag {
            raw.push('<');
            pos = tag_start + 1;
            continue;
        }

        // An unterminated tag at end of input is kept as text.
        let Some(close) = html[tag_start..].find('>') else {
            raw.push_str(&decode_entities(&html[tag_start..]));
            break;
        };
        let tag_end = tag_start + close + 1;
        let tag_body = &lower[tag_start + 1..tag_end - 1];
        let is_closing = tag_body.starts_with('/');
        let name: String = tag_body
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();

        if LINE_BREAKING_ELEMENTS.contains(&name.as_str()) && !raw.ends_with('\n') {
            raw.push('\n');
        }

        if !is_closing && !tag_body.ends_with('/') && INVISIBLE_ELEMENTS.contains(&name.as_str()) {
            let closing_tag = format!("</{}", name);
            pos = match lower[tag_end..].find(&closing_tag) {
                Some(rel) => {
                    let closing_start = tag_end + rel;
                    match html[closing_start..].find('>') {
                        Some(gt) => closing_start + gt + 1,
                        None => html.len(),
                    }
                }
                None => html.len(),
            };
        } else {
            pos = tag_end;
        }
    }

    tidy_whitespace(&raw)
}

fn tidy_whitespace(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in raw.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() && lines.last().map(|l| l.is_empty()).unwrap_or(true) {
            continue;
        }
        lines.push(collapsed);
    }
    while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }
    lines.join("\n")
}

/// Decode the named and numeric entities that commonly appear in page text.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        let decoded = candidate
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&candidate[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &candidate[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let number = entity.strip_prefix('#')?;
            let code = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split `text` into chunks of at most `chunk_size` characters, preferring paragraph and then
/// line boundaries, with roughly `overlap` characters repeated between neighbouring chunks.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);
    if char_len(text) <= chunk_size {
        return if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };
    }
    split_recursive(text, &SPLIT_SEPARATORS, chunk_size, overlap)
}

fn split_recursive(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    overlap: usize,
) -> Vec<String> {
    let Some(index) = separators.iter().position(|sep| text.contains(sep)) else {
        return hard_split(text, chunk_size, overlap);
    };
    let separator = separators[index];
    let finer = &separators[index + 1..];

    let mut chunks = Vec::new();
    let mut pending: Vec<&str> = Vec::new();
    for piece in text.split(separator).filter(|p| !p.is_empty()) {
        if char_len(piece) <= chunk_size {
            pending.push(piece);
        } else {
            if !pending.is_empty() {
                chunks.extend(merge_pieces(&pending, separator, chunk_size, overlap));
                pending.clear();
            }
            chunks.extend(split_recursive(piece, finer, chunk_size, overlap));
        }
    }
    if !pending.is_empty() {
        chunks.extend(merge_pieces(&pending, separator, chunk_size, overlap));
    }
    chunks
}

/// Greedily join pieces into chunks, carrying trailing pieces worth up to `overlap`
/// characters into the next chunk.
fn merge_pieces(pieces: &[&str], separator: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0;

    for piece in pieces {
        let len = char_len(piece);
        let joined_len = if current.is_empty() { len } else { len + sep_len };
        if total + joined_len > chunk_size && !current.is_empty() {
            chunks.push(join(&current, separator));
            while total > overlap || (total > 0 && total + len + sep_len > chunk_size) {
                let Some(front) = current.front() else {
                    break;
                };
                let removed = char_len(front) + if current.len() > 1 { sep_len } else { 0 };
                total -= removed;
                current.pop_front();
            }
        }
        total += if current.is_empty() { len } else { len + sep_len };
        current.push_back(piece);
    }
    if !current.is_empty() {
        chunks.push(join(&current, separator));
    }
    chunks
}

fn join(pieces: &VecDeque<&str>, separator: &str) -> String {
    pieces.iter().copied().collect::<Vec<_>>().join(separator)
}

fn hard_split(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}
