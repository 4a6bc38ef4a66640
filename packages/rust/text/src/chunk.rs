//! Splitting cleaned page text into extraction-sized chunks.

use std::sync::LazyLock;

use regex::Regex;

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Paragraphs are packed greedily; a paragraph that does not fit on its own
/// is split on lines, and a line that does not fit is cut at the last
/// whitespace inside the window (or hard-cut when there is none). Chunks
/// are never empty and every non-whitespace character keeps its order.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    static PARA_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("valid regex"));

    let max = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in PARA_RE.split(text).map(str::trim).filter(|p| !p.is_empty()) {
        if char_len(para) <= max {
            pack(&mut chunks, &mut current, para, "\n\n", max);
            continue;
        }

        flush(&mut chunks, &mut current);
        for line in para.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if char_len(line) <= max {
                pack(&mut chunks, &mut current, line, "\n", max);
            } else {
                flush(&mut chunks, &mut current);
                chunks.extend(split_long_line(line, max));
            }
        }
        flush(&mut chunks, &mut current);
    }
    flush(&mut chunks, &mut current);

    chunks
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Append `unit` to `current`, starting a new chunk when it would overflow.
fn pack(chunks: &mut Vec<String>, current: &mut String, unit: &str, sep: &str, max: usize) {
    if current.is_empty() {
        current.push_str(unit);
    } else if char_len(current) + sep.len() + char_len(unit) <= max {
        current.push_str(sep);
        current.push_str(unit);
    } else {
        chunks.push(std::mem::take(current));
        current.push_str(unit);
    }
}

fn flush(chunks: &mut Vec<String>, current: &mut String) {
    if !current.trim().is_empty() {
        chunks.push(std::mem::take(current));
    }
    current.clear();
}

fn split_long_line(line: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + max).min(chars.len());
        if end < chars.len() {
            // Prefer a word boundary in the back half of the window.
            if let Some(ws) = chars[start..end].iter().rposition(|c| c.is_whitespace()) {
                if ws > max / 2 {
                    end = start + ws;
                }
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        start = end;
    }

    pieces
}
