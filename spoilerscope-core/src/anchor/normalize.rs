//! Churn normalization and tokenization.
//!
//! Churn is superficial editing that should never break an anchor: smart
//! quotes turned straight and whitespace runs collapsed. [`Normalized`] keeps
//! a byte map back to the source so matches found in normalized text can be
//! reported at their original offsets.

use std::collections::HashMap;

/// Normalized copy of a slice of source text.
pub(crate) struct Normalized {
    /// Normalized text
    pub text: String,
    /// `map[i]` is the source byte offset of normalized byte `i`; one extra
    /// entry maps `text.len()` to the end of the source slice.
    map: Vec<usize>,
}

impl Normalized {
    /// Normalize `source`, whose first byte sits at absolute offset `base`.
    pub fn new(source: &str, base: usize, lowercase: bool) -> Self {
        let mut text = String::with_capacity(source.len());
        let mut map = Vec::with_capacity(source.len() + 1);
        let mut in_whitespace = false;

        for (i, c) in source.char_indices() {
            if c.is_whitespace() {
                if in_whitespace {
                    continue;
                }
                in_whitespace = true;
                text.push(' ');
                map.push(base + i);
                continue;
            }
            in_whitespace = false;

            let mut c = fold_quote(c);
            if lowercase {
                c = c.to_ascii_lowercase();
            }
            let start = text.len();
            text.push(c);
            map.extend(std::iter::repeat(base + i).take(text.len() - start));
        }
        map.push(base + source.len());

        Self { text, map }
    }

    /// Source offset for a normalized offset (clamped to the end).
    pub fn original(&self, index: usize) -> usize {
        self.map[index.min(self.map.len() - 1)]
    }
}

/// Map typographic quotes to their ASCII forms.
fn fold_quote(c: char) -> char {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => '\'',
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => '"',
        other => other,
    }
}

/// Normalize churn in a standalone string.
pub fn normalize_churn(text: &str) -> String {
    Normalized::new(text, 0, false).text
}

/// Lowercased word tokens with their byte offsets in `text`.
///
/// Words are runs of alphanumerics and inner apostrophes.
pub(crate) fn tokens(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut start = 0usize;

    for (i, c) in text.char_indices() {
        let c = fold_quote(c);
        if c.is_alphanumeric() || (c == '\'' && !current.is_empty()) {
            if current.is_empty() {
                start = i;
            }
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            push_token(&mut out, start, &mut current);
        }
    }
    if !current.is_empty() {
        push_token(&mut out, start, &mut current);
    }
    out
}

fn push_token(out: &mut Vec<(usize, String)>, start: usize, current: &mut String) {
    let word = current.trim_end_matches('\'').to_string();
    if !word.is_empty() {
        out.push((start, word));
    }
    current.clear();
}

/// Size of the multiset intersection between `expected` and `window`.
pub(crate) fn multiset_overlap(expected: &HashMap<&str, usize>, window: &[(usize, String)]) -> usize {
    let mut remaining = expected.clone();
    let mut hits = 0;
    for (_, word) in window {
        if let Some(count) = remaining.get_mut(word.as_str()) {
            if *count > 0 {
                *count -= 1;
                hits += 1;
            }
        }
    }
    hits
}

/// Largest char boundary `<= index`, clamped to the text.
pub(crate) fn floor_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest char boundary `>= index`, clamped to the text.
pub(crate) fn ceil_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// The last `n` characters of `text`.
pub(crate) fn tail_chars(text: &str, n: usize) -> &str {
    match text.char_indices().rev().nth(n.saturating_sub(1)) {
        Some((i, _)) if n > 0 => &text[i..],
        _ if n == 0 => "",
        _ => text,
    }
}

/// The first `n` characters of `text`.
pub(crate) fn head_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}
