use std::{borrow::Cow, sync::LazyLock};

use regex::Regex;

/// A word: letters, digits, anything in the Hebrew block (including
/// niqqud and cantillation marks), and apostrophe/geresh used in
/// abbreviations such as `ר'`.
///
/// The tantivy tokenizer, query tokenization, body verification and
/// composition chunking all use this one pattern so index terms and
/// verified tokens always agree.
pub const WORD_TOKEN_PATTERN: &str = r"[\w\x{0590}-\x{05FF}']+";

/// Number of characters shown when a page is previewed without a match.
pub const DEFAULT_PREVIEW_CHARS: usize = 300;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(WORD_TOKEN_PATTERN).expect("word pattern is a valid regex")
});

static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w]").expect("valid regex"));

static SHELFMARK_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*m[.\s]*s[.\s]*\.?\s*").expect("valid regex")
});

/// A word token with both character and byte offsets into its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// The token exactly as it appears in the source.
    pub text: &'a str,
    /// Lowercased form used for comparisons.
    pub normalized: Cow<'a, str>,
    /// Character offset of the first character.
    pub start: usize,
    /// Character offset one past the last character.
    pub end: usize,
    pub byte_start: usize,
    pub byte_end: usize,
}

/// Split `text` into word tokens.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars_before = 0;
    let mut last_byte = 0;

    for m in WORD_RE.find_iter(text) {
        chars_before += text[last_byte..m.start()].chars().count();
        let len = m.as_str().chars().count();
        tokens.push(Token {
            text: m.as_str(),
            normalized: lowercase(m.as_str()),
            start: chars_before,
            end: chars_before + len,
            byte_start: m.start(),
            byte_end: m.end(),
        });
        chars_before += len;
        last_byte = m.end();
    }

    tokens
}

/// Word tokens as plain string slices.
pub fn words(text: &str) -> Vec<&str> {
    WORD_RE.find_iter(text).map(|m| m.as_str()).collect()
}

fn lowercase(s: &str) -> Cow<'_, str> {
    if s.chars().any(char::is_uppercase) {
        Cow::Owned(s.to_lowercase())
    } else {
        Cow::Borrowed(s)
    }
}

/// Character-offset to byte-offset table for one string.
///
/// Holds one entry per character plus a trailing entry for the end of the
/// string, so both `start` and `end` offsets resolve in O(1).
#[derive(Debug, Clone)]
pub struct CharMap {
    char_to_byte: Vec<usize>,
}

impl CharMap {
    pub fn new(text: &str) -> Self {
        let char_to_byte = text
            .char_indices()
            .map(|(byte_idx, _)| byte_idx)
            .chain(std::iter::once(text.len()))
            .collect();
        Self { char_to_byte }
    }

    /// Number of characters in the mapped string.
    pub fn char_len(&self) -> usize {
        self.char_to_byte.len() - 1
    }

    /// Byte offset of character `pos`, clamped to the end of the string.
    pub fn byte(&self, pos: usize) -> usize {
        self.char_to_byte[pos.min(self.char_len())]
    }

    /// Character offset of byte `byte`, which must be a char boundary.
    pub fn char_at_byte(&self, byte: usize) -> usize {
        self.char_to_byte
            .binary_search(&byte)
            .unwrap_or_else(|insert| insert)
    }

    /// Slice `text` between two character offsets.
    pub fn slice<'t>(
        &self,
        text: &'t str,
        start: usize,
        end: usize,
    ) -> &'t str {
        &text[self.byte(start)..self.byte(end)]
    }
}

/// Map Hebrew final letters to their medial forms.
pub fn fold_final_letter(c: char) -> char {
    match c {
        'ך' => 'כ',
        'ם' => 'מ',
        'ן' => 'נ',
        'ף' => 'פ',
        'ץ' => 'צ',
        other => other,
    }
}

/// Normalize text for containment checks: lowercased words with final
/// letters folded, joined by single spaces.
pub fn normalize_for_comparison(text: &str) -> String {
    tokenize(text)
        .iter()
        .map(|t| {
            t.normalized
                .chars()
                .map(fold_final_letter)
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a shelfmark so that `MS. Heb. 12`, `ms heb 12` and `Heb.12`
/// compare equal.
pub fn normalize_shelfmark(shelfmark: &str) -> String {
    let without_prefix = SHELFMARK_PREFIX_RE.replace(shelfmark, "");
    let cleaned = NON_WORD_RE.replace_all(&without_prefix, "").to_lowercase();
    match cleaned.strip_prefix("ms") {
        Some(rest) => rest.to_string(),
        None => cleaned,
    }
}

/// Words of a catalogue title with punctuation removed and one-letter
/// words dropped.
pub fn clean_title_words(title: &str) -> Vec<String> {
    NON_WORD_RE
        .replace_all(title, " ")
        .split_whitespace()
        .filter(|w| w.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let map = CharMap::new(text);
    if map.char_len() <= max_chars {
        return text.to_string();
    }
    format!("{}...", map.slice(text, 0, max_chars))
}

/// Replace newlines with spaces for single-line display.
pub fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
