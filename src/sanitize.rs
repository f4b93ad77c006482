//! Identifier sanitization.
//!
//! Table and column names come from third-party content and may contain
//! anything: spaces, punctuation, leading digits, keywords, or nothing at all.
//! Everything downstream (record schemas, field lookup, cached descriptors)
//! works on identifiers produced here.
//!
//! # Policy
//!
//! ```text
//! "Base Attack+"   -> "Base_Attack_plus"
//! "2ndLevel"       -> "col_2ndLevel"
//! "match"          -> "match_"
//! ""               -> "empty_field"
//! "???"            -> "q_q_q"
//! "~~~"            -> "unnamed_field"
//! ```
//!
//! Sanitization never fails. [`sanitize_unique_columns`] additionally makes a
//! whole column list pairwise distinct.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use once_cell::sync::Lazy;

/// Placeholder for an empty input name.
pub const EMPTY_PLACEHOLDER: &str = "empty_field";

/// Placeholder for a non-empty name that sanitizes to nothing.
pub const UNNAMED_PLACEHOLDER: &str = "unnamed_field";

/// Prefix for names that would otherwise start with a digit.
pub const DIGIT_PREFIX: &str = "col_";

/// Prefix for the last-resort hashed identifier.
pub const HASH_PREFIX: &str = "field_";

/// Known table file suffix, stripped by [`sanitize_table_name`].
pub const TABLE_FILE_SUFFIX: &str = ".2da";

/// Upper bound (exclusive) of the numeric part of a hashed identifier.
const HASH_BOUND: u64 = 1_000_000;

/// Symbols that carry meaning in column names and are spelled out instead of
/// being dropped, so `AC+` and `AC-` stay distinguishable.
static SYMBOL_WORDS: &[(char, &str)] = &[
    ('+', "plus"),
    ('&', "and"),
    ('|', "or"),
    ('%', "pct"),
    ('#', "num"),
    ('@', "at"),
    ('!', "not"),
    ('?', "q"),
    ('*', "star"),
    ('$', "dollar"),
];

/// Punctuation that separates words. Replaced with `_`.
const STRUCTURAL: &[char] = &[
    '-', '.', '/', '\\', ':', ';', ',', '(', ')', '[', ']', '{', '}', '<', '>', '=', '\'', '"',
    '`', '~', '^',
];

/// Strict and reserved Rust keywords.
static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
        "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
        "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait",
        "true", "type", "unsafe", "use", "where", "while", "abstract", "become", "box", "do",
        "final", "gen", "macro", "override", "priv", "try", "typeof", "unsized", "virtual",
        "yield",
    ]
    .into_iter()
    .collect()
});

/// Returns true if `name` is a reserved keyword.
pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(name)
}

/// Returns true if `name` is a non-empty ASCII identifier that does not start
/// with a digit and is not a keyword.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return false;
    }
    // A run of underscores names nothing.
    if name.bytes().all(|b| b == b'_') {
        return false;
    }
    !is_keyword(name)
}

/// Map an arbitrary external name to a safe identifier.
pub fn sanitize(name: &str) -> String {
    if name.is_empty() {
        return EMPTY_PLACEHOLDER.to_string();
    }
    if is_valid_identifier(name) {
        return name.to_string();
    }

    let mut spelled = String::with_capacity(name.len() + 8);
    for c in name.chars() {
        if c.is_whitespace() || STRUCTURAL.contains(&c) {
            spelled.push('_');
        } else if let Some((_, word)) = SYMBOL_WORDS.iter().find(|(symbol, _)| *symbol == c) {
            spelled.push('_');
            spelled.push_str(word);
            spelled.push('_');
        } else if c.is_ascii_alphanumeric() || c == '_' {
            spelled.push(c);
        }
    }

    let mut result = collapse_underscores(&spelled);

    if result.is_empty() {
        return UNNAMED_PLACEHOLDER.to_string();
    }

    if result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert_str(0, DIGIT_PREFIX);
    }

    if is_keyword(&result) {
        result.push('_');
    }

    if is_valid_identifier(&result) {
        result
    } else {
        hashed_identifier(name)
    }
}

/// Sanitize a list of column names so that every output is distinct.
///
/// Comparison is case-insensitive because records also resolve fields
/// case-insensitively. The first occurrence keeps its plain name; later
/// collisions get `_2`, `_3`, ... in the order they are seen.
pub fn sanitize_unique_columns<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::with_capacity(names.len());
    let mut result = Vec::with_capacity(names.len());

    for name in names {
        let base = sanitize(name.as_ref());
        let mut candidate = base.clone();
        let mut counter = 2;
        while used.contains(&candidate.to_ascii_lowercase()) {
            candidate = format!("{}_{}", base, counter);
            counter += 1;
        }
        used.insert(candidate.to_ascii_lowercase());
        result.push(candidate);
    }

    result
}

/// Sanitize a table name into a type name: strip the `.2da` suffix, sanitize,
/// capitalize the first letter.
pub fn sanitize_table_name(name: &str) -> String {
    let stem = strip_table_suffix(name);
    let mut ident = sanitize(stem);
    if let Some(first) = ident.get(0..1) {
        let upper = first.to_ascii_uppercase();
        ident.replace_range(0..1, &upper);
    }
    if is_valid_identifier(&ident) {
        ident
    } else {
        hashed_identifier(name)
    }
}

/// Strip the known table file suffix (case-insensitive).
pub fn strip_table_suffix(name: &str) -> &str {
    let suffix_len = TABLE_FILE_SUFFIX.len();
    if name.len() >= suffix_len
        && name.is_char_boundary(name.len() - suffix_len)
        && name[name.len() - suffix_len..].eq_ignore_ascii_case(TABLE_FILE_SUFFIX)
    {
        &name[..name.len() - suffix_len]
    } else {
        name
    }
}

fn collapse_underscores(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_underscore = false;
    for c in s.chars() {
        if c == '_' {
            if !last_underscore {
                out.push('_');
            }
            last_underscore = true;
        } else {
            out.push(c);
            last_underscore = false;
        }
    }
    out.trim_matches('_').to_string()
}

/// Lossy fallback. Distinct inputs may collide here.
fn hashed_identifier(original: &str) -> String {
    let mut hasher = DefaultHasher::new();
    original.hash(&mut hasher);
    format!("{}{}", HASH_PREFIX, hasher.finish() % HASH_BOUND)
}
