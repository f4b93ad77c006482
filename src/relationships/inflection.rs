//! Plural and singular forms for matching column prefixes to table names.
//!
//! Table names in a rules corpus are mostly regular English plurals
//! (`classes`, `skills`, `weapontypes`). The `inflector` crate covers those;
//! the list below covers the fantasy vocabulary it gets wrong.

use inflector::Inflector;

static IRREGULAR_PLURALS: &[(&str, &str)] = &[
    ("dwarf", "dwarves"),
    ("elf", "elves"),
    ("wolf", "wolves"),
    ("thief", "thieves"),
    ("staff", "staves"),
    ("die", "dice"),
    ("man", "men"),
    ("woman", "women"),
    ("person", "people"),
    ("child", "children"),
    ("mouse", "mice"),
    ("index", "indices"),
];

/// Plural of `word`, lowercased. Already-plural irregulars are returned as is.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }

    let lower = word.to_lowercase();
    for (singular, plural) in IRREGULAR_PLURALS {
        if lower == *singular || lower == *plural {
            return plural.to_string();
        }
    }

    lower.to_plural()
}

/// Singular of `word`, lowercased.
pub fn singularize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }

    let lower = word.to_lowercase();
    for (singular, plural) in IRREGULAR_PLURALS {
        if lower == *plural || lower == *singular {
            return singular.to_string();
        }
    }

    lower.to_singular()
}
