//! Text normalization shared by capability scoring and document naming.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+").expect("word pattern should be valid"));

/// Words of the task text that go into a document name.
const NAME_WORDS: usize = 4;
/// Upper bound on the slug part of a document name.
const NAME_SLUG_MAX: usize = 40;
/// Hex chars of the text digest appended to a document name.
const NAME_HASH_LEN: usize = 8;

/// Lower-case `text` and fold Polish diacritics to ASCII.
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'ą' => 'a',
            'ć' => 'c',
            'ę' => 'e',
            'ł' => 'l',
            'ń' => 'n',
            'ó' => 'o',
            'ś' => 's',
            'ź' | 'ż' => 'z',
            other => other,
        })
        .collect()
}

/// Folded word tokens of `text`, in order.
pub fn tokenize(text: &str) -> Vec<String> {
    let folded = fold(text);
    WORD.find_iter(&folded)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Sum of weights of distinct keywords that prefix at least one token,
/// saturating at `u32::MAX`.
///
/// Keywords are stems: `wiadomo` matches `wiadomości`.
pub fn keyword_score(keywords: &BTreeMap<String, u32>, tokens: &[String]) -> u32 {
    keywords
        .iter()
        .filter(|(keyword, _)| {
            let stem = fold(keyword);
            !stem.is_empty() && tokens.iter().any(|token| token.starts_with(&stem))
        })
        .map(|(_, weight)| *weight)
        .fold(0u32, u32::saturating_add)
}

/// Collapse runs of whitespace and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deterministic document name for a task text: `<slug>-<hash8>`.
///
/// The slug is built from the first few words; the hash covers the whole
/// whitespace-normalized text so distinct tasks with the same opening words
/// get distinct names.
pub fn document_name(text: &str) -> String {
    let normalized = normalize_whitespace(text);
    let mut slug = String::new();
    for token in WORD.find_iter(&fold(&normalized)).take(NAME_WORDS) {
        let word: String = token
            .as_str()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        if word.is_empty() {
            continue;
        }
        let extra = if slug.is_empty() { word.len() } else { word.len() + 1 };
        if slug.len() + extra > NAME_SLUG_MAX {
            break;
        }
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(&word);
    }
    if slug.is_empty() {
        slug.push_str("task");
    }

    let digest = Sha256::digest(normalized.as_bytes());
    let hash = hex::encode(digest);
    format!("{slug}-{}", &hash[..NAME_HASH_LEN])
}

/// Validate that a name is safe as a filename stem.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if name.starts_with('.') {
        return Err("name must not start with '.'".to_string());
    }
    if name
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(format!("name must be [A-Za-z0-9._-] only (got '{name}')"));
    }
    Ok(())
}
