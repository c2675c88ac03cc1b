use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::store::Document;

/// Longest prefix stored per term; the full term is always stored as well.
pub const MAX_PREFIX_CHARS: usize = 12;

static ZH_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[，,/=\\]").unwrap());
static GENERIC_ALIAS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9\-]+$").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEntry {
    /// A list of names, or the original value when no name survived.
    pub zh: Value,
    pub en: String,
    pub alias: Vec<String>,
    pub keywords: Vec<String>,
}

impl NormalizedEntry {
    pub fn into_fields(self) -> Document {
        let mut fields = Document::new();
        fields.insert("zh".into(), self.zh);
        fields.insert("en".into(), Value::String(self.en));
        fields.insert("alias".into(), string_array(self.alias));
        fields.insert("keywords".into(), string_array(self.keywords));
        fields
    }
}

fn string_array(values: Vec<String>) -> Value {
    Value::Array(values.into_iter().map(Value::String).collect())
}

/// Insertion-ordered set of strings.
#[derive(Debug, Default)]
struct OrderedSet {
    seen: HashSet<String>,
    items: Vec<String>,
}

impl OrderedSet {
    fn insert(&mut self, value: String) {
        if self.seen.insert(value.clone()) {
            self.items.push(value);
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.items
    }
}

pub fn normalize(doc: &Document) -> NormalizedEntry {
    let zh_list = zh_names(doc.get("zh"));
    let en = doc
        .get("en")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let mut aliases = OrderedSet::default();
    if !en.is_empty() {
        aliases.insert(en.to_lowercase());
    }
    if let Some(existing) = doc.get("alias").and_then(Value::as_array) {
        for alias in existing.iter().filter_map(Value::as_str).map(str::trim) {
            if !alias.is_empty() {
                aliases.insert(alias.to_lowercase());
            }
        }
    }
    let alias: Vec<String> = aliases
        .into_vec()
        .into_iter()
        .filter(|alias| GENERIC_ALIAS.is_match(alias))
        .collect();

    let mut keywords = OrderedSet::default();
    let terms = zh_list
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(en.as_str()))
        .chain(alias.iter().map(String::as_str));
    for term in terms {
        for keyword in keyword_prefixes(term) {
            keywords.insert(keyword);
        }
    }

    let zh = if !zh_list.is_empty() {
        string_array(zh_list)
    } else {
        match doc.get("zh") {
            Some(Value::String(raw)) => Value::String(raw.clone()),
            _ => Value::String(String::new()),
        }
    };

    NormalizedEntry {
        zh,
        en,
        alias,
        keywords: keywords.into_vec(),
    }
}

fn zh_names(value: Option<&Value>) -> Vec<String> {
    let raw: Vec<String> = match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .collect(),
        Some(Value::String(joined)) => ZH_SEPARATORS
            .split(joined)
            .map(|s| s.trim().to_string())
            .collect(),
        _ => Vec::new(),
    };
    let mut names = OrderedSet::default();
    for name in raw.into_iter().filter(|s| !s.is_empty()) {
        names.insert(name);
    }
    names.into_vec()
}

/// Lowercase prefixes of `term` from one character up to
/// [`MAX_PREFIX_CHARS`], followed by the whole lowercase term.
pub fn keyword_prefixes(term: &str) -> Vec<String> {
    if term.is_empty() {
        return Vec::new();
    }
    let lowered = term.to_lowercase();
    let mut prefixes: Vec<String> = lowered
        .char_indices()
        .map(|(idx, ch)| lowered[..idx + ch.len_utf8()].to_string())
        .take(MAX_PREFIX_CHARS)
        .collect();
    if prefixes.last() != Some(&lowered) {
        prefixes.push(lowered);
    }
    prefixes
}
