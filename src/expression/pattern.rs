use crate::core::{DbError, Result};
use lru::LruCache;
use regex::{Regex, RegexBuilder};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const PATTERN_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(200) {
    Some(n) => n,
    None => panic!("pattern cache capacity must be non-zero"),
};

lazy_static::lazy_static! {
    static ref REGEX_LRU_CACHE: Arc<Mutex<LruCache<String, Arc<Regex>>>> =
        Arc::new(Mutex::new(LruCache::new(PATTERN_CACHE_CAPACITY)));
}

/// Convert a LIKE pattern into an anchored regex
#[inline]
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                regex.push_str(&regex::escape(&chars[i].to_string()));
            }
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    regex.push('$');
    regex
}

/// Fast path for simple patterns (no regex)
#[inline]
fn fast_path_like(text: &str, pattern: &str, case_sensitive: bool) -> Option<bool> {
    if pattern.contains('\\') || pattern.contains('_') {
        return None;
    }

    // 1. No wildcards at all
    if !pattern.contains('%') {
        return Some(if case_sensitive {
            text == pattern
        } else {
            text.to_lowercase() == pattern.to_lowercase()
        });
    }

    // 2. "prefix%"
    if let Some(prefix) = pattern.strip_suffix('%')
        && !prefix.contains('%')
    {
        return Some(starts_with(text, prefix, case_sensitive));
    }

    // 3. "%suffix"
    if let Some(suffix) = pattern.strip_prefix('%')
        && !suffix.contains('%')
    {
        return Some(ends_with(text, suffix, case_sensitive));
    }

    // 4. "%substring%"
    if pattern.len() >= 2
        && pattern.starts_with('%')
        && pattern.ends_with('%')
        && pattern.matches('%').count() == 2
    {
        let substring = &pattern[1..pattern.len() - 1];
        return Some(contains(text, substring, case_sensitive));
    }

    None
}

fn cached_regex(cache_key: String, build: impl FnOnce() -> Result<Regex>) -> Result<Arc<Regex>> {
    {
        let mut cache = REGEX_LRU_CACHE.lock()?;
        if let Some(regex) = cache.get(&cache_key) {
            return Ok(Arc::clone(regex));
        }
    }

    let compiled = Arc::new(build()?);

    {
        let mut cache = REGEX_LRU_CACHE.lock()?;
        cache.put(cache_key, Arc::clone(&compiled));
    }

    Ok(compiled)
}

fn compile(pattern: &str, case_sensitive: bool, what: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| DbError::ExecutionError(format!("Invalid {} pattern: {}", what, e)))
}

/// Evaluate a SQL LIKE pattern (`%` and `_` wildcards, `\` escapes).
#[inline]
pub fn eval_like(text: &str, pattern: &str, case_sensitive: bool) -> Result<bool> {
    if let Some(result) = fast_path_like(text, pattern, case_sensitive) {
        return Ok(result);
    }

    let key = format!("{}:{}", if case_sensitive { "s" } else { "i" }, pattern);
    let regex = cached_regex(key, || compile(&like_to_regex(pattern), case_sensitive, "LIKE"))?;
    Ok(regex.is_match(text))
}

/// Evaluate an unanchored regular expression search.
pub fn eval_regex(text: &str, pattern: &str, case_sensitive: bool) -> Result<bool> {
    let key = format!("{}:{}", if case_sensitive { "rs" } else { "ri" }, pattern);
    let regex = cached_regex(key, || compile(pattern, case_sensitive, "regex"))?;
    Ok(regex.is_match(text))
}

pub fn starts_with(text: &str, prefix: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        text.starts_with(prefix)
    } else {
        text.to_lowercase().starts_with(&prefix.to_lowercase())
    }
}

pub fn ends_with(text: &str, suffix: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        text.ends_with(suffix)
    } else {
        text.to_lowercase().ends_with(&suffix.to_lowercase())
    }
}

pub fn contains(text: &str, needle: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        text.contains(needle)
    } else {
        text.to_lowercase().contains(&needle.to_lowercase())
    }
}
