//! Preference set merging
//!
//! A user's long-lived preferences are a small ordered set of tokens. New
//! keyword candidates are folded in with [`merge_tokens`], which is pure and
//! deterministic:
//!
//! 1. existing tokens first, then incoming tokens
//! 2. each element re-normalized, stop-words and sentinels dropped
//! 3. duplicates removed, first occurrence wins
//! 4. only the first `max_tokens` survive
//!
//! Keeping the first tokens means established preferences are never pushed
//! out by a burst of new candidates; overflow drops the newest incoming
//! tokens instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use super::normalizer::{join, normalize};
use sdk::types::{is_none_sentinel, NONE_SENTINEL};

/// Default maximum number of tokens kept per user
pub const DEFAULT_MAX_TOKENS: usize = 20;

/// Words that never carry a preference. The tokenizer should already have
/// removed them; merge drops them again.
pub const DEFAULT_STOP_WORDS: &[&str] = &[
    "的", "了", "是", "我", "你", "他", "她", "它", "在", "有", "和", "就", "都", "而", "及", "与",
    "也", "还", "吗", "呢", "吧", "啊", "哦", "嗯", "这", "那", "哪", "什么", "怎么", "为什么",
    "推荐", "一款", "适合", "喜欢", "是的", "今天", "明天", "昨天", "天气", "怎么样", "如何",
    "多少", "何时", "何地", "哪里", "哪些", "查询", "问", "打听", "了解", "知道", "你好",
    "我喜欢什么",
];

/// Cap and stop-word list applied by every merge
#[derive(Debug, Clone)]
pub struct MergePolicy {
    max_tokens: usize,
    stop_words: HashSet<String>,
}

impl MergePolicy {
    /// Policy with the given cap and the default stop-words
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            stop_words: DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }

    /// Add stop-words on top of the defaults
    pub fn with_extra_stop_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for word in words {
            let word: String = word.into();
            self.stop_words.insert(word.trim().to_string());
        }
        self
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn is_stop_word(&self, token: &str) -> bool {
        self.stop_words.contains(token)
    }
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKENS)
    }
}

/// Merge two token sequences under `policy`.
pub fn merge_tokens(existing: &[String], incoming: &[String], policy: &MergePolicy) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    let candidates = existing
        .iter()
        .chain(incoming.iter())
        .flat_map(|element| normalize(element));

    for token in candidates {
        if is_none_sentinel(&token) || policy.is_stop_word(&token) {
            debug!(token = %token, "Dropping stop-word during merge");
            continue;
        }
        if seen.insert(token.clone()) {
            merged.push(token);
        }
    }

    if merged.len() > policy.max_tokens {
        debug!(
            kept = policy.max_tokens,
            dropped = merged.len() - policy.max_tokens,
            "Preference cap reached, truncating newest tokens"
        );
        merged.truncate(policy.max_tokens);
    }

    merged
}

/// String-level merge: both sides are keyword blobs, the result is a
/// canonical preference string or the "none" sentinel.
pub fn merge(existing: &str, incoming: &str, policy: &MergePolicy) -> String {
    let merged = merge_tokens(&normalize(existing), &normalize(incoming), policy);
    if merged.is_empty() {
        NONE_SENTINEL.to_string()
    } else {
        join(&merged)
    }
}

/// A single retained preference token and when it was first seen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceItem {
    pub value: String,
    pub created_at: DateTime<Utc>,
}

/// The bounded, deduplicated preference tokens of one user.
///
/// Only constructible through merging, so the cap and the dedup rule hold
/// for every instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferenceSet {
    items: Vec<PreferenceItem>,
}

impl PreferenceSet {
    /// An empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from stored items, re-applying the policy. Items keep
    /// their stored timestamps.
    pub fn from_items(items: Vec<PreferenceItem>, policy: &MergePolicy) -> Self {
        let retained = {
            let values: Vec<String> = items.iter().map(|i| i.value.clone()).collect();
            merge_tokens(&values, &[], policy)
        };

        let items = retained
            .into_iter()
            .map(|value| {
                let created_at = items
                    .iter()
                    .find(|item| item.value.trim() == value)
                    .map(|item| item.created_at)
                    .unwrap_or_else(Utc::now);
                PreferenceItem { value, created_at }
            })
            .collect();

        Self { items }
    }

    /// Merge `incoming` tokens into a new set. New tokens are stamped
    /// with `now`; retained tokens keep their original timestamp.
    pub fn merged(&self, incoming: &[String], policy: &MergePolicy, now: DateTime<Utc>) -> Self {
        let retained = merge_tokens(&self.tokens(), incoming, policy);

        let items = retained
            .into_iter()
            .map(|value| match self.items.iter().find(|i| i.value == value) {
                Some(existing) => existing.clone(),
                None => PreferenceItem {
                    value,
                    created_at: now,
                },
            })
            .collect();

        Self { items }
    }

    pub fn tokens(&self) -> Vec<String> {
        self.items.iter().map(|i| i.value.clone()).collect()
    }

    pub fn items(&self) -> &[PreferenceItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.items.iter().any(|i| i.value == token)
    }

    /// Canonical preference string, or the "none" sentinel when empty
    pub fn to_preference_string(&self) -> String {
        if self.items.is_empty() {
            NONE_SENTINEL.to_string()
        } else {
            join(&self.tokens())
        }
    }
}

impl fmt::Display for PreferenceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_preference_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_dedups_and_keeps_order() {
        let policy = MergePolicy::default();
        let merged = merge_tokens(
            &toks(&["fishing", "reading"]),
            &toks(&["fishing", "movies"]),
            &policy,
        );
        assert_eq!(merged, toks(&["fishing", "reading", "movies"]));
    }

    #[test]
    fn test_merge_string_level() {
        let policy = MergePolicy::default();
        assert_eq!(
            merge("fishing,reading", "fishing，movies", &policy),
            "fishing,reading,movies"
        );
    }

    #[test]
    fn test_merge_empty_is_sentinel() {
        let policy = MergePolicy::default();
        assert_eq!(merge("", "none", &policy), NONE_SENTINEL);
        assert_eq!(merge("无", "", &policy), NONE_SENTINEL);
    }

    #[test]
    fn test_stop_words_dropped() {
        let policy = MergePolicy::default().with_extra_stop_words(["weather"]);
        let merged = merge_tokens(&toks(&["喜欢", "tea"]), &toks(&["weather", "熊猫"]), &policy);
        assert_eq!(merged, toks(&["tea", "熊猫"]));
    }

    #[test]
    fn test_cap_keeps_established_tokens() {
        let policy = MergePolicy::new(3);
        let merged = merge_tokens(&toks(&["a", "b"]), &toks(&["c", "d", "e"]), &policy);
        assert_eq!(merged, toks(&["a", "b", "c"]));
    }

    #[test]
    fn test_elements_with_separators_are_split() {
        let policy = MergePolicy::default();
        let merged = merge_tokens(&toks(&["a,b"]), &toks(&[" b 、c "]), &policy);
        assert_eq!(merged, toks(&["a", "b", "c"]));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let policy = MergePolicy::new(4);
        let a = toks(&["x", "y", "z"]);
        let b = toks(&["z", "w", "v", "u"]);
        let once = merge_tokens(&a, &b, &policy);
        let twice = merge_tokens(&once, &b, &policy);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_preference_set_keeps_timestamps() {
        let policy = MergePolicy::default();
        let t0 = Utc::now() - chrono::Duration::days(3);
        let t1 = Utc::now();

        let first = PreferenceSet::new().merged(&toks(&["tea"]), &policy, t0);
        let second = first.merged(&toks(&["tea", "coffee"]), &policy, t1);

        assert_eq!(second.len(), 2);
        assert_eq!(second.items()[0].created_at, t0);
        assert_eq!(second.items()[1].created_at, t1);
        assert_eq!(second.to_string(), "tea,coffee");
    }

    #[test]
    fn test_from_items_reapplies_policy() {
        let now = Utc::now();
        let items = ["a", "a", "的", "b", "c"]
            .iter()
            .map(|v| PreferenceItem {
                value: v.to_string(),
                created_at: now,
            })
            .collect();

        let set = PreferenceSet::from_items(items, &MergePolicy::new(2));
        assert_eq!(set.tokens(), toks(&["a", "b"]));
    }

    #[test]
    fn test_empty_set_renders_sentinel() {
        assert_eq!(PreferenceSet::new().to_preference_string(), NONE_SENTINEL);
        assert!(!PreferenceSet::new().contains("tea"));
    }
}
