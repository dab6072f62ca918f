// File: detector.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

const WORD_SUFFIXES: &[&str] = &["", "s", "ned", "ning", "med", "ming"];

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\s]+").unwrap());
static MARKUP_RESIDUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[<>{}=;]|^(function|var|const)\b|^\d+px|^rgba?\(|^https?://").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Significance {
    None,
    Cosmetic,
    Substantive,
}

impl std::fmt::Display for Significance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Significance::None => write!(f, "none"),
            Significance::Cosmetic => write!(f, "cosmetic"),
            Significance::Substantive => write!(f, "substantive"),
        }
    }
}

/// Thresholds for classifying a diff. The defaults favour precision: anything
/// without a clear policy signal is reported as cosmetic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorSettings {
    pub min_diff_chars: usize,
    pub min_diff_words: usize,
    pub min_indicator_terms: usize,
    pub noise_ratio_threshold: f64,
    pub short_diff_words: usize,
    pub large_diff_words: usize,
    /// Matched as word prefixes.
    pub indicator_stems: Vec<String>,
    /// Matched as whole words, optionally followed by one of `WORD_SUFFIXES`.
    #[serde(default)]
    pub indicator_words: Vec<String>,
    pub navigation_terms: Vec<String>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            min_diff_chars: 50,
            min_diff_words: 8,
            min_indicator_terms: 2,
            noise_ratio_threshold: 0.5,
            short_diff_words: 200,
            large_diff_words: 60,
            indicator_stems: strings(&[
                "prohibit", "suspen", "enforce", "violat", "remov", "terminat", "penalt",
                "strike", "restrict", "complian", "harass", "hateful", "violen", "safety",
                "appeal", "illegal", "fraud", "counterfeit", "weapon", "exploit", "abuse",
                "moderat", "takedown", "infring",
            ]),
            indicator_words: strings(&["ban", "minor", "scam"]),
            navigation_terms: strings(&[
                "home", "menu", "login", "log", "sign", "search", "skip", "navigation",
                "share", "copyright", "subscribe", "follow", "download", "app", "language",
                "english", "back", "next", "previous", "top", "close", "open", "click",
            ]),
        }
    }
}

/// Lines present in only one of the two texts, counted as multisets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffRegion<'a> {
    pub added: Vec<&'a str>,
    pub removed: Vec<&'a str>,
}

impl<'a> DiffRegion<'a> {
    pub fn between(old: &'a str, new: &'a str) -> Self {
        let mut remaining: HashMap<&str, usize> = HashMap::new();
        for line in old.lines() {
            *remaining.entry(line).or_insert(0) += 1;
        }

        let mut added = Vec::new();
        for line in new.lines() {
            match remaining.get_mut(line) {
                Some(count) if *count > 0 => *count -= 1,
                _ => added.push(line),
            }
        }

        let mut removed = Vec::new();
        for line in old.lines() {
            if let Some(count) = remaining.get_mut(line) {
                if *count > 0 {
                    *count -= 1;
                    removed.push(line);
                }
            }
        }

        Self { added, removed }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn text(&self) -> String {
        self.added
            .iter()
            .chain(self.removed.iter())
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiffScore {
    pub chars: usize,
    pub words: usize,
    pub noise_ratio: f64,
    pub indicators: BTreeSet<String>,
}

pub struct ChangeDetector {
    settings: DetectorSettings,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(DetectorSettings::default())
    }
}

impl ChangeDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    pub fn evaluate(&self, old: &str, new: &str, is_new_page: bool) -> (Significance, String) {
        if is_new_page {
            return (Significance::Substantive, "initial capture".to_string());
        }
        if old == new {
            return (Significance::None, "no change".to_string());
        }

        let region = DiffRegion::between(old, new);
        if region.is_empty() {
            // Same lines, different order.
            return (
                Significance::Cosmetic,
                "content reordered without new text".to_string(),
            );
        }

        let score = self.score(&region.text());
        debug!(
            "Diff score: {} chars, {} words, noise {:.2}, indicators {:?}",
            score.chars, score.words, score.noise_ratio, score.indicators
        );

        if score.chars < self.settings.min_diff_chars || score.words < self.settings.min_diff_words
        {
            return (
                Significance::Cosmetic,
                format!(
                    "too small to be meaningful ({} chars, {} words)",
                    score.chars, score.words
                ),
            );
        }

        if score.indicators.len() >= self.settings.min_indicator_terms {
            return (
                Significance::Substantive,
                format!(
                    "policy indicators in diff: {}",
                    score.indicators.iter().cloned().collect::<Vec<_>>().join(", ")
                ),
            );
        }

        let noise_heavy = score.noise_ratio >= self.settings.noise_ratio_threshold;
        if noise_heavy && score.words <= self.settings.short_diff_words {
            return (
                Significance::Cosmetic,
                format!("noise-heavy diff (noise ratio {:.2})", score.noise_ratio),
            );
        }

        if !noise_heavy
            && !score.indicators.is_empty()
            && score.words >= self.settings.large_diff_words
        {
            return (
                Significance::Substantive,
                format!(
                    "large prose change ({} words) mentioning {}",
                    score.words,
                    score.indicators.iter().cloned().collect::<Vec<_>>().join(", ")
                ),
            );
        }

        (
            Significance::Cosmetic,
            format!(
                "no substantive signal ({} words, {} indicator terms)",
                score.words,
                score.indicators.len()
            ),
        )
    }

    fn indicator_for(&self, word: &str) -> Option<&str> {
        let settings = &self.settings;
        if let Some(stem) = settings
            .indicator_stems
            .iter()
            .find(|stem| word.starts_with(stem.as_str()))
        {
            return Some(stem);
        }
        settings
            .indicator_words
            .iter()
            .find(|base| {
                word.strip_prefix(base.as_str())
                    .is_some_and(|rest| WORD_SUFFIXES.contains(&rest))
            })
            .map(String::as_str)
    }

    pub fn score(&self, region: &str) -> DiffScore {
        let tokens: Vec<&str> = TOKEN.find_iter(region).map(|m| m.as_str()).collect();
        let mut noise = 0usize;
        let mut indicators = BTreeSet::new();

        for token in &tokens {
            if MARKUP_RESIDUE.is_match(token) {
                noise += 1;
                continue;
            }
            let word = token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() {
                noise += 1;
                continue;
            }
            if self.settings.navigation_terms.iter().any(|t| *t == word) {
                noise += 1;
                continue;
            }
            if let Some(term) = self.indicator_for(&word) {
                indicators.insert(term.to_string());
            }
        }

        let words = tokens.len();
        DiffScore {
            chars: region.chars().filter(|c| !c.is_whitespace()).count(),
            words,
            noise_ratio: if words == 0 {
                0.0
            } else {
                noise as f64 / words as f64
            },
            indicators,
        }
    }
}

/// Evaluates with the default thresholds.
pub fn evaluate(old: &str, new: &str, is_new_page: bool) -> (Significance, String) {
    ChangeDetector::default().evaluate(old, new, is_new_page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BASE: &str = "Community Guidelines\nWe want everyone to feel safe.\nRespect others.";

    #[test]
    fn test_new_page_is_substantive() {
        let (significance, reason) = evaluate("", BASE, true);
        assert_eq!(significance, Significance::Substantive);
        assert_eq!(reason, "initial capture");
    }

    #[test]
    fn test_identical_text_is_none() {
        let (significance, _) = evaluate(BASE, BASE, false);
        assert_eq!(significance, Significance::None);
    }

    #[test]
    fn test_small_diff_is_cosmetic_even_with_keywords() {
        let new = format!("{}\nSuspend violation enforcement.", BASE);
        let (significance, reason) = evaluate(BASE, &new, false);
        assert_eq!(significance, Significance::Cosmetic);
        assert!(reason.starts_with("too small to be meaningful"));
    }

    #[test]
    fn test_words_sharing_a_short_prefix_are_not_indicators() {
        let new = format!(
            "{}\nWe refreshed the banner on the bank details page and the band photos, \
             which a minority of readers asked about.",
            BASE
        );
        let (significance, reason) = evaluate(BASE, &new, false);
        assert_eq!(significance, Significance::Cosmetic);
        assert!(!reason.contains("policy indicators"));

        let score = ChangeDetector::default().score("banner bank band minority scampered");
        assert!(score.indicators.is_empty());
    }

    #[test]
    fn test_whole_word_indicators_with_suffixes() {
        let score = ChangeDetector::default().score("banned bans minors scams ban");
        assert_eq!(
            score.indicators.into_iter().collect::<Vec<_>>(),
            vec!["ban".to_string(), "minor".to_string(), "scam".to_string()]
        );
    }

    #[test]
    fn test_policy_keywords_above_floor_are_substantive() {
        let new = format!(
            "{}\nAccounts that repeatedly post violating content will face enforcement action, \
             and we may suspend the account for up to thirty days after a violation.",
            BASE
        );
        let (significance, reason) = evaluate(BASE, &new, false);
        assert_eq!(significance, Significance::Substantive);
        assert!(reason.contains("enforce"));
        assert!(reason.contains("suspen"));
        assert!(reason.contains("violat"));
    }

    #[test]
    fn test_navigation_noise_is_cosmetic() {
        let new = format!(
            "{}\nHome Menu Search Sign Login Share Download App Language English Back Next Top Close",
            BASE
        );
        let (significance, reason) = evaluate(BASE, &new, false);
        assert_eq!(significance, Significance::Cosmetic);
        assert!(reason.starts_with("noise-heavy"));
    }

    #[test]
    fn test_markup_residue_counts_as_noise() {
        let settings = DetectorSettings::default();
        let detector = ChangeDetector::new(settings);
        let score = detector.score("<div class=x> {color:red;} function() var a = 1;");
        assert!(score.noise_ratio >= 0.5);
    }

    #[test]
    fn test_prose_without_signal_defaults_to_cosmetic() {
        let new = format!(
            "{}\nOur team has refreshed the wording on this page so that it reads more clearly \
             for everyone who visits it.",
            BASE
        );
        let (significance, reason) = evaluate(BASE, &new, false);
        assert_eq!(significance, Significance::Cosmetic);
        assert!(reason.starts_with("no substantive signal"));
    }

    #[test]
    fn test_large_prose_change_with_single_indicator_is_substantive() {
        let paragraph = "Sellers are expected to describe every item accurately and ship \
                         orders within the promised window so buyers receive what they paid for. "
            .repeat(3);
        let new = format!("{}\n{} Listings for counterfeit goods are not allowed.", BASE, paragraph);
        let (significance, _) = evaluate(BASE, &new, false);
        assert_eq!(significance, Significance::Substantive);
    }

    #[test]
    fn test_reordered_lines_are_cosmetic() {
        let reordered = "Respect others.\nCommunity Guidelines\nWe want everyone to feel safe.";
        let (significance, _) = evaluate(BASE, reordered, false);
        assert_eq!(significance, Significance::Cosmetic);
    }

    #[test]
    fn test_diff_region_multiset() {
        let region = DiffRegion::between("a\nb\nb\nc", "a\nb\nc\nd");
        assert_eq!(region.added, vec!["d"]);
        assert_eq!(region.removed, vec!["b"]);
    }

    #[test]
    fn test_removed_policy_text_is_scored() {
        let old = format!(
            "{}\nWe will suspend accounts and take enforcement action after repeated violations \
             of these rules by any member.",
            BASE
        );
        let (significance, _) = evaluate(&old, BASE, false);
        assert_eq!(significance, Significance::Substantive);
    }

    #[test]
    fn test_significance_display() {
        assert_eq!(Significance::None.to_string(), "none");
        assert_eq!(Significance::Cosmetic.to_string(), "cosmetic");
        assert_eq!(Significance::Substantive.to_string(), "substantive");
    }
}
