// File: normalizer.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{WatchError, WatchResult};

const DENSE_LINE_MIN_LEN: usize = 500;
const DENSE_LINE_MAX_WHITESPACE_RATIO: f64 = 0.05;

const STRUCTURAL_TAGS: &[&str] = &[
    "head", "title", "script", "style", "meta", "link", "noscript", "template", "nav", "header",
    "footer",
];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "details", "div", "dl", "dt",
    "figcaption", "figure", "form", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "li", "main",
    "ol", "p", "pre", "section", "summary", "table", "td", "th", "tr", "ul",
];

static HIDDEN_STYLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)display\s*:\s*none").unwrap());
static TERMINAL_PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?](\s|$)").unwrap());
static RAW_NOISE_BLOCKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());
static RAW_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static DEFAULT_NORMALIZER: Lazy<Normalizer> = Lazy::new(|| {
    Normalizer::new(NormalizerRules::default()).expect("built-in normalizer rules are valid")
});

/// Boilerplate handling for one family of sources, selected by slug prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFamily {
    pub name: String,
    pub slug_prefixes: Vec<String>,
    #[serde(default)]
    pub denylist: Vec<String>,
    #[serde(default)]
    pub trim_leading: bool,
}

impl SourceFamily {
    fn matches(&self, slug: &str) -> bool {
        let slug = slug.to_lowercase();
        self.slug_prefixes
            .iter()
            .any(|prefix| slug.starts_with(&prefix.to_lowercase()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerRules {
    pub version: u32,
    pub main_content_selectors: Vec<String>,
    pub noise_selectors: Vec<String>,
    pub session_id_pattern: String,
    #[serde(default)]
    pub global_denylist: Vec<String>,
    #[serde(default)]
    pub families: Vec<SourceFamily>,
}

impl Default for NormalizerRules {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            version: 1,
            main_content_selectors: strings(&[
                r#"div.article-body[itemprop="articleBody"]"#,
                "div.article-body",
                r#"[itemprop="articleBody"]"#,
                r#"[role="main"]"#,
                "main",
            ]),
            noise_selectors: strings(&[
                r#"[class*="feedback"]"#,
                r#"[id*="feedback"]"#,
                r#"[class*="survey"]"#,
                r#"[class*="follow-button"]"#,
                r#"[class*="subscribe"]"#,
                r#"[role="search"]"#,
                r#"input[type="search"]"#,
                r#"form[action*="search"]"#,
                r#"[class*="search-box"]"#,
                "[hidden]",
            ]),
            session_id_pattern: r"(?i)(\d{5,}|[0-9a-f]{12,}|^:r[0-9a-z]+:$|^(ember|yui_|gwt-)\w*\d)"
                .to_string(),
            global_denylist: strings(&[
                "accept all cookies",
                "cookie preferences",
                "cookie settings",
                "manage cookies",
                "we use cookies",
            ]),
            families: vec![
                SourceFamily {
                    name: "google-help".to_string(),
                    slug_prefixes: strings(&["youtube", "google"]),
                    denylist: strings(&[
                        "was this helpful?",
                        "need more help?",
                        "send feedback",
                        "help center community",
                        "try asking the help community",
                        "sign in for additional support options",
                    ]),
                    trim_leading: true,
                },
                SourceFamily {
                    name: "tiktok".to_string(),
                    slug_prefixes: strings(&["tiktok"]),
                    denylist: strings(&["download tiktok", "log in to follow creators"]),
                    trim_leading: true,
                },
                SourceFamily {
                    name: "meta".to_string(),
                    slug_prefixes: strings(&["meta", "facebook", "instagram"]),
                    denylist: strings(&["skip to content", "transparency center home"]),
                    trim_leading: false,
                },
            ],
        }
    }
}

impl NormalizerRules {
    pub fn load(path: &Path) -> WatchResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WatchError::Configuration(format!("Could not read rules {}: {}", path.display(), e))
        })?;
        let rules: NormalizerRules = serde_json::from_str(&raw).map_err(|e| {
            WatchError::Configuration(format!("Invalid rules file {}: {}", path.display(), e))
        })?;
        debug!("Loaded normalizer rules v{} from {}", rules.version, path.display());
        Ok(rules)
    }

    pub fn family_for(&self, slug: &str) -> Option<&SourceFamily> {
        self.families.iter().find(|family| family.matches(slug))
    }
}

fn parse_selector(raw: &str) -> WatchResult<Selector> {
    Selector::parse(raw)
        .map_err(|e| WatchError::Configuration(format!("Invalid selector '{}': {:?}", raw, e)))
}

pub struct Normalizer {
    rules: NormalizerRules,
    main_content: Vec<Selector>,
    noise: Vec<Selector>,
    session_id: Regex,
}

impl Normalizer {
    pub fn new(rules: NormalizerRules) -> WatchResult<Self> {
        let main_content = rules
            .main_content_selectors
            .iter()
            .map(|s| parse_selector(s))
            .collect::<WatchResult<Vec<_>>>()?;
        let noise = rules
            .noise_selectors
            .iter()
            .map(|s| parse_selector(s))
            .collect::<WatchResult<Vec<_>>>()?;
        let session_id = Regex::new(&rules.session_id_pattern).map_err(|e| {
            WatchError::Configuration(format!("Invalid session id pattern: {}", e))
        })?;

        Ok(Self {
            rules,
            main_content,
            noise,
            session_id,
        })
    }

    pub fn rules(&self) -> &NormalizerRules {
        &self.rules
    }

    pub fn normalize(&self, raw_html: &str, slug_hint: &str) -> String {
        let document = Html::parse_document(raw_html);
        let family = self.rules.family_for(slug_hint);

        let main = self
            .main_content
            .iter()
            .find_map(|selector| document.select(selector).next());

        let mut lines = self.extract_lines(main.unwrap_or_else(|| document.root_element()));
        if lines.is_empty() && main.is_some() {
            debug!("Main content container for {} was empty, using whole document", slug_hint);
            lines = self.extract_lines(document.root_element());
        }

        let filtered = self.filter_lines(lines, family);
        let trimmed = match family {
            Some(f) if f.trim_leading => trim_leading_boilerplate(&filtered),
            _ => filtered,
        };

        if trimmed.is_empty() && !raw_html.trim().is_empty() {
            warn!(
                "Structured normalization of {} produced no text, falling back to raw text",
                slug_hint
            );
            return raw_text_fallback(raw_html);
        }

        trimmed.join("\n")
    }

    fn extract_lines(&self, root: ElementRef) -> Vec<String> {
        let mut buffer = String::new();
        self.collect_text(root, &mut buffer);
        buffer
            .split('\n')
            .map(collapse_whitespace)
            .filter(|line| !line.is_empty())
            .collect()
    }

    fn collect_text(&self, element: ElementRef, buffer: &mut String) {
        let block = BLOCK_TAGS.contains(&element.value().name());
        if block {
            buffer.push('\n');
        }
        for child in element.children() {
            match child.value() {
                // Source line wrapping is not meaningful; only blocks break lines.
                Node::Text(text) => buffer.extend(text.chars().map(|c| match c {
                    '\n' | '\r' => ' ',
                    other => other,
                })),
                Node::Element(_) => {
                    if let Some(child_element) = ElementRef::wrap(child) {
                        if !self.is_noise(&child_element) {
                            self.collect_text(child_element, buffer);
                        }
                    }
                }
                _ => {}
            }
        }
        if block {
            buffer.push('\n');
        }
    }

    fn is_noise(&self, element: &ElementRef) -> bool {
        let value = element.value();
        if STRUCTURAL_TAGS.contains(&value.name()) {
            return true;
        }
        if let Some(id) = value.id() {
            if self.session_id.is_match(id) {
                return true;
            }
        }
        if let Some(style) = value.attr("style") {
            if HIDDEN_STYLE.is_match(style) {
                return true;
            }
        }
        self.noise.iter().any(|selector| selector.matches(element))
    }

    fn filter_lines(&self, lines: Vec<String>, family: Option<&SourceFamily>) -> Vec<String> {
        let family_denylist: &[String] = family.map(|f| f.denylist.as_slice()).unwrap_or(&[]);

        lines
            .into_iter()
            .filter(|line| {
                let lowered = line.to_lowercase();
                let denied = self
                    .rules
                    .global_denylist
                    .iter()
                    .chain(family_denylist.iter())
                    .any(|phrase| lowered.contains(&phrase.to_lowercase()));
                !denied && !is_dense_blob(line)
            })
            .collect()
    }
}

/// Normalizes with the built-in rule set.
pub fn normalize(raw_html: &str, slug_hint: &str) -> String {
    DEFAULT_NORMALIZER.normalize(raw_html, slug_hint)
}

fn collapse_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_dense_blob(line: &str) -> bool {
    let len = line.chars().count();
    if len <= DENSE_LINE_MIN_LEN {
        return false;
    }
    let whitespace = line.chars().filter(|c| c.is_whitespace()).count();
    (whitespace as f64 / len as f64) < DENSE_LINE_MAX_WHITESPACE_RATIO
}

/// Drops leading lines until prose starts. Returns the input unchanged when no
/// line looks like a sentence.
fn trim_leading_boilerplate(lines: &[String]) -> Vec<String> {
    match lines
        .iter()
        .position(|line| TERMINAL_PUNCTUATION.is_match(line))
    {
        Some(start) => lines[start..].to_vec(),
        None => lines.to_vec(),
    }
}

fn raw_text_fallback(raw_html: &str) -> String {
    let without_blocks = RAW_NOISE_BLOCKS.replace_all(raw_html, "\n");
    let without_tags = RAW_TAGS.replace_all(&without_blocks, "\n");
    without_tags
        .split('\n')
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[path = "normalizer_tests.rs"]
mod tests;
