//! Page analysis used by the evidence validator.
//!
//! Everything here is a pure function of the page body, a course name or a
//! website string, so the validator's scoring stays deterministic for a fixed
//! fetch result.

use crate::core::fetcher::normalize_url;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// 教育網站常見字詞，以不分大小寫的子字串比對
pub const EDU_KEYWORDS: [&str; 8] = [
    "admission",
    "course",
    "faculty",
    "campus",
    "semester",
    "syllabus",
    "placement",
    "department",
];

pub const EDUCATIONAL_MIN_KEYWORDS: usize = 2;

/// Share of a course name's significant words that must appear on the page.
pub const COURSE_WORD_MATCH_RATIO: f64 = 0.6;

const SIGNIFICANT_WORD_MIN_LEN: usize = 4;

const STOPWORDS: &[&str] = &[
    "with", "from", "into", "that", "this", "these", "those", "their", "about", "under", "over",
    "than", "through", "including", "based", "course", "courses", "program", "programme",
    "programs", "degree",
];

// 縮寫須整個 token 相符，避免 "nba" 之類誤中其他字
const RECOGNITION_ACRONYMS: &[&str] = &["ugc", "aicte", "naac", "nba", "nirf"];

const RECOGNITION_PHRASES: &[&str] = &[
    "recognized by",
    "recognised by",
    "affiliated to",
    "affiliated with",
    "approved by",
    "government of india",
    "ministry of education",
];

const PUBLIC_NAME_ACRONYMS: &[&str] = &["iit", "nit", "iiit", "aiims"];

const PUBLIC_NAME_PHRASES: &[&str] = &[
    "government",
    "govt",
    "central university",
    "state university",
    "national institute",
];

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>").expect("static regex")
});
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static regex"));

/// Strips markup and decodes the handful of entities that matter for keyword scans.
pub fn html_to_text(html: &str) -> String {
    let without_code = SCRIPT_OR_STYLE.replace_all(html, " ");
    let without_comments = COMMENT.replace_all(&without_code, " ");
    let text = TAG.replace_all(&without_comments, " ");

    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Lowercases and collapses runs of whitespace.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokenize(normalized: &str) -> impl Iterator<Item = &str> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
}

/// 正規化後的頁面文字與 token 集合
#[derive(Debug, Clone, Default)]
pub struct PageText {
    text: String,
    tokens: HashSet<String>,
}

impl PageText {
    pub fn new(plain_text: &str) -> Self {
        let text = normalize_text(plain_text);
        let tokens = tokenize(&text).map(str::to_string).collect();
        Self { text, tokens }
    }

    pub fn from_html(body: &str) -> Self {
        Self::new(&html_to_text(body))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn contains_phrase(&self, phrase: &str) -> bool {
        self.text.contains(phrase)
    }

    /// Like `contains_phrase`, but the phrase may not start or end inside a word.
    pub fn contains_words(&self, phrase: &str) -> bool {
        if phrase.is_empty() {
            return false;
        }
        let starts_alnum = phrase.starts_with(char::is_alphanumeric);
        let ends_alnum = phrase.ends_with(char::is_alphanumeric);

        self.text.match_indices(phrase).any(|(start, matched)| {
            let before = self.text[..start].chars().next_back();
            let after = self.text[start + matched.len()..].chars().next();
            !(starts_alnum && before.is_some_and(char::is_alphanumeric))
                && !(ends_alnum && after.is_some_and(char::is_alphanumeric))
        })
    }

    pub fn has_token(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }
}

pub fn count_edu_keywords(page: &PageText) -> usize {
    EDU_KEYWORDS
        .iter()
        .filter(|keyword| page.contains_phrase(keyword))
        .count()
}

pub fn significant_words(name: &str) -> Vec<String> {
    let normalized = normalize_text(name);
    let mut words: Vec<String> = Vec::new();
    for token in tokenize(&normalized) {
        if token.chars().count() < SIGNIFICANT_WORD_MIN_LEN || STOPWORDS.contains(&token) {
            continue;
        }
        if !words.iter().any(|w| w == token) {
            words.push(token.to_string());
        }
    }
    words
}

/// Fuzzy containment: the whole name as whole words, or enough of its significant words.
pub fn course_matches(page: &PageText, course_name: &str) -> bool {
    let normalized = normalize_text(course_name);
    if normalized.is_empty() {
        return false;
    }
    if page.contains_words(&normalized) {
        return true;
    }

    let words = significant_words(course_name);
    if words.is_empty() {
        return false;
    }

    let found = words.iter().filter(|word| page.has_token(word)).count();
    found as f64 / words.len() as f64 >= COURSE_WORD_MATCH_RATIO
}

pub fn find_recognition_terms(page: &PageText) -> Vec<&'static str> {
    let acronyms = RECOGNITION_ACRONYMS
        .iter()
        .filter(|acronym| page.has_token(acronym));
    let phrases = RECOGNITION_PHRASES
        .iter()
        .filter(|phrase| page.contains_phrase(phrase));
    acronyms.chain(phrases).copied().collect()
}

/// 只作為診斷資訊，不影響分數
pub fn name_suggests_public_institution(name: &str) -> bool {
    let page = PageText::new(name);
    PUBLIC_NAME_ACRONYMS.iter().any(|a| page.has_token(a))
        || PUBLIC_NAME_PHRASES.iter().any(|p| page.contains_phrase(p))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainType {
    GovernmentOfficial,
    Academic,
    Organization,
    Generic,
}

impl DomainType {
    pub fn label(&self) -> &'static str {
        match self {
            DomainType::GovernmentOfficial => "Government/Official (.gov.in)",
            DomainType::Academic => "Academic (.edu.in/.ac.in)",
            DomainType::Organization => "Organization (.org.in)",
            DomainType::Generic => "Generic (.com/.in/other)",
        }
    }

    pub fn adjustment(&self) -> f64 {
        match self {
            DomainType::GovernmentOfficial => 0.15,
            DomainType::Academic => 0.10,
            DomainType::Organization => 0.05,
            DomainType::Generic => 0.0,
        }
    }
}

fn host_of(website: &str) -> String {
    if let Some(host) = normalize_url(website)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
    {
        return host.to_lowercase();
    }

    // URL 解析失敗時退回純字串處理
    let lowered = website.trim().to_lowercase();
    let without_scheme = lowered
        .split_once("://")
        .map_or(lowered.as_str(), |(_, rest)| rest);
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    host.split(':').next().unwrap_or_default().to_string()
}

fn has_suffix(host: &str, suffix: &str) -> bool {
    host.strip_suffix(suffix)
        .is_some_and(|rest| rest.is_empty() || rest.ends_with('.'))
}

/// Classifies the website's registered suffix. Does not touch the network.
pub fn classify_domain(website: &str) -> DomainType {
    let host = host_of(website);
    let host = host.trim_end_matches('.');

    if has_suffix(host, "gov.in") {
        DomainType::GovernmentOfficial
    } else if has_suffix(host, "edu.in") || has_suffix(host, "ac.in") {
        DomainType::Academic
    } else if has_suffix(host, "org.in") {
        DomainType::Organization
    } else {
        DomainType::Generic
    }
}
