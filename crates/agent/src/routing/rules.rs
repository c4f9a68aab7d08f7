//! Deterministic routing rules.
//!
//! Pattern and keyword evidence for unambiguous requests. Evaluated in a
//! fixed order (CODE, OPS, ANALYZE, RESEARCH, PLAN); the first match wins.
//! The strong-code-evidence test is shared with the classifier gate.

use concierge_core::route::Route;
use regex_lite::Regex;
use std::sync::OnceLock;

/// Evidence tag for the code rule.
pub const STRONG_CODE_EVIDENCE: &str = "strong_code_evidence";

/// A rule that fired.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub route: Route,
    pub evidence: Vec<String>,
    pub reason: String,
}

struct CodePatterns {
    diff_hunk: Option<Regex>,
    java_frame: Option<Regex>,
    rust_error: Option<Regex>,
    source_file: Option<Regex>,
}

fn code_patterns() -> &'static CodePatterns {
    static PATTERNS: OnceLock<CodePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| CodePatterns {
        diff_hunk: compile(r"(?m)^@@ -\d+(,\d+)? \+\d+(,\d+)? @@"),
        java_frame: compile(r"(?m)^\s*at [\w$.<>]+\([\w$]+\.\w+:\d+\)"),
        rust_error: compile(r"error\[E\d{4}\]"),
        source_file: compile(
            r"(?i)\b[\w./-]*\w\.(rs|go|py|js|ts|tsx|jsx|java|kt|swift|c|cc|cpp|h|hpp|cs|rb|php|sh|sql)\b",
        ),
    })
}

fn url_pattern() -> Option<&'static Regex> {
    static URL: OnceLock<Option<Regex>> = OnceLock::new();
    URL.get_or_init(|| compile(r"(?i)\bhttps?://\S+")).as_ref()
}

fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(pattern)
        .map_err(|e| tracing::error!(pattern, error = %e, "Invalid routing pattern"))
        .ok()
}

fn is_match(re: &Option<Regex>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

const OPS_KEYWORDS: &[&str] = &[
    "deploy",
    "restart",
    "systemctl",
    "docker",
    "kubectl",
    "nginx",
    "crontab",
    "ssh ",
    "disk space",
    "uptime",
    "server logs",
    "install package",
];

const ANALYZE_KEYWORDS: &[&str] = &[
    "analyze",
    "analyse",
    "analysis",
    "spreadsheet",
    "csv",
    "tabular",
    "statistics",
    "average",
    "median",
    "trend",
    "chart",
    "compare the numbers",
];

const RESEARCH_KEYWORDS: &[&str] = &[
    "research",
    "look up",
    "search for",
    "find sources",
    "latest news",
    "what is the current",
    "citations",
];

const PLAN_KEYWORDS: &[&str] = &[
    "design doc",
    "spec ",
    "specification",
    "roadmap",
    "architecture",
    "plan out",
    "make a plan",
    "milestones",
];

/// Whether `text` carries unmistakable code: a fenced block, a diff, a
/// traceback, or a source-file name.
pub fn has_strong_code_evidence(text: &str) -> bool {
    code_evidence(text).is_some()
}

/// The kind of code evidence found, if any.
fn code_evidence(text: &str) -> Option<&'static str> {
    let p = code_patterns();
    if text.contains("```") {
        return Some("fenced_code_block");
    }
    if text.contains("diff --git")
        || is_match(&p.diff_hunk, text)
        || (text.contains("--- a/") && text.contains("+++ b/"))
    {
        return Some("diff_marker");
    }
    if text.contains("Traceback (most recent call last)")
        || text.contains("panicked at")
        || text.contains("Exception in thread")
        || is_match(&p.java_frame, text)
        || is_match(&p.rust_error, text)
    {
        return Some("traceback");
    }
    if is_match(&p.source_file, text) {
        return Some("source_file");
    }
    None
}

fn matched_keyword<'a>(lower: &str, keywords: &[&'a str]) -> Option<&'a str> {
    keywords.iter().copied().find(|k| lower.contains(k))
}

/// Evaluate the rules against `text`.
pub fn evaluate(text: &str) -> Option<RuleMatch> {
    if let Some(kind) = code_evidence(text) {
        return Some(RuleMatch {
            route: Route::Code,
            evidence: vec![STRONG_CODE_EVIDENCE.into(), kind.into()],
            reason: format!("matched {kind}"),
        });
    }

    let lower = text.to_lowercase();

    if let Some(k) = matched_keyword(&lower, OPS_KEYWORDS) {
        return Some(keyword_match(Route::Ops, k));
    }
    if let Some(k) = matched_keyword(&lower, ANALYZE_KEYWORDS) {
        return Some(keyword_match(Route::Analyze, k));
    }
    if let Some(url) = url_pattern().and_then(|re| re.find(text)) {
        return Some(RuleMatch {
            route: Route::Research,
            evidence: vec!["url".into()],
            reason: format!("message links {}", url.as_str()),
        });
    }
    if let Some(k) = matched_keyword(&lower, RESEARCH_KEYWORDS) {
        return Some(keyword_match(Route::Research, k));
    }
    if let Some(k) = matched_keyword(&lower, PLAN_KEYWORDS) {
        return Some(keyword_match(Route::Plan, k));
    }
    None
}

fn keyword_match(route: Route, keyword: &str) -> RuleMatch {
    RuleMatch {
        route,
        evidence: vec![format!("keyword:{}", keyword.trim())],
        reason: format!("keyword '{}'", keyword.trim()),
    }
}
