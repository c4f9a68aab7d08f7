//! User-facing delegation notices.
//!
//! Phrasing is picked from a template list by hashing a seed, so the same
//! delegation always reads the same way while different ones vary.

use concierge_core::route::Route;
use sha2::{Digest, Sha256};

/// Longest task label shown in a notice, in characters.
pub const LABEL_MAX_CHARS: usize = 60;

const START_TEMPLATES: &[&str] = &[
    "Handing this to the {role}: {label}",
    "Bringing in the {role} for \"{label}\".",
    "The {role} is taking it from here: {label}",
    "Passing \"{label}\" to the {role}.",
];

const DONE_TEMPLATES: &[&str] = &[
    "The {role} finished \"{label}\".",
    "Done: {label} (via the {role}).",
    "Here's what the {role} came back with for \"{label}\":",
    "The {role} wrapped up {label}.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Done,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::Done => "done",
        }
    }

    fn templates(self) -> &'static [&'static str] {
        match self {
            Phase::Start => START_TEMPLATES,
            Phase::Done => DONE_TEMPLATES,
        }
    }
}

/// Pick a template for `seed`. Empty when there are no templates.
pub fn pick_template<'a>(seed: &str, templates: &[&'a str]) -> &'a str {
    if templates.is_empty() {
        return "";
    }
    let digest = Sha256::digest(seed.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let index = u64::from_be_bytes(head) % templates.len() as u64;
    templates[index as usize]
}

/// First non-blank line of the task, cut to [`LABEL_MAX_CHARS`].
pub fn task_label(task: &str) -> String {
    let line = task.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if line.chars().count() <= LABEL_MAX_CHARS {
        return line.to_string();
    }
    let cut: String = line.chars().take(LABEL_MAX_CHARS - 3).collect();
    format!("{}...", cut.trim_end())
}

/// Render the notice for `phase` of a delegation to `route`.
pub fn render(session_key: &str, phase: Phase, route: Route, task: &str) -> String {
    let label = task_label(task);
    let seed = format!("{session_key}|{}|{}|{label}", phase.as_str(), route.as_str());
    pick_template(&seed, phase.templates())
        .replace("{role}", route.role_name())
        .replace("{label}", &label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_is_deterministic() {
        let templates = ["a", "b", "c", "d", "e"];
        assert_eq!(pick_template("seed-1", &templates), pick_template("seed-1", &templates));
    }

    #[test]
    fn pick_varies_across_seeds() {
        let templates = ["a", "b", "c", "d", "e"];
        let picked: std::collections::HashSet<&str> = (0..50)
            .map(|i| pick_template(&format!("seed-{i}"), &templates))
            .collect();
        assert!(picked.len() > 1);
    }

    #[test]
    fn pick_from_nothing_is_empty() {
        assert_eq!(pick_template("x", &[]), "");
    }

    #[test]
    fn label_is_first_line_truncated() {
        assert_eq!(task_label("\n  fix the login  \nmore detail"), "fix the login");
        let long = "word ".repeat(30);
        let label = task_label(&long);
        assert!(label.ends_with("..."));
        assert!(label.chars().count() <= LABEL_MAX_CHARS);
    }

    #[test]
    fn render_fills_role_and_label() {
        let text = render("cli:local", Phase::Start, Route::Code2, "design the schema");
        assert!(text.contains("design coder"));
        assert!(text.contains("design the schema"));
        assert!(!text.contains('{'));

        let done = render("cli:local", Phase::Done, Route::Code2, "design the schema");
        assert!(DONE_TEMPLATES.iter().any(|t| {
            t.replace("{role}", "design coder").replace("{label}", "design the schema") == done
        }));
    }
}
