//! Identity — the assistant's base system prompt.
//!
//! Loaded from markdown files in the workspace directory, in order:
//!
//! 1. `IDENTITY.md` — who the assistant is
//! 2. `SOUL.md` — personality and tone
//! 3. `USER.md` — facts about the user
//! 4. any extra files named in config
//!
//! Missing files are skipped. If nothing loads, a built-in prompt is used.
//! Role-specific instructions are layered on top of this by the prompt
//! assembler; the identity itself is route-agnostic.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const IDENTITY_FILE: &str = "IDENTITY.md";
pub const SOUL_FILE: &str = "SOUL.md";
pub const USER_FILE: &str = "USER.md";

/// The assistant's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// The assistant's name
    pub name: String,

    /// Base system prompt shared by every route
    pub system_prompt: String,

    /// Which files were loaded (for diagnostics)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loaded_files: Vec<String>,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: "Concierge".into(),
            system_prompt: concat!(
                "You are Concierge, a personal assistant reachable over chat. ",
                "Answer accurately and concisely. ",
                "When you are unsure, say so instead of guessing.",
            )
            .into(),
            loaded_files: vec![],
        }
    }
}

impl Identity {
    /// Load the identity from `workspace` plus `extra_files`.
    ///
    /// `system_prompt_override` short-circuits all file loading.
    pub fn load(
        workspace: Option<&Path>,
        extra_files: &[PathBuf],
        system_prompt_override: Option<&str>,
    ) -> Self {
        if let Some(prompt) = system_prompt_override {
            debug!("Using system prompt override, skipping file loading");
            return Self {
                system_prompt: prompt.to_string(),
                loaded_files: vec!["<override>".into()],
                ..Self::default()
            };
        }

        let mut sections = Vec::new();
        let mut loaded_files = Vec::new();
        let mut name = None;

        if let Some(dir) = workspace {
            for (file, heading) in [
                (IDENTITY_FILE, "Identity"),
                (SOUL_FILE, "Personality & Tone"),
                (USER_FILE, "About the User"),
            ] {
                let path = dir.join(file);
                let Some(content) = read_non_empty(&path) else {
                    continue;
                };
                if file == IDENTITY_FILE {
                    name = extract_name(&content);
                }
                debug!(file = %path.display(), "Loaded identity file");
                loaded_files.push(path.display().to_string());
                sections.push(format!("## {heading}\n\n{}", content.trim()));
            }
        }

        for path in extra_files {
            let Some(content) = read_non_empty(path) else {
                continue;
            };
            let label = path.file_name().and_then(|n| n.to_str()).unwrap_or("extra");
            loaded_files.push(path.display().to_string());
            sections.push(format!("## Additional Context ({label})\n\n{}", content.trim()));
        }

        if sections.is_empty() {
            debug!("No identity files found, using built-in prompt");
            return Self::default();
        }

        Self {
            name: name.unwrap_or_else(|| "Concierge".into()),
            system_prompt: sections.join("\n\n"),
            loaded_files,
        }
    }
}

fn read_non_empty(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .filter(|content| !content.trim().is_empty())
}

/// Pull a name from the first `# Heading` or a `Name: X` line.
fn extract_name(content: &str) -> Option<String> {
    for line in content.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Name:").or_else(|| line.strip_prefix("name:")) {
            let rest = rest.trim();
            if !rest.is_empty() {
                return Some(rest.to_string());
            }
        }
        if let Some(rest) = line.strip_prefix("# ") {
            let rest = rest.trim();
            if !rest.is_empty() {
                return Some(rest.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_identity_without_files() {
        let identity = Identity::load(None, &[], None);
        assert_eq!(identity.name, "Concierge");
        assert!(identity.loaded_files.is_empty());
    }

    #[test]
    fn override_skips_files() {
        let identity = Identity::load(None, &[], Some("You are a pirate."));
        assert_eq!(identity.system_prompt, "You are a pirate.");
        assert_eq!(identity.loaded_files, vec!["<override>".to_string()]);
    }

    #[test]
    fn loads_workspace_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(IDENTITY_FILE), "# Jeeves\nA butler.").unwrap();
        std::fs::write(dir.path().join(USER_FILE), "Lives in Lisbon.").unwrap();
        std::fs::write(dir.path().join(SOUL_FILE), "   \n").unwrap();

        let identity = Identity::load(Some(dir.path()), &[], None);
        assert_eq!(identity.name, "Jeeves");
        assert_eq!(identity.loaded_files.len(), 2);
        let identity_pos = identity.system_prompt.find("A butler").unwrap();
        let user_pos = identity.system_prompt.find("Lisbon").unwrap();
        assert!(identity_pos < user_pos);
        assert!(!identity.system_prompt.contains("Personality"));
    }

    #[test]
    fn extra_files_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let extra = dir.path().join("notes.md");
        std::fs::write(&extra, "Prefers metric units.").unwrap();

        let identity = Identity::load(None, &[extra], None);
        assert!(identity.system_prompt.contains("Additional Context (notes.md)"));
        assert!(identity.system_prompt.contains("metric units"));
    }

    #[test]
    fn name_line_wins_when_present() {
        assert_eq!(extract_name("Name: Ada\n# Other"), Some("Ada".into()));
        assert_eq!(extract_name("no heading here"), None);
    }
}
