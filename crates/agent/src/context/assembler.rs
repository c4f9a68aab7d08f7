//! Prompt assembly.
//!
//! Builds the message sequence for one backend call:
//!
//! 1. **System** — identity, role instructions for the active route, and the
//!    running summary
//! 2. **History** — persisted messages, oldest first
//! 3. **Overlay** — the work-mode directive, while it has turns left
//! 4. **User** — the current message, when it is not already in history
//!
//! Assembly is deterministic: identical inputs give identical output.

use concierge_core::identity::Identity;
use concierge_core::message::Message;
use concierge_core::route::Route;

/// Everything the assembler needs for one call.
pub struct AssemblyInput<'a> {
    pub route: Route,
    /// Running summary of older history (may be empty)
    pub summary: &'a str,
    pub history: &'a [Message],
    /// Active work-overlay directive
    pub overlay: Option<&'a str>,
    /// Current user message; `None` when it is already the tail of `history`
    pub user: Option<&'a Message>,
}

/// Turns assembly input into backend messages.
pub trait ContextAssembler: Send + Sync {
    fn assemble(&self, input: &AssemblyInput<'_>) -> Vec<Message>;
}

/// Identity-based assembler used by the runtime.
pub struct DefaultAssembler {
    identity: Identity,
}

impl DefaultAssembler {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    fn system_prompt(&self, route: Route, summary: &str) -> String {
        let mut prompt = self.identity.system_prompt.clone();
        prompt.push_str("\n\n## Current Role\n\n");
        prompt.push_str(role_instructions(route));
        if !summary.trim().is_empty() {
            prompt.push_str("\n\n## Conversation Summary\n\n");
            prompt.push_str(summary.trim());
        }
        prompt
    }
}

impl ContextAssembler for DefaultAssembler {
    fn assemble(&self, input: &AssemblyInput<'_>) -> Vec<Message> {
        let mut messages = Vec::with_capacity(input.history.len() + 3);
        messages.push(Message::system(self.system_prompt(input.route, input.summary)));
        messages.extend(input.history.iter().cloned());
        if let Some(directive) = input.overlay {
            messages.push(Message::system(directive));
        }
        if let Some(user) = input.user {
            messages.push(user.clone());
        }
        messages
    }
}

/// Instructions layered on the identity for each route.
pub fn role_instructions(route: Route) -> &'static str {
    match route {
        Route::Chat => {
            "You are the conversational assistant. You have no tools. Answer directly when you can.\n\
             When a request needs real work (planning, analysis, operations, research, or code), \
             hand it off by replying with exactly:\n\
             DELEGATE: <PLAN|ANALYZE|OPS|RESEARCH|CODE|CODE1|CODE2|CODE3>\n\
             TASK:\n\
             <a self-contained description of the task>\n\
             Do not add anything else to a hand-off reply."
        }
        Route::Plan => {
            "You are the planner. Produce clear, ordered plans, designs, and specifications. \
             Call out assumptions and open questions."
        }
        Route::Analyze => {
            "You are the analyst. Work carefully with data, numbers, and comparisons. \
             Show the figures your conclusions rest on."
        }
        Route::Ops => {
            "You are the operator. Inspect before you change anything, prefer reversible steps, \
             and report exactly what you ran."
        }
        Route::Research => {
            "You are the researcher. Gather information, cross-check it, and cite where each \
             fact came from."
        }
        Route::Code | Route::Code1 => {
            "You are the coder. Read the relevant files before editing, make focused changes, \
             and verify them."
        }
        Route::Code2 => {
            "You are the design coder. Settle the structure and interfaces first, then implement \
             them cleanly."
        }
        Route::Code3 => {
            "You are the senior coder on critical work. Be conservative, consider failure modes \
             and security, and verify every change."
        }
    }
}

/// User text plus one line per attached media reference.
pub fn format_user_content(text: &str, media: &[String]) -> String {
    if media.is_empty() {
        return text.to_string();
    }
    let mut content = text.to_string();
    for item in media {
        content.push_str("\n[attachment: ");
        content.push_str(item);
        content.push(']');
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::message::Role;

    fn assembler() -> DefaultAssembler {
        DefaultAssembler::new(Identity {
            name: "Test".into(),
            system_prompt: "You are Test.".into(),
            loaded_files: vec![],
        })
    }

    #[test]
    fn order_is_system_history_overlay_user() {
        let history = vec![Message::user("earlier"), Message::assistant("reply")];
        let user = Message::user("now");
        let messages = assembler().assemble(&AssemblyInput {
            route: Route::Plan,
            summary: "",
            history: &history,
            overlay: Some("be brief"),
            user: Some(&user),
        });

        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::System, Role::User]
        );
        assert!(messages[0].content.starts_with("You are Test."));
        assert!(messages[0].content.contains("planner"));
        assert_eq!(messages[3].content, "be brief");
        assert_eq!(messages[4].content, "now");
    }

    #[test]
    fn summary_goes_into_system_prompt() {
        let messages = assembler().assemble(&AssemblyInput {
            route: Route::Chat,
            summary: "User likes tea.",
            history: &[],
            overlay: None,
            user: None,
        });
        assert_eq!(messages.len(), 1);
        assert!(messages[0].content.contains("## Conversation Summary\n\nUser likes tea."));
        assert!(messages[0].content.contains("DELEGATE:"));
    }

    #[test]
    fn only_chat_describes_delegation() {
        for route in Route::ALL {
            assert_eq!(role_instructions(route).contains("DELEGATE:"), route == Route::Chat);
        }
    }

    #[test]
    fn media_becomes_attachment_lines() {
        assert_eq!(format_user_content("hi", &[]), "hi");
        assert_eq!(
            format_user_content("see this", &["photo.jpg".into()]),
            "see this\n[attachment: photo.jpg]"
        );
    }
}
