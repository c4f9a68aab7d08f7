//! Session commands handled before routing.
//!
//! These change session state and answer directly; the loop never runs for
//! them. Anything else starting with `/` goes on to the router.

/// A recognized session command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// `/work` or `/work N`. `None` means the configured default.
    WorkOn(Option<u32>),
    /// `/work off` or `/normal`
    WorkOff,
    /// `/work status`
    WorkStatus,
    /// `/work` with an argument that is none of the above
    WorkUsage,
    /// `/new`
    NewSession,
    /// `/new` followed by text
    NewUsage,
}

pub const NEW_USAGE: &str = "Usage: /new on its own starts a fresh session. Nothing was cleared.";

pub const WORK_USAGE: &str = "Usage: /work [N|off|status], where N is the number of turns (at least 1).";

/// Parse a session command from the start of `text`.
pub fn parse_session_command(text: &str) -> Option<SessionCommand> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?.to_lowercase();
    let args: Vec<&str> = parts.collect();

    match head.as_str() {
        "/normal" => Some(SessionCommand::WorkOff),
        "/new" if args.is_empty() => Some(SessionCommand::NewSession),
        "/new" => Some(SessionCommand::NewUsage),
        "/work" => Some(match args.as_slice() {
            [] => SessionCommand::WorkOn(None),
            [arg] if arg.eq_ignore_ascii_case("off") => SessionCommand::WorkOff,
            [arg] if arg.eq_ignore_ascii_case("status") => SessionCommand::WorkStatus,
            [arg] => match arg.parse::<u32>() {
                Ok(n) if n >= 1 => SessionCommand::WorkOn(Some(n)),
                _ => SessionCommand::WorkUsage,
            },
            _ => SessionCommand::WorkUsage,
        }),
        _ => None,
    }
}
