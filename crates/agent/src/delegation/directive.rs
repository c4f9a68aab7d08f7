//! The hand-off directive the conversational role can emit.
//!
//! Grammar, applied line by line:
//!
//! ```text
//! directive := blank* "DELEGATE:" route NL line* task
//! task      := "TASK:" rest-of-line (NL line)*
//! ```
//!
//! `route` is any route except CHAT and the task body must not be blank.
//! Anything else is an ordinary answer.

use concierge_core::route::Route;

/// A parsed hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationDirective {
    pub route: Route,
    pub task: String,
}

const DELEGATE_MARKER: &str = "DELEGATE:";
const TASK_MARKER: &str = "TASK:";

/// Parse `content` as a directive. `None` means it is a normal answer.
pub fn parse_directive(content: &str) -> Option<DelegationDirective> {
    let mut lines = content.lines().skip_while(|line| line.trim().is_empty());

    let first = lines.next()?.trim();
    let route = first.strip_prefix(DELEGATE_MARKER)?.trim().parse::<Route>().ok()?;
    if route == Route::Chat {
        return None;
    }

    let mut lines = lines.skip_while(|line| !line.trim_start().starts_with(TASK_MARKER));
    let task_line = lines.next()?.trim_start();
    let head = task_line[TASK_MARKER.len()..].trim();

    let mut task = String::from(head);
    for line in lines {
        task.push('\n');
        task.push_str(line);
    }
    let task = task.trim().to_string();
    if task.is_empty() {
        return None;
    }

    Some(DelegationDirective { route, task })
}

/// Whether `content` carries a directive.
pub fn is_directive(content: &str) -> bool {
    parse_directive(content).is_some()
}

/// Pick the coder tier for a generic `CODE` hand-off from the task text.
/// Specific routes are returned unchanged.
pub fn select_coder(route: Route, task: &str) -> Route {
    match route {
        Route::Code => {
            let lower = task.to_lowercase();
            let any = |words: &[&str]| words.iter().any(|w| lower.contains(w));
            if any(&["critical", "production", "security", "hotfix"]) {
                Route::Code3
            } else if any(&["spec", "design", "architecture"]) {
                Route::Code2
            } else {
                Route::Code1
            }
        }
        Route::Chat
        | Route::Plan
        | Route::Analyze
        | Route::Ops
        | Route::Research
        | Route::Code1
        | Route::Code2
        | Route::Code3 => route,
    }
}
