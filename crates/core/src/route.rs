//! Routes — the closed set of reasoning roles a turn can be handled by.
//!
//! Routes are compared case-insensitively at the boundary (commands,
//! classifier output, config, delegation directives) and always stored in
//! their canonical upper-case form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The role selected to handle a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Route {
    /// Conversational gateway. Never calls tools; may delegate.
    Chat,
    Plan,
    Analyze,
    Ops,
    Research,
    /// Generic coder route.
    Code,
    Code1,
    Code2,
    Code3,
}

impl Route {
    /// Every route, in canonical order.
    pub const ALL: [Route; 9] = [
        Route::Chat,
        Route::Plan,
        Route::Analyze,
        Route::Ops,
        Route::Research,
        Route::Code,
        Route::Code1,
        Route::Code2,
        Route::Code3,
    ];

    /// Canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Route::Chat => "CHAT",
            Route::Plan => "PLAN",
            Route::Analyze => "ANALYZE",
            Route::Ops => "OPS",
            Route::Research => "RESEARCH",
            Route::Code => "CODE",
            Route::Code1 => "CODE1",
            Route::Code2 => "CODE2",
            Route::Code3 => "CODE3",
        }
    }

    /// Whether this is one of the `CODE*` routes.
    pub fn is_coder(self) -> bool {
        match self {
            Route::Code | Route::Code1 | Route::Code2 | Route::Code3 => true,
            Route::Chat | Route::Plan | Route::Analyze | Route::Ops | Route::Research => false,
        }
    }

    /// Whether the model bound to this route is offered tool definitions.
    ///
    /// The conversational role is a pure dialogue gateway.
    pub fn allows_tools(self) -> bool {
        match self {
            Route::Chat => false,
            Route::Plan
            | Route::Analyze
            | Route::Ops
            | Route::Research
            | Route::Code
            | Route::Code1
            | Route::Code2
            | Route::Code3 => true,
        }
    }

    /// Human-facing role name used in notices.
    pub fn role_name(self) -> &'static str {
        match self {
            Route::Chat => "assistant",
            Route::Plan => "planner",
            Route::Analyze => "analyst",
            Route::Ops => "operator",
            Route::Research => "researcher",
            Route::Code => "coder",
            Route::Code1 => "coder",
            Route::Code2 => "design coder",
            Route::Code3 => "senior coder",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when text does not name a route.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown route: {0}")]
pub struct UnknownRoute(pub String);

impl FromStr for Route {
    type Err = UnknownRoute;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Route::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownRoute(s.to_string()))
    }
}

impl TryFrom<String> for Route {
    type Error = UnknownRoute;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Route> for String {
    fn from(route: Route) -> Self {
        route.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("code2".parse::<Route>().unwrap(), Route::Code2);
        assert_eq!(" Research ".parse::<Route>().unwrap(), Route::Research);
        assert!("CODE4".parse::<Route>().is_err());
        assert!("".parse::<Route>().is_err());
    }

    #[test]
    fn displays_canonical_upper_case() {
        for route in Route::ALL {
            assert_eq!(route.to_string(), route.as_str());
            assert_eq!(route.as_str(), route.as_str().to_uppercase());
        }
    }

    #[test]
    fn coder_routes() {
        let coders: Vec<_> = Route::ALL.into_iter().filter(|r| r.is_coder()).collect();
        assert_eq!(coders, vec![Route::Code, Route::Code1, Route::Code2, Route::Code3]);
    }

    #[test]
    fn only_chat_is_tool_free() {
        for route in Route::ALL {
            assert_eq!(route.allows_tools(), route != Route::Chat);
        }
    }

    #[test]
    fn serde_uses_canonical_names() {
        let json = serde_json::to_string(&Route::Analyze).unwrap();
        assert_eq!(json, "\"ANALYZE\"");
        let parsed: Route = serde_json::from_str("\"ops\"").unwrap();
        assert_eq!(parsed, Route::Ops);
        assert!(serde_json::from_str::<Route>("\"nope\"").is_err());
    }
}
