//! Hook event input from Claude Code.
//!
//! The raw stdin document is parsed leniently: every field is optional and
//! malformed input still yields a routable `RoutingEvent`.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Stop,
    SubagentStop,
    Notification,
    PermissionRequest,
    PreToolUse,
    PostToolUse,
    Unknown(String),
}

impl EventKind {
    const KNOWN: [&'static str; 6] = [
        "Stop",
        "SubagentStop",
        "Notification",
        "PermissionRequest",
        "PreToolUse",
        "PostToolUse",
    ];

    /// Total conversion: exact match, then case-insensitive, else `Unknown`.
    pub fn from_name(name: &str) -> Self {
        let known = Self::KNOWN
            .iter()
            .find(|k| **k == name)
            .or_else(|| Self::KNOWN.iter().find(|k| k.eq_ignore_ascii_case(name)));
        match known.copied() {
            Some("Stop") => Self::Stop,
            Some("SubagentStop") => Self::SubagentStop,
            Some("Notification") => Self::Notification,
            Some("PermissionRequest") => Self::PermissionRequest,
            Some("PreToolUse") => Self::PreToolUse,
            Some("PostToolUse") => Self::PostToolUse,
            _ => {
                debug!("Unrecognised hook event {name:?}");
                Self::Unknown(name.to_string())
            }
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Stop => "Stop",
            Self::SubagentStop => "SubagentStop",
            Self::Notification => "Notification",
            Self::PermissionRequest => "PermissionRequest",
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
            Self::Unknown(name) => name,
        }
    }

    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::PreToolUse | Self::PostToolUse)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const KNOWN_TOOLS: [&str; 14] = [
    "Read", "Write", "Edit", "MultiEdit", "NotebookEdit", "NotebookRead", "Bash", "Glob", "Grep",
    "LS", "WebFetch", "WebSearch", "Task", "TodoWrite",
];

/// The tool an event concerns, plus the structured input fields routing uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolContext {
    pub name: String,
    pub file_path: Option<String>,
    pub command: Option<String>,
}

impl ToolContext {
    fn new(raw_name: &str, input: Option<&Value>) -> Self {
        let name = KNOWN_TOOLS
            .iter()
            .find(|t| t.eq_ignore_ascii_case(raw_name))
            .map_or_else(|| raw_name.to_string(), |t| (*t).to_string());

        let field = |key: &str| {
            input
                .and_then(|v| v.get(key))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        Self {
            file_path: field("file_path").or_else(|| field("notebook_path")),
            command: field("command"),
            name,
        }
    }

    /// File tools share pattern tables with their base tool.
    pub fn file_operation_base(&self) -> Option<&'static str> {
        match self.name.as_str() {
            "Read" | "NotebookRead" => Some("Read"),
            "Edit" | "MultiEdit" | "NotebookEdit" => Some("Edit"),
            "Write" => Some("Write"),
            _ => None,
        }
    }

    pub fn is_shell(&self) -> bool {
        self.name == "Bash"
    }
}

/// Normalised representation of one incoming lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingEvent {
    pub kind: EventKind,
    pub tool: Option<ToolContext>,
    pub raw_message: Option<String>,
    pub notification_type: Option<String>,
    pub cwd: Option<String>,
    pub project_name: String,
    pub session_mode: Option<String>,
    pub permission_mode: Option<String>,
}

impl RoutingEvent {
    /// Parse the stdin document. Never fails: input that is not a JSON object
    /// becomes an `Unknown` event, a missing event name is treated as `Stop`.
    /// Fields are read one by one, so a wrongly-typed field only loses itself.
    pub fn parse(input: &str) -> Self {
        let hook = match serde_json::from_str::<Value>(input) {
            Ok(hook @ Value::Object(_)) => hook,
            Ok(other) => {
                warn!("Hook input is not an object ({other}), routing to defaults");
                return Self::unknown();
            }
            Err(e) => {
                warn!("Unparseable hook input ({e}), routing to defaults");
                return Self::unknown();
            }
        };

        let field = |key: &str| -> Option<String> {
            match hook.get(key)? {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => {
                    debug!("Ignoring hook field {key} with unexpected value {other}");
                    None
                }
            }
        };

        let kind = field("hook_event_name").map_or(EventKind::Stop, |n| EventKind::from_name(&n));
        let tool = field("tool_name")
            .filter(|n| !n.is_empty())
            .map(|name| ToolContext::new(&name, hook.get("tool_input")));

        let cwd = field("cwd").filter(|c| !c.is_empty());
        let project_name = cwd.as_deref().map(project_name_from_cwd).unwrap_or_default();

        Self {
            kind,
            tool,
            raw_message: field("message").filter(|m| !m.is_empty()),
            notification_type: field("notification_type"),
            cwd,
            project_name,
            session_mode: field("session_mode"),
            permission_mode: field("permission_mode"),
        }
    }

    fn unknown() -> Self {
        Self {
            kind: EventKind::Unknown(String::new()),
            tool: None,
            raw_message: None,
            notification_type: None,
            cwd: None,
            project_name: String::new(),
            session_mode: None,
            permission_mode: None,
        }
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.tool.as_ref().map(|t| t.name.as_str())
    }

    pub fn is_delegate_session(&self) -> bool {
        [&self.session_mode, &self.permission_mode]
            .into_iter()
            .any(|mode| mode.as_deref() == Some("delegate"))
    }
}

/// The spoken "project" token: last component of the working directory.
pub fn project_name_from_cwd(cwd: &str) -> String {
    Path::new(cwd)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tool_use_event() {
        let event = RoutingEvent::parse(
            r#"{"hook_event_name":"PreToolUse","tool_name":"bash",
                "tool_input":{"command":"git status"},"cwd":"/home/me/daylight"}"#,
        );
        assert_eq!(event.kind, EventKind::PreToolUse);
        let tool = event.tool.unwrap();
        assert_eq!(tool.name, "Bash");
        assert_eq!(tool.command.as_deref(), Some("git status"));
        assert_eq!(event.project_name, "daylight");
    }

    #[test]
    fn unknown_kind_is_preserved_not_rejected() {
        let event = RoutingEvent::parse(r#"{"hook_event_name":"UnknownEvent","tool_name":"UnknownTool"}"#);
        assert_eq!(event.kind, EventKind::Unknown("UnknownEvent".into()));
        assert_eq!(event.tool_name(), Some("UnknownTool"));
    }

    #[test]
    fn malformed_input_degrades_to_unknown() {
        let event = RoutingEvent::parse("{not json");
        assert!(matches!(event.kind, EventKind::Unknown(_)));
        assert!(event.tool.is_none());
        assert_eq!(event.project_name, "");
    }

    #[test]
    fn wrongly_typed_field_keeps_the_rest() {
        let event = RoutingEvent::parse(
            r#"{"hook_event_name":"Stop","cwd":"/home/me/daylight",
                "permission_mode":"delegate","session_mode":{"kind":"x"},"message":7}"#,
        );
        assert_eq!(event.kind, EventKind::Stop);
        assert_eq!(event.cwd.as_deref(), Some("/home/me/daylight"));
        assert_eq!(event.project_name, "daylight");
        assert_eq!(event.session_mode, None);
        assert_eq!(event.raw_message, None);
        assert!(event.is_delegate_session());
    }

    #[test]
    fn non_object_json_is_unknown() {
        assert_eq!(RoutingEvent::parse("[1, 2]").kind, EventKind::Unknown(String::new()));
        assert_eq!(RoutingEvent::parse(r#""Stop""#).kind, EventKind::Unknown(String::new()));
    }

    #[test]
    fn missing_event_name_is_stop() {
        let event = RoutingEvent::parse("{}");
        assert_eq!(event.kind, EventKind::Stop);
    }

    #[test]
    fn non_object_tool_input_is_ignored() {
        let event = RoutingEvent::parse(
            r#"{"hook_event_name":"PostToolUse","tool_name":"Edit","tool_input":"oops"}"#,
        );
        let tool = event.tool.unwrap();
        assert_eq!(tool.file_path, None);
        assert_eq!(tool.file_operation_base(), Some("Edit"));
    }

    #[test]
    fn delegate_detection_checks_both_modes() {
        let event = RoutingEvent::parse(r#"{"hook_event_name":"Stop","permission_mode":"delegate"}"#);
        assert!(event.is_delegate_session());
        let event = RoutingEvent::parse(r#"{"hook_event_name":"Stop","session_mode":"default"}"#);
        assert!(!event.is_delegate_session());
    }
}
