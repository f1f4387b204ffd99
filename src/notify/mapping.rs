//! Notification mapping document: which words to say for which event.
//!
//! Every message slot accepts a single string, a list (one picked at random
//! per event) or an explicit `{title, message}` pair.

use std::collections::{BTreeMap, BTreeSet};

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::Deserialize;

use crate::config::{load_document, VoxPaths};

pub const DEFAULT_TITLE: &str = "Claude Code";
pub const DEFAULT_MESSAGE: &str = "Task completed";

/// A resolved title + message pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Notice {
    #[serde(default = "default_title")]
    pub title: String,
    pub message: String,
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

impl Notice {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            title: default_title(),
            message: message.into(),
        }
    }
}

impl Default for Notice {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageSpec {
    Text(String),
    Choices(Vec<String>),
    Titled(Notice),
}

impl MessageSpec {
    /// Normalise to a `Notice`, choosing uniformly among list variations.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> Notice {
        match self {
            Self::Text(text) => Notice::new(text.clone()),
            Self::Choices(options) => options
                .choose(rng)
                .map_or_else(Notice::default, |m| Notice::new(m.clone())),
            Self::Titled(notice) => notice.clone(),
        }
    }

    fn messages(&self) -> Vec<&str> {
        match self {
            Self::Text(text) => vec![text.as_str()],
            Self::Choices(options) => options.iter().map(String::as_str).collect(),
            Self::Titled(notice) => vec![notice.message.as_str()],
        }
    }
}

/// A hook event's entry: one message slot, or slots keyed by tool name,
/// notification category and `default`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HookEventSpec {
    Message(MessageSpec),
    Keyed(BTreeMap<String, MessageSpec>),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileToolPatterns {
    pub by_filename: BTreeMap<String, MessageSpec>,
    pub by_extension: BTreeMap<String, MessageSpec>,
    pub default: Option<MessageSpec>,
}

/// Per command-type entry under `bash_commands`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CommandPatterns {
    /// Any invocation of the command.
    Messages(MessageSpec),
    /// Keyed by command prefix, e.g. `npm install`.
    Prefixes(BTreeMap<String, MessageSpec>),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BashPatterns {
    /// Keyed by `git <subcommand>`.
    pub git: BTreeMap<String, MessageSpec>,
    pub default: Option<MessageSpec>,
    #[serde(flatten)]
    pub commands: BTreeMap<String, CommandPatterns>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContextPatterns {
    pub file_operations: BTreeMap<String, FileToolPatterns>,
    pub bash_commands: BashPatterns,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotificationMapping {
    pub default: Notice,
    pub hook_events: BTreeMap<String, HookEventSpec>,
    pub tools: BTreeMap<String, MessageSpec>,
    pub context_patterns: ContextPatterns,
}

const BUILTIN_MAPPING: &str = r#"
default:
  title: Claude Code
  message: Task completed
hook_events:
  Stop: ["Task complete.", "Done. Standing by.", "Finished. Ready for next."]
  SubagentStop: ["Subagent finished.", "Delegated task complete."]
  PermissionRequest: ["Permission needed.", "Approval required."]
  Notification:
    permission_request: ["Permission needed.", "It wants to do something. Approve it."]
    idle_timeout: ["Waiting for your input.", "Still here. Still waiting."]
    error: ["Something failed.", "An error occurred."]
    warning: ["Warning raised.", "Heads up."]
    general: ["Notification.", "Attention required."]
    default: "Attention required."
tools:
  Read: Reading file
  Edit: Editing code
  Write: Writing file
  Bash: Running command
context_patterns:
  file_operations:
    Edit:
      by_extension:
        .rs: Editing Rust code
        .py: Editing Python code
      default: Editing code
  bash_commands:
    git:
      git status: Checking git status
      git commit: Committing changes
      git push: Pushing changes
    cargo: Running cargo
    default: Running command
"#;

impl NotificationMapping {
    /// Load the user's mapping document, or the built-in one when it is
    /// missing or unparseable.
    pub fn load(paths: &VoxPaths) -> Self {
        paths
            .mapping_file()
            .and_then(|path| load_document(&path))
            .unwrap_or_else(Self::builtin)
    }

    pub fn builtin() -> Self {
        serde_yml::from_str(BUILTIN_MAPPING).unwrap_or_default()
    }

    /// Every distinct message without `{placeholders}`, for pre-rendering.
    pub fn static_messages(&self) -> Vec<String> {
        let mut specs: Vec<&MessageSpec> = Vec::new();
        for event in self.hook_events.values() {
            match event {
                HookEventSpec::Message(spec) => specs.push(spec),
                HookEventSpec::Keyed(keyed) => specs.extend(keyed.values()),
            }
        }
        specs.extend(self.tools.values());
        for file_tool in self.context_patterns.file_operations.values() {
            specs.extend(file_tool.by_filename.values());
            specs.extend(file_tool.by_extension.values());
            specs.extend(file_tool.default.iter());
        }
        let bash = &self.context_patterns.bash_commands;
        specs.extend(bash.git.values());
        specs.extend(bash.default.iter());
        for patterns in bash.commands.values() {
            match patterns {
                CommandPatterns::Messages(spec) => specs.push(spec),
                CommandPatterns::Prefixes(prefixes) => specs.extend(prefixes.values()),
            }
        }

        let mut messages: BTreeSet<&str> = specs.iter().flat_map(|s| s.messages()).collect();
        messages.insert(self.default.message.as_str());
        messages
            .into_iter()
            .filter(|m| !m.contains('{'))
            .map(String::from)
            .collect()
    }
}
