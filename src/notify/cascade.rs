//! Message resolution cascade.
//!
//! Rules run in a fixed order and the first one that produces a notice wins.
//! More specific rules come first; nothing is scored or merged.

use std::path::Path;

use rand::RngCore;
use tracing::debug;

use super::category::{permission_tool, NotificationCategory};
use super::mapping::{
    BashPatterns, CommandPatterns, FileToolPatterns, HookEventSpec, MessageSpec, Notice,
    NotificationMapping,
};
use crate::event::{EventKind, RoutingEvent, ToolContext};

type Rule = fn(&NotificationMapping, &RoutingEvent, &mut dyn RngCore) -> Option<Notice>;

/// Evaluated strictly in order. The global default follows the last rule.
const CASCADE: [(&str, Rule); 4] = [
    ("notification-category", notification_rule),
    ("context-pattern", context_rule),
    ("tool", tool_rule),
    ("hook-event", hook_event_rule),
];

pub const DEFAULT_RULE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub notice: Notice,
    /// Name of the rule that matched.
    pub rule: &'static str,
}

pub fn resolve(
    mapping: &NotificationMapping,
    event: &RoutingEvent,
    rng: &mut dyn RngCore,
) -> Resolution {
    for (name, rule) in CASCADE {
        if let Some(notice) = rule(mapping, event, rng) {
            debug!("Cascade rule {name} -> {notice:?}");
            return Resolution { notice, rule: name };
        }
    }
    debug!("No cascade rule matched {} / {:?}, using default", event.kind, event.tool_name());
    Resolution {
        notice: mapping.default.clone(),
        rule: DEFAULT_RULE,
    }
}

/// Category of a Notification event. `notification_type: idle_prompt`
/// overrides the message text; other events have no category.
pub fn notification_category(event: &RoutingEvent) -> Option<NotificationCategory> {
    if event.kind != EventKind::Notification {
        return None;
    }
    if event.notification_type.as_deref() == Some("idle_prompt") {
        return Some(NotificationCategory::IdleTimeout);
    }
    event
        .raw_message
        .as_deref()
        .map(NotificationCategory::from_message)
}

fn notification_rule(
    mapping: &NotificationMapping,
    event: &RoutingEvent,
    rng: &mut dyn RngCore,
) -> Option<Notice> {
    if event.kind != EventKind::Notification {
        return None;
    }
    let keyed = match mapping.hook_events.get(event.kind.as_str())? {
        HookEventSpec::Message(spec) => return Some(spec.select(rng)),
        HookEventSpec::Keyed(keyed) => keyed,
    };

    let category = notification_category(event)?;
    let tool = event
        .tool_name()
        .or_else(|| event.raw_message.as_deref().and_then(permission_tool));

    let category_key = category.config_key();
    let tool_key = tool.map(|t| format!("{category_key}:{t}"));
    let spec = tool_key
        .as_deref()
        .and_then(|k| keyed.get(k))
        .or_else(|| keyed.get(category_key))
        .or_else(|| keyed.get("default"))?;
    debug!("{category:?} notification");
    Some(spec.select(rng))
}

fn context_rule(
    mapping: &NotificationMapping,
    event: &RoutingEvent,
    rng: &mut dyn RngCore,
) -> Option<Notice> {
    if !event.kind.is_tool_use() {
        return None;
    }
    let tool = event.tool.as_ref()?;
    let patterns = &mapping.context_patterns;

    if let Some(base) = tool.file_operation_base() {
        let file_patterns = patterns.file_operations.get(base)?;
        return file_notice(file_patterns, tool, rng);
    }
    if tool.is_shell() {
        return shell_notice(&patterns.bash_commands, tool, rng);
    }
    None
}

fn file_notice(
    patterns: &FileToolPatterns,
    tool: &ToolContext,
    rng: &mut dyn RngCore,
) -> Option<Notice> {
    let file_path = Path::new(tool.file_path.as_deref()?);
    let filename = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let by_name = patterns.by_filename.get(&filename).or_else(|| {
        patterns
            .by_filename
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&filename))
            .map(|(_, spec)| spec)
    });

    let by_extension = || {
        let ext = file_path.extension()?.to_string_lossy().to_lowercase();
        patterns
            .by_extension
            .get(&format!(".{ext}"))
            .or_else(|| patterns.by_extension.get(&ext))
    };

    by_name
        .or_else(by_extension)
        .or(patterns.default.as_ref())
        .map(|spec| spec.select(rng))
}

fn shell_notice(
    patterns: &BashPatterns,
    tool: &ToolContext,
    rng: &mut dyn RngCore,
) -> Option<Notice> {
    let command = tool.command.as_deref()?;
    let tokens = command_tokens(command);

    if let Some(sub) = git_subcommand(&tokens) {
        if let Some(spec) = patterns.git.get(&sub) {
            return Some(spec.select(rng));
        }
    }

    if let Some(command_type) = tokens.first() {
        let normalized = tokens.join(" ");
        let spec = match patterns.commands.get(command_type.as_str()) {
            Some(CommandPatterns::Messages(spec)) => Some(spec),
            Some(CommandPatterns::Prefixes(prefixes)) => longest_prefix(prefixes, &normalized),
            None => None,
        };
        if let Some(spec) = spec {
            return Some(spec.select(rng));
        }
    }

    patterns.default.as_ref().map(|spec| spec.select(rng))
}

/// Most specific (longest) key that prefixes the command.
fn longest_prefix<'a>(
    prefixes: &'a std::collections::BTreeMap<String, MessageSpec>,
    command: &str,
) -> Option<&'a MessageSpec> {
    prefixes
        .iter()
        .filter(|(prefix, _)| {
            command == prefix.as_str()
                || command
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with(' '))
        })
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, spec)| spec)
}

const SKIP_PREFIXES: [&str; 5] = ["sudo", "env", "nice", "time", "nohup"];
const GIT_FLAGS_WITH_VALUE: [&str; 5] = ["-C", "-c", "--git-dir", "--work-tree", "--namespace"];

/// Shell-split the command and drop wrapper prefixes like `sudo`.
fn command_tokens(command: &str) -> Vec<String> {
    let tokens = shell_words::split(command.trim())
        .unwrap_or_else(|_| command.split_whitespace().map(String::from).collect());
    let skip = tokens
        .iter()
        .take_while(|t| SKIP_PREFIXES.contains(&t.as_str()))
        .count();
    tokens.into_iter().skip(skip).collect()
}

/// `git [global flags] <sub> ...` -> `git <sub>`.
fn git_subcommand(tokens: &[String]) -> Option<String> {
    let (first, rest) = tokens.split_first()?;
    if first != "git" {
        return None;
    }
    let mut i = 0;
    while let Some(token) = rest.get(i) {
        if !token.starts_with('-') {
            return Some(format!("git {token}"));
        }
        i += if GIT_FLAGS_WITH_VALUE.contains(&token.as_str()) { 2 } else { 1 };
    }
    None
}

fn tool_rule(
    mapping: &NotificationMapping,
    event: &RoutingEvent,
    rng: &mut dyn RngCore,
) -> Option<Notice> {
    if !event.kind.is_tool_use() {
        return None;
    }
    let name = event.tool_name()?;
    mapping.tools.get(name).map(|spec| spec.select(rng))
}

fn hook_event_rule(
    mapping: &NotificationMapping,
    event: &RoutingEvent,
    rng: &mut dyn RngCore,
) -> Option<Notice> {
    let spec = match mapping.hook_events.get(event.kind.as_str())? {
        HookEventSpec::Message(spec) => spec,
        HookEventSpec::Keyed(keyed) => event
            .tool_name()
            .and_then(|tool| keyed.get(tool))
            .or_else(|| keyed.get("default"))?,
    };
    Some(spec.select(rng))
}
