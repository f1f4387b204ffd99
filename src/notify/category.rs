//! Notification message categorisation.

/// Category of a Notification event, derived only from its message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCategory {
    PermissionRequest,
    IdleTimeout,
    Error,
    Warning,
    General,
}

const ERROR_KEYWORDS: [&str; 4] = ["error", "failed", "exception", "critical"];
const WARNING_KEYWORDS: [&str; 3] = ["warning", "warn", "caution"];

impl NotificationCategory {
    /// Ordered substring rules; anything unmatched is `General`.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("permission") && lower.contains("use") {
            Self::PermissionRequest
        } else if lower.contains("waiting for your input") || lower.contains("waiting for input") {
            Self::IdleTimeout
        } else if ERROR_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Self::Error
        } else if WARNING_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Self::Warning
        } else {
            Self::General
        }
    }

    /// Key used in the `Notification` block of the mapping document.
    pub fn config_key(self) -> &'static str {
        match self {
            Self::PermissionRequest => "permission_request",
            Self::IdleTimeout => "idle_timeout",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::General => "general",
        }
    }
}

/// Tool named in a permission prompt ("... permission to use the Bash tool").
pub fn permission_tool(message: &str) -> Option<&str> {
    let mut words = message.split_whitespace();
    words.find(|w| w.eq_ignore_ascii_case("use"))?;
    let next = words.next()?;
    let name = if next.eq_ignore_ascii_case("the") {
        words.next()?
    } else {
        next
    };
    let name = name.trim_matches(|c: char| !c.is_alphanumeric());
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn categorises_known_messages() {
        use NotificationCategory::*;
        let cases = [
            ("Claude Code is requesting permission to use the Bash tool", PermissionRequest),
            ("Claude is waiting for your input", IdleTimeout),
            ("Still waiting for input", IdleTimeout),
            ("Hook failed: TypeError: x is undefined", Error),
            ("Deprecation WARNING in config", Warning),
            ("General system notification", General),
            ("", General),
        ];
        for (message, expected) in cases {
            assert_eq!(NotificationCategory::from_message(message), expected, "{message:?}");
        }
    }

    #[test]
    fn permission_outranks_error_keywords() {
        assert_eq!(
            NotificationCategory::from_message("permission to use Bash after the error"),
            NotificationCategory::PermissionRequest
        );
    }

    #[test]
    fn extracts_permission_tool() {
        assert_eq!(
            permission_tool("Claude Code is requesting permission to use the Bash tool"),
            Some("Bash")
        );
        assert_eq!(permission_tool("Claude needs your permission to use WebFetch."), Some("WebFetch"));
        assert_eq!(permission_tool("General system notification"), None);
    }

    proptest! {
        #[test]
        fn categorisation_is_total(message in ".*") {
            let category = NotificationCategory::from_message(&message);
            prop_assert!(!category.config_key().is_empty());
        }
    }
}
