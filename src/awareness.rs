//! User awareness detection.
//!
//! Infers how closely the user is watching from live desktop state so
//! notification intensity can be scaled. Fail-open: any query failure yields
//! `None`, which callers treat as "fire everything".
//!
//! - `Focused`: a terminal is frontmost and its window names this project
//! - `Nearby`: at the computer (other terminal window, or another app, not idle)
//! - `Away`: another app is frontmost and the system has been idle past the threshold

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::AwarenessConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwarenessTier {
    Focused,
    Nearby,
    Away,
}

impl std::fmt::Display for AwarenessTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Focused => write!(f, "FOCUSED"),
            Self::Nearby => write!(f, "NEARBY"),
            Self::Away => write!(f, "AWAY"),
        }
    }
}

/// Read-only desktop state queries. Each returns `None` on any failure.
pub trait SystemProbe {
    async fn frontmost_app(&self) -> Option<String>;
    async fn front_window_title(&self, app: &str) -> Option<String>;
    async fn idle_seconds(&self) -> Option<f64>;
}

/// Classify the user's attention for an event in `project_name`.
pub async fn classify<P: SystemProbe>(
    config: &AwarenessConfig,
    probe: &P,
    project_name: &str,
) -> Option<AwarenessTier> {
    if !config.enabled {
        return None;
    }

    let Some(frontmost) = probe.frontmost_app().await else {
        debug!("Frontmost app query failed, failing open");
        return None;
    };

    let frontmost_lower = frontmost.to_lowercase();
    let is_terminal = config
        .terminal_apps
        .iter()
        .any(|app| app.to_lowercase() == frontmost_lower);

    if is_terminal {
        if project_name.is_empty() {
            return Some(AwarenessTier::Focused);
        }
        let title = probe.front_window_title(&frontmost).await;
        let matches = title
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains(&project_name.to_lowercase()));
        debug!("Terminal {frontmost:?} frontmost, window {title:?}, project match={matches}");
        return Some(if matches {
            AwarenessTier::Focused
        } else {
            AwarenessTier::Nearby
        });
    }

    let Some(idle) = probe.idle_seconds().await else {
        debug!("Idle time query failed, failing open");
        return None;
    };
    debug!("Non-terminal {frontmost:?} frontmost, idle {idle:.1}s");

    if idle > config.idle_threshold_seconds as f64 {
        Some(AwarenessTier::Away)
    } else {
        Some(AwarenessTier::Nearby)
    }
}

/// Queries the host desktop through its stock command-line tools:
/// `osascript`/`ioreg` on macOS, `xdotool`/`xprintidle` elsewhere.
pub struct OsProbe {
    timeout: Duration,
}

impl OsProbe {
    pub fn new(config: &AwarenessConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.query_timeout_ms),
        }
    }

    /// Run a query command, returning trimmed stdout when it succeeds in time
    /// with non-empty output.
    async fn run(&self, program: &str, args: &[&str]) -> Option<String> {
        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(out)) if out.status.success() => {
                let text = String::from_utf8_lossy(&out.stdout).trim().to_string();
                (!text.is_empty()).then_some(text)
            }
            Ok(Ok(out)) => {
                debug!("{program} exited with {}", out.status);
                None
            }
            Ok(Err(e)) => {
                warn!("Failed to run {program}: {e}");
                None
            }
            Err(_) => {
                warn!("{program} timed out after {:?}", self.timeout);
                None
            }
        }
    }
}

impl SystemProbe for OsProbe {
    async fn frontmost_app(&self) -> Option<String> {
        if cfg!(target_os = "macos") {
            self.run(
                "osascript",
                &[
                    "-e",
                    "tell application \"System Events\" to get name of first application process whose frontmost is true",
                ],
            )
            .await
        } else {
            self.run("xdotool", &["getactivewindow", "getwindowclassname"]).await
        }
    }

    async fn front_window_title(&self, app: &str) -> Option<String> {
        if cfg!(target_os = "macos") {
            let script = format!(
                "tell application \"System Events\" to get title of front window of application process \"{}\"",
                applescript_escape(app)
            );
            self.run("osascript", &["-e", &script]).await
        } else {
            self.run("xdotool", &["getactivewindow", "getwindowname"]).await
        }
    }

    async fn idle_seconds(&self) -> Option<f64> {
        if cfg!(target_os = "macos") {
            let out = self.run("ioreg", &["-c", "IOHIDSystem"]).await?;
            parse_hid_idle_seconds(&out)
        } else {
            let out = self.run("xprintidle", &[]).await?;
            parse_xprintidle_seconds(&out)
        }
    }
}

fn applescript_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// `ioreg` reports `"HIDIdleTime" = <nanoseconds>`.
fn parse_hid_idle_seconds(ioreg: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r#""HIDIdleTime"\s*=\s*(\d+)"#).expect("static regex"));
    let nanos: u64 = re.captures(ioreg)?.get(1)?.as_str().parse().ok()?;
    Some(nanos as f64 / 1_000_000_000.0)
}

/// `xprintidle` prints milliseconds.
fn parse_xprintidle_seconds(out: &str) -> Option<f64> {
    let millis: u64 = out.trim().parse().ok()?;
    Some(millis as f64 / 1000.0)
}
