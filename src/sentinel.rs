//! Mute sentinels and the idle-notification cooldown marker.
//!
//! Sentinels are checked by existence only; their content is never read.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::{VoxPaths, SUPPRESS_FILE};

pub fn is_globally_muted(paths: &VoxPaths) -> bool {
    paths.mute_file().exists()
}

pub fn is_project_suppressed(cwd: Option<&str>) -> bool {
    cwd.is_some_and(|dir| Path::new(dir).join(SUPPRESS_FILE).exists())
}

/// Persisted timestamp of the last idle notification.
pub struct IdleCooldown {
    path: PathBuf,
    window: Duration,
}

impl IdleCooldown {
    pub fn new(path: PathBuf, window: Duration) -> Self {
        Self { path, window }
    }

    /// True when the previous idle notification is still inside the window.
    /// A missing or unreadable marker is never on cooldown.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        let Some(last) = fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
        else {
            return false;
        };
        let elapsed = now.timestamp_millis() as f64 / 1000.0 - last;
        debug!("Last idle notification {elapsed:.0}s ago");
        elapsed < self.window.as_secs_f64()
    }

    pub fn mark(&self, now: DateTime<Utc>) {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let stamp = format!("{:.3}", now.timestamp_millis() as f64 / 1000.0);
        if let Err(e) = fs::write(&self.path, stamp) {
            warn!("Failed to record idle cooldown: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_existence_checks() {
        let dir = tempfile::tempdir().unwrap();
        let paths = VoxPaths::new(dir.path().to_path_buf());
        assert!(!is_globally_muted(&paths));
        fs::write(paths.mute_file(), "").unwrap();
        assert!(is_globally_muted(&paths));

        let project = dir.path().join("daylight");
        fs::create_dir(&project).unwrap();
        let cwd = project.to_string_lossy().into_owned();
        assert!(!is_project_suppressed(Some(&cwd)));
        fs::write(project.join(SUPPRESS_FILE), "ignored content").unwrap();
        assert!(is_project_suppressed(Some(&cwd)));
        assert!(!is_project_suppressed(None));
    }

    #[test]
    fn cooldown_window() {
        let dir = tempfile::tempdir().unwrap();
        let cooldown = IdleCooldown::new(dir.path().join(".idle_cooldown"), Duration::from_secs(300));
        let t0 = Utc::now();
        assert!(!cooldown.is_active(t0));

        cooldown.mark(t0);
        assert!(cooldown.is_active(t0 + chrono::Duration::seconds(299)));
        assert!(!cooldown.is_active(t0 + chrono::Duration::seconds(301)));
    }

    #[test]
    fn garbage_marker_is_not_on_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".idle_cooldown");
        fs::write(&path, "yesterday-ish").unwrap();
        let cooldown = IdleCooldown::new(path, Duration::from_secs(300));
        assert!(!cooldown.is_active(Utc::now()));
    }
}
