//! Configuration management for voxhook.
//!
//! Loads config from a YAML (or JSON) document under the hook root,
//! using the same keys as a plain `config.json`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AwarenessConfig {
    pub enabled: bool,
    pub terminal_apps: Vec<String>,
    pub idle_threshold_seconds: u64,
    pub query_timeout_ms: u64,
}

impl Default for AwarenessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // Warp reports its process name as "stable"
            terminal_apps: [
                "Terminal", "iTerm2", "Ghostty", "Alacritty", "kitty", "WezTerm", "Warp", "stable",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            idle_threshold_seconds: 300,
            query_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: 500 }
    }
}

/// External audio player argv. Placeholders: `{file}`, `{volume}`,
/// `{volume_pct}`, `{speed}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub command: Vec<String>,
    pub lock_timeout_seconds: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        let command: &[&str] = if cfg!(target_os = "macos") {
            &["afplay", "-v", "{volume}", "-r", "{speed}", "{file}"]
        } else {
            &[
                "ffplay", "-nodisp", "-autoexit", "-loglevel", "quiet", "-volume", "{volume_pct}",
                "-af", "atempo={speed}", "{file}",
            ]
        };
        Self {
            command: command.iter().map(|s| (*s).to_string()).collect(),
            lock_timeout_seconds: 30,
        }
    }
}

/// External speech synthesis argv. Placeholders: `{text}`, `{output}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub command: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let command: &[&str] = if cfg!(target_os = "macos") {
            &["say", "-o", "{output}", "--data-format=LEI16@22050", "{text}"]
        } else {
            &["espeak-ng", "-w", "{output}", "{text}"]
        };
        Self {
            command: command.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub enabled: bool,
    pub sound_enabled: bool,
    pub ntfy_enabled: bool,
    pub suppress_delegate_mode: bool,
    pub volume: f32,
    pub playback_speed: f32,
    pub idle_cooldown_seconds: u64,
    pub ntfy_topic: Option<String>,
    pub ntfy_server: String,
    pub ntfy_priority: u8,
    pub ntfy_tags: String,
    pub ntfy_title: String,
    pub awareness: AwarenessConfig,
    pub cache: CacheConfig,
    pub player: PlayerConfig,
    pub render: RenderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            sound_enabled: true,
            ntfy_enabled: true,
            suppress_delegate_mode: true,
            volume: 0.6,
            playback_speed: 1.0,
            idle_cooldown_seconds: 300,
            ntfy_topic: None,
            ntfy_server: "https://ntfy.sh".into(),
            ntfy_priority: 3,
            ntfy_tags: "brain".into(),
            ntfy_title: "Voxhook".into(),
            awareness: AwarenessConfig::default(),
            cache: CacheConfig::default(),
            player: PlayerConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// Searches, in order:
    /// 1. the explicit `--config` path
    /// 2. `<root>/config.yaml`
    /// 3. `<root>/config.json`
    pub fn load(path: Option<&Path>, paths: &VoxPaths) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            [paths.root.join("config.yaml"), paths.root.join("config.json")]
                .into_iter()
                .find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        load_document(&config_path).unwrap_or_default()
    }
}

/// Read and parse a YAML/JSON document, logging and returning `None` on
/// any failure so callers can fall back to their defaults.
pub fn load_document<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yml::from_str(&contents) {
            Ok(doc) => {
                info!("Loaded {}", path.display());
                Some(doc)
            }
            Err(e) => {
                tracing::warn!("Failed to parse {}: {e}, using defaults", path.display());
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read {}: {e}, using defaults", path.display());
            None
        }
    }
}

/// Well-known locations shared by every voxhook invocation on the host.
#[derive(Debug, Clone)]
pub struct VoxPaths {
    pub root: PathBuf,
    pub lock_file: PathBuf,
}

/// Per-project marker that silences a single working directory.
pub const SUPPRESS_FILE: &str = ".voxhook-suppress";

impl VoxPaths {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            lock_file: std::env::temp_dir().join("voxhook_audio.lock"),
        }
    }

    /// `~/.claude/hooks/voxhook`, or `./.voxhook` without a home directory.
    pub fn default_root() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".claude").join("hooks").join("voxhook"))
            .unwrap_or_else(|| PathBuf::from(".voxhook"))
    }

    pub fn mute_file(&self) -> PathBuf {
        self.root.join(".muted")
    }

    pub fn idle_cooldown_file(&self) -> PathBuf {
        self.root.join(".idle_cooldown")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.root.join("history")
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join("debug.log")
    }

    /// First existing notification mapping document, if any.
    pub fn mapping_file(&self) -> Option<PathBuf> {
        ["notification_mapping.yaml", "notification_mapping.json"]
            .into_iter()
            .map(|name| self.root.join(name))
            .find(|p| p.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_safe_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let paths = VoxPaths::new(dir.path().to_path_buf());
        let config = Config::load(None, &paths);
        assert!(config.enabled);
        assert!(config.sound_enabled);
        assert!(config.ntfy_enabled);
        assert!(!config.awareness.enabled);
        assert_eq!(config.awareness.idle_threshold_seconds, 300);
    }

    #[test]
    fn json_config_loads_through_yaml_parser() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"volume": 0.3, "ntfy_enabled": false,
                "awareness": {"enabled": true, "terminal_apps": ["kitty"], "idle_threshold_seconds": 60}}"#,
        )
        .unwrap();
        let paths = VoxPaths::new(dir.path().to_path_buf());
        let config = Config::load(None, &paths);
        assert!((config.volume - 0.3).abs() < f32::EPSILON);
        assert!(!config.ntfy_enabled);
        assert!(config.sound_enabled);
        assert!(config.awareness.enabled);
        assert_eq!(config.awareness.terminal_apps, vec!["kitty".to_string()]);
        assert_eq!(config.awareness.idle_threshold_seconds, 60);
        assert_eq!(config.awareness.query_timeout_ms, 2000);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "volume: [not, a, float").unwrap();
        let paths = VoxPaths::new(dir.path().to_path_buf());
        let config = Config::load(Some(&path), &paths);
        assert!((config.volume - 0.6).abs() < f32::EPSILON);
        assert!(!config.awareness.enabled);
    }
}
