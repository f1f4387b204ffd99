//! Serialized audio playback through an external player.
//!
//! Every voxhook process on the host shares one advisory `flock` on a
//! well-known path. A call holds it for its whole duration, so a sequence
//! (project name, then message) is never split by another invocation's audio.
//! The kernel drops the lock when the holder exits, so there is no stale-lock
//! recovery.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::PlayerConfig;
use crate::error::{Result, VoxError};

const LOCK_RETRY: Duration = Duration::from_millis(50);

/// Exclusive cross-process audio lock, released on drop.
pub struct AudioLock {
    file: File,
}

impl AudioLock {
    pub async fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => return Ok(Self { file }),
                Err(e) if e.kind() == ErrorKind::WouldBlock
                    || e.kind() == fs2::lock_contended_error().kind() =>
                {
                    if start.elapsed() >= timeout {
                        return Err(VoxError::LockTimeout {
                            path: path.to_path_buf(),
                            secs: timeout.as_secs(),
                        });
                    }
                    tokio::time::sleep(LOCK_RETRY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for AudioLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

pub struct PlaybackCoordinator {
    command: Vec<String>,
    lock_path: PathBuf,
    lock_timeout: Duration,
}

impl PlaybackCoordinator {
    pub fn new(player: &PlayerConfig, lock_path: PathBuf) -> Self {
        Self {
            command: player.command.clone(),
            lock_path,
            lock_timeout: Duration::from_secs(player.lock_timeout_seconds),
        }
    }

    #[cfg(test)]
    fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Play one artifact under the audio lock. Failures are logged, never raised.
    pub async fn play_one(&self, path: &Path, volume: f32, speed: f32) {
        self.play_sequence(&[path.to_path_buf()], volume, speed).await;
    }

    /// Play artifacts back-to-back while holding the lock for the whole run.
    pub async fn play_sequence(&self, paths: &[PathBuf], volume: f32, speed: f32) {
        if paths.is_empty() {
            return;
        }
        if let Err(e) = self.try_play_sequence(paths, volume, speed).await {
            warn!("Playback skipped: {e}");
        }
    }

    async fn try_play_sequence(&self, paths: &[PathBuf], volume: f32, speed: f32) -> Result<()> {
        let _lock = AudioLock::acquire(&self.lock_path, self.lock_timeout).await?;
        for path in paths {
            // One failed file must not cut the rest of the sequence.
            if let Err(e) = self.run_player(path, volume, speed).await {
                warn!("Player failed on {}: {e}", path.display());
            }
        }
        Ok(())
    }

    async fn run_player(&self, path: &Path, volume: f32, speed: f32) -> Result<()> {
        let argv = player_argv(&self.command, path, volume, speed);
        let Some((program, args)) = argv.split_first() else {
            return Err(VoxError::Player("empty player command".into()));
        };

        debug!("Playing {} via {program}", path.display());
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if status.success() {
            Ok(())
        } else {
            Err(VoxError::Player(format!("{program} exited with {status}")))
        }
    }
}

/// Expand `{file}`, `{volume}`, `{volume_pct}` and `{speed}` in each argument.
fn player_argv(template: &[String], path: &Path, volume: f32, speed: f32) -> Vec<String> {
    let file = path.to_string_lossy();
    let volume_pct = ((volume * 100.0).round().max(0.0) as u32).to_string();
    template
        .iter()
        .map(|arg| {
            arg.replace("{file}", &file)
                .replace("{volume_pct}", &volume_pct)
                .replace("{volume}", &volume.to_string())
                .replace("{speed}", &speed.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A player that appends the file name to `log` and lingers briefly.
    fn logging_player(log: &Path) -> PlayerConfig {
        PlayerConfig {
            command: vec![
                "sh".into(),
                "-c".into(),
                "echo \"$1\" >> \"$2\"; sleep 0.05".into(),
                "sh".into(),
                "{file}".into(),
                log.to_string_lossy().into_owned(),
            ],
            lock_timeout_seconds: 10,
        }
    }

    fn played(log: &Path) -> Vec<String> {
        std::fs::read_to_string(log)
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn expands_placeholders() {
        let template: Vec<String> = ["afplay", "-v", "{volume}", "-r", "{speed}", "--pct={volume_pct}", "{file}"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let argv = player_argv(&template, Path::new("/tmp/a.wav"), 0.6, 1.5);
        assert_eq!(argv, ["afplay", "-v", "0.6", "-r", "1.5", "--pct=60", "/tmp/a.wav"]);
    }

    #[tokio::test]
    async fn plays_sequence_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("played.log");
        let coordinator = PlaybackCoordinator::new(&logging_player(&log), dir.path().join("audio.lock"));

        coordinator
            .play_sequence(&[PathBuf::from("proj.wav"), PathBuf::from("msg.wav")], 0.6, 1.0)
            .await;
        assert_eq!(played(&log), ["proj.wav", "msg.wav"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_sequences_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("played.log");
        let lock = dir.path().join("audio.lock");
        let first = PlaybackCoordinator::new(&logging_player(&log), lock.clone());
        let second = PlaybackCoordinator::new(&logging_player(&log), lock);

        let ab = [PathBuf::from("A"), PathBuf::from("B")];
        let cd = [PathBuf::from("C"), PathBuf::from("D")];
        tokio::join!(
            first.play_sequence(&ab, 1.0, 1.0),
            second.play_sequence(&cd, 1.0, 1.0)
        );

        let order = played(&log);
        assert!(
            order == ["A", "B", "C", "D"] || order == ["C", "D", "A", "B"],
            "interleaved playback: {order:?}"
        );
    }

    #[tokio::test]
    async fn lock_timeout_skips_playback_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("played.log");
        let lock_path = dir.path().join("audio.lock");
        let _held = AudioLock::acquire(&lock_path, Duration::from_secs(1)).await.unwrap();

        let coordinator = PlaybackCoordinator::new(&logging_player(&log), lock_path)
            .with_lock_timeout(Duration::from_millis(120));
        coordinator.play_one(Path::new("late.wav"), 1.0, 1.0).await;
        assert!(played(&log).is_empty());
    }

    #[tokio::test]
    async fn missing_player_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let player = PlayerConfig {
            command: vec!["voxhook-definitely-not-a-player".into(), "{file}".into()],
            lock_timeout_seconds: 1,
        };
        let coordinator = PlaybackCoordinator::new(&player, dir.path().join("audio.lock"));
        coordinator.play_one(Path::new("a.wav"), 1.0, 1.0).await;

        // The lock was released after the failed run.
        let relock = AudioLock::acquire(&dir.path().join("audio.lock"), Duration::from_millis(100)).await;
        assert!(relock.is_ok());
    }
}
