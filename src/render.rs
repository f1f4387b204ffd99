//! Cache warming through the external speech synthesis command.
//!
//! The hook never waits for synthesis: on a miss it spawns a detached
//! `voxhook warm` process, which renders the text via the configured command
//! and stores the artifact for next time.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::cache::{content_hash, project_key, AudioCache};
use crate::config::RenderConfig;
use crate::error::{Result, VoxError};

/// One piece of speech that can be cached independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderPiece {
    Message(String),
    Project(String),
}

impl RenderPiece {
    /// Text whose digest identifies the artifact.
    pub fn cache_key(&self) -> String {
        match self {
            Self::Message(text) => text.clone(),
            Self::Project(name) => project_key(name),
        }
    }

    pub fn hash(&self) -> String {
        content_hash(&self.cache_key())
    }

    /// Text actually spoken.
    pub fn spoken(&self) -> &str {
        match self {
            Self::Message(text) | Self::Project(text) => text,
        }
    }

    fn is_project(&self) -> bool {
        matches!(self, Self::Project(_))
    }

    fn cli_args(&self) -> [&str; 2] {
        match self {
            Self::Message(text) => ["--text", text],
            Self::Project(name) => ["--project", name],
        }
    }
}

/// Spawns `voxhook warm` in the background, fire-and-forget.
pub struct BackgroundRenderer {
    exe: PathBuf,
    global_args: Vec<String>,
}

impl BackgroundRenderer {
    /// `global_args` are forwarded ahead of the subcommand (`--config`, `--root`).
    pub fn new(exe: PathBuf, global_args: Vec<String>) -> Self {
        Self { exe, global_args }
    }

    pub fn spawn(&self, piece: &RenderPiece) {
        let spawned = std::process::Command::new(&self.exe)
            .args(&self.global_args)
            .arg("warm")
            .args(piece.cli_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(child) => debug!("Spawned cache warmer pid {} for {piece:?}", child.id()),
            Err(e) => warn!("Failed to spawn cache warmer for {piece:?}: {e}"),
        }
    }
}

/// Render `piece` unless already cached, then store it. Returns the artifact path.
pub async fn warm(
    piece: &RenderPiece,
    cache: &AudioCache,
    render: &RenderConfig,
    max_entries: usize,
) -> Result<PathBuf> {
    let hash = piece.hash();
    if let Some(existing) = cache.lookup(&hash) {
        debug!("Already cached: {piece:?} -> {}", existing.display());
        return Ok(existing);
    }

    let output = cache.artifact_path(&hash, piece.is_project());
    std::fs::create_dir_all(cache.dir())?;

    let argv = render_argv(&render.command, piece.spoken(), &output.to_string_lossy());
    let Some((program, args)) = argv.split_first() else {
        return Err(VoxError::Render("empty render command".into()));
    };

    info!("Rendering {:?} via {program}", piece.spoken());
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .status()
        .await?;

    if !status.success() {
        return Err(VoxError::Render(format!("{program} exited with {status}")));
    }
    if !output.exists() {
        return Err(VoxError::Render(format!(
            "{program} produced no file at {}",
            output.display()
        )));
    }

    cache.store(&hash, &piece.cache_key(), &output, max_entries);
    info!("Cached {:?} -> {}", piece.spoken(), output.display());
    Ok(output)
}

/// Warm every message, continuing past failures. Returns (rendered_or_cached, failed).
pub async fn pre_generate(
    messages: &[String],
    cache: &AudioCache,
    render: &RenderConfig,
    max_entries: usize,
) -> (usize, usize) {
    let total = messages.len();
    info!("Pre-generating {total} phrases");
    let mut failed = 0;
    for (i, text) in messages.iter().enumerate() {
        if let Err(e) = warm(&RenderPiece::Message(text.clone()), cache, render, max_entries).await {
            warn!("({}/{total}) FAILED: {text:?} -- {e}", i + 1);
            failed += 1;
        }
    }
    (total - failed, failed)
}

fn render_argv(template: &[String], text: &str, output: &str) -> Vec<String> {
    template
        .iter()
        .map(|arg| arg.replace("{output}", output).replace("{text}", text))
        .collect()
}
