//! voxhook: spoken and push notifications for Claude Code hook events.

mod awareness;
mod cache;
mod config;
mod error;
mod event;
mod history;
mod notify;
mod playback;
mod push;
mod render;
mod sentinel;

use std::fs::OpenOptions;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::awareness::OsProbe;
use crate::cache::AudioCache;
use crate::config::{Config, VoxPaths};
use crate::event::RoutingEvent;
use crate::history::HistoryRecord;
use crate::notify::mapping::NotificationMapping;
use crate::notify::{HookOutputs, Router};
use crate::playback::PlaybackCoordinator;
use crate::push::NtfyClient;
use crate::render::{BackgroundRenderer, RenderPiece};

#[derive(Parser, Debug)]
#[command(name = "voxhook", about = "Spoken and push notifications for Claude Code hooks")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// State directory (default: ~/.claude/hooks/voxhook)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Route one hook event read from stdin (the default)
    Hook {
        /// ntfy topic, overrides `ntfy_topic` from the config
        #[arg(long)]
        ntfy_topic: Option<String>,
    },
    /// Render missing audio into the cache
    Warm {
        /// A message to render
        #[arg(long)]
        text: Option<String>,
        /// A project name to render
        #[arg(long)]
        project: Option<String>,
        /// Every static message of the notification mapping
        #[arg(long)]
        all: bool,
    },
    /// Print cache entry counts
    CacheStats,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Hook callers only see the exit status; argument errors must not fail it.
    let mut args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return;
        }
    };

    let paths = VoxPaths::new(args.root.clone().unwrap_or_else(VoxPaths::default_root));
    let command = args.command.take().unwrap_or(Command::Hook { ntfy_topic: None });
    if skip_muted_hook(&command, &paths) {
        return;
    }
    init_logging(&paths, args.verbose);

    let config = Config::load(args.config.as_deref(), &paths);
    let forwarded = forwarded_args(&args);

    match command {
        Command::Hook { ntfy_topic } => run_hook(config, paths, ntfy_topic, forwarded).await,
        Command::Warm { text, project, all } => run_warm(&config, &paths, text, project, all).await,
        Command::CacheStats => run_cache_stats(&paths),
    }
}

/// Global mute ends a hook invocation before stdin, config or mapping are read.
fn skip_muted_hook(command: &Command, paths: &VoxPaths) -> bool {
    matches!(command, Command::Hook { .. }) && sentinel::is_globally_muted(paths)
}

/// Log to `<root>/debug.log`: stdout and stderr belong to the hook caller.
fn init_logging(paths: &VoxPaths, verbose: bool) {
    let filter = EnvFilter::try_from_env("VOXHOOK_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { "info" })
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let _ = std::fs::create_dir_all(&paths.root);
    match OpenOptions::new().create(true).append(true).open(paths.log_file()) {
        Ok(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).init(),
        Err(_) => builder.with_writer(std::io::stderr).init(),
    }
}

/// Global flags the background `warm` process needs to see the same state.
fn forwarded_args(args: &Args) -> Vec<String> {
    let mut forwarded = Vec::new();
    if let Some(config) = &args.config {
        forwarded.push("--config".to_string());
        forwarded.push(config.to_string_lossy().into_owned());
    }
    if let Some(root) = &args.root {
        forwarded.push("--root".to_string());
        forwarded.push(root.to_string_lossy().into_owned());
    }
    forwarded
}

async fn run_hook(config: Config, paths: VoxPaths, ntfy_topic: Option<String>, forwarded: Vec<String>) {
    let t0 = Instant::now();

    let mut input = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut input) {
        warn!("Failed to read hook input: {e}");
    }
    let event = RoutingEvent::parse(&input);
    info!("Hook event {} in {:?}", event.kind, event.project_name);

    let push = ntfy_topic
        .or_else(|| config.ntfy_topic.clone())
        .filter(|topic| !topic.trim().is_empty())
        .map(|topic| {
            NtfyClient::new(
                &config.ntfy_server,
                topic.trim(),
                config.ntfy_priority,
                &config.ntfy_tags,
            )
        });
    let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("voxhook"));
    let outputs = HookOutputs::new(
        PlaybackCoordinator::new(&config.player, paths.lock_file.clone()),
        BackgroundRenderer::new(exe, forwarded),
        push,
    );
    let probe = OsProbe::new(&config.awareness);
    let mapping = NotificationMapping::load(&paths);
    let history_dir = paths.history_dir();

    let router = Router::new(config, mapping, paths, probe, outputs);
    let outcome = router.route(&event).await;
    info!("Hook done: {} ({:?})", outcome.action.as_str(), outcome.rule);

    history::save_record(&history_dir, &HistoryRecord::new(&event, &outcome, t0.elapsed()));
}

async fn run_warm(
    config: &Config,
    paths: &VoxPaths,
    text: Option<String>,
    project: Option<String>,
    all: bool,
) {
    let cache = AudioCache::new(paths.cache_dir());
    let max_entries = config.cache.max_entries;

    if all {
        let messages = NotificationMapping::load(paths).static_messages();
        let (ok, failed) = render::pre_generate(&messages, &cache, &config.render, max_entries).await;
        println!("{ok} cached, {failed} failed");
    }

    let pieces = text
        .map(RenderPiece::Message)
        .into_iter()
        .chain(project.map(RenderPiece::Project));
    for piece in pieces {
        match render::warm(&piece, &cache, &config.render, max_entries).await {
            Ok(path) => println!("{}", path.display()),
            Err(e) => {
                warn!("Warming {piece:?} failed: {e}");
                eprintln!("{:?}: {e}", piece.spoken());
            }
        }
    }
}

fn run_cache_stats(paths: &VoxPaths) {
    let stats = AudioCache::new(paths.cache_dir()).stats();
    match serde_json::to_string_pretty(&stats) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to format cache stats: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_mute_short_circuits_only_the_hook() {
        let dir = tempfile::tempdir().unwrap();
        let paths = VoxPaths::new(dir.path().to_path_buf());
        let hook = Command::Hook { ntfy_topic: None };
        assert!(!skip_muted_hook(&hook, &paths));

        std::fs::write(paths.mute_file(), "").unwrap();
        assert!(skip_muted_hook(&hook, &paths));
        assert!(!skip_muted_hook(&Command::CacheStats, &paths));
    }

    #[test]
    fn forwards_state_flags_to_background_warmers() {
        let args = Args::try_parse_from(["voxhook", "--root", "/tmp/vox", "hook"]).unwrap();
        assert_eq!(forwarded_args(&args), ["--root", "/tmp/vox"]);
        assert!(matches!(args.command, Some(Command::Hook { ntfy_topic: None })));
    }
}
