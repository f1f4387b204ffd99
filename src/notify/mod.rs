//! Notification routing: decides, per hook event, whether to speak, push,
//! both or neither, and what to say.
//!
//! The router is generic over its two side-effecting seams: the desktop
//! probe used for awareness and the `Outputs` that play, warm and push.

pub mod cascade;
pub mod category;
pub mod mapping;

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::awareness::{self, AwarenessTier, SystemProbe};
use crate::cache::AudioCache;
use crate::config::{Config, VoxPaths};
use crate::event::RoutingEvent;
use crate::playback::PlaybackCoordinator;
use crate::push::NtfyClient;
use crate::render::{BackgroundRenderer, RenderPiece};
use crate::sentinel::{self, IdleCooldown};

use self::category::NotificationCategory;
use self::mapping::{Notice, NotificationMapping, DEFAULT_TITLE};

const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Side effects the router drives.
pub trait Outputs {
    /// Play files in order without another invocation's audio in between.
    async fn play(&self, files: &[PathBuf], volume: f32, speed: f32);
    /// Schedule rendering of a missing artifact. Must not block.
    fn warm(&self, piece: &RenderPiece);
    fn can_push(&self) -> bool;
    async fn push(&self, title: &str, text: &str);
}

/// Production outputs: external player under the audio lock, detached
/// `voxhook warm` processes and ntfy.
pub struct HookOutputs {
    playback: PlaybackCoordinator,
    renderer: BackgroundRenderer,
    push: Option<NtfyClient>,
}

impl HookOutputs {
    pub fn new(
        playback: PlaybackCoordinator,
        renderer: BackgroundRenderer,
        push: Option<NtfyClient>,
    ) -> Self {
        Self {
            playback,
            renderer,
            push,
        }
    }
}

impl Outputs for HookOutputs {
    async fn play(&self, files: &[PathBuf], volume: f32, speed: f32) {
        match files {
            [one] => self.playback.play_one(one, volume, speed).await,
            _ => self.playback.play_sequence(files, volume, speed).await,
        }
    }

    fn warm(&self, piece: &RenderPiece) {
        self.renderer.spawn(piece);
    }

    fn can_push(&self) -> bool {
        self.push.is_some()
    }

    async fn push(&self, title: &str, text: &str) {
        let Some(client) = &self.push else {
            return;
        };
        match tokio::time::timeout(PUSH_TIMEOUT, client.send(title, text)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Push to {} failed: {e}", client.url()),
            Err(_) => warn!("Push to {} timed out", client.url()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Muted,
    ProjectSuppressed,
    Disabled,
    DelegateSuppressed,
    IdleCooldown,
    Delivered { spoke: bool, pushed: bool },
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Muted => "muted",
            Self::ProjectSuppressed => "suppressed",
            Self::Disabled => "disabled",
            Self::DelegateSuppressed => "delegate",
            Self::IdleCooldown => "cooldown",
            Self::Delivered { spoke: true, pushed: true } => "spoke+pushed",
            Self::Delivered { spoke: true, pushed: false } => "spoke",
            Self::Delivered { spoke: false, pushed: true } => "pushed",
            Self::Delivered { spoke: false, pushed: false } => "silent",
        }
    }
}

/// What the router decided for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub action: Action,
    pub tier: Option<AwarenessTier>,
    pub notice: Option<Notice>,
    /// Cascade rule that produced the notice.
    pub rule: Option<&'static str>,
}

impl Outcome {
    fn early(action: Action) -> Self {
        Self {
            action,
            tier: None,
            notice: None,
            rule: None,
        }
    }
}

pub struct Router<P, O> {
    config: Config,
    mapping: NotificationMapping,
    paths: VoxPaths,
    cache: AudioCache,
    probe: P,
    outputs: O,
}

impl<P: SystemProbe, O: Outputs> Router<P, O> {
    pub fn new(
        config: Config,
        mapping: NotificationMapping,
        paths: VoxPaths,
        probe: P,
        outputs: O,
    ) -> Self {
        let cache = AudioCache::new(paths.cache_dir());
        Self {
            config,
            mapping,
            paths,
            cache,
            probe,
            outputs,
        }
    }

    pub async fn route(&self, event: &RoutingEvent) -> Outcome {
        if sentinel::is_globally_muted(&self.paths) {
            debug!("Globally muted");
            return Outcome::early(Action::Muted);
        }
        if sentinel::is_project_suppressed(event.cwd.as_deref()) {
            debug!("Project {:?} suppressed", event.project_name);
            return Outcome::early(Action::ProjectSuppressed);
        }
        if !self.config.enabled {
            return Outcome::early(Action::Disabled);
        }
        if self.config.suppress_delegate_mode && event.is_delegate_session() {
            debug!("Delegate session, staying quiet");
            return Outcome::early(Action::DelegateSuppressed);
        }
        if cascade::notification_category(event) == Some(NotificationCategory::IdleTimeout) {
            let cooldown = IdleCooldown::new(
                self.paths.idle_cooldown_file(),
                Duration::from_secs(self.config.idle_cooldown_seconds),
            );
            let now = Utc::now();
            if cooldown.is_active(now) {
                info!("Idle notification on cooldown, skipping");
                return Outcome::early(Action::IdleCooldown);
            }
            cooldown.mark(now);
        }

        let tier = awareness::classify(&self.config.awareness, &self.probe, &event.project_name).await;
        let should_speak = matches!(tier, None | Some(AwarenessTier::Nearby));
        let should_push = matches!(tier, None | Some(AwarenessTier::Away));
        info!(
            "Tier {}: speak={should_speak} push={should_push}",
            tier.map_or_else(|| "unknown".to_string(), |t| t.to_string())
        );

        let resolution = cascade::resolve(&self.mapping, event, &mut rand::rng());
        let notice = resolution.notice;

        let spoke = if should_speak && self.config.sound_enabled {
            self.speak(&event.project_name, &notice.message).await
        } else {
            false
        };

        let pushed = should_push && self.config.ntfy_enabled && self.outputs.can_push();
        if pushed {
            let title = if notice.title == DEFAULT_TITLE {
                self.config.ntfy_title.as_str()
            } else {
                notice.title.as_str()
            };
            self.outputs.push(title, &push_text(&event.project_name, &notice.message)).await;
        }

        Outcome {
            action: Action::Delivered { spoke, pushed },
            tier,
            notice: Some(notice),
            rule: Some(resolution.rule),
        }
    }

    /// Play whatever is cached for the project name and message, warming the
    /// rest for next time. Returns whether anything was handed to the player.
    async fn speak(&self, project: &str, message: &str) -> bool {
        let message_piece = RenderPiece::Message(message.to_string());
        let message_file = self.cache.lookup(&message_piece.hash());

        let mut missing = Vec::new();
        let files: Vec<PathBuf> = if project.is_empty() {
            match message_file {
                Some(file) => vec![file],
                None => {
                    missing.push(message_piece);
                    self.cache.any_valid_entry().into_iter().collect()
                }
            }
        } else {
            let project_piece = RenderPiece::Project(project.to_string());
            let project_file = self.cache.lookup(&project_piece.hash());
            match (project_file, message_file) {
                (Some(p), Some(m)) => vec![p, m],
                (Some(p), None) => {
                    missing.push(message_piece);
                    vec![p]
                }
                (None, Some(m)) => {
                    missing.push(project_piece);
                    vec![m]
                }
                (None, None) => {
                    missing.push(project_piece);
                    missing.push(message_piece);
                    self.cache.any_valid_entry().into_iter().collect()
                }
            }
        };

        for piece in &missing {
            debug!("Cache miss for {piece:?}, warming");
            self.outputs.warm(piece);
        }

        if files.is_empty() {
            info!("Nothing cached yet, staying silent");
            return false;
        }
        self.outputs
            .play(&files, self.config.volume, self.config.playback_speed)
            .await;
        true
    }
}

fn push_text(project: &str, message: &str) -> String {
    if project.is_empty() {
        message.to_string()
    } else {
        format!("{project}: {message}")
    }
}
