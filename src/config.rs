use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

pub const DEFAULT_MEDIA_DIR: &str = "media";
const MAX_TICK_RATE: u32 = 240;

/// One entry of the video player priority list. The media path is appended
/// after `args` when the player is launched.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PlayerConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl PlayerConfig {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|arg| (*arg).to_string()).collect(),
        }
    }

    /// omxplayer first (Pi-optimized), then VLC, then mpv.
    pub fn default_priority() -> Vec<Self> {
        vec![
            Self::new("omxplayer", &["--no-osd", "--aspect-mode", "fill"]),
            Self::new(
                "cvlc",
                &["--fullscreen", "--no-video-title-show", "--play-and-exit"],
            ),
            Self::new("mpv", &["--fs", "--quiet"]),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct TouchConfig {
    /// Watch a hardware touch device in the background.
    pub enabled: bool,
    /// evdev node to bind; the first device advertising `BTN_TOUCH` when omitted.
    pub device: Option<PathBuf>,
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Directory holding the media catalog (not scanned recursively).
    pub media_dir: PathBuf,
    /// Minimum time an item stays on screen before an advance is honored.
    #[serde(with = "humantime_serde")]
    pub min_dwell: Duration,
    /// Upper bound on waiting for a video player to exit after termination is requested.
    #[serde(with = "humantime_serde")]
    pub terminate_timeout: Duration,
    /// Kill the player outright once `terminate-timeout` has elapsed.
    pub force_kill_after_timeout: bool,
    /// Black hold applied before the surface is recreated after a video.
    #[serde(with = "humantime_serde")]
    pub blankout: Duration,
    /// Control-loop ticks per second.
    pub tick_rate: u32,
    pub fullscreen: bool,
    pub hide_cursor: bool,
    pub window_title: String,
    /// Solid color shown when an image cannot be decoded.
    pub error_color: [u8; 3],
    pub image_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
    pub players: Vec<PlayerConfig>,
    pub touch: TouchConfig,
    /// Command painting the X11 root window black during a surface reset; `null` disables.
    pub root_window_command: Option<Vec<String>>,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(mut self) -> Result<Self> {
        ensure!(
            !self.media_dir.as_os_str().is_empty(),
            "media-dir must not be empty"
        );
        ensure!(
            (1..=MAX_TICK_RATE).contains(&self.tick_rate),
            "tick-rate must be between 1 and {MAX_TICK_RATE}"
        );
        ensure!(
            self.min_dwell > Duration::ZERO,
            "min-dwell must be greater than zero"
        );
        ensure!(
            self.terminate_timeout > Duration::ZERO,
            "terminate-timeout must be greater than zero"
        );
        ensure!(!self.players.is_empty(), "players must list at least one video player");
        for player in &self.players {
            ensure!(
                !player.program.trim().is_empty(),
                "players entries must name a program"
            );
        }
        if let Some(command) = &self.root_window_command {
            ensure!(
                command.first().is_some_and(|program| !program.trim().is_empty()),
                "root-window-command must name a program (use null to disable)"
            );
        }

        self.image_extensions = normalize_extensions(&self.image_extensions)
            .context("invalid image-extensions")?;
        self.video_extensions = normalize_extensions(&self.video_extensions)
            .context("invalid video-extensions")?;
        let images: HashSet<&str> = self.image_extensions.iter().map(String::as_str).collect();
        if let Some(shared) = self
            .video_extensions
            .iter()
            .find(|ext| images.contains(ext.as_str()))
        {
            anyhow::bail!("extension '{shared}' is listed as both image and video");
        }
        Ok(self)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }
}

fn normalize_extensions(raw: &[String]) -> Result<Vec<String>> {
    ensure!(!raw.is_empty(), "extension list must not be empty");
    let mut out = Vec::with_capacity(raw.len());
    for ext in raw {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        ensure!(!ext.is_empty(), "extensions must not be blank");
        if !out.contains(&ext) {
            out.push(ext);
        }
    }
    Ok(out)
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from(DEFAULT_MEDIA_DIR),
            min_dwell: Duration::from_millis(1000),
            terminate_timeout: Duration::from_millis(2000),
            force_kill_after_timeout: true,
            blankout: Duration::from_millis(50),
            tick_rate: 30,
            fullscreen: true,
            hide_cursor: true,
            window_title: "Touch Media Viewer".to_string(),
            error_color: [255, 0, 0],
            image_extensions: ["jpg", "jpeg", "png", "bmp", "gif", "webp"]
                .map(String::from)
                .to_vec(),
            video_extensions: ["mp4", "mov", "mkv", "avi"].map(String::from).to_vec(),
            players: PlayerConfig::default_priority(),
            touch: TouchConfig::default(),
            root_window_command: Some(
                ["xsetroot", "-solid", "black"].map(String::from).to_vec(),
            ),
        }
    }
}
