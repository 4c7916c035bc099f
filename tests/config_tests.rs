use std::path::PathBuf;
use std::time::Duration;

use touch_kiosk::config::{Configuration, PlayerConfig};

#[test]
fn empty_document_uses_defaults() {
    let cfg: Configuration = serde_yaml::from_str("{}").unwrap();
    let cfg = cfg.validated().unwrap();
    assert_eq!(cfg.media_dir, PathBuf::from("media"));
    assert_eq!(cfg.min_dwell, Duration::from_secs(1));
    assert_eq!(cfg.terminate_timeout, Duration::from_secs(2));
    assert_eq!(cfg.blankout, Duration::from_millis(50));
    assert!(cfg.force_kill_after_timeout);
    assert_eq!(cfg.tick_rate, 30);
    assert_eq!(cfg.error_color, [255, 0, 0]);
    assert_eq!(
        cfg.players.iter().map(|p| p.program.as_str()).collect::<Vec<_>>(),
        vec!["omxplayer", "cvlc", "mpv"]
    );
    assert!(cfg.touch.enabled);
    assert!(cfg.touch.device.is_none());
}

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
media-dir: "/srv/kiosk"
min-dwell: 750ms
terminate-timeout: 3s
force-kill-after-timeout: false
blankout: 0ms
tick-rate: 60
fullscreen: false
error-color: [10, 20, 30]
image-extensions: [".PNG", jpg]
video-extensions: [webm]
players:
  - program: mpv
    args: ["--fs"]
  - program: ffplay
touch:
  enabled: false
  device: /dev/input/event3
root-window-command: null
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let cfg = cfg.validated().unwrap();
    assert_eq!(cfg.media_dir, PathBuf::from("/srv/kiosk"));
    assert_eq!(cfg.min_dwell, Duration::from_millis(750));
    assert_eq!(cfg.terminate_timeout, Duration::from_secs(3));
    assert!(!cfg.force_kill_after_timeout);
    assert_eq!(cfg.blankout, Duration::ZERO);
    assert_eq!(cfg.tick_rate, 60);
    assert!(!cfg.fullscreen);
    assert_eq!(cfg.error_color, [10, 20, 30]);
    assert_eq!(cfg.image_extensions, vec!["png", "jpg"]);
    assert_eq!(cfg.video_extensions, vec!["webm"]);
    assert_eq!(
        cfg.players,
        vec![PlayerConfig::new("mpv", &["--fs"]), PlayerConfig::new("ffplay", &[])]
    );
    assert!(!cfg.touch.enabled);
    assert_eq!(cfg.touch.device, Some(PathBuf::from("/dev/input/event3")));
    assert!(cfg.root_window_command.is_none());
}

#[test]
fn unknown_keys_are_rejected() {
    let err = serde_yaml::from_str::<Configuration>("photo-library-path: /photos\n").unwrap_err();
    assert!(err.to_string().contains("unknown field"));
}

#[test]
fn zero_tick_rate_is_rejected() {
    let cfg: Configuration = serde_yaml::from_str("tick-rate: 0\n").unwrap();
    assert!(cfg.validated().is_err());
}

#[test]
fn zero_dwell_is_rejected() {
    let cfg: Configuration = serde_yaml::from_str("min-dwell: 0s\n").unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(err.to_string().contains("min-dwell"));
}

#[test]
fn empty_player_list_is_rejected() {
    let cfg: Configuration = serde_yaml::from_str("players: []\n").unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(err.to_string().contains("players"));
}

#[test]
fn blank_player_program_is_rejected() {
    let yaml = r#"
players:
  - program: "  "
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert!(cfg.validated().is_err());
}

#[test]
fn extension_claimed_by_both_kinds_is_rejected() {
    let yaml = r#"
image-extensions: [gif]
video-extensions: [GIF, mp4]
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(err.to_string().contains("gif"));
}

#[test]
fn empty_root_window_command_is_rejected() {
    let cfg: Configuration = serde_yaml::from_str("root-window-command: []\n").unwrap();
    assert!(cfg.validated().is_err());
}

#[test]
fn loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kiosk.yaml");
    std::fs::write(&path, "media-dir: /tmp/media\ntick-rate: 15\n").unwrap();
    let cfg = Configuration::from_yaml_file(&path).unwrap().validated().unwrap();
    assert_eq!(cfg.media_dir, PathBuf::from("/tmp/media"));
    assert_eq!(cfg.tick_interval(), Duration::from_secs_f64(1.0 / 15.0));
}
