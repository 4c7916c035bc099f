use std::fs;
use std::path::Path;

use touch_kiosk::catalog::{MediaFilter, MediaKind, scan_media_dir};
use touch_kiosk::config::Configuration;
use touch_kiosk::error::CatalogError;

fn touch(dir: &Path, name: &str) {
    fs::write(dir.join(name), b"x").unwrap();
}

#[test]
fn scan_is_sorted_flat_and_classified() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.mp4", "a.JPG", "c.png", "notes.txt", "d.mkv"] {
        touch(dir.path(), name);
    }
    let nested = dir.path().join("nested");
    fs::create_dir(&nested).unwrap();
    touch(&nested, "0-hidden-from-scan.png");

    let catalog = scan_media_dir(dir.path(), &MediaFilter::default()).unwrap();
    let listed: Vec<(String, MediaKind)> = catalog
        .items()
        .iter()
        .map(|item| {
            (
                item.path.file_name().unwrap().to_string_lossy().into_owned(),
                item.kind,
            )
        })
        .collect();
    assert_eq!(
        listed,
        vec![
            ("a.JPG".to_string(), MediaKind::Image),
            ("b.mp4".to_string(), MediaKind::Video),
            ("c.png".to_string(), MediaKind::Image),
            ("d.mkv".to_string(), MediaKind::Video),
        ]
    );
}

#[test]
fn filter_follows_configured_extensions() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "clip.webm");
    touch(dir.path(), "photo.png");

    let cfg: Configuration = serde_yaml::from_str("image-extensions: [jpg]\nvideo-extensions: [webm]\n").unwrap();
    let cfg = cfg.validated().unwrap();
    let catalog = scan_media_dir(dir.path(), &MediaFilter::from_config(&cfg)).unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.get(0).kind, MediaKind::Video);
}

#[test]
fn directory_without_media_is_an_empty_catalog() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "readme.md");
    let err = scan_media_dir(dir.path(), &MediaFilter::default()).unwrap_err();
    assert!(matches!(err, CatalogError::Empty));
}

#[test]
fn missing_directory_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    let err = scan_media_dir(&missing, &MediaFilter::default()).unwrap_err();
    assert!(matches!(err, CatalogError::BadDir(path) if path == missing));
}

#[test]
fn index_wraps_around_the_catalog() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "a.png");
    touch(dir.path(), "b.png");
    let catalog = scan_media_dir(dir.path(), &MediaFilter::default()).unwrap();
    assert_eq!(catalog.next_index(0), 1);
    assert_eq!(catalog.next_index(1), 0);
    assert_eq!(catalog.get(2).path, catalog.get(0).path);
}
