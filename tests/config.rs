use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use vidsort::config::{Settings, PRESENCE_DEFAULTS, TAG_DEFAULTS};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "VIDSORT_CONFIG",
        "VIDSORT_MODEL",
        "VIDSORT_FRAME_SKIP",
        "VIDSORT_CONFIDENCE",
    ] {
        std::env::remove_var(key);
    }
}

const FAMILY_CONFIG: &str = r#"
model = "models/family.onnx"
labels = "models/family.txt"
frame_skip = 15
extensions = ["mp4", "webm"]

[presence]
label = "dog"
positive_dir = "Dog"
negative_dir = "noDog"

[extract]
label = "Leo"

[[suffixes]]
label = "Vova"
token = "_Vova"

[[suffixes]]
label = "Sha"
token = "_Sha"

[[suffixes]]
label = "Leo"
token = "_Leo"
"#;

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, FAMILY_CONFIG.as_bytes()).expect("write config");

    std::env::set_var("VIDSORT_CONFIG", file.path());
    std::env::set_var("VIDSORT_MODEL", "/opt/models/yolov8n.onnx");
    std::env::set_var("VIDSORT_CONFIDENCE", "0.75");

    let cfg = Settings::load(None).expect("load config");

    assert_eq!(cfg.model, Some(PathBuf::from("/opt/models/yolov8n.onnx")));
    assert_eq!(cfg.labels, Some(PathBuf::from("models/family.txt")));
    assert_eq!(cfg.frame_skip, Some(15));
    assert_eq!(cfg.confidence, Some(0.75));
    assert_eq!(cfg.presence.label, "dog");
    assert_eq!(cfg.presence.positive_dir, "Dog");
    assert_eq!(cfg.presence.negative_dir, "noDog");
    assert_eq!(cfg.extract.label, "Leo");
    assert!(cfg.video_filter().matches("clip.WEBM"));
    assert!(!cfg.video_filter().matches("clip.mov"));

    let map = cfg.suffix_map(&[]).expect("suffix map");
    assert_eq!(map.tokens().collect::<Vec<_>>(), vec!["_Vova", "_Sha", "_Leo"]);

    let scan = cfg.scan_settings(TAG_DEFAULTS, None, None).unwrap();
    assert_eq!(scan.frame_skip, 15);
    assert_eq!(scan.confidence, 0.75);

    clear_env();
}

#[test]
fn explicit_path_wins_over_env_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"frame_skip = 3\n").expect("write config");
    std::env::set_var("VIDSORT_CONFIG", "/no/such/vidsort.toml");

    let cfg = Settings::load(Some(file.path())).expect("load config");
    assert_eq!(cfg.frame_skip, Some(3));

    clear_env();
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = Settings::load(None).expect("load config");
    let scan = cfg.scan_settings(PRESENCE_DEFAULTS, None, None).unwrap();
    assert_eq!(scan.frame_skip, 10);
    assert_eq!(scan.confidence, 0.5);
    assert!(cfg.model.is_none());
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VIDSORT_FRAME_SKIP", "0");
    assert!(Settings::load(None).is_err());

    std::env::set_var("VIDSORT_FRAME_SKIP", "ten");
    assert!(Settings::load(None).is_err());
    std::env::remove_var("VIDSORT_FRAME_SKIP");

    std::env::set_var("VIDSORT_CONFIDENCE", "-0.1");
    assert!(Settings::load(None).is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VIDSORT_CONFIG", "/no/such/vidsort.toml");
    assert!(Settings::load(None).is_err());

    clear_env();
}
