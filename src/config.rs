use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::classify::ScanSettings;
use crate::suffix::{SuffixEntry, SuffixMap};
use crate::walker::{VideoFilter, DEFAULT_VIDEO_EXTENSIONS};

pub const CONFIG_ENV: &str = "VIDSORT_CONFIG";
pub const MODEL_ENV: &str = "VIDSORT_MODEL";
pub const FRAME_SKIP_ENV: &str = "VIDSORT_FRAME_SKIP";
pub const CONFIDENCE_ENV: &str = "VIDSORT_CONFIDENCE";

const DEFAULT_PRESENCE_LABEL: &str = "person";
const DEFAULT_POSITIVE_DIR: &str = "Person";
const DEFAULT_NEGATIVE_DIR: &str = "noPerson";
const DEFAULT_EXTRACT_LABEL: &str = "person";

/// Per-subcommand sampling defaults, used when neither the config file, the
/// environment nor the command line sets a value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanDefaults {
    pub frame_skip: u32,
    pub confidence: f32,
}

pub const PRESENCE_DEFAULTS: ScanDefaults = ScanDefaults {
    frame_skip: 10,
    confidence: 0.5,
};
pub const TAG_DEFAULTS: ScanDefaults = ScanDefaults {
    frame_skip: 20,
    confidence: 0.9,
};
pub const EXTRACT_DEFAULTS: ScanDefaults = ScanDefaults {
    frame_skip: 1,
    confidence: 0.85,
};
pub const PROBE_DEFAULTS: ScanDefaults = PRESENCE_DEFAULTS;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    model: Option<PathBuf>,
    labels: Option<PathBuf>,
    frame_skip: Option<u32>,
    confidence: Option<f32>,
    extensions: Option<Vec<String>>,
    presence: Option<PresenceConfigFile>,
    extract: Option<ExtractConfigFile>,
    suffixes: Option<Vec<SuffixEntry>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PresenceConfigFile {
    label: Option<String>,
    positive_dir: Option<String>,
    negative_dir: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ExtractConfigFile {
    label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub model: Option<PathBuf>,
    pub labels: Option<PathBuf>,
    /// `None` means "use the subcommand default".
    pub frame_skip: Option<u32>,
    pub confidence: Option<f32>,
    pub extensions: Vec<String>,
    pub presence: PresenceSettings,
    pub extract: ExtractSettings,
    /// Explicit suffix map; empty means "derive from the label vocabulary".
    pub suffixes: Vec<SuffixEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresenceSettings {
    pub label: String,
    pub positive_dir: String,
    pub negative_dir: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractSettings {
    pub label: String,
}

impl Default for Settings {
    fn default() -> Self {
        // An empty file resolves every key to its default.
        Self::from_file(SettingsFile::default())
    }
}

impl Settings {
    /// Resolve settings from `path` (or `VIDSORT_CONFIG`) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        let file_cfg = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => read_config_file(&path)?,
            None => SettingsFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let file: SettingsFile = toml::from_str(raw).context("invalid config")?;
        let cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SettingsFile) -> Self {
        let presence = file.presence.unwrap_or_default();
        let extract = file.extract.unwrap_or_default();
        Self {
            model: file.model,
            labels: file.labels,
            frame_skip: file.frame_skip,
            confidence: file.confidence,
            extensions: file.extensions.unwrap_or_else(|| {
                DEFAULT_VIDEO_EXTENSIONS
                    .iter()
                    .map(|ext| ext.to_string())
                    .collect()
            }),
            presence: PresenceSettings {
                label: presence
                    .label
                    .unwrap_or_else(|| DEFAULT_PRESENCE_LABEL.to_string()),
                positive_dir: presence
                    .positive_dir
                    .unwrap_or_else(|| DEFAULT_POSITIVE_DIR.to_string()),
                negative_dir: presence
                    .negative_dir
                    .unwrap_or_else(|| DEFAULT_NEGATIVE_DIR.to_string()),
            },
            extract: ExtractSettings {
                label: extract
                    .label
                    .unwrap_or_else(|| DEFAULT_EXTRACT_LABEL.to_string()),
            },
            suffixes: file.suffixes.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(model) = std::env::var(MODEL_ENV) {
            if !model.trim().is_empty() {
                self.model = Some(PathBuf::from(model));
            }
        }
        if let Ok(skip) = std::env::var(FRAME_SKIP_ENV) {
            let skip: u32 = skip
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be a positive integer", FRAME_SKIP_ENV))?;
            self.frame_skip = Some(skip);
        }
        if let Ok(confidence) = std::env::var(CONFIDENCE_ENV) {
            let confidence: f32 = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be a number in [0, 1]", CONFIDENCE_ENV))?;
            self.confidence = Some(confidence);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_skip == Some(0) {
            return Err(anyhow!("frame_skip must be >= 1"));
        }
        if let Some(confidence) = self.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(anyhow!("confidence must lie in [0, 1], got {}", confidence));
            }
        }
        if self.extensions.is_empty() {
            return Err(anyhow!("extensions must list at least one video extension"));
        }
        for dir in [&self.presence.positive_dir, &self.presence.negative_dir] {
            validate_dir_name(dir)?;
        }
        if self.presence.positive_dir == self.presence.negative_dir {
            return Err(anyhow!("presence positive_dir and negative_dir must differ"));
        }
        if !self.suffixes.is_empty() {
            SuffixMap::new(self.suffixes.clone())?;
        }
        Ok(())
    }

    /// Layer command-line overrides over the resolved values and the
    /// subcommand defaults.
    pub fn scan_settings(
        &self,
        defaults: ScanDefaults,
        skip: Option<u32>,
        confidence: Option<f32>,
    ) -> Result<ScanSettings> {
        let settings = ScanSettings::new(
            skip.or(self.frame_skip).unwrap_or(defaults.frame_skip),
            confidence
                .or(self.confidence)
                .unwrap_or(defaults.confidence),
        );
        settings.validate()?;
        Ok(settings)
    }

    pub fn video_filter(&self) -> VideoFilter {
        VideoFilter::new(&self.extensions)
    }

    /// The configured suffix map, or `label -> "_label"` over `vocabulary`.
    pub fn suffix_map(&self, vocabulary: &[String]) -> Result<SuffixMap> {
        if self.suffixes.is_empty() {
            SuffixMap::from_labels(vocabulary).context(
                "cannot derive suffixes from the label vocabulary; list them under [[suffixes]]",
            )
        } else {
            SuffixMap::new(self.suffixes.clone())
        }
    }
}

fn validate_dir_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." || name.contains(['/', '\\']) {
        return Err(anyhow!("'{}' is not a valid subdirectory name", name));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<SettingsFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_resolves_to_defaults() {
        let cfg = Settings::from_toml("").unwrap();
        assert_eq!(cfg, Settings::default());
        assert_eq!(cfg.presence.positive_dir, "Person");
        assert_eq!(cfg.presence.negative_dir, "noPerson");
        assert_eq!(cfg.extensions, vec!["mp4", "avi", "mkv", "mov"]);
    }

    #[test]
    fn command_line_beats_file_beats_defaults() {
        let cfg = Settings::from_toml("frame_skip = 5").unwrap();
        let scan = cfg.scan_settings(TAG_DEFAULTS, None, None).unwrap();
        assert_eq!(scan.frame_skip, 5);
        assert_eq!(scan.confidence, 0.9);

        let scan = cfg.scan_settings(TAG_DEFAULTS, Some(2), Some(0.3)).unwrap();
        assert_eq!(scan.frame_skip, 2);
        assert_eq!(scan.confidence, 0.3);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(Settings::from_toml("frame_skip = 0").is_err());
        assert!(Settings::from_toml("confidence = 1.5").is_err());
        assert!(Settings::default()
            .scan_settings(PRESENCE_DEFAULTS, Some(0), None)
            .is_err());
        assert!(Settings::from_toml("[presence]\npositive_dir = \"../out\"").is_err());
    }

    #[test]
    fn suffixes_keep_declared_order() {
        let cfg = Settings::from_toml(
            r#"
            [[suffixes]]
            label = "Vova"
            token = "_Vova"

            [[suffixes]]
            label = "Sha"
            token = "_Sha"
            "#,
        )
        .unwrap();
        let map = cfg.suffix_map(&[]).unwrap();
        assert_eq!(map.tokens().collect::<Vec<_>>(), vec!["_Vova", "_Sha"]);
    }

    #[test]
    fn overlapping_suffixes_are_rejected() {
        let err = Settings::from_toml(
            r#"
            [[suffixes]]
            label = "car"
            token = "_car"

            [[suffixes]]
            label = "carrot"
            token = "_carrot"
            "#,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("_car"));
    }

    #[test]
    fn derives_suffixes_from_vocabulary_when_unset() {
        let cfg = Settings::default();
        let vocabulary = vec!["Leo".to_string(), "Sha".to_string()];
        let map = cfg.suffix_map(&vocabulary).unwrap();
        assert_eq!(map.token_for("Leo"), Some("_Leo"));
    }

    #[test]
    fn unknown_keys_are_errors() {
        assert!(Settings::from_toml("frameskip = 3").is_err());
    }
}
