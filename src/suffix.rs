//! Filename suffix bookkeeping.
//!
//! Videos carry their detected classes as suffix tokens between the stem and
//! the extension: `beach.mp4` with `Leo` and `Sha` detected becomes
//! `beach_Sha_Leo.mp4` when the map declares `Sha` before `Leo`.
//!
//! Stripping removes every occurrence of each known token anywhere in the
//! stem, not only a trailing match. Tokens are validated so that none is a
//! substring of another and no token's leading character recurs inside any
//! token; together these keep every token occurrence in a decorated name
//! aligned with the tokens that were appended. A base stem that itself
//! contains a token is still altered by stripping.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Distinct class labels accumulated while scanning one video.
pub type ClassSet = BTreeSet<String>;

/// One `label -> token` association.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffixEntry {
    pub label: String,
    pub token: String,
}

/// Ordered mapping from class label to suffix token.
///
/// Declaration order is the order tokens are appended in, which keeps the
/// decorated name identical across runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SuffixMap {
    entries: Vec<SuffixEntry>,
}

impl SuffixMap {
    pub fn new(entries: Vec<SuffixEntry>) -> Result<Self> {
        let map = Self { entries };
        map.validate()?;
        Ok(map)
    }

    /// Derive `label -> "_label"` for every label, keeping vocabulary order.
    pub fn from_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = labels
            .into_iter()
            .map(|label| {
                let label = label.as_ref();
                SuffixEntry {
                    label: label.to_string(),
                    token: format!("_{}", label),
                }
            })
            .collect();
        Self::new(entries)
    }

    pub fn entries(&self) -> &[SuffixEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.label.as_str())
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.token.as_str())
    }

    pub fn token_for(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.label == label)
            .map(|entry| entry.token.as_str())
    }

    /// Label set used as the early-exit target when tagging.
    pub fn label_set(&self) -> ClassSet {
        self.labels().map(str::to_string).collect()
    }

    fn validate(&self) -> Result<()> {
        static TOKEN_RE: OnceLock<regex::Regex> = OnceLock::new();
        let re = TOKEN_RE.get_or_init(|| regex::Regex::new(r"^[\w +\-]{1,64}$").unwrap());

        let mut seen = BTreeSet::new();
        for entry in &self.entries {
            if entry.label.trim().is_empty() {
                return Err(anyhow!("suffix map contains an empty label"));
            }
            if !seen.insert(entry.label.as_str()) {
                return Err(anyhow!("label '{}' is mapped more than once", entry.label));
            }
            if !re.is_match(&entry.token) {
                return Err(anyhow!(
                    "suffix token '{}' for label '{}' must match ^[\\w +-]{{1,64}}$",
                    entry.token,
                    entry.label
                ));
            }
        }

        for (i, a) in self.entries.iter().enumerate() {
            for (j, b) in self.entries.iter().enumerate() {
                if i != j && b.token.contains(a.token.as_str()) {
                    return Err(anyhow!(
                        "suffix token '{}' is contained in '{}'; stripping would corrupt names",
                        a.token,
                        b.token
                    ));
                }
            }
        }

        // Every token starts with a marker character that appears nowhere
        // else in any token, so no occurrence can span a stem/token or
        // token/token join.
        let markers: BTreeSet<char> = self
            .entries
            .iter()
            .filter_map(|entry| entry.token.chars().next())
            .collect();
        for entry in &self.entries {
            if let Some(marker) = entry.token.chars().skip(1).find(|c| markers.contains(c)) {
                return Err(anyhow!(
                    "suffix token '{}' repeats the leading character '{}' after its start; \
                     decorated names could not be stripped reliably",
                    entry.token,
                    marker
                ));
            }
        }
        Ok(())
    }
}

/// Split a file name into `(stem, extension)` at the last `.`.
///
/// The extension keeps its dot. Leading dots belong to the stem, so
/// `.profile` has no extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if name[..idx].chars().any(|c| c != '.') => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Remove every occurrence of each token from the stem of `name`.
///
/// Tokens are applied in the given order. The extension is never touched.
pub fn strip_suffixes<'a, I>(name: &str, tokens: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let (stem, extension) = split_extension(name);
    let mut stem = stem.to_string();
    for token in tokens {
        if token.is_empty() {
            continue;
        }
        stem = stem.replace(token, "");
    }
    stem.push_str(extension);
    stem
}

/// Concatenate the tokens of every detected label, in map order.
pub fn build_suffix(detected: &ClassSet, map: &SuffixMap) -> String {
    map.entries()
        .iter()
        .filter(|entry| detected.contains(&entry.label))
        .map(|entry| entry.token.as_str())
        .collect()
}

/// Insert `suffix` between the stem and the extension of `name`.
pub fn decorate(name: &str, suffix: &str) -> String {
    let (stem, extension) = split_extension(name);
    format!("{}{}{}", stem, suffix, extension)
}

/// Base name of `name` with respect to `map`.
pub fn clean_name(name: &str, map: &SuffixMap) -> String {
    strip_suffixes(name, map.tokens())
}

/// Decorated name for `name` given the detected classes.
///
/// Any tokens already present are stripped first, so repeated application
/// converges on the same name.
pub fn decorated_name(name: &str, detected: &ClassSet, map: &SuffixMap) -> String {
    decorate(&clean_name(name, map), &build_suffix(detected, map))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family() -> SuffixMap {
        SuffixMap::new(vec![
            SuffixEntry {
                label: "Vova".into(),
                token: "_Vova".into(),
            },
            SuffixEntry {
                label: "Sha".into(),
                token: "_Sha".into(),
            },
            SuffixEntry {
                label: "Leo".into(),
                token: "_Leo".into(),
            },
        ])
        .unwrap()
    }

    fn classes(labels: &[&str]) -> ClassSet {
        labels.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn splits_like_a_file_name() {
        assert_eq!(split_extension("beach.mp4"), ("beach", ".mp4"));
        assert_eq!(split_extension("a.b.mkv"), ("a.b", ".mkv"));
        assert_eq!(split_extension("noext"), ("noext", ""));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
        assert_eq!(split_extension("..dots"), ("..dots", ""));
        assert_eq!(split_extension("trailing."), ("trailing", "."));
    }

    #[test]
    fn strip_removes_tokens_anywhere_in_the_stem() {
        let map = family();
        assert_eq!(clean_name("beach_Sha_Leo.mp4", &map), "beach.mp4");
        assert_eq!(clean_name("my_Leo_trip_Leo.mov", &map), "my_trip.mov");
        assert_eq!(clean_name("plain.avi", &map), "plain.avi");
    }

    #[test]
    fn strip_never_touches_the_extension() {
        assert_eq!(strip_suffixes("x_mp4.mp4", ["_mp4", "mp4"]), "x.mp4");
    }

    #[test]
    fn suffix_follows_map_order_not_detection_order() {
        let map = family();
        let detected = classes(&["Leo", "Vova", "dog"]);
        assert_eq!(build_suffix(&detected, &map), "_Vova_Leo");
        assert_eq!(build_suffix(&detected, &map), build_suffix(&detected, &map));
        assert_eq!(build_suffix(&classes(&["dog"]), &map), "");
    }

    #[test]
    fn decorating_twice_is_idempotent() {
        let map = family();
        let detected = classes(&["Sha", "Leo"]);
        let once = decorated_name("party.mp4", &detected, &map);
        assert_eq!(once, "party_Sha_Leo.mp4");
        let twice = decorated_name(&once, &detected, &map);
        assert_eq!(twice, once);
        assert_eq!(clean_name(&twice, &map), "party.mp4");
    }

    #[test]
    fn strip_undoes_any_decoration() {
        let map = family();
        let all: Vec<&str> = map.labels().collect();
        for mask in 0u8..8 {
            let picked: Vec<&str> = all
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, l)| *l)
                .collect();
            let suffix = build_suffix(&classes(&picked), &map);
            let name = format!("clip{}.mp4", suffix);
            assert_eq!(clean_name(&name, &map), "clip.mp4");
        }
    }

    #[test]
    fn derives_tokens_from_labels() {
        let map = SuffixMap::from_labels(["Vova", "Sha"]).unwrap();
        assert_eq!(map.token_for("Sha"), Some("_Sha"));
        assert_eq!(map.label_set(), classes(&["Sha", "Vova"]));
    }

    #[test]
    fn rejects_overlapping_tokens() {
        let err = SuffixMap::from_labels(["car", "carrot"]).unwrap_err();
        assert!(err.to_string().contains("contained in"));
    }

    #[test]
    fn rejects_path_separators_and_dots() {
        for token in ["_a/b", "_a\\b", "_v1.2", ""] {
            let result = SuffixMap::new(vec![SuffixEntry {
                label: "x".into(),
                token: token.into(),
            }]);
            assert!(result.is_err(), "token {:?} should be rejected", token);
        }
    }

    #[test]
    fn rejects_tokens_that_could_match_across_a_join() {
        let result = SuffixMap::new(vec![
            SuffixEntry {
                label: "x".into(),
                token: "_x_y".into(),
            },
            SuffixEntry {
                label: "yz".into(),
                token: "_yz".into(),
            },
        ]);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("_x_y"));

        // Mixed markers are checked against each other too.
        let result = SuffixMap::new(vec![
            SuffixEntry {
                label: "a".into(),
                token: "-a_b".into(),
            },
            SuffixEntry {
                label: "c".into(),
                token: "_c".into(),
            },
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn accepted_maps_strip_back_to_stems_ending_in_token_fragments() {
        let map = SuffixMap::new(vec![
            SuffixEntry {
                label: "x".into(),
                token: "_x".into(),
            },
            SuffixEntry {
                label: "yz".into(),
                token: "_yz".into(),
            },
        ])
        .unwrap();
        for stem in ["clip_", "clip_y", "clip_x_", "clipz"] {
            let name = format!("{}.mp4", stem);
            if clean_name(&name, &map) != name {
                continue;
            }
            for detected in [classes(&["x"]), classes(&["yz"]), classes(&["x", "yz"])] {
                let decorated = decorated_name(&name, &detected, &map);
                assert_eq!(clean_name(&decorated, &map), name, "decorated {}", decorated);
            }
        }
    }

    #[test]
    fn rejects_duplicate_labels() {
        let entry = SuffixEntry {
            label: "Leo".into(),
            token: "_Leo".into(),
        };
        assert!(SuffixMap::new(vec![entry.clone(), entry]).is_err());
    }
}
