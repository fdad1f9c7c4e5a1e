//! Command-line model and dispatch for the `vidsort` binary.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::classify::{ClassificationEngine, NoSink, ScanReport, ScanSettings};
use crate::config::{
    ScanDefaults, Settings, EXTRACT_DEFAULTS, PRESENCE_DEFAULTS, PROBE_DEFAULTS, TAG_DEFAULTS,
};
use crate::detect::{labels, load_model, Detector};
use crate::ingest::VideoOpener;
use crate::suffix::SuffixMap;
use crate::tasks::{
    ExtractLayout, FrameExtractor, PresenceLayout, PresenceSorter, SuffixStripper, SuffixTagger,
    VideoTask,
};
use crate::ui::Ui;
use crate::walker::{BatchSummary, CollectionWalker};

#[derive(Parser, Debug)]
#[command(name = "vidsort", author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
    /// TOML configuration file.
    #[arg(long, global = true, env = "VIDSORT_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Write the batch summary (or probe report) as JSON to this file.
    #[arg(long, global = true, value_name = "PATH")]
    pub report: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, global = true, default_value = "auto", value_name = "MODE")]
    pub ui: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Move each video into a subdirectory by whether the label appears in it.
    Presence {
        input_dir: PathBuf,
        /// Label to look for (default from config, else "person").
        #[arg(long)]
        label: Option<String>,
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        scan: ScanArgs,
    },
    /// Rename each video to carry one suffix per detected class.
    Tag {
        input_dir: PathBuf,
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        scan: ScanArgs,
    },
    /// Remove all known suffixes from video names.
    Strip {
        input_dir: PathBuf,
        /// Label vocabulary used when the config has no [[suffixes]].
        #[arg(long, value_name = "PATH")]
        labels: Option<PathBuf>,
    },
    /// Write annotated frames for detector training.
    Extract {
        input_dir: PathBuf,
        output_dir: PathBuf,
        /// Class number written into the annotation files.
        class_number: u32,
        /// Label whose boxes are exported (default from config, else "person").
        #[arg(long)]
        label: Option<String>,
        /// What to do with videos showing several subjects in one frame.
        #[arg(long, value_enum, default_value_t = MultiInstance::Reject)]
        multi_instance: MultiInstance,
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        scan: ScanArgs,
    },
    /// Scan a single video; exits 0 when the label is found, 1 otherwise.
    Probe {
        video: PathBuf,
        #[arg(long)]
        label: Option<String>,
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        scan: ScanArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// ONNX detector model.
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,
    /// Newline-separated label vocabulary (defaults to COCO).
    #[arg(long, value_name = "PATH")]
    pub labels: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ScanArgs {
    /// Process every N-th frame.
    #[arg(
        short = 's',
        long = "skip",
        visible_alias = "frame-skip",
        short_alias = 'f',
        value_name = "N"
    )]
    pub skip: Option<u32>,
    /// Minimum detection confidence in [0, 1].
    #[arg(short = 'c', long, value_name = "F")]
    pub confidence: Option<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum MultiInstance {
    /// Delete the video's extracted frames and rename it to `<name>.bad`.
    Reject,
    /// Keep every frame and annotate all instances.
    Keep,
}

/// Run a parsed command line. Returns the process exit code.
pub fn run(cli: Cli) -> Result<i32> {
    let settings = Settings::load(cli.config.as_deref())?;
    let ui = Ui::from_args(
        Some(&cli.ui),
        std::io::stderr().is_terminal(),
        !std::io::stdout().is_terminal(),
    );
    let report = cli.report.as_deref();

    match cli.command {
        Command::Presence {
            input_dir,
            label,
            model,
            scan,
        } => {
            check_input_dir(&input_dir)?;
            let scan = scan_settings(&settings, PRESENCE_DEFAULTS, &scan)?;
            let (detector, vocabulary) = load_detector(&ui, &model, &settings)?;
            let label = label.unwrap_or_else(|| settings.presence.label.clone());
            warn_unknown_label(&label, &vocabulary);
            let layout = PresenceLayout::under(
                &input_dir,
                &label,
                &settings.presence.positive_dir,
                &settings.presence.negative_dir,
            );
            let mut task =
                PresenceSorter::new(detector, Box::new(VideoOpener::new()), scan, layout)?;
            let summary = walk(&ui, &input_dir, &settings, &mut task)?;
            write_report(report, &summary)?;
        }
        Command::Tag {
            input_dir,
            model,
            scan,
        } => {
            check_input_dir(&input_dir)?;
            let scan = scan_settings(&settings, TAG_DEFAULTS, &scan)?;
            let (detector, vocabulary) = load_detector(&ui, &model, &settings)?;
            let map = settings.suffix_map(&vocabulary)?;
            let mut task = SuffixTagger::new(detector, Box::new(VideoOpener::new()), scan, map)?;
            let summary = walk(&ui, &input_dir, &settings, &mut task)?;
            write_report(report, &summary)?;
        }
        Command::Strip { input_dir, labels } => {
            check_input_dir(&input_dir)?;
            let map = strip_map(&settings, labels.as_deref())?;
            let mut task = SuffixStripper::new(map);
            let summary = walk(&ui, &input_dir, &settings, &mut task)?;
            write_report(report, &summary)?;
        }
        Command::Extract {
            input_dir,
            output_dir,
            class_number,
            label,
            multi_instance,
            model,
            scan,
        } => {
            check_input_dir(&input_dir)?;
            let scan = scan_settings(&settings, EXTRACT_DEFAULTS, &scan)?;
            let (detector, vocabulary) = load_detector(&ui, &model, &settings)?;
            let label = label.unwrap_or_else(|| settings.extract.label.clone());
            warn_unknown_label(&label, &vocabulary);
            let layout = ExtractLayout {
                output_dir,
                label,
                class_number,
                reject_multiple: multi_instance == MultiInstance::Reject,
            };
            let mut task =
                FrameExtractor::new(detector, Box::new(VideoOpener::new()), scan, layout)?;
            let summary = walk(&ui, &input_dir, &settings, &mut task)?;
            write_report(report, &summary)?;
        }
        Command::Probe {
            video,
            label,
            model,
            scan,
        } => {
            let scan = scan_settings(&settings, PROBE_DEFAULTS, &scan)?;
            let (detector, vocabulary) = load_detector(&ui, &model, &settings)?;
            let label = label.unwrap_or_else(|| settings.presence.label.clone());
            warn_unknown_label(&label, &vocabulary);
            let mut engine =
                ClassificationEngine::new(detector, scan.with_targets([label.clone()]))?;
            let scan_report = {
                let _stage = ui.stage("Scan video");
                engine.scan_path(&VideoOpener::new(), &video, &mut NoSink)?
            };
            write_report(report, &scan_report)?;

            let (lines, code) = scan_summary(&scan_report, &label);
            for line in lines {
                println!("{}", line);
            }
            return Ok(code);
        }
    }
    Ok(0)
}

/// Lines printed for a single-video scan and the exit code: 0 when `label`
/// was seen, 1 otherwise.
fn scan_summary(report: &ScanReport, label: &str) -> (Vec<String>, i32) {
    let mut lines = Vec::new();
    if !report.classes.is_empty() {
        let classes: Vec<&str> = report.classes.iter().map(String::as_str).collect();
        lines.push(format!("Detected classes: {}", classes.join(", ")));
    }
    if report.contains(label) {
        lines.push(format!("The video contains a {}.", label));
        (lines, 0)
    } else {
        lines.push(format!("No {} detected in the video.", label));
        (lines, 1)
    }
}

fn scan_settings(settings: &Settings, defaults: ScanDefaults, args: &ScanArgs) -> Result<ScanSettings> {
    settings.scan_settings(defaults, args.skip, args.confidence)
}

fn check_input_dir(path: &Path) -> Result<()> {
    if !path.is_dir() {
        return Err(anyhow!("input directory {} does not exist", path.display()));
    }
    Ok(())
}

fn vocabulary(labels_path: Option<&Path>) -> Result<Vec<String>> {
    match labels_path {
        Some(path) => labels::load_labels(path),
        None => Ok(labels::coco_labels()),
    }
}

fn load_detector(
    ui: &Ui,
    args: &ModelArgs,
    settings: &Settings,
) -> Result<(Box<dyn Detector>, Vec<String>)> {
    let vocabulary = vocabulary(args.labels.as_deref().or(settings.labels.as_deref()))?;
    let model = args
        .model
        .as_ref()
        .or(settings.model.as_ref())
        .ok_or_else(|| anyhow!("no detector model configured; pass --model or set VIDSORT_MODEL"))?;
    let _stage = ui.stage("Load detector");
    let detector = load_model(model, vocabulary.clone())?;
    log::info!(
        "{} detector loaded from {} ({} labels)",
        detector.name(),
        model.display(),
        vocabulary.len()
    );
    Ok((detector, vocabulary))
}

fn strip_map(settings: &Settings, labels_path: Option<&Path>) -> Result<SuffixMap> {
    if !settings.suffixes.is_empty() {
        return SuffixMap::new(settings.suffixes.clone());
    }
    let path = labels_path
        .or(settings.labels.as_deref())
        .ok_or_else(|| anyhow!("strip needs [[suffixes]] in the config or a --labels file"))?;
    settings.suffix_map(&labels::load_labels(path)?)
}

fn warn_unknown_label(label: &str, vocabulary: &[String]) {
    if !vocabulary.iter().any(|known| known == label) {
        log::warn!("label '{}' is not in the detector vocabulary", label);
    }
}

fn walk(
    ui: &Ui,
    directory: &Path,
    settings: &Settings,
    task: &mut dyn VideoTask,
) -> Result<BatchSummary> {
    let filter = settings.video_filter();
    let mut progress = ui.progress();
    CollectionWalker::new(directory).run_observed(
        |name| filter.matches(name),
        |path| task.process(path),
        &mut progress,
    )
}

fn write_report<T: serde::Serialize>(path: Option<&Path>, report: &T) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let json = serde_json::to_vec_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write report {}", path.display()))?;
    log::info!("report written to {}", path.display());
    Ok(())
}
