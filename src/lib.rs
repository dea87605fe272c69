//! Annotated Slides - Core Library
//!
//! Drives the pipeline for a folder of recordings: for each video, sample
//! frames into a scratch directory, pick the annotated slide states and
//! collect them into a PDF named after the video.

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub mod video_processor;
pub mod frame_analyzer;
pub mod document_builder;
pub mod natural_order;

use frame_analyzer::{AnalysisReport, Thresholds};

/// Application configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    /// Folder scanned for recordings.
    pub source_dir: PathBuf,
    /// Scratch folder for one video's frames. Cleared before every video.
    pub frame_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Recordings are matched on this extension, ignoring ASCII case.
    pub video_extension: String,
    pub interval_secs: u64,
    pub thresholds: Thresholds,
    /// Also write `analysis/<video>.json` next to the PDFs.
    pub generate_index: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source_dir: PathBuf::from("recordings"),
            frame_dir: PathBuf::from("images"),
            output_dir: PathBuf::from("pdfs"),
            video_extension: "mp4".to_string(),
            interval_secs: 20,
            thresholds: Thresholds::default(),
            generate_index: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            bail!("Sampling interval must be greater than zero");
        }
        if self.video_extension.is_empty() {
            bail!("Video extension must not be empty");
        }
        Ok(())
    }
}

/// Why a video produced no document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoFrames,
    NoAnnotations,
}

/// What happened to each video in a run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub documents: Vec<PathBuf>,
    pub skipped: Vec<(PathBuf, SkipReason)>,
}

enum VideoOutcome {
    Document(PathBuf),
    Skipped(SkipReason),
}

/// Processes every recording in `config.source_dir`.
///
/// Per-video problems (nothing decodable, nothing selected) are logged and
/// the video is skipped. Filesystem errors abort the run.
pub fn run(config: &Config) -> Result<RunSummary> {
    info!("Initializing processing with config: {:?}", config);
    config.validate()?;

    // 1. Check the source directory
    let mut summary = RunSummary::default();
    if !config.source_dir.exists() {
        warn!("No videos found: {:?} does not exist.", config.source_dir);
        return Ok(summary);
    }

    // 2. Setup scratch and output directories
    fs::create_dir_all(&config.frame_dir).context("Failed to create frame directory")?;
    fs::create_dir_all(&config.output_dir).context("Failed to create output directory")?;

    // 3. Process each video in turn
    let mut used_stems = HashSet::new();
    for video in list_videos(&config.source_dir, &config.video_extension)? {
        info!("--- VIDEO: {:?} ---", video.file_name().unwrap_or_default());
        let stem = document_stem(&video, &mut used_stems);
        match process_video(&video, &stem, config)? {
            VideoOutcome::Document(path) => summary.documents.push(path),
            VideoOutcome::Skipped(reason) => summary.skipped.push((video, reason)),
        }
    }

    info!(
        "Done. {} documents written, {} videos skipped.",
        summary.documents.len(),
        summary.skipped.len()
    );
    Ok(summary)
}

fn process_video(video: &Path, stem: &str, config: &Config) -> Result<VideoOutcome> {
    // 1. Clear the previous video's frames
    phase("clearing frame directory", || clear_frame_dir(&config.frame_dir))?;

    // 2. Sample frames
    let frame_count = phase("extracting frames", || {
        video_processor::extract_frames(video, &config.frame_dir, config.interval_secs)
    })?;
    if frame_count == 0 {
        error!("No frames found in {:?}. Check the video.", video);
        return Ok(VideoOutcome::Skipped(SkipReason::NoFrames));
    }

    // 3. Pick the annotated frames
    let (frames, selection) = phase("finding annotations", || -> Result<_> {
        let frames = frame_analyzer::scan_frame_dir(&config.frame_dir)?;
        let selection = frame_analyzer::detect_annotations(&frames, &config.thresholds);
        Ok((frames, selection))
    })?;

    if config.generate_index {
        let report_path = AnalysisReport::new(stem, &frames, &selection).write(&config.output_dir)?;
        info!("Wrote analysis report {:?}", report_path);
    }

    if selection.is_empty() {
        error!("No annotated frames selected from {:?}. Skipping document.", video);
        return Ok(VideoOutcome::Skipped(SkipReason::NoAnnotations));
    }

    // 4. Build the document
    let pdf_path = config.output_dir.join(format!("{}.pdf", stem));
    phase("building document", || {
        document_builder::build_pdf(&selection.sorted_paths(), &pdf_path)
    })
    .with_context(|| format!("Failed to build PDF for {:?}", video))?;
    info!("Successfully created PDF: {:?}", pdf_path);

    Ok(VideoOutcome::Document(pdf_path))
}

/// Picks the name the video's PDF and report are written under.
///
/// Normally the file stem. When another video in the run already took that
/// stem (`talk.mp4` and `talk.MP4`), the full file name is used instead.
pub fn document_stem(video: &Path, used: &mut HashSet<String>) -> String {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    if used.insert(stem.clone()) {
        return stem;
    }

    let file_name = video
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| stem.clone());
    let mut candidate = file_name.clone();
    let mut n = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{}-{}", file_name, n);
        n += 1;
    }
    warn!("{:?} shares its name with another video. Writing it as {:?}.", video, candidate);
    candidate
}

/// Lists files in `dir` with the given extension, in directory order.
pub fn list_videos(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut videos = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read video directory {:?}", dir))? {
        let path = entry.context("Failed to read video directory entry")?.path();
        let matches = path
            .extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension));
        if matches && path.is_file() {
            videos.push(path);
        }
    }
    Ok(videos)
}

/// Deletes every frame file left in `dir` by a previous video.
pub fn clear_frame_dir(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read frame directory {:?}", dir))? {
        let path = entry.context("Failed to read frame directory entry")?.path();
        if frame_analyzer::is_frame_file(&path) {
            fs::remove_file(&path).with_context(|| format!("Failed to remove frame {:?}", path))?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn phase<T>(name: &str, step: impl FnOnce() -> Result<T>) -> Result<T> {
    info!("Starting {}..", name);
    let result = step();
    match &result {
        Ok(_) => info!("Finished {}..", name),
        Err(e) => error!("Failed {}: {:#}", name, e),
    }
    result
}
