//! Frame Analysis Module
//!
//! Picks the frames that show a new annotation state. Encoded JPEG size is
//! the only signal: markup added to a slide grows the file, a slide change
//! makes it jump.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::natural_order;

/// Extension of the frame files written by the extractor.
pub const FRAME_EXTENSION: &str = "jpg";

/// A frame file on disk together with its encoded size in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameRecord {
    pub path: PathBuf,
    pub size: u64,
}

impl FrameRecord {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        FrameRecord {
            path: path.into(),
            size,
        }
    }
}

/// Size thresholds for the detector, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// A frame whose size differs from the baseline by more than this is a change.
    pub size_delta: u64,
    /// Reserved. Only reported in debug logs; it never affects the selection.
    pub insignificant_change: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            size_delta: 3000,
            insignificant_change: 2000,
        }
    }
}

/// The set of frames chosen to become document pages.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Selection {
    frames: HashSet<FrameRecord>,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.frames.iter().any(|frame| frame.path == path)
    }

    /// Returns the selected paths in natural filename order.
    pub fn sorted_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.frames.iter().map(|f| f.path.clone()).collect();
        natural_order::sort_paths(&mut paths);
        paths
    }

    fn insert(&mut self, frame: FrameRecord) {
        self.frames.insert(frame);
    }
}

impl FromIterator<FrameRecord> for Selection {
    fn from_iter<I: IntoIterator<Item = FrameRecord>>(iter: I) -> Self {
        Selection {
            frames: iter.into_iter().collect(),
        }
    }
}

/// Scan state threaded through the fold in [`detect_annotations`].
#[derive(Debug, Default)]
struct DetectorState {
    baseline: u64,
    previous: Option<FrameRecord>,
    selection: Selection,
}

impl DetectorState {
    fn step(mut self, frame: &FrameRecord, thresholds: &Thresholds) -> Self {
        if frame.size.abs_diff(self.baseline) > thresholds.size_delta {
            if let Some(previous) = self.previous.take() {
                if previous.size.abs_diff(frame.size) < thresholds.insignificant_change {
                    debug!(
                        "{:?} is within the insignificant change band of {:?}",
                        frame.path, previous.path
                    );
                }
                self.selection.insert(previous);
            }
            debug!(
                "Size jump at {:?}: {} -> {} bytes",
                frame.path, self.baseline, frame.size
            );
            self.selection.insert(frame.clone());
            self.baseline = frame.size;
        }
        self.previous = Some(frame.clone());
        self
    }
}

/// Selects the frames that start or end a significant size change.
///
/// Expects `frames` in capture order. When a frame's size differs from the
/// baseline by more than `thresholds.size_delta`, both the frame before it
/// and the frame itself are selected, and the baseline moves to the new
/// frame's size. The baseline starts at 0.
pub fn detect_annotations(frames: &[FrameRecord], thresholds: &Thresholds) -> Selection {
    let start_time = Instant::now();
    let state = frames
        .iter()
        .fold(DetectorState::default(), |state, frame| state.step(frame, thresholds));

    info!(
        "Frame analysis complete in {:.2?}. Scanned {}, selected {}.",
        start_time.elapsed(),
        frames.len(),
        state.selection.len()
    );
    state.selection
}

/// Lists the frame files in `dir` with their sizes, in natural filename order.
pub fn scan_frame_dir(dir: &Path) -> Result<Vec<FrameRecord>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read frame directory {:?}", dir))? {
        let path = entry.context("Failed to read frame directory entry")?.path();
        if is_frame_file(&path) {
            paths.push(path);
        }
    }
    natural_order::sort_paths(&mut paths);

    paths
        .into_iter()
        .map(|path| {
            let size = fs::metadata(&path)
                .with_context(|| format!("Failed to stat frame {:?}", path))?
                .len();
            Ok(FrameRecord { path, size })
        })
        .collect()
}

pub(crate) fn is_frame_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(FRAME_EXTENSION))
}

/// Per-video summary of the detector's decisions, written as JSON.
#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    pub video: String,
    pub total_frames: usize,
    pub selected: usize,
    pub frames: Vec<FrameEntry>,
}

#[derive(Debug, Serialize)]
pub struct FrameEntry {
    pub file: String,
    pub size: u64,
    pub selected: bool,
}

impl AnalysisReport {
    pub fn new(video: &str, frames: &[FrameRecord], selection: &Selection) -> Self {
        let frames: Vec<FrameEntry> = frames
            .iter()
            .map(|frame| FrameEntry {
                file: frame
                    .path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                size: frame.size,
                selected: selection.contains(&frame.path),
            })
            .collect();

        AnalysisReport {
            video: video.to_string(),
            total_frames: frames.len(),
            selected: selection.len(),
            frames,
        }
    }

    /// Writes the report to `<output_dir>/analysis/<video>.json`.
    pub fn write(&self, output_dir: &Path) -> Result<PathBuf> {
        let stats_dir = output_dir.join("analysis");
        fs::create_dir_all(&stats_dir).context("Failed to create analysis directory")?;
        let stats_path = stats_dir.join(format!("{}.json", self.video));

        fs::write(&stats_path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write analysis report {:?}", stats_path))?;
        Ok(stats_path)
    }
}
