//! Video Processing Module
//!
//! Samples still frames from a video at a fixed interval using the
//! ffmpeg-next crate and saves each one as a numbered JPEG.

use ffmpeg_next as ffmpeg;
use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{Context as ScalingContext, flag::Flags};
use ffmpeg::util::frame::video::Video;
use ffmpeg::Rational;
use image::{ImageFormat, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use std::time::Duration;
use log::{debug, info, warn};

/// Name of the frame captured `elapsed_secs` into the video.
pub fn frame_file_name(elapsed_secs: u64) -> String {
    format!("frame{}.{}", elapsed_secs, crate::frame_analyzer::FRAME_EXTENSION)
}

/// Number of samples a video of `duration` yields at `interval_secs`,
/// counting the frame at time 0.
pub fn expected_frame_count(duration: Duration, interval_secs: u64) -> u64 {
    if interval_secs == 0 {
        return 0;
    }
    duration.as_secs() / interval_secs + 1
}

/// Decodes single frames at arbitrary timestamps from one video stream.
pub struct FrameExtractor {
    ictx: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ScalingContext,
    stream_index: usize,
    time_base: Rational,
    start_pts: i64,
    fresh: bool,
    warned_missing_pts: bool,
}

impl FrameExtractor {
    /// Opens `path` and prepares a decoder for its best video stream.
    pub fn open(path: &Path) -> Result<Self> {
        ffmpeg::init().context("Failed to initialize FFmpeg")?;

        let ictx = input(path).context("Failed to open input file")?;
        let (stream_index, time_base, start_pts, parameters) = {
            let stream = ictx
                .streams()
                .best(Type::Video)
                .context("Could not find video stream")?;
            let start = stream.start_time();
            let start_pts = if start == ffmpeg::ffi::AV_NOPTS_VALUE { 0 } else { start };
            (stream.index(), stream.time_base(), start_pts, stream.parameters())
        };

        let context_decoder = ffmpeg::codec::context::Context::from_parameters(parameters)
            .context("Failed to create decoder context")?;
        let decoder = context_decoder.decoder().video()
            .context("Failed to create video decoder")?;

        let scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            Flags::BILINEAR,
        ).context("Failed to create scaler")?;

        Ok(FrameExtractor {
            ictx,
            decoder,
            scaler,
            stream_index,
            time_base,
            start_pts,
            fresh: true,
            warned_missing_pts: false,
        })
    }

    /// Container duration, when the container reports one.
    pub fn duration(&self) -> Option<Duration> {
        let micros = self.ictx.duration();
        (micros > 0).then(|| Duration::from_micros(micros as u64))
    }

    /// True once a decoded frame arrived without any timestamp.
    pub fn timestamps_missing(&self) -> bool {
        self.warned_missing_pts
    }

    /// Decodes the first frame presented at or after `timestamp`.
    ///
    /// Returns `Ok(None)` when the stream ends before reaching `timestamp`.
    /// Frames without any timestamp are taken as soon as they decode.
    pub fn frame_at(&mut self, timestamp: Duration) -> Result<Option<RgbImage>> {
        // A fresh decoder already sits at the start; unseekable inputs still yield frame 0.
        if needs_seek(timestamp, self.fresh) {
            let target_us = i64::try_from(timestamp.as_micros())
                .map_err(|_| anyhow!("Timestamp {:?} is out of range", timestamp))?;
            self.ictx
                .seek(target_us, ..target_us)
                .with_context(|| format!("Failed to seek to {:?}", timestamp))?;
            self.decoder.flush();
        }
        self.fresh = false;

        let target_pts = self.start_pts + duration_to_pts(timestamp, self.time_base);
        let mut decoded = Video::empty();

        for (stream, packet) in self.ictx.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder.send_packet(&packet).context("Failed to send packet to decoder")?;
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let pts = presentation_pts(&decoded, &mut self.warned_missing_pts);
                if reaches_target(pts, target_pts) {
                    return to_rgb_image(&mut self.scaler, &decoded).map(Some);
                }
            }
        }

        self.decoder.send_eof().context("Failed to flush decoder")?;
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let pts = presentation_pts(&decoded, &mut self.warned_missing_pts);
            if reaches_target(pts, target_pts) {
                return to_rgb_image(&mut self.scaler, &decoded).map(Some);
            }
        }
        Ok(None)
    }
}

/// Writes one JPEG into `frame_dir` every `interval_secs` seconds of video,
/// starting at 0, and returns how many were written.
///
/// A video that cannot be opened yields 0. A decode failure partway through
/// ends extraction quietly and keeps the frames written so far. Failing to
/// write a frame file is an error.
pub fn extract_frames(video: &Path, frame_dir: &Path, interval_secs: u64) -> Result<usize> {
    if interval_secs == 0 {
        bail!("Sampling interval must be greater than zero");
    }

    let mut extractor = match FrameExtractor::open(video) {
        Ok(extractor) => extractor,
        Err(e) => {
            warn!("Could not open {:?} for decoding: {:#}", video, e);
            return Ok(0);
        }
    };
    let duration = extractor.duration();

    let pb = match duration {
        Some(duration) => {
            let bar = ProgressBar::new(expected_frame_count(duration, interval_secs));
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} Extracting frames [{bar:40.cyan/blue}] {pos}/{len} [{elapsed_precise}]")
                    .context("Invalid progress bar template")?
                    .progress_chars("##-"),
            );
            bar
        }
        None => {
            warn!("Could not determine video duration. Using spinner as fallback.");
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} Extracting frames... [{elapsed_precise}] {pos} frames captured")
                    .context("Invalid spinner template")?,
            );
            bar
        }
    };

    let mut written = 0;
    let mut elapsed_secs = 0u64;
    loop {
        let timestamp = Duration::from_secs(elapsed_secs);
        if duration.is_some_and(|d| timestamp > d) {
            break;
        }

        let image = match extractor.frame_at(timestamp) {
            Ok(Some(image)) => image,
            Ok(None) => break,
            Err(e) => {
                debug!("Decoding stopped at {}s: {:#}", elapsed_secs, e);
                break;
            }
        };

        let frame_path = frame_dir.join(frame_file_name(elapsed_secs));
        image
            .save_with_format(&frame_path, ImageFormat::Jpeg)
            .with_context(|| format!("Failed to save frame to {:?}", frame_path))?;
        written += 1;
        pb.inc(1);

        // Nothing bounds the loop without timestamps or a known duration.
        if duration.is_none() && extractor.timestamps_missing() {
            warn!("{:?} has neither timestamps nor a duration. Keeping the first frame only.", video);
            break;
        }
        elapsed_secs += interval_secs;
    }
    pb.finish_with_message(format!("Captured {} frames", written));

    info!("Captured {} frames from {:?}.", written, video);
    Ok(written)
}

fn duration_to_pts(duration: Duration, time_base: Rational) -> i64 {
    let numerator = time_base.numerator() as f64;
    let denominator = time_base.denominator() as f64;
    if numerator <= 0.0 {
        return 0;
    }
    (duration.as_secs_f64() * denominator / numerator).round() as i64
}

fn needs_seek(timestamp: Duration, fresh: bool) -> bool {
    !(fresh && timestamp.is_zero())
}

fn presentation_pts(frame: &Video, warned: &mut bool) -> Option<i64> {
    let pts = frame.timestamp().or_else(|| frame.pts());
    if pts.is_none() && !*warned {
        warn!("Decoded frames carry no timestamps; sampling relies on seek positions.");
        *warned = true;
    }
    pts
}

fn reaches_target(pts: Option<i64>, target_pts: i64) -> bool {
    pts.is_none_or(|pts| pts >= target_pts)
}

fn to_rgb_image(scaler: &mut ScalingContext, decoded: &Video) -> Result<RgbImage> {
    let mut rgb_frame = Video::empty();
    scaler.run(decoded, &mut rgb_frame).context("Scaler failed")?;

    let frame_data = rgb_frame.data(0);
    let width = rgb_frame.width() as usize;
    let height = rgb_frame.height() as usize;
    let stride = rgb_frame.stride(0);
    if stride == 0 {
        bail!("Invalid frame stride");
    }

    let mut pixels = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let start_index = y * stride;
        let end_index = start_index + width * 3;
        if end_index > frame_data.len() {
            bail!("Frame data is smaller than expected");
        }
        pixels.extend_from_slice(&frame_data[start_index..end_index]);
    }

    RgbImage::from_raw(width as u32, height as u32, pixels)
        .context("Failed to create image buffer from frame data")
}
