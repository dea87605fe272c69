//! Shared helpers for integration tests.
//!
//! Test videos are encoded on the fly with FFmpeg's built-in MPEG-4 encoder,
//! so no binary fixtures are needed.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::codec::Id;
use ffmpeg::codec::context::Context as CodecContext;
use ffmpeg::format::{Flags as FormatFlags, Pixel};
use ffmpeg::frame::Video as VideoFrame;
use ffmpeg::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg::{Packet, Rational};

pub const CLIP_WIDTH: u32 = 320;
pub const CLIP_HEIGHT: u32 = 240;
pub const CLIP_FPS: i32 = 2;

/// Writes an MPEG-4 clip of `frame_count` frames at [`CLIP_FPS`].
///
/// Every 10 frames the picture switches to a new block pattern, so the
/// sampled JPEGs are large and change size between "slides".
pub fn write_clip(path: &Path, frame_count: usize) {
    ffmpeg::init().expect("Failed to initialize FFmpeg");
    let time_base = Rational::new(1, CLIP_FPS);

    let mut output = ffmpeg::format::output(path).expect("Failed to open output");
    let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);
    let codec = ffmpeg::encoder::find(Id::MPEG4).expect("MPEG-4 encoder not available");

    let mut stream = output.add_stream(codec).expect("Failed to add stream");
    let stream_index = stream.index();

    let mut encoder = CodecContext::from_parameters(stream.parameters())
        .expect("Failed to create codec context")
        .encoder()
        .video()
        .expect("Failed to create video encoder");
    encoder.set_width(CLIP_WIDTH);
    encoder.set_height(CLIP_HEIGHT);
    encoder.set_format(Pixel::YUV420P);
    encoder.set_time_base(time_base);
    encoder.set_frame_rate(Some(Rational::new(CLIP_FPS, 1)));
    encoder.set_bit_rate(4_000_000);
    encoder.set_gop(4);
    if needs_global_header {
        unsafe {
            (*encoder.as_mut_ptr()).flags |= ffmpeg::ffi::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
        }
    }

    let mut encoder = encoder.open_as(codec).expect("Failed to open encoder");
    stream.set_parameters(&encoder);
    output.write_header().expect("Failed to write header");
    let stream_time_base = output.stream(stream_index).unwrap().time_base();

    let mut scaler = ScalingContext::get(
        Pixel::RGB24,
        CLIP_WIDTH,
        CLIP_HEIGHT,
        Pixel::YUV420P,
        CLIP_WIDTH,
        CLIP_HEIGHT,
        ScalingFlags::BILINEAR,
    )
    .expect("Failed to create scaler");

    let mut packet = Packet::empty();
    for index in 0..frame_count {
        let mut rgb_frame = VideoFrame::new(Pixel::RGB24, CLIP_WIDTH, CLIP_HEIGHT);
        fill_slide(&mut rgb_frame, index / 10);

        let mut yuv_frame = VideoFrame::empty();
        scaler.run(&rgb_frame, &mut yuv_frame).expect("Scaling failed");
        yuv_frame.set_pts(Some(index as i64));

        encoder.send_frame(&yuv_frame).expect("send_frame failed");
        while encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(stream_index);
            packet.rescale_ts(time_base, stream_time_base);
            packet.write_interleaved(&mut output).expect("Failed to write packet");
        }
    }

    encoder.send_eof().expect("send_eof failed");
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(stream_index);
        packet.rescale_ts(time_base, stream_time_base);
        packet.write_interleaved(&mut output).expect("Failed to write flush packet");
    }

    output.write_trailer().expect("Failed to write trailer");
}

/// Frames sampled from a clip of `frame_count` frames every `interval_secs`.
/// Sorted the same way as [`jpg_names`].
pub fn sampled_frame_names(frame_count: usize, interval_secs: u64) -> Vec<String> {
    let last_second = (frame_count as u64 - 1) / CLIP_FPS as u64;
    let mut names: Vec<String> = (0..=last_second)
        .step_by(interval_secs as usize)
        .map(|secs| format!("frame{}.jpg", secs))
        .collect();
    names.sort();
    names
}

/// Names of the `.jpg` files in `dir`, sorted.
pub fn jpg_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("Failed to read directory")
        .map(|entry| entry.expect("Failed to read entry").path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "jpg"))
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// 4x4 pixel blocks of pseudo-random colour, seeded by the slide number.
fn fill_slide(frame: &mut VideoFrame, slide: usize) {
    let stride = frame.stride(0);
    let data = frame.data_mut(0);
    for y in 0..CLIP_HEIGHT as usize {
        for x in 0..CLIP_WIDTH as usize {
            let mut seed = ((y / 4) * 1_000 + (x / 4) + slide * 7_919) as u32;
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let offset = y * stride + x * 3;
            data[offset..offset + 3].copy_from_slice(&seed.to_le_bytes()[..3]);
        }
    }
}
