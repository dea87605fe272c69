//! Document Builder Module
//!
//! Collects the selected frames into a PDF, one frame per page.

use anyhow::{bail, Context, Result};
use image::{ColorType, GenericImageView, ImageFormat, ImageOutputFormat};
use log::info;
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

// Standard PDF page sizes in points (1/72 inch).
const A4_WIDTH_PT: f32 = 595.0;
const A4_HEIGHT_PT: f32 = 842.0;

const REENCODE_QUALITY: u8 = 85;

/// Frame bytes ready to embed as a DCT-encoded image XObject.
struct PageImage {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
    grayscale: bool,
}

/// Builds a PDF at `output_path` with one page per frame, in the given order.
///
/// `frame_paths` should already be in natural order; the first path becomes
/// page 1. Fails when `frame_paths` is empty.
pub fn build_pdf(frame_paths: &[PathBuf], output_path: &Path) -> Result<()> {
    if frame_paths.is_empty() {
        bail!("No frames selected for {:?}", output_path);
    }

    let mut pdf = Pdf::new();
    let mut next_ref = Ref::new(1);

    let catalog_ref = next_ref.bump();
    let page_tree_ref = next_ref.bump();
    pdf.catalog(catalog_ref).pages(page_tree_ref);

    let page_refs: Vec<Ref> = frame_paths.iter().map(|_| next_ref.bump()).collect();

    for (path, &page_ref) in frame_paths.iter().zip(&page_refs) {
        let image = load_page_image(path)?;
        build_single_page(&mut pdf, &mut next_ref, page_ref, page_tree_ref, &image);
    }

    pdf.pages(page_tree_ref)
        .kids(page_refs.iter().copied())
        .count(page_refs.len() as i32);

    if let Some(parent_dir) = output_path.parent() {
        fs::create_dir_all(parent_dir).context("Failed to create PDF parent directory")?;
    }
    info!("Writing {} pages to {:?}", frame_paths.len(), output_path);
    fs::write(output_path, pdf.finish())
        .with_context(|| format!("Failed to write PDF file {:?}", output_path))?;

    Ok(())
}

/// Reads a frame from disk. JPEGs in RGB or grayscale pass through untouched;
/// anything else is re-encoded as an RGB JPEG.
fn load_page_image(path: &Path) -> Result<PageImage> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read frame {:?}", path))?;
    let format = image::guess_format(&bytes).ok();
    let decoded = image::load_from_memory(&bytes)
        .with_context(|| format!("Failed to decode frame {:?}", path))?;
    let (width, height) = decoded.dimensions();

    match (format, decoded.color()) {
        (Some(ImageFormat::Jpeg), ColorType::Rgb8) => Ok(PageImage { jpeg: bytes, width, height, grayscale: false }),
        (Some(ImageFormat::Jpeg), ColorType::L8) => Ok(PageImage { jpeg: bytes, width, height, grayscale: true }),
        _ => {
            let mut jpeg = Vec::new();
            decoded
                .to_rgb8()
                .write_to(&mut Cursor::new(&mut jpeg), ImageOutputFormat::Jpeg(REENCODE_QUALITY))
                .with_context(|| format!("Failed to re-encode frame {:?}", path))?;
            Ok(PageImage { jpeg, width, height, grayscale: false })
        }
    }
}

/// Writes the page, content stream and image XObject for one frame.
fn build_single_page(
    pdf: &mut Pdf,
    next_ref: &mut Ref,
    page_ref: Ref,
    page_tree_ref: Ref,
    image: &PageImage,
) {
    let content_ref = next_ref.bump();
    let image_ref = next_ref.bump();
    let image_name_str = format!("Frame{}", image_ref.get());
    let image_name = Name(image_name_str.as_bytes());

    // Landscape frames get a landscape page.
    let (page_width, page_height) = if image.width > image.height {
        (A4_HEIGHT_PT, A4_WIDTH_PT)
    } else {
        (A4_WIDTH_PT, A4_HEIGHT_PT)
    };
    let scale_factor = (page_width / image.width as f32).min(page_height / image.height as f32);
    let scaled_width = image.width as f32 * scale_factor;
    let scaled_height = image.height as f32 * scale_factor;
    let offset_x = (page_width - scaled_width) / 2.0;
    let offset_y = (page_height - scaled_height) / 2.0;

    let mut page = pdf.page(page_ref);
    page.media_box(Rect::new(0.0, 0.0, page_width, page_height));
    page.parent(page_tree_ref);
    page.contents(content_ref);
    page.resources().x_objects().pair(image_name, image_ref);
    page.finish();

    let mut content = Content::new();
    content.save_state();
    content.transform([scaled_width, 0.0, 0.0, scaled_height, offset_x, offset_y]);
    content.x_object(image_name);
    content.restore_state();
    pdf.stream(content_ref, &content.finish());

    let mut image_xobject = pdf.image_xobject(image_ref, &image.jpeg);
    image_xobject.filter(Filter::DctDecode);
    image_xobject.width(image.width as i32);
    image_xobject.height(image.height as i32);
    if image.grayscale {
        image_xobject.color_space().device_gray();
    } else {
        image_xobject.color_space().device_rgb();
    }
    image_xobject.bits_per_component(8);
    image_xobject.finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_analyzer::{FrameRecord, Selection};
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn write_jpeg(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(width, height, Rgb([200, 30, 30]))
            .save_with_format(&path, ImageFormat::Jpeg)
            .unwrap();
        path
    }

    fn page_widths(pdf_path: &Path) -> Vec<i64> {
        let doc = lopdf::Document::load(pdf_path).unwrap();
        doc.get_pages()
            .values()
            .map(|&page_id| {
                let images = doc.get_page_images(page_id).unwrap();
                assert_eq!(images.len(), 1);
                images[0].width
            })
            .collect()
    }

    #[test]
    fn pages_follow_natural_order_of_selection() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![
            FrameRecord::new(write_jpeg(dir.path(), "frame100.jpg", 30, 20), 0),
            FrameRecord::new(write_jpeg(dir.path(), "frame20.jpg", 20, 20), 0),
            FrameRecord::new(write_jpeg(dir.path(), "frame0.jpg", 10, 20), 0),
        ];
        let selection: Selection = frames.into_iter().collect();

        let output = dir.path().join("pdfs").join("lecture.pdf");
        build_pdf(&selection.sorted_paths(), &output).unwrap();

        assert_eq!(page_widths(&output), [10, 20, 30]);
    }

    #[test]
    fn jpeg_frames_are_embedded_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let frame = write_jpeg(dir.path(), "frame0.jpg", 64, 48);
        let output = dir.path().join("single.pdf");
        build_pdf(std::slice::from_ref(&frame), &output).unwrap();

        let doc = lopdf::Document::load(&output).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let images = doc.get_page_images(page_id).unwrap();
        assert_eq!(images[0].content, fs::read(&frame).unwrap().as_slice());
        assert_eq!(images[0].height, 48);
    }

    #[test]
    fn non_jpeg_and_grayscale_frames_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("frame0.png");
        RgbImage::from_pixel(16, 16, Rgb([0, 0, 255])).save(&png).unwrap();
        let gray = dir.path().join("frame20.jpg");
        GrayImage::from_pixel(24, 16, Luma([90]))
            .save_with_format(&gray, ImageFormat::Jpeg)
            .unwrap();

        let output = dir.path().join("mixed.pdf");
        build_pdf(&[png, gray], &output).unwrap();
        assert_eq!(page_widths(&output), [16, 24]);
    }

    #[test]
    fn empty_selection_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("empty.pdf");
        assert!(build_pdf(&[], &output).is_err());
        assert!(!output.exists());
    }

    #[test]
    fn missing_frame_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("broken.pdf");
        assert!(build_pdf(&[dir.path().join("frame0.jpg")], &output).is_err());
    }
}
