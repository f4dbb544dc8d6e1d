//! One-shot conversion of a single image or raw frame.
//!
//! Greyscale PNG and TIFF inputs are repacked MSB-first at their native
//! depth (8 or 16 bits) and pushed through one [`FramePipeline`] call.
//! Raw inputs are taken as packed bytes with the geometry from the
//! pipeline options.

use std::path::Path;

use image::{DynamicImage, RgbImage, RgbaImage};
use thiserror::Error;
use tracing::info;

use crate::capture::RawFrame;
use crate::compute::{
    ComputeError, FramePipeline, FrameSummary, OutputFormat, OutputImage, PipelineOptions,
};

/// Errors that can occur while converting a file.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error("unsupported input image: {0}")]
    UnsupportedInput(String),
}

/// Returns true if `path` names a raw packed frame rather than an image.
pub fn is_raw_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("raw") || ext.eq_ignore_ascii_case("bin"))
}

/// Loads a single-channel 8- or 16-bit image as a packed frame.
///
/// Colour images are rejected.
pub fn load_image(path: impl AsRef<Path>) -> Result<RawFrame, ConvertError> {
    let path = path.as_ref();
    let decoded = image::open(path)?;
    let (width, height) = (decoded.width() as usize, decoded.height() as usize);

    let (samples, bits): (Vec<u32>, u32) = match decoded {
        DynamicImage::ImageLuma8(img) => (img.into_raw().into_iter().map(u32::from).collect(), 8),
        DynamicImage::ImageLuma16(img) => {
            (img.into_raw().into_iter().map(u32::from).collect(), 16)
        }
        other => {
            return Err(ConvertError::UnsupportedInput(format!(
                "{}: colour type {:?} (only single-channel greyscale is supported)",
                path.display(),
                other.color()
            )))
        }
    };

    info!(path = %path.display(), width, height, bits, "Input image loaded");
    Ok(RawFrame::from_samples(&samples, width, height, bits, 0))
}

/// Loads a raw packed frame, taking geometry from `options`.
///
/// The length is not checked here; a mismatch surfaces from the pipeline.
pub fn load_raw(path: impl AsRef<Path>, options: &PipelineOptions) -> Result<RawFrame, ConvertError> {
    let data = std::fs::read(path.as_ref())?;
    Ok(RawFrame::new(
        data,
        options.width,
        options.height,
        options.bits_per_sample,
        0,
    ))
}

/// Runs one frame through a fresh pipeline.
///
/// Geometry and bit depth come from the frame; everything else from
/// `options`.
pub fn render_frame(
    frame: &RawFrame,
    options: &PipelineOptions,
) -> Result<(OutputImage, FrameSummary), ConvertError> {
    let options = PipelineOptions {
        width: frame.width(),
        height: frame.height(),
        bits_per_sample: frame.bits_per_sample(),
        ..options.clone()
    };
    let mut pipeline = FramePipeline::new(options)?;
    let mut output = pipeline.new_output();
    let summary = pipeline.write_frame(frame.data(), &mut output)?;
    Ok((output, summary))
}

/// Saves a rendered image; the format follows the file extension.
pub fn save_image(image: &OutputImage, path: impl AsRef<Path>) -> Result<(), ConvertError> {
    let (width, height) = (image.width() as u32, image.height() as u32);
    let bytes = image.as_bytes().to_vec();
    let size_mismatch = || ComputeError::InvalidFrameLength {
        expected: image.width() * image.height() * image.channels(),
        actual: image.as_bytes().len(),
    };

    match OutputFormat::from_channels(image.channels())? {
        OutputFormat::Rgb => RgbImage::from_raw(width, height, bytes)
            .ok_or_else(size_mismatch)?
            .save(path.as_ref())?,
        OutputFormat::Rgba => RgbaImage::from_raw(width, height, bytes)
            .ok_or_else(size_mismatch)?
            .save(path.as_ref())?,
    }
    Ok(())
}

/// Converts `input` to a false-colour image at `output`.
pub fn convert_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &PipelineOptions,
) -> Result<FrameSummary, ConvertError> {
    let input = input.as_ref();
    let frame = if is_raw_path(input) {
        load_raw(input, options)?
    } else {
        load_image(input)?
    };

    let (image, summary) = render_frame(&frame, options)?;
    save_image(&image, output.as_ref())?;
    info!(
        output = %output.as_ref().display(),
        valid_pixels = summary.valid_pixels,
        elapsed_ms = summary.elapsed.as_secs_f64() * 1e3,
        "Conversion complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::pack_samples;
    use crate::compute::palette::PLASMA;
    use crate::compute::VisualizerMode;
    use image::{GrayImage, ImageBuffer, Luma};

    fn options() -> PipelineOptions {
        PipelineOptions {
            spatial_window: 3,
            correlation_table_size: 256,
            ..PipelineOptions::default()
        }
    }

    #[test]
    fn test_convert_png() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("flat.png");
        let output = dir.path().join("out.png");
        GrayImage::from_pixel(8, 6, Luma([90])).save(&input).unwrap();

        let summary = convert_file(&input, &output, &options()).unwrap();
        assert_eq!(summary.valid_pixels, 6 * 4);

        let result = image::open(&output).unwrap().to_rgb8();
        assert_eq!(result.dimensions(), (8, 6));
        assert_eq!(result.get_pixel(3, 3).0, PLASMA[0]);
        // Border pixels without a full window stay black.
        assert_eq!(result.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_sixteen_bit_input_keeps_depth() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("deep.tiff");
        let img: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(5, 4, |x, y| Luma([(x * 1000 + y * 7) as u16]));
        img.save(&input).unwrap();

        let frame = load_image(&input).unwrap();
        assert_eq!(frame.bits_per_sample(), 16);
        assert_eq!((frame.width(), frame.height()), (5, 4));
        assert!(frame.is_valid());
        assert_eq!(&frame.data()[..4], &[0, 0, 0x03, 0xE8]);
    }

    #[test]
    fn test_colour_input_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("colour.png");
        RgbImage::new(4, 4).save(&input).unwrap();

        assert!(matches!(
            convert_file(&input, dir.path().join("out.png"), &options()),
            Err(ConvertError::UnsupportedInput(_))
        ));
    }

    #[test]
    fn test_convert_raw_with_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("frame.raw");
        let output = dir.path().join("frame.png");
        std::fs::write(&input, pack_samples(&[512; 16], 10)).unwrap();

        let options = PipelineOptions {
            mode: VisualizerMode::Overlay,
            alpha: 0.0,
            output_format: OutputFormat::Rgba,
            ..PipelineOptions::with_geometry(4, 4, 10)
        };
        convert_file(&input, &output, &PipelineOptions { spatial_window: 3, ..options })
            .unwrap();

        // With alpha 0 every pixel shows the source luminance.
        let result = image::open(&output).unwrap().to_rgba8();
        assert_eq!(result.get_pixel(0, 0).0, [128, 128, 128, 255]);
        assert_eq!(result.get_pixel(2, 2).0, [128, 128, 128, 255]);
    }

    #[test]
    fn test_short_raw_input_reports_length() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("short.bin");
        std::fs::write(&input, [0u8; 3]).unwrap();

        let result = convert_file(
            &input,
            dir.path().join("out.png"),
            &PipelineOptions::with_geometry(4, 4, 10),
        );
        assert!(matches!(
            result,
            Err(ConvertError::Compute(ComputeError::InvalidFrameLength {
                expected: 20,
                actual: 3
            }))
        ));
    }

    #[test]
    fn test_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let result = convert_file(
            dir.path().join("missing.png"),
            dir.path().join("out.png"),
            &options(),
        );
        assert!(matches!(result, Err(ConvertError::Image(_))));
    }
}
