// processor.rs - Per-image transform: decode, resize, adjust, encode to JPEG/WebP

use crate::metadata;
use crate::options::ProcessOptions;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageReader, Rgb, RgbImage};
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

// libwebp refuses anything larger
const WEBP_MAX_DIMENSION: u32 = 16383;
// Slowest, smallest output
const WEBP_METHOD: i32 = 6;

// 2 * identity - smooth, where smooth is [1 1 1; 1 5 1; 1 1 1] / 13
const SHARPEN_KERNEL: [f32; 9] = [
    -1.0, -1.0, -1.0,
    -1.0, 21.0, -1.0,
    -1.0, -1.0, -1.0,
];
const SHARPEN_DIVISOR: f32 = 13.0;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("Failed to decode: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Failed to encode JPEG: {0}")]
    Encode(image::ImageError),
    #[error("Failed to encode WebP: {0}")]
    WebpEncode(String),
    #[error("Input has no file name")]
    NoFileName,
    #[error("Failed to create {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("Save failed for {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("Image is {width}x{height}, WebP supports at most 16383px per side")]
    WebpTooLarge { width: u32, height: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub original_size: u64,
    pub written_size: u64,
    pub dimensions: (u32, u32),
    pub outputs: Vec<PathBuf>,
}

/// Output file stem for `input`: its own stem with the rename prefix.
pub fn output_base_name(input: &Path, options: &ProcessOptions) -> Option<String> {
    let stem = input.file_stem()?.to_string_lossy();
    Some(options.output_stem(&stem))
}

/// Processes one image into `output_dir/jpg/<base_name>.jpg` and
/// `output_dir/webp/<base_name>.webp`.
pub fn optimize_image(
    input_path: &Path,
    output_dir: &Path,
    base_name: &str,
    options: &ProcessOptions,
) -> Result<ProcessOutcome, ProcessError> {
    let bytes = fs::read(input_path).map_err(|source| ProcessError::Read {
        path: input_path.to_path_buf(),
        source,
    })?;

    let img = ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .map_err(|source| ProcessError::Read {
            path: input_path.to_path_buf(),
            source,
        })?
        .decode()?;

    let exif = if options.preserve_exif {
        metadata::extract_exif(&bytes)
    } else {
        None
    };

    let img = transform(img, options);
    let dimensions = img.dimensions();

    let mut outputs = Vec::new();
    let mut written_size = 0u64;

    if options.to_jpg {
        let jpg_path = output_dir.join("jpg").join(format!("{}.jpg", base_name));
        let data = encode_jpeg(&flatten_to_rgb(&img), options.quality, exif.as_deref())?;
        write_output(&jpg_path, &data)?;
        written_size += data.len() as u64;
        outputs.push(jpg_path);
    }

    if options.to_webp {
        let webp_path = output_dir.join("webp").join(format!("{}.webp", base_name));
        let data = encode_webp(&webp_source(img, options), options.quality)?;
        write_output(&webp_path, &data)?;
        written_size += data.len() as u64;
        outputs.push(webp_path);
    }

    info!(path = %input_path.display(), outputs = outputs.len(), "Processed and saved");

    Ok(ProcessOutcome {
        original_size: bytes.len() as u64,
        written_size,
        dimensions,
        outputs,
    })
}

/// Resize, grayscale and sharpen steps, in that order.
pub fn transform(mut img: DynamicImage, options: &ProcessOptions) -> DynamicImage {
    let (width, height) = img.dimensions();
    let (new_width, new_height) = options
        .resize
        .target_dimensions(width, height, options.allow_enlarge);

    if (new_width, new_height) != (width, height) {
        debug!(width, height, new_width, new_height, "Resizing");
        img = img.resize_exact(new_width, new_height, FilterType::Lanczos3);
    }

    if options.grayscale {
        img = DynamicImage::ImageRgb8(grayscale(&img));
    }

    if options.sharpen {
        img = sharpen(&img);
    }

    img
}

/// ITU-R 601-2 luma replicated into three channels. Alpha is dropped, not
/// composited.
fn grayscale(img: &DynamicImage) -> RgbImage {
    let mut rgb = img.to_rgb8();
    for pixel in rgb.pixels_mut() {
        let [r, g, b] = pixel.0;
        // 0.299 R + 0.587 G + 0.114 B in 16.16 fixed point
        let luma = ((r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16) as u8;
        *pixel = Rgb([luma, luma, luma]);
    }
    rgb
}

/// Sharpness enhancement with factor 2. Edge pixels reuse their nearest
/// neighbours; alpha is left untouched.
fn sharpen(img: &DynamicImage) -> DynamicImage {
    let has_alpha = img.color().has_alpha();
    let src = img.to_rgba8();
    let (width, height) = src.dimensions();
    let mut out = src.clone();

    let max_x = width as i64 - 1;
    let max_y = height as i64 - 1;
    for y in 0..height {
        for x in 0..width {
            let mut acc = [0f32; 3];
            for (i, weight) in SHARPEN_KERNEL.iter().enumerate() {
                let sx = (x as i64 + (i % 3) as i64 - 1).clamp(0, max_x) as u32;
                let sy = (y as i64 + (i / 3) as i64 - 1).clamp(0, max_y) as u32;
                let pixel = src.get_pixel(sx, sy);
                for (channel, sum) in acc.iter_mut().enumerate() {
                    *sum += pixel[channel] as f32 * weight;
                }
            }
            let dst = out.get_pixel_mut(x, y);
            for (channel, sum) in acc.iter().enumerate() {
                dst[channel] = (sum / SHARPEN_DIVISOR).round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    if has_alpha {
        DynamicImage::ImageRgba8(out)
    } else {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(out).to_rgb8())
    }
}

/// The image the WebP encoder receives: alpha is kept only when asked for.
pub fn webp_source(img: DynamicImage, options: &ProcessOptions) -> DynamicImage {
    if options.preserve_transparency && img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(flatten_to_rgb(&img))
    }
}

/// Composites onto a white background.
pub fn flatten_to_rgb(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(rgb.pixels_mut()) {
        let alpha = src[3] as u32;
        for channel in 0..3 {
            let value = src[channel] as u32 * alpha + 255 * (255 - alpha);
            dst[channel] = ((value + 127) / 255) as u8;
        }
    }
    rgb
}

fn encode_jpeg(rgb: &RgbImage, quality: u8, exif: Option<&[u8]>) -> Result<Vec<u8>, ProcessError> {
    let (width, height) = rgb.dimensions();
    let mut data = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut data, quality);
        encoder
            .encode(rgb.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .map_err(ProcessError::Encode)?;
    }

    if let Some(exif) = exif {
        metadata::embed_exif_jpeg(&mut data, exif);
    }

    Ok(data)
}

fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ProcessError> {
    let (width, height) = img.dimensions();
    if width > WEBP_MAX_DIMENSION || height > WEBP_MAX_DIMENSION {
        return Err(ProcessError::WebpTooLarge { width, height });
    }

    let mut config = webp::WebPConfig::new()
        .map_err(|_| ProcessError::WebpEncode("invalid encoder configuration".to_string()))?;
    config.quality = quality as f32;
    config.method = WEBP_METHOD;

    let encoded = match img {
        DynamicImage::ImageRgba8(rgba) => webp::Encoder::from_rgba(rgba, width, height).encode_advanced(&config),
        other => {
            let rgb = other.to_rgb8();
            webp::Encoder::from_rgb(&rgb, width, height).encode_advanced(&config)
        }
    };

    encoded
        .map(|memory| memory.to_vec())
        .map_err(|e| ProcessError::WebpEncode(format!("{:?}", e)))
}

/// Writes through a temporary file in the target directory, then renames
/// it into place.
fn write_output(path: &Path, data: &[u8]) -> Result<(), ProcessError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|source| ProcessError::CreateDir {
        path: parent.to_path_buf(),
        source,
    })?;

    let write_error = |source: io::Error| ProcessError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = NamedTempFile::new_in(parent).map_err(write_error)?;
    tmp.write_all(data).map_err(write_error)?;
    tmp.persist(path).map_err(|e| write_error(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ResizeMode;
    use image::{Rgb, Rgba, RgbaImage};

    fn write_png(dir: &Path, name: &str, img: RgbaImage) -> PathBuf {
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    fn run(input: &Path, output_dir: &Path, options: &ProcessOptions) -> Result<ProcessOutcome, ProcessError> {
        let base_name = output_base_name(input, options).unwrap();
        optimize_image(input, output_dir, &base_name, options)
    }

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255]))
    }

    #[test]
    fn writes_both_formats_into_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_png(dir.path(), "photo.png", gradient(64, 48));
        let out = dir.path().join("out");

        let outcome = run(&input, &out, &ProcessOptions::default()).unwrap();

        let jpg = out.join("jpg").join("photo.jpg");
        let webp = out.join("webp").join("photo.webp");
        assert_eq!(outcome.outputs, vec![jpg.clone(), webp.clone()]);
        assert!(webp.is_file());
        assert_eq!(image::open(&jpg).unwrap().dimensions(), (64, 48));
        assert_eq!(outcome.original_size, fs::metadata(&input).unwrap().len());
        assert_eq!(
            outcome.written_size,
            fs::metadata(&jpg).unwrap().len() + fs::metadata(&webp).unwrap().len()
        );
    }

    #[test]
    fn max_width_resizes_and_prefix_renames() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_png(dir.path(), "wide.png", gradient(200, 100));
        let options = ProcessOptions {
            resize: ResizeMode::MaxWidth { width: 50 },
            to_webp: false,
            rename_prefix: "small".to_string(),
            ..Default::default()
        };

        let outcome = run(&input, dir.path(), &options).unwrap();

        assert_eq!(outcome.dimensions, (50, 25));
        let jpg = dir.path().join("jpg").join("small_wide.jpg");
        assert_eq!(outcome.outputs, vec![jpg.clone()]);
        assert_eq!(image::open(&jpg).unwrap().dimensions(), (50, 25));
    }

    #[test]
    fn transparent_pixels_flatten_to_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0])));
        let rgb = flatten_to_rgb(&img);
        assert!(rgb.pixels().all(|p| *p == Rgb([255, 255, 255])));

        let half = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128])));
        assert_eq!(flatten_to_rgb(&half).get_pixel(0, 0), &Rgb([127, 127, 127]));
    }

    #[test]
    fn webp_keeps_alpha_only_when_asked() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 40])));

        let keep = ProcessOptions::default();
        assert!(webp_source(img.clone(), &keep).color().has_alpha());

        let drop = ProcessOptions {
            preserve_transparency: false,
            ..Default::default()
        };
        assert!(!webp_source(img, &drop).color().has_alpha());
    }

    #[test]
    fn grayscale_equalises_channels_and_drops_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([200, 30, 90, 255])));
        let options = ProcessOptions {
            grayscale: true,
            ..Default::default()
        };

        let out = transform(img, &options);
        assert!(!out.color().has_alpha());
        let pixel = out.to_rgb8().get_pixel(3, 3).0;
        assert_eq!(pixel[0], pixel[1]);
        assert_eq!(pixel[1], pixel[2]);
    }

    #[test]
    fn grayscale_uses_rec601_weights() {
        let img = RgbImage::from_fn(4, 1, |x, _| match x {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            2 => Rgb([0, 0, 255]),
            _ => Rgb([255, 255, 255]),
        });
        let gray = grayscale(&DynamicImage::ImageRgb8(img));

        let lumas: Vec<u8> = gray.pixels().map(|p| p[0]).collect();
        assert_eq!(lumas, [76, 150, 29, 255]);
    }

    #[test]
    fn sharpen_leaves_flat_regions_alone() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 6, Rgb([100, 150, 200])));
        let options = ProcessOptions {
            sharpen: true,
            ..Default::default()
        };

        let out = transform(img, &options).to_rgb8();
        assert!(out.pixels().all(|p| *p == Rgb([100, 150, 200])));
    }

    #[test]
    fn sharpen_boosts_edges() {
        let img = RgbImage::from_fn(6, 1, |x, _| if x < 3 { Rgb([100, 100, 100]) } else { Rgb([200, 200, 200]) });
        let out = sharpen(&DynamicImage::ImageRgb8(img)).to_rgb8();

        assert!(out.get_pixel(2, 0)[0] < 100);
        assert!(out.get_pixel(3, 0)[0] > 200);
        assert_eq!(out.get_pixel(0, 0)[0], 100);
    }

    #[test]
    fn exif_follows_option() {
        let dir = tempfile::tempdir().unwrap();
        let exif: &[u8] = &[b'M', b'M', 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00];

        let rgb = RgbImage::from_pixel(16, 16, Rgb([40, 80, 120]));
        let input = dir.path().join("camera.jpg");
        fs::write(&input, encode_jpeg(&rgb, 90, Some(exif)).unwrap()).unwrap();

        let keep = ProcessOptions {
            to_webp: false,
            ..Default::default()
        };
        let outcome = run(&input, &dir.path().join("keep"), &keep).unwrap();
        let written = fs::read(&outcome.outputs[0]).unwrap();
        assert_eq!(metadata::extract_exif(&written).as_deref(), Some(exif));

        let strip = ProcessOptions {
            to_webp: false,
            preserve_exif: false,
            ..Default::default()
        };
        let outcome = run(&input, &dir.path().join("strip"), &strip).unwrap();
        let written = fs::read(&outcome.outputs[0]).unwrap();
        assert_eq!(metadata::extract_exif(&written), None);
    }

    #[test]
    fn jpeg_encode_failure_is_not_a_decode_error() {
        let too_wide = RgbImage::new(65536, 1);
        let err = encode_jpeg(&too_wide, 85, None).unwrap_err();
        assert!(matches!(err, ProcessError::Encode(_)));
        assert!(err.to_string().starts_with("Failed to encode JPEG"));
    }

    #[test]
    fn webp_encoder_output_decodes() {
        let img = DynamicImage::ImageRgba8(gradient(40, 20));
        let data = encode_webp(&img, 85).unwrap();
        let decoded = image::load_from_memory(&data).unwrap();
        assert_eq!(decoded.dimensions(), (40, 20));
    }

    #[test]
    fn outputs_replace_existing_files_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("jpg").join("x.jpg");

        write_output(&target, b"first").unwrap();
        write_output(&target, b"second").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"second");
        let entries = fs::read_dir(target.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn base_name_needs_a_file_name() {
        let options = ProcessOptions {
            rename_prefix: "web".to_string(),
            ..Default::default()
        };
        assert_eq!(output_base_name(Path::new("a/photo.png"), &options).as_deref(), Some("web_photo"));
        assert_eq!(output_base_name(Path::new("/"), &options), None);
    }

    #[test]
    fn corrupt_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.jpg");
        fs::write(&input, b"definitely not an image").unwrap();

        let err = run(&input, dir.path(), &ProcessOptions::default()).unwrap_err();
        assert!(matches!(err, ProcessError::Decode(_)));
        assert!(!dir.path().join("jpg").exists());
    }

    #[test]
    fn missing_input_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("nope.png");

        let err = run(&input, dir.path(), &ProcessOptions::default()).unwrap_err();
        assert!(matches!(err, ProcessError::Read { .. }));
        assert!(err.to_string().contains("nope.png"));
    }
}
