use std::fs;
use std::io::Cursor;
use std::time::Instant;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, ImageFormat};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::Environment;
use crate::error::ImageError;
use crate::io::as_overhead;

const JPEG_QUALITY: u8 = 80;

/// Mirrors the image tree into `dist/<images.output>`.
///
/// In development every file is copied byte for byte. In production JPEG and
/// PNG files are re-encoded and the smaller of the two versions is kept, so
/// an output is never larger than its input. Anything else passes through.
pub fn process_images(env: &Environment) -> Result<usize, ImageError> {
    let s = Instant::now();
    let config = &env.config;
    let source = config.resolve(&config.paths.images.source);
    let target = config.dist_dir().join(&config.paths.images.output);

    let files = crate::io::expand(&[format!("{source}/**/*")])?;
    let production = env.mode.is_production();

    let saved = files
        .par_iter()
        .map(|file| -> Result<u64, ImageError> {
            let dst = target.join(&file.relative);

            if !production {
                crate::io::copy(&file.path, &dst)?;
                return Ok(0);
            }

            let original = fs::read(&file.path)?;
            let data = match compress(&original, file.path.extension()) {
                Ok(Some(smaller)) if smaller.len() < original.len() => smaller,
                Ok(_) => original.clone(),
                Err(e) => {
                    tracing::warn!("{}: {e}, copying as is", file.path);
                    original.clone()
                }
            };

            crate::io::write(&dst, &data)?;
            Ok((original.len() - data.len()) as u64)
        })
        .try_reduce(|| 0, |a, b| Ok(a + b))?;

    tracing::info!(
        saved_bytes = saved,
        "Processed {} images {}",
        files.len(),
        as_overhead(s)
    );

    Ok(files.len())
}

/// Re-encodes JPEG and PNG data. `None` for formats that are left alone.
fn compress(data: &[u8], extension: Option<&str>) -> Result<Option<Vec<u8>>, ImageError> {
    let format = match extension.map(str::to_ascii_lowercase).as_deref() {
        Some("jpg" | "jpeg") => ImageFormat::Jpeg,
        Some("png") => ImageFormat::Png,
        _ => return Ok(None),
    };

    let img = image::load_from_memory_with_format(data, format)?;
    let (width, height) = (img.width(), img.height());
    let mut out = Cursor::new(Vec::with_capacity(data.len()));

    match format {
        ImageFormat::Jpeg => {
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )?;
        }
        _ => {
            PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive)
                .write_image(img.as_bytes(), width, height, img.color().into())?;
        }
    }

    Ok(Some(out.into_inner()))
}
