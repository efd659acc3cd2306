//! Lossless PNG output.
//!
//! Images are encoded into a temporary file next to the destination and
//! renamed into place once the encoder has finished, so a failed run never
//! leaves a truncated PNG behind.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, ImageEncoder, ImageError, RgbaImage};
use serde::Serialize;
use tracing::debug;

use crate::error::ConvertError;

/// zlib effort used for the PNG stream. Never affects pixel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PngCompression {
    Fast,
    #[default]
    Default,
    Best,
}

impl PngCompression {
    fn compression_type(self) -> CompressionType {
        match self {
            PngCompression::Fast => CompressionType::Fast,
            PngCompression::Default => CompressionType::Default,
            PngCompression::Best => CompressionType::Best,
        }
    }
}

/// Channel layout of the written PNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorMode {
    /// Drop the alpha channel
    #[default]
    Rgb,
    /// Keep the reader's alpha channel
    Rgba,
}

impl ColorMode {
    /// Convert a region read from the slide into the output layout.
    pub fn apply(self, region: RgbaImage) -> DynamicImage {
        let image = DynamicImage::ImageRgba8(region);
        match self {
            ColorMode::Rgb => DynamicImage::ImageRgb8(image.into_rgb8()),
            ColorMode::Rgba => image,
        }
    }
}

/// Writes pixel buffers as PNG files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngCropEncoder {
    compression: PngCompression,
}

impl PngCropEncoder {
    pub fn new(compression: PngCompression) -> Self {
        Self { compression }
    }

    pub fn compression(&self) -> PngCompression {
        self.compression
    }

    /// Check that a buffer can be stored losslessly as PNG.
    ///
    /// 8- and 16-bit grayscale, grayscale+alpha, RGB and RGBA are accepted.
    pub fn check_supported(image: &DynamicImage) -> Result<(), ConvertError> {
        match image.color() {
            ColorType::L8
            | ColorType::La8
            | ColorType::Rgb8
            | ColorType::Rgba8
            | ColorType::L16
            | ColorType::La16
            | ColorType::Rgb16
            | ColorType::Rgba16 => Ok(()),
            other => Err(ConvertError::UnsupportedBuffer(format!(
                "{:?} cannot be stored as PNG",
                other
            ))),
        }
    }

    /// Check that `path` can receive an output file.
    ///
    /// The parent directory must exist and `path` must not be a directory.
    /// Permissions are only discovered when the file is created.
    pub fn check_destination(path: &Path) -> Result<(), ConvertError> {
        let dir = parent_dir(path);
        if !dir.is_dir() {
            return Err(write_error(
                path,
                format!("directory {} does not exist", dir.display()),
            ));
        }
        if path.is_dir() {
            return Err(write_error(path, "path is a directory"));
        }
        Ok(())
    }

    /// Encode `image` to `path`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// - [`ConvertError::UnsupportedBuffer`] for pixel formats PNG cannot hold
    /// - [`ConvertError::WriteError`] if the file cannot be created or written;
    ///   nothing is left at `path` in that case
    pub fn write(&self, image: &DynamicImage, path: &Path) -> Result<u64, ConvertError> {
        Self::check_supported(image)?;
        Self::check_destination(path)?;

        let dir = parent_dir(path);
        let mut temp = tempfile::Builder::new()
            .prefix(".mrxs-crop-")
            .suffix(".png.tmp")
            .tempfile_in(&dir)
            .map_err(|e| write_error(path, e))?;

        debug!(
            temp = %temp.path().display(),
            width = image.width(),
            height = image.height(),
            color = ?image.color(),
            compression = ?self.compression,
            "Encoding PNG"
        );

        {
            let mut writer = BufWriter::new(&mut temp);
            let encoder = PngEncoder::new_with_quality(
                &mut writer,
                self.compression.compression_type(),
                FilterType::Adaptive,
            );
            encoder
                .write_image(
                    image.as_bytes(),
                    image.width(),
                    image.height(),
                    image.color().into(),
                )
                .map_err(|e| encode_error(path, e))?;
            writer.flush().map_err(|e| write_error(path, e))?;
        }

        temp.as_file()
            .sync_all()
            .map_err(|e| write_error(path, e))?;
        set_output_permissions(temp.as_file()).map_err(|e| write_error(path, e))?;

        let file = temp.persist(path).map_err(|e| write_error(path, e.error))?;
        let bytes = file.metadata().map_err(|e| write_error(path, e))?.len();

        debug!(path = %path.display(), bytes, "PNG written");
        Ok(bytes)
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(unix)]
fn set_output_permissions(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_output_permissions(_file: &File) -> std::io::Result<()> {
    Ok(())
}

fn write_error(path: &Path, message: impl ToString) -> ConvertError {
    ConvertError::WriteError {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

fn encode_error(path: &Path, err: ImageError) -> ConvertError {
    match err {
        ImageError::Unsupported(e) => ConvertError::UnsupportedBuffer(e.to_string()),
        ImageError::Parameter(e) => ConvertError::UnsupportedBuffer(e.to_string()),
        other => write_error(path, other),
    }
}
