use std::fmt;

use thiserror::Error;

/// I/O errors that can occur when reading slide files
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error reported by the operating system
    #[error("I/O error on {path}: {message}")]
    Os { path: String, message: String },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

impl IoError {
    /// Build an error from a `std::io::Error`, mapping `NotFound` explicitly.
    pub fn from_std(path: impl Into<String>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            IoError::NotFound(path)
        } else {
            IoError::Os {
                path,
                message: err.to_string(),
            }
        }
    }
}

/// Errors raised while parsing or reading a slide
#[derive(Debug, Clone, Error)]
pub enum SlideError {
    /// I/O error while reading one of the slide files
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Required key is missing from Slidedat.ini
    #[error("Missing key {key} in section [{section}]")]
    MissingKey { section: String, key: String },

    /// Key is present but its value cannot be used
    #[error("Invalid value for {key} in section [{section}]: {message}")]
    InvalidValue {
        section: String,
        key: String,
        message: String,
    },

    /// Slidedat.ini is not well-formed
    #[error("Malformed Slidedat.ini at line {line}: {message}")]
    MalformedIni { line: usize, message: String },

    /// Index.dat does not match the expected layout
    #[error("Invalid index file: {0}")]
    InvalidIndex(String),

    /// A stored tile could not be decoded
    #[error("Failed to decode tile ({x}, {y}) on level {level}: {message}")]
    TileDecode {
        level: usize,
        x: u32,
        y: u32,
        message: String,
    },

    /// Requested level does not exist
    #[error("Level {level} out of range (slide has {count} levels)")]
    LevelOutOfRange { level: usize, count: usize },

    /// Requested region is empty or too large to allocate
    #[error("Invalid region: {0}")]
    InvalidRegion(String),
}

/// Errors related to format detection
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while probing the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Slide structure could not be parsed
    #[error("Slide error: {0}")]
    Slide(#[from] SlideError),

    /// File format is not supported
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },
}

/// Failure kinds of the conversion pipeline.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Slide container missing, corrupt, or unsupported
    #[error("cannot open slide {path}: {source}")]
    OpenFailure {
        path: String,
        #[source]
        source: FormatError,
    },

    /// Degenerate preview array or bad threshold configuration
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Detection or rescaling produced a zero-area box
    #[error("degenerate region: {0}")]
    DegenerateRegion(String),

    /// Requested region exceeds the full-resolution extent
    #[error(
        "region {width}x{height} at ({x}, {y}) exceeds slide bounds {slide_width}x{slide_height}"
    )]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        slide_width: u32,
        slide_height: u32,
    },

    /// Pixel data could not be read from an opened slide
    #[error("cannot read slide pixels: {0}")]
    ReadFailure(#[from] SlideError),

    /// Output path is not writable
    #[error("cannot write {path}: {message}")]
    WriteError { path: String, message: String },

    /// Pixel format cannot be encoded as PNG
    #[error("unsupported pixel buffer: {0}")]
    UnsupportedBuffer(String),
}

impl ConvertError {
    /// Process exit code for this failure kind.
    pub const fn exit_code(&self) -> u8 {
        match self {
            ConvertError::OpenFailure { .. } => 10,
            ConvertError::InvalidInput(_) => 11,
            ConvertError::DegenerateRegion(_) => 12,
            ConvertError::OutOfBounds { .. } => 13,
            ConvertError::ReadFailure(_) => 14,
            ConvertError::WriteError { .. } => 15,
            ConvertError::UnsupportedBuffer(_) => 16,
        }
    }
}

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Open,
    Detection,
    CoordinateCalc,
    ImageReading,
    Processing,
    Saving,
}

impl Stage {
    /// Human-readable stage name.
    pub const fn name(&self) -> &'static str {
        match self {
            Stage::Open => "opening slide",
            Stage::Detection => "detecting tissue region",
            Stage::CoordinateCalc => "calculating coordinates",
            Stage::ImageReading => "reading image data",
            Stage::Processing => "processing image",
            Stage::Saving => "saving image",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A [`ConvertError`] tagged with the stage that produced it.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: ConvertError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: ConvertError) -> Self {
        Self { stage, source }
    }

    /// Process exit code, derived from the underlying error kind.
    pub const fn exit_code(&self) -> u8 {
        self.source.exit_code()
    }
}

/// Attach a [`Stage`] to a fallible result.
pub trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T, E: Into<ConvertError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::new(stage, e.into()))
    }
}
