//! Format parsers for Whole Slide Image files.
//!
//! # Format Detection
//!
//! Use [`detect::detect_format`] to identify the format of a slide path.
//! Currently supported formats:
//!
//! - **MIRAX**: `.mrxs` file with a sibling data directory

pub mod detect;
pub mod mirax;

pub use detect::{detect_format, mirax_data_dir, SlideFormat};
pub use mirax::{MiraxReader, SlideProperties};
