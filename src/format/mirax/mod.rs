//! MIRAX (`.mrxs`) slide support.
//!
//! A MIRAX slide is a small `.mrxs` marker file next to a directory of the
//! same name holding:
//!
//! - `Slidedat.ini`: slide layout, pyramid levels and data file list
//! - `Index.dat`: where each tile image lives in the data files
//! - `Data*.dat`: concatenated JPEG/PNG/BMP tile images
//!
//! [`MiraxReader`] parses the first two on open and decodes tiles from the
//! data files on demand.

pub mod index;
mod reader;
pub mod slidedat;

pub use index::{IndexHeader, TileEntry, INDEX_VERSION};
pub use reader::{MiraxReader, SlideProperties, SLIDEDAT_FILE};
pub use slidedat::{IniFile, SlideDat, TileFormat, ZoomLevelSection};
