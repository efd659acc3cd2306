//! Test utilities for integration tests.
//!
//! This module builds synthetic MIRAX slides: a `Slidedat.ini`, an
//! `Index.dat` and a single data file holding PNG, JPEG or BMP tiles. The
//! slide content is a black background with one rectangle of patterned
//! "tissue", so expected pixels can be computed for any coordinate.

use std::collections::HashSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};

use mrxs_crop::error::IoError;
use mrxs_crop::io::{MemoryReader, RangeReader};
use mrxs_crop::slide::{MemorySlideSource, SlideSource};

pub const SLIDE_ID: &str = "5A1DE0C0FFEE";

// =============================================================================
// Synthetic Slide Builder
// =============================================================================

/// Tile encoding for a synthetic slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileEncoding {
    Png,
    Jpeg,
    Bmp,
}

impl TileEncoding {
    fn ini_name(self) -> &'static str {
        match self {
            TileEncoding::Png => "PNG",
            TileEncoding::Jpeg => "JPEG",
            TileEncoding::Bmp => "BMP",
        }
    }
}

/// Encoded files of a synthetic slide.
pub struct SlideFiles {
    pub slidedat: String,
    pub index: Vec<u8>,
    pub data: Vec<u8>,
}

/// Builder for a synthetic MIRAX slide.
///
/// Level `l` has downsample `2^l`. Level-0 tiles abut without overlap and
/// every level stores one tile per `2^l × 2^l` block of level-0 tiles,
/// positioned at the block's top-left grid index.
#[derive(Debug, Clone)]
pub struct SyntheticMrxs {
    pub tile_width: u32,
    pub tile_height: u32,
    pub images_across: u32,
    pub images_down: u32,
    pub levels: u32,
    /// Tissue rectangle in level-0 pixels, exclusive ends
    pub tissue: Option<(u32, u32, u32, u32)>,
    /// Level-0 grid cells with no stored tile
    pub missing: HashSet<(u32, u32)>,
    pub encoding: TileEncoding,
    /// Maximum tile entries per index page
    pub page_size: usize,
}

impl Default for SyntheticMrxs {
    fn default() -> Self {
        Self {
            tile_width: 64,
            tile_height: 64,
            images_across: 8,
            images_down: 6,
            levels: 4,
            tissue: Some((128, 96, 384, 288)),
            missing: HashSet::new(),
            encoding: TileEncoding::Png,
            page_size: 5,
        }
    }
}

impl SyntheticMrxs {
    pub fn blank() -> Self {
        Self {
            tissue: None,
            ..Self::default()
        }
    }

    pub fn with_tissue(mut self, x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        self.tissue = Some((x0, y0, x1, y1));
        self
    }

    pub fn with_missing(mut self, x: u32, y: u32) -> Self {
        self.missing.insert((x, y));
        self
    }

    pub fn with_encoding(mut self, encoding: TileEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Level-0 dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        (
            self.images_across * self.tile_width,
            self.images_down * self.tile_height,
        )
    }

    /// Expected level-0 pixel, ignoring missing tiles.
    pub fn pixel(&self, x: u32, y: u32) -> Rgb<u8> {
        match self.tissue {
            Some((x0, y0, x1, y1)) if x >= x0 && x < x1 && y >= y0 && y < y1 => Rgb([
                150 + (x % 97) as u8,
                60 + (y % 131) as u8,
                90 + ((x + 2 * y) % 113) as u8,
            ]),
            _ => Rgb([0, 0, 0]),
        }
    }

    /// Whether the level-0 pixel falls inside a missing tile.
    pub fn is_missing(&self, x: u32, y: u32) -> bool {
        self.missing
            .contains(&(x / self.tile_width, y / self.tile_height))
    }

    fn tile_image(&self, level: u32, gx: u32, gy: u32) -> RgbImage {
        let d = 1u32 << level;
        let ox = gx * self.tile_width;
        let oy = gy * self.tile_height;
        RgbImage::from_fn(self.tile_width, self.tile_height, |px, py| {
            self.pixel(ox + px * d, oy + py * d)
        })
    }

    fn encode(&self, tile: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        match self.encoding {
            TileEncoding::Png => tile
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
                .unwrap(),
            TileEncoding::Bmp => tile
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Bmp)
                .unwrap(),
            TileEncoding::Jpeg => JpegEncoder::new_with_quality(&mut buf, 95)
                .encode_image(tile)
                .unwrap(),
        }
        buf
    }

    pub fn slidedat(&self) -> String {
        let mut ini = String::from("\u{feff}");
        ini.push_str(&format!(
            "[GENERAL]\nSLIDE_ID = {}\nIMAGENUMBER_X = {}\nIMAGENUMBER_Y = {}\n\
             CameraImageDivisionsPerSide = 1\n\n",
            SLIDE_ID, self.images_across, self.images_down
        ));
        ini.push_str("[HIERARCHICAL]\nHIER_COUNT = 1\nHIER_0_NAME = Slide zoom level\n");
        ini.push_str(&format!("HIER_0_COUNT = {}\n", self.levels));
        for l in 0..self.levels {
            ini.push_str(&format!(
                "HIER_0_VAL_{}_SECTION = LAYER_0_LEVEL_{}_SECTION\n",
                l, l
            ));
        }
        ini.push_str("INDEXFILE = Index.dat\n\n");
        ini.push_str("[DATAFILE]\nFILE_COUNT = 1\nFILE_0 = Data0000.dat\n\n");
        for l in 0..self.levels {
            let mpp = 0.25 * (1u32 << l) as f64;
            ini.push_str(&format!(
                "[LAYER_0_LEVEL_{}_SECTION]\nOVERLAP_X = 0\nOVERLAP_Y = 0\n\
                 MPP_X = {}\nMPP_Y = {}\nIMAGE_FORMAT = {}\nIMAGE_FILL_COLOR_BGR = 0\n\
                 DIGITIZER_WIDTH = {}\nDIGITIZER_HEIGHT = {}\nIMAGE_CONCAT_FACTOR = {}\n\n",
                l,
                mpp,
                mpp,
                self.encoding.ini_name(),
                self.tile_width,
                self.tile_height,
                if l == 0 { 0 } else { 1 }
            ));
        }
        ini
    }

    /// Encode all files of the slide.
    pub fn build(&self) -> SlideFiles {
        // Data file: a small header followed by the tile images
        let mut data = b"01.02".to_vec();
        data.extend_from_slice(SLIDE_ID.as_bytes());

        let mut records: Vec<Vec<[i32; 4]>> = Vec::new();
        for level in 0..self.levels {
            let step = 1u32 << level;
            let mut entries = Vec::new();
            for gy in (0..self.images_down).step_by(step as usize) {
                for gx in (0..self.images_across).step_by(step as usize) {
                    if level == 0 && self.missing.contains(&(gx, gy)) {
                        continue;
                    }
                    let encoded = self.encode(&self.tile_image(level, gx, gy));
                    let index = (gy * self.images_across + gx) as i32;
                    entries.push([index, data.len() as i32, encoded.len() as i32, 0]);
                    data.extend_from_slice(&encoded);
                }
            }
            records.push(entries);
        }

        SlideFiles {
            slidedat: self.slidedat(),
            index: build_index(&records, self.page_size),
            data,
        }
    }

    /// Write `<name>.mrxs` and its data directory under `dir`.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let files = self.build();
        let slide_dir = dir.join(name);
        std::fs::create_dir_all(&slide_dir).unwrap();
        std::fs::write(slide_dir.join("Slidedat.ini"), files.slidedat).unwrap();
        std::fs::write(slide_dir.join("Index.dat"), files.index).unwrap();
        std::fs::write(slide_dir.join("Data0000.dat"), files.data).unwrap();

        let path = dir.join(format!("{}.mrxs", name));
        std::fs::write(&path, b"MIRAX").unwrap();
        path
    }

    /// Files of the slide as an in-memory source.
    pub fn memory_source(&self) -> MemorySlideSource {
        let files = self.build();
        MemorySlideSource::new("mem://synthetic")
            .with_file("Slidedat.ini", files.slidedat.into_bytes())
            .with_file("Index.dat", files.index)
            .with_file("Data0000.dat", files.data)
    }
}

fn push_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Lay out an index: header, record pointer table, records, then pages.
fn build_index(records: &[Vec<[i32; 4]>], page_size: usize) -> Vec<u8> {
    let mut buf = b"01.02".to_vec();
    buf.extend_from_slice(SLIDE_ID.as_bytes());

    let header_len = buf.len() + 8;
    let hier_root = header_len;
    let nonhier_root = hier_root + 4 * records.len();
    let records_start = nonhier_root + 4;
    let pages_start = records_start + 8 * records.len();

    // Page offsets, in record order
    let mut page_offsets: Vec<Vec<usize>> = Vec::new();
    let mut cursor = pages_start;
    for entries in records {
        let mut offsets = Vec::new();
        for chunk in entries.chunks(page_size.max(1)) {
            offsets.push(cursor);
            cursor += 8 + 16 * chunk.len();
        }
        page_offsets.push(offsets);
    }

    push_i32(&mut buf, hier_root as i32);
    push_i32(&mut buf, nonhier_root as i32);

    for r in 0..records.len() {
        push_i32(&mut buf, (records_start + 8 * r) as i32);
    }
    push_i32(&mut buf, 0);

    for offsets in &page_offsets {
        push_i32(&mut buf, 0);
        push_i32(&mut buf, offsets.first().copied().unwrap_or(0) as i32);
    }

    for (entries, offsets) in records.iter().zip(&page_offsets) {
        let chunks: Vec<&[[i32; 4]]> = entries.chunks(page_size.max(1)).collect();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(buf.len(), offsets[i]);
            push_i32(&mut buf, chunk.len() as i32);
            push_i32(&mut buf, offsets.get(i + 1).copied().unwrap_or(0) as i32);
            for entry in chunk.iter() {
                for v in entry {
                    push_i32(&mut buf, *v);
                }
            }
        }
    }

    buf
}

// =============================================================================
// Tracking Source
// =============================================================================

/// Range reader that counts the reads reaching it.
pub struct TrackingReader {
    inner: MemoryReader,
    reads: Arc<AtomicUsize>,
}

#[async_trait]
impl RangeReader for TrackingReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_exact_at(offset, len).await
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}

/// In-memory slide source that records how many reads each file receives.
pub struct TrackingSource {
    inner: MemorySlideSource,
    reads: std::collections::HashMap<String, Arc<AtomicUsize>>,
}

impl TrackingSource {
    pub fn new(slide: &SyntheticMrxs) -> Self {
        let reads = ["Slidedat.ini", "Index.dat", "Data0000.dat"]
            .iter()
            .map(|name| (name.to_string(), Arc::new(AtomicUsize::new(0))))
            .collect();
        Self {
            inner: slide.memory_source(),
            reads,
        }
    }

    pub fn reads(&self, name: &str) -> usize {
        self.reads
            .get(name)
            .map_or(0, |c| c.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl SlideSource for TrackingSource {
    type Reader = TrackingReader;

    async fn create_reader(&self, name: &str) -> Result<Self::Reader, IoError> {
        let inner = self.inner.create_reader(name).await?;
        let reads = self
            .reads
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::new(AtomicUsize::new(0)));
        Ok(TrackingReader { inner, reads })
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}

// =============================================================================
// Image Helpers
// =============================================================================

/// Expected level-0 crop of a synthetic slide, exclusive far edges.
pub fn expected_crop(slide: &SyntheticMrxs, x0: u32, y0: u32, x1: u32, y1: u32) -> RgbImage {
    RgbImage::from_fn(x1 - x0, y1 - y0, |x, y| {
        if slide.is_missing(x0 + x, y0 + y) {
            Rgb([0, 0, 0])
        } else {
            slide.pixel(x0 + x, y0 + y)
        }
    })
}

/// Largest per-channel difference between two images of equal size.
pub fn max_channel_diff(a: &RgbImage, b: &RgbImage) -> u8 {
    assert_eq!(a.dimensions(), b.dimensions());
    a.pixels()
        .zip(b.pixels())
        .flat_map(|(p, q)| (0..3).map(move |c| p[c].abs_diff(q[c])))
        .max()
        .unwrap_or(0)
}
