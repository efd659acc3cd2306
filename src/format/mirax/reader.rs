//! MIRAX slide reader.
//!
//! Opens the slide directory through a [`SlideSource`], parses Slidedat.ini
//! and Index.dat once, and then serves arbitrary regions by compositing the
//! stored tile images that intersect them.

use async_trait::async_trait;
use image::RgbaImage;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::SlideError;
use crate::io::{BlockCache, RangeReader};
use crate::slide::{SlideReader, SlideSource};

use super::index::{self, IndexBounds, TileEntry};
use super::slidedat::{SlideDat, TileFormat, ZoomLevelSection};

/// Slide descriptor file name inside the slide directory.
pub const SLIDEDAT_FILE: &str = "Slidedat.ini";

// =============================================================================
// Geometry
// =============================================================================

/// Level-0 placement of the tile grid.
///
/// Tiles belonging to one camera image abut; neighbouring camera images
/// overlap by the level-0 section's overlap.
#[derive(Debug, Clone, Copy)]
struct Geometry {
    tile_width: u32,
    tile_height: u32,
    divisions: u32,
    overlap_x: f64,
    overlap_y: f64,
}

impl Geometry {
    fn new(dat: &SlideDat) -> Self {
        let base = &dat.levels[0];
        Self {
            tile_width: base.tile_width,
            tile_height: base.tile_height,
            divisions: dat.camera_divisions,
            overlap_x: base.overlap_x,
            overlap_y: base.overlap_y,
        }
    }

    fn origin_x(&self, x: u32) -> f64 {
        axis_origin(x, self.tile_width, self.divisions, self.overlap_x)
    }

    fn origin_y(&self, y: u32) -> f64 {
        axis_origin(y, self.tile_height, self.divisions, self.overlap_y)
    }

    /// Level-0 slide dimensions for a grid of `across × down` tiles.
    fn base_dimensions(&self, across: u32, down: u32) -> (u32, u32) {
        let width = self.origin_x(across - 1) + self.tile_width as f64;
        let height = self.origin_y(down - 1) + self.tile_height as f64;
        (width.ceil() as u32, height.ceil() as u32)
    }
}

fn axis_origin(index: u32, tile: u32, divisions: u32, overlap: f64) -> f64 {
    let camera = (index / divisions) as f64;
    let within = (index % divisions) as f64;
    camera * (divisions as f64 * tile as f64 - overlap) + within * tile as f64
}

// =============================================================================
// Levels
// =============================================================================

/// A tile positioned in its level's pixel space.
#[derive(Debug, Clone, Copy)]
struct PlacedTile {
    entry: TileEntry,
    x: i64,
    y: i64,
}

#[derive(Debug)]
struct MiraxLevel {
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    divisor: u32,
    format: TileFormat,
    tiles: Vec<PlacedTile>,
}

impl MiraxLevel {
    fn new(
        geometry: &Geometry,
        base: (u32, u32),
        section: &ZoomLevelSection,
        divisor: u32,
        entries: Vec<TileEntry>,
    ) -> Self {
        let d = divisor as f64;
        let tiles = entries
            .into_iter()
            .map(|entry| PlacedTile {
                entry,
                x: (geometry.origin_x(entry.x) / d).round() as i64,
                y: (geometry.origin_y(entry.y) / d).round() as i64,
            })
            .collect();

        Self {
            width: base.0.div_ceil(divisor),
            height: base.1.div_ceil(divisor),
            tile_width: section.tile_width,
            tile_height: section.tile_height,
            divisor,
            format: section.format,
            tiles,
        }
    }

    /// Tiles whose footprint intersects the rectangle `[x, x+w) × [y, y+h)`.
    fn tiles_in(&self, x: i64, y: i64, w: u32, h: u32) -> impl Iterator<Item = &PlacedTile> {
        let (tw, th) = (self.tile_width as i64, self.tile_height as i64);
        let (x_end, y_end) = (x + w as i64, y + h as i64);
        self.tiles.iter().filter(move |t| {
            t.x < x_end && t.x + tw > x && t.y < y_end && t.y + th > y
        })
    }
}

// =============================================================================
// Properties
// =============================================================================

/// Descriptive slide metadata, mostly for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideProperties {
    pub slide_id: String,
    pub images_across: u32,
    pub images_down: u32,
    pub camera_divisions: u32,
    pub tile_format: &'static str,
    pub mpp_x: Option<f64>,
    pub mpp_y: Option<f64>,
    /// Scanner background colour as `#RRGGBB`
    pub background_color: Option<String>,
    pub data_files: usize,
}

fn bgr_to_hex(bgr: u32) -> String {
    let r = bgr & 0xFF;
    let g = (bgr >> 8) & 0xFF;
    let b = (bgr >> 16) & 0xFF;
    format!("#{:02X}{:02X}{:02X}", r, g, b)
}

// =============================================================================
// Reader
// =============================================================================

/// Reader for MIRAX (`.mrxs`) slides.
pub struct MiraxReader<R> {
    dat: SlideDat,
    levels: Vec<MiraxLevel>,
    data_files: Vec<R>,
    identifier: String,
}

impl<R: RangeReader + 'static> MiraxReader<R> {
    /// Open a slide from its directory.
    ///
    /// Parses Slidedat.ini, walks the index for every zoom level and opens
    /// all data files, so a slide with missing pieces fails here rather
    /// than halfway through a read.
    pub async fn open<S>(source: &S) -> Result<Self, SlideError>
    where
        S: SlideSource<Reader = R>,
    {
        let slidedat = source.create_reader(SLIDEDAT_FILE).await?;
        let raw = slidedat.read_exact_at(0, slidedat.size() as usize).await?;
        let dat = SlideDat::parse(&String::from_utf8_lossy(&raw))?;

        let index_reader = BlockCache::new(source.create_reader(&dat.index_file).await?);
        let header = index::read_header(&index_reader, &dat.slide_id).await?;
        let bounds = IndexBounds {
            images_across: dat.images_across,
            images_down: dat.images_down,
            file_count: dat.data_files.len(),
        };

        let geometry = Geometry::new(&dat);
        let base = geometry.base_dimensions(dat.images_across, dat.images_down);

        let mut levels = Vec::with_capacity(dat.levels.len());
        let mut divisor = 1u32;
        for (idx, section) in dat.levels.iter().enumerate() {
            divisor <<= section.concat_exponent;
            let entries = index::read_record_entries(
                &index_reader,
                &header,
                dat.zoom_record_offset + idx,
                bounds,
            )
            .await?;
            levels.push(MiraxLevel::new(&geometry, base, section, divisor, entries));
        }

        let mut data_files = Vec::with_capacity(dat.data_files.len());
        for name in &dat.data_files {
            data_files.push(source.create_reader(name).await?);
        }

        info!(
            slide = source.identifier(),
            slide_id = %dat.slide_id,
            width = base.0,
            height = base.1,
            levels = levels.len(),
            "Opened MIRAX slide"
        );
        for (idx, level) in levels.iter().enumerate() {
            debug!(
                level = idx,
                width = level.width,
                height = level.height,
                downsample = level.divisor,
                tiles = level.tiles.len(),
                format = level.format.name(),
                "Level"
            );
        }

        Ok(Self {
            dat,
            levels,
            data_files,
            identifier: source.identifier().to_string(),
        })
    }

    /// Slide ID from Slidedat.ini.
    pub fn slide_id(&self) -> &str {
        &self.dat.slide_id
    }

    /// Identifier of the source the slide was opened from.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Number of stored tiles on a level.
    pub fn stored_tile_count(&self, level: usize) -> Option<usize> {
        self.levels.get(level).map(|l| l.tiles.len())
    }

    /// Descriptive metadata.
    pub fn properties(&self) -> SlideProperties {
        let base = &self.dat.levels[0];
        SlideProperties {
            slide_id: self.dat.slide_id.clone(),
            images_across: self.dat.images_across,
            images_down: self.dat.images_down,
            camera_divisions: self.dat.camera_divisions,
            tile_format: base.format.name(),
            mpp_x: base.mpp_x,
            mpp_y: base.mpp_y,
            background_color: base.fill_color_bgr.map(bgr_to_hex),
            data_files: self.data_files.len(),
        }
    }

    async fn decode_tile(
        &self,
        level: usize,
        format: TileFormat,
        tile: &PlacedTile,
    ) -> Result<RgbaImage, SlideError> {
        let entry = &tile.entry;
        let file = self
            .data_files
            .get(entry.file)
            .ok_or_else(|| SlideError::InvalidIndex(format!("no data file {}", entry.file)))?;

        let bytes = file.read_exact_at(entry.offset, entry.length).await?;
        let decoded = image::load_from_memory_with_format(&bytes, format.image_format())
            .map_err(|e| SlideError::TileDecode {
                level,
                x: entry.x,
                y: entry.y,
                message: e.to_string(),
            })?;

        Ok(decoded.to_rgba8())
    }
}

#[async_trait]
impl<R: RangeReader + 'static> SlideReader for MiraxReader<R> {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.levels.get(level).map(|l| (l.width, l.height))
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.levels.get(level).map(|l| l.divisor as f64)
    }

    fn tile_size(&self, level: usize) -> Option<(u32, u32)> {
        self.levels.get(level).map(|l| (l.tile_width, l.tile_height))
    }

    async fn read_region(
        &self,
        level: usize,
        origin: (u32, u32),
        size: (u32, u32),
    ) -> Result<RgbaImage, SlideError> {
        let lvl = self.levels.get(level).ok_or(SlideError::LevelOutOfRange {
            level,
            count: self.levels.len(),
        })?;

        let (width, height) = size;
        if width == 0 || height == 0 {
            return Err(SlideError::InvalidRegion(format!(
                "empty region {}x{}",
                width, height
            )));
        }
        let bytes = width as u64 * height as u64 * 4;
        if usize::try_from(bytes).is_err() {
            return Err(SlideError::InvalidRegion(format!(
                "region {}x{} does not fit in memory",
                width, height
            )));
        }

        // Origin is in level-0 coordinates
        let d = lvl.divisor as i64;
        let x = origin.0 as i64 / d;
        let y = origin.1 as i64 / d;

        let mut canvas = RgbaImage::new(width, height);
        let mut painted = 0usize;
        for tile in lvl.tiles_in(x, y, width, height) {
            let pixels = self.decode_tile(level, lvl.format, tile).await?;
            image::imageops::replace(&mut canvas, &pixels, tile.x - x, tile.y - y);
            painted += 1;
        }

        debug!(
            level,
            x,
            y,
            width,
            height,
            tiles = painted,
            "Composited region"
        );

        Ok(canvas)
    }
}
