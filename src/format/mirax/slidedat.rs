//! `Slidedat.ini` parsing.
//!
//! The slide descriptor is a Windows-style INI file. Only the keys needed to
//! locate tiles and lay out the pyramid are interpreted; everything else is
//! kept in the raw [`IniFile`] for callers that want it.

use std::collections::HashMap;
use std::str::FromStr;

use crate::error::SlideError;

/// Section holding slide-wide settings.
pub const GENERAL: &str = "GENERAL";

/// Section describing the index hierarchies.
pub const HIERARCHICAL: &str = "HIERARCHICAL";

/// Section listing the data files.
pub const DATAFILE: &str = "DATAFILE";

/// Name of the hierarchy holding the pyramid levels.
pub const ZOOM_LEVEL_HIERARCHY: &str = "Slide zoom level";

/// UTF-8 byte order mark, commonly present at the start of the file.
const BOM: char = '\u{feff}';

// =============================================================================
// INI File
// =============================================================================

/// A parsed INI document: section name -> key -> value.
#[derive(Debug, Clone, Default)]
pub struct IniFile {
    sections: HashMap<String, HashMap<String, String>>,
}

impl IniFile {
    /// Parse INI text.
    ///
    /// Blank lines and lines starting with `;` or `#` are skipped. Keys must
    /// appear inside a section and must contain `=`.
    pub fn parse(text: &str) -> Result<Self, SlideError> {
        let text = text.strip_prefix(BOM).unwrap_or(text);
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| SlideError::MalformedIni {
                    line: idx + 1,
                    message: "unterminated section header".to_string(),
                })?;
                let name = name.trim().to_string();
                sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| SlideError::MalformedIni {
                line: idx + 1,
                message: format!("expected KEY = VALUE, got {:?}", line),
            })?;

            let section = current.as_ref().ok_or_else(|| SlideError::MalformedIni {
                line: idx + 1,
                message: "key outside of any section".to_string(),
            })?;

            sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Self { sections })
    }

    /// Check whether a section exists.
    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    /// Get a raw value.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    /// Get a raw value, failing if it is absent.
    pub fn require(&self, section: &str, key: &str) -> Result<&str, SlideError> {
        self.get(section, key).ok_or_else(|| SlideError::MissingKey {
            section: section.to_string(),
            key: key.to_string(),
        })
    }

    /// Get and parse a required value.
    pub fn require_parsed<T: FromStr>(&self, section: &str, key: &str) -> Result<T, SlideError> {
        let raw = self.require(section, key)?;
        parse_value(section, key, raw)
    }

    /// Get and parse an optional value.
    pub fn parsed<T: FromStr>(&self, section: &str, key: &str) -> Result<Option<T>, SlideError> {
        self.get(section, key)
            .map(|raw| parse_value(section, key, raw))
            .transpose()
    }
}

fn parse_value<T: FromStr>(section: &str, key: &str, raw: &str) -> Result<T, SlideError> {
    raw.parse().map_err(|_| SlideError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        message: format!("cannot parse {:?}", raw),
    })
}

fn invalid(section: &str, key: &str, message: impl Into<String>) -> SlideError {
    SlideError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        message: message.into(),
    }
}

// =============================================================================
// Slide Descriptor
// =============================================================================

/// Encoding of the tile images stored in the data files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileFormat {
    Jpeg,
    Png,
    Bmp,
}

impl TileFormat {
    fn from_ini(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "JPEG" | "JPG" => Some(TileFormat::Jpeg),
            "PNG" => Some(TileFormat::Png),
            "BMP" | "BMP24" => Some(TileFormat::Bmp),
            _ => None,
        }
    }

    /// Matching `image` crate format.
    pub const fn image_format(&self) -> image::ImageFormat {
        match self {
            TileFormat::Jpeg => image::ImageFormat::Jpeg,
            TileFormat::Png => image::ImageFormat::Png,
            TileFormat::Bmp => image::ImageFormat::Bmp,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            TileFormat::Jpeg => "JPEG",
            TileFormat::Png => "PNG",
            TileFormat::Bmp => "BMP",
        }
    }
}

/// Settings of one pyramid level, taken from its `LAYER_*_LEVEL_*_SECTION`.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomLevelSection {
    /// Section name in Slidedat.ini
    pub section: String,
    /// Stored tile width in pixels
    pub tile_width: u32,
    /// Stored tile height in pixels
    pub tile_height: u32,
    /// Tile encoding
    pub format: TileFormat,
    /// Horizontal overlap between camera images, in level-0 pixels
    pub overlap_x: f64,
    /// Vertical overlap between camera images, in level-0 pixels
    pub overlap_y: f64,
    /// Power-of-two step relative to the previous level
    pub concat_exponent: u32,
    pub mpp_x: Option<f64>,
    pub mpp_y: Option<f64>,
    /// Background fill colour packed as 0xBBGGRR
    pub fill_color_bgr: Option<u32>,
}

/// Everything needed from Slidedat.ini to open a slide.
#[derive(Debug, Clone)]
pub struct SlideDat {
    pub slide_id: String,
    /// Number of tiles across at level 0
    pub images_across: u32,
    /// Number of tiles down at level 0
    pub images_down: u32,
    /// Tiles per camera image side
    pub camera_divisions: u32,
    /// Index file name inside the slide directory
    pub index_file: String,
    /// Data file names, addressed by the index's file number
    pub data_files: Vec<String>,
    /// Index records that precede the zoom level records
    pub zoom_record_offset: usize,
    /// Pyramid levels, level 0 first
    pub levels: Vec<ZoomLevelSection>,
}

impl SlideDat {
    /// Parse Slidedat.ini text.
    pub fn parse(text: &str) -> Result<Self, SlideError> {
        Self::from_ini(&IniFile::parse(text)?)
    }

    /// Interpret an already parsed INI document.
    pub fn from_ini(ini: &IniFile) -> Result<Self, SlideError> {
        let slide_id = ini.require(GENERAL, "SLIDE_ID")?.to_string();

        let images_across: u32 = ini.require_parsed(GENERAL, "IMAGENUMBER_X")?;
        let images_down: u32 = ini.require_parsed(GENERAL, "IMAGENUMBER_Y")?;
        if images_across == 0 {
            return Err(invalid(GENERAL, "IMAGENUMBER_X", "must be positive"));
        }
        if images_down == 0 {
            return Err(invalid(GENERAL, "IMAGENUMBER_Y", "must be positive"));
        }

        let camera_divisions: u32 = ini
            .parsed(GENERAL, "CameraImageDivisionsPerSide")?
            .unwrap_or(1);
        if camera_divisions == 0 {
            return Err(invalid(
                GENERAL,
                "CameraImageDivisionsPerSide",
                "must be positive",
            ));
        }

        let index_file = ini.require(HIERARCHICAL, "INDEXFILE")?.to_string();
        let data_files = parse_data_files(ini)?;
        let (zoom_record_offset, level_sections) = locate_zoom_levels(ini)?;

        let mut levels = Vec::with_capacity(level_sections.len());
        for (idx, section) in level_sections.into_iter().enumerate() {
            levels.push(parse_level(ini, section, idx)?);
        }

        let total_exponent: u32 = levels.iter().skip(1).map(|l| l.concat_exponent).sum();
        if total_exponent > 16 {
            return Err(SlideError::InvalidValue {
                section: HIERARCHICAL.to_string(),
                key: "IMAGE_CONCAT_FACTOR".to_string(),
                message: format!("pyramid too deep (total factor 2^{})", total_exponent),
            });
        }

        Ok(Self {
            slide_id,
            images_across,
            images_down,
            camera_divisions,
            index_file,
            data_files,
            zoom_record_offset,
            levels,
        })
    }
}

fn parse_data_files(ini: &IniFile) -> Result<Vec<String>, SlideError> {
    let count: usize = ini.require_parsed(DATAFILE, "FILE_COUNT")?;
    if count == 0 {
        return Err(invalid(DATAFILE, "FILE_COUNT", "slide has no data files"));
    }

    (0..count)
        .map(|i| {
            ini.require(DATAFILE, &format!("FILE_{}", i))
                .map(str::to_string)
        })
        .collect()
}

/// Find the zoom level hierarchy.
///
/// Returns the number of index records belonging to hierarchies listed
/// before it, and the section name of each level.
fn locate_zoom_levels(ini: &IniFile) -> Result<(usize, Vec<String>), SlideError> {
    let hier_count: usize = ini.require_parsed(HIERARCHICAL, "HIER_COUNT")?;
    let mut record_offset = 0usize;

    for h in 0..hier_count {
        let name = ini.require(HIERARCHICAL, &format!("HIER_{}_NAME", h))?;
        let count: usize = ini.require_parsed(HIERARCHICAL, &format!("HIER_{}_COUNT", h))?;

        if name == ZOOM_LEVEL_HIERARCHY {
            if count == 0 {
                return Err(invalid(
                    HIERARCHICAL,
                    &format!("HIER_{}_COUNT", h),
                    "slide has no zoom levels",
                ));
            }
            let sections = (0..count)
                .map(|l| {
                    ini.require(HIERARCHICAL, &format!("HIER_{}_VAL_{}_SECTION", h, l))
                        .map(str::to_string)
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok((record_offset, sections));
        }

        record_offset += count;
    }

    Err(SlideError::MissingKey {
        section: HIERARCHICAL.to_string(),
        key: format!("HIER_*_NAME = {}", ZOOM_LEVEL_HIERARCHY),
    })
}

fn parse_level(ini: &IniFile, section: String, idx: usize) -> Result<ZoomLevelSection, SlideError> {
    if !ini.has_section(&section) {
        return Err(SlideError::MissingKey {
            section,
            key: "(section)".to_string(),
        });
    }

    let tile_width: u32 = ini.require_parsed(&section, "DIGITIZER_WIDTH")?;
    let tile_height: u32 = ini.require_parsed(&section, "DIGITIZER_HEIGHT")?;
    if tile_width == 0 || tile_height == 0 {
        return Err(invalid(&section, "DIGITIZER_WIDTH", "tile size must be positive"));
    }

    let raw_format = ini.require(&section, "IMAGE_FORMAT")?;
    let format = TileFormat::from_ini(raw_format).ok_or_else(|| {
        invalid(
            &section,
            "IMAGE_FORMAT",
            format!("unsupported tile format {:?}", raw_format),
        )
    })?;

    let overlap_x: f64 = ini.parsed(&section, "OVERLAP_X")?.unwrap_or(0.0);
    let overlap_y: f64 = ini.parsed(&section, "OVERLAP_Y")?.unwrap_or(0.0);
    if !(0.0..tile_width as f64).contains(&overlap_x) {
        return Err(invalid(&section, "OVERLAP_X", "must be in [0, tile width)"));
    }
    if !(0.0..tile_height as f64).contains(&overlap_y) {
        return Err(invalid(&section, "OVERLAP_Y", "must be in [0, tile height)"));
    }

    // Level 0 is the reference; its factor is meaningless
    let concat_exponent = if idx == 0 {
        0
    } else {
        ini.parsed(&section, "IMAGE_CONCAT_FACTOR")?.unwrap_or(1)
    };

    Ok(ZoomLevelSection {
        tile_width,
        tile_height,
        format,
        overlap_x,
        overlap_y,
        concat_exponent,
        mpp_x: ini.parsed(&section, "MPP_X")?,
        mpp_y: ini.parsed(&section, "MPP_Y")?,
        fill_color_bgr: ini.parsed(&section, "IMAGE_FILL_COLOR_BGR")?,
        section,
    })
}
