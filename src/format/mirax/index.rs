//! `Index.dat` parsing.
//!
//! The index maps every stored tile image to a `(file, offset, length)`
//! triple inside the data files. All integers are little-endian `i32`.
//!
//! ```text
//! header:     "01.02" <SLIDE_ID bytes> hier_root:i32 nonhier_root:i32
//! hier_root:  record_ptr:i32 per hierarchical value
//! record:     0:i32 first_page:i32
//! page:       count:i32 next_page:i32 count × entry
//! entry:      image_index:i32 offset:i32 length:i32 file_number:i32
//! ```

use std::collections::HashSet;

use tracing::debug;

use crate::error::SlideError;
use crate::io::{read_i32_le, RangeReader};

/// Version string every supported index starts with.
pub const INDEX_VERSION: &[u8] = b"01.02";

/// Size of one tile entry in bytes.
const ENTRY_SIZE: usize = 16;

/// Page header: entry count + next page pointer.
const PAGE_HEADER_SIZE: usize = 8;

/// Location of one stored tile image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileEntry {
    /// Grid column at level-0 tile granularity
    pub x: u32,
    /// Grid row at level-0 tile granularity
    pub y: u32,
    /// Index into the slide's data file list
    pub file: usize,
    /// Byte offset inside the data file
    pub offset: u64,
    /// Byte length of the encoded image
    pub length: usize,
}

/// Root pointer from the index header.
///
/// The non-hierarchical root that follows it points at scan metadata and
/// is not read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub hier_root: u64,
}

/// Grid and file limits used to validate entries.
#[derive(Debug, Clone, Copy)]
pub struct IndexBounds {
    pub images_across: u32,
    pub images_down: u32,
    pub file_count: usize,
}

/// Read and validate the index header.
///
/// The slide ID embedded after the version string must match the one from
/// Slidedat.ini, otherwise the index belongs to a different slide.
pub async fn read_header<R: RangeReader>(
    reader: &R,
    slide_id: &str,
) -> Result<IndexHeader, SlideError> {
    let id_len = slide_id.len();
    let header_len = INDEX_VERSION.len() + id_len + 8;
    if reader.size() < header_len as u64 {
        return Err(SlideError::InvalidIndex(format!(
            "file too small for header: {} bytes",
            reader.size()
        )));
    }

    let bytes = reader.read_exact_at(0, header_len).await?;

    let version = &bytes[..INDEX_VERSION.len()];
    if version != INDEX_VERSION {
        return Err(SlideError::InvalidIndex(format!(
            "unsupported version {:?}",
            String::from_utf8_lossy(version)
        )));
    }

    let id = &bytes[INDEX_VERSION.len()..INDEX_VERSION.len() + id_len];
    if id != slide_id.as_bytes() {
        return Err(SlideError::InvalidIndex(format!(
            "slide ID mismatch: index has {:?}, Slidedat.ini has {:?}",
            String::from_utf8_lossy(id),
            slide_id
        )));
    }

    let roots = &bytes[INDEX_VERSION.len() + id_len..];
    Ok(IndexHeader {
        hier_root: to_offset(read_i32_le(&roots[0..4]), "hierarchical root")?,
    })
}

/// Read all tile entries of one hierarchical record.
///
/// `record` is the position of the record in the hierarchical table, i.e.
/// the zoom level plus the records of preceding hierarchies.
pub async fn read_record_entries<R: RangeReader>(
    reader: &R,
    header: &IndexHeader,
    record: usize,
    bounds: IndexBounds,
) -> Result<Vec<TileEntry>, SlideError> {
    let slot = header.hier_root + 4 * record as u64;
    let record_ptr = read_offset(reader, slot, "record pointer").await?;

    let head = reader.read_exact_at(record_ptr, 8).await?;
    if read_i32_le(&head[0..4]) != 0 {
        return Err(SlideError::InvalidIndex(format!(
            "record {} at offset {} does not start with 0",
            record, record_ptr
        )));
    }
    let mut page_ptr = to_offset(read_i32_le(&head[4..8]), "first page")?;

    let mut entries = Vec::new();
    let mut visited = HashSet::new();
    let mut pages = 0usize;

    while page_ptr != 0 {
        if !visited.insert(page_ptr) {
            return Err(SlideError::InvalidIndex(format!(
                "page chain of record {} loops at offset {}",
                record, page_ptr
            )));
        }

        let page = reader.read_exact_at(page_ptr, PAGE_HEADER_SIZE).await?;
        let count = read_i32_le(&page[0..4]);
        if count < 0 {
            return Err(SlideError::InvalidIndex(format!(
                "negative entry count {} at offset {}",
                count, page_ptr
            )));
        }
        let next = to_offset(read_i32_le(&page[4..8]), "next page")?;

        let count = count as usize;
        let data = reader
            .read_exact_at(page_ptr + PAGE_HEADER_SIZE as u64, count * ENTRY_SIZE)
            .await?;
        entries.reserve(count);
        for raw in data.chunks_exact(ENTRY_SIZE) {
            entries.push(parse_entry(raw, bounds)?);
        }

        pages += 1;
        page_ptr = next;
    }

    debug!(
        record,
        pages,
        entries = entries.len(),
        "Read index record"
    );

    Ok(entries)
}

fn parse_entry(raw: &[u8], bounds: IndexBounds) -> Result<TileEntry, SlideError> {
    let image_index = read_i32_le(&raw[0..4]);
    let offset = read_i32_le(&raw[4..8]);
    let length = read_i32_le(&raw[8..12]);
    let file = read_i32_le(&raw[12..16]);

    let total = bounds.images_across as u64 * bounds.images_down as u64;
    if image_index < 0 || image_index as u64 >= total {
        return Err(SlideError::InvalidIndex(format!(
            "image index {} outside {}x{} grid",
            image_index, bounds.images_across, bounds.images_down
        )));
    }
    if offset < 0 || length <= 0 {
        return Err(SlideError::InvalidIndex(format!(
            "bad tile location: offset {}, length {}",
            offset, length
        )));
    }
    if file < 0 || file as usize >= bounds.file_count {
        return Err(SlideError::InvalidIndex(format!(
            "data file number {} out of range ({} files)",
            file, bounds.file_count
        )));
    }

    let image_index = image_index as u32;
    Ok(TileEntry {
        x: image_index % bounds.images_across,
        y: image_index / bounds.images_across,
        file: file as usize,
        offset: offset as u64,
        length: length as usize,
    })
}

async fn read_offset<R: RangeReader>(
    reader: &R,
    at: u64,
    what: &str,
) -> Result<u64, SlideError> {
    let bytes = reader.read_exact_at(at, 4).await?;
    to_offset(read_i32_le(&bytes), what)
}

fn to_offset(value: i32, what: &str) -> Result<u64, SlideError> {
    u64::try_from(value)
        .map_err(|_| SlideError::InvalidIndex(format!("negative {} pointer {}", what, value)))
}
