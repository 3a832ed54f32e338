//! Grid serialization and disk I/O

use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use glam::IVec3;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::codec::{
    read_len, read_u8, read_u64, read_var_u32, write_u8, write_u64, write_var_u32, write_var_u64,
};
use super::geometry::GridGeometry;
use super::grid::VoxelGrid;
use super::palette::Palette;
use super::storage::{MAX_BITS, PackedIndices, bits_required, required_words};
use crate::core::{Error, Result};

/// Magic bytes opening a compact grid stream.
const MAGIC: &[u8; 4] = b"CGRD";

/// Current compact stream version.
const VERSION: u32 = 1;

/// File extension of compressed grid files.
pub const GRID_EXTENSION: &str = "cgc";

/// Tree document: `{"side": n, "palette": [...], "indices": [...]}`.
#[derive(Serialize, Deserialize)]
struct GridDocument {
    side: u32,
    palette: Value,
    indices: Vec<i64>,
}

impl VoxelGrid {
    /// Tree form. Indices are listed in storage order.
    pub fn to_tree(&self) -> Value {
        let indices: Vec<u32> = self.indices().iter().collect();
        json!({
            "side": self.geometry().bits_per_side(),
            "palette": self.palette().to_tree(),
            "indices": indices,
        })
    }

    /// Decode a tree document. Indices outside the palette become 0.
    pub fn from_tree(value: &Value) -> Result<Self> {
        let document = GridDocument::deserialize(value)
            .map_err(|e| Error::corrupt(format!("grid document: {}", e)))?;
        let geometry = GridGeometry::new(document.side)
            .map_err(|e| Error::corrupt(e.to_string()))?;
        if document.indices.len() != geometry.bits_per_block() {
            return Err(Error::corrupt(format!(
                "grid document has {} indices, expected {}",
                document.indices.len(),
                geometry.bits_per_block()
            )));
        }

        let palette = Palette::new();
        let folded = palette.load_tree(&document.palette)?;
        // Indices address the list as written, repeated entries included.
        let listed = document.palette.as_array().map_or(0, Vec::len);
        let slots = listed.max(palette.len());

        let mut indices = PackedIndices::new(document.indices.len(), bits_required(slots));
        let mut reset = 0usize;
        for (offset, &index) in document.indices.iter().enumerate() {
            if index >= 0 && (index as u64) < slots as u64 {
                indices.set(offset, index as u32);
            } else {
                reset += 1;
            }
        }
        if reset > 0 {
            warn!("Reset {} out-of-range voxel indices in grid document", reset);
        }
        VoxelGrid::from_parts(geometry, palette, indices, &folded)
    }

    /// Replace this grid from a tree, or clear it if the tree is corrupt.
    pub fn load_tree_or_reset(&mut self, value: &Value) {
        match VoxelGrid::from_tree(value) {
            Ok(grid) => *self = grid,
            Err(err) => {
                warn!("Resetting corrupt voxel grid: {}", err);
                self.clear();
            }
        }
    }

    /// Compact stream: magic, version, side, palette compact form, index
    /// width and the packed words.
    pub fn write_compact(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        write_var_u32(writer, self.geometry().bits_per_side())?;
        self.palette().write_compact(writer)?;

        let indices = self.indices();
        write_u8(writer, indices.bits())?;
        write_var_u64(writer, indices.words().len() as u64)?;
        for &word in indices.words() {
            write_u64(writer, word)?;
        }
        Ok(())
    }

    pub fn to_compact(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let _ = self.write_compact(&mut buf);
        buf
    }

    pub fn read_compact(reader: &mut impl Read) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(corrupt_io)?;
        if &magic != MAGIC {
            return Err(Error::corrupt("invalid grid magic bytes"));
        }
        let mut version = [0u8; 4];
        reader.read_exact(&mut version).map_err(corrupt_io)?;
        let version = u32::from_le_bytes(version);
        if version != VERSION {
            return Err(Error::corrupt(format!("unsupported grid version: {}", version)));
        }

        let side = read_var_u32(reader).map_err(corrupt_io)?;
        let geometry = GridGeometry::new(side).map_err(|e| Error::corrupt(e.to_string()))?;
        let palette = Palette::new();
        let folded = palette.read_compact(reader)?;

        let bits = read_u8(reader).map_err(corrupt_io)?;
        let limit = required_words(geometry.bits_per_block(), MAX_BITS);
        let count = read_len(reader, limit).map_err(corrupt_io)?;
        let mut words = Vec::with_capacity(count);
        for _ in 0..count {
            words.push(read_u64(reader).map_err(corrupt_io)?);
        }
        let indices = PackedIndices::from_words(geometry.bits_per_block(), bits, words)?;
        VoxelGrid::from_parts(geometry, palette, indices, &folded)
    }

    pub fn from_compact(bytes: &[u8]) -> Result<Self> {
        VoxelGrid::read_compact(&mut Cursor::new(bytes))
    }
}

fn corrupt_io(err: io::Error) -> Error {
    Error::corrupt(err.to_string())
}

/// Compress a grid's compact stream using LZ4
pub fn compress_grid(grid: &VoxelGrid) -> Vec<u8> {
    lz4_flex::compress_prepend_size(&grid.to_compact())
}

/// Decompress and decode a grid
///
/// # Arguments
/// * `data` - Output of [`compress_grid`]
///
/// # Returns
/// The decoded grid, or `CorruptPersisted` if the bytes do not decompress
/// or do not hold a valid compact stream
pub fn decompress_grid(data: &[u8]) -> Result<VoxelGrid> {
    let decompressed = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| Error::corrupt(format!("LZ4 decompression failed: {}", e)))?;
    VoxelGrid::from_compact(&decompressed)
}

/// Get the file path for the grid of a cell
///
/// # Arguments
/// * `base_dir` - Root directory of the grid store
/// * `cell` - Cell coordinate
pub fn grid_path(base_dir: &Path, cell: IVec3) -> PathBuf {
    // base_dir/y_{y}/cell_{x}_{y}_{z}.cgc
    base_dir
        .join(format!("y_{}", cell.y))
        .join(format!("cell_{}_{}_{}.{}", cell.x, cell.y, cell.z, GRID_EXTENSION))
}

/// Save a grid to disk (compressed)
///
/// Parent directories are created as needed and an existing file is
/// overwritten.
///
/// # Arguments
/// * `base_dir` - Root directory of the grid store
/// * `cell` - Cell coordinate the grid belongs to
/// * `grid` - Grid to write
pub async fn save_grid(base_dir: &Path, cell: IVec3, grid: &VoxelGrid) -> Result<()> {
    let path = grid_path(base_dir, cell);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let compressed = compress_grid(grid);
    debug!("Saving grid {} ({} bytes) to {}", cell, compressed.len(), path.display());
    tokio::fs::write(&path, compressed).await?;

    Ok(())
}

/// Load a grid from disk (if it exists)
///
/// # Arguments
/// * `base_dir` - Root directory of the grid store
/// * `cell` - Cell coordinate
///
/// # Returns
/// `None` if no file exists for the cell; `CorruptPersisted` if the file
/// cannot be decoded
pub async fn load_grid(base_dir: &Path, cell: IVec3) -> Result<Option<VoxelGrid>> {
    let path = grid_path(base_dir, cell);

    if !tokio::fs::try_exists(&path).await? {
        return Ok(None);
    }

    let compressed = tokio::fs::read(&path).await?;
    Ok(Some(decompress_grid(&compressed)?))
}

/// Load a grid, falling back to an empty one if the file is corrupt.
///
/// # Returns
/// `None` if no file exists; an empty grid of `geometry` if the file is
/// corrupt. I/O failures are still returned as errors.
pub async fn load_grid_or_reset(base_dir: &Path, cell: IVec3, geometry: GridGeometry) -> Result<Option<VoxelGrid>> {
    match load_grid(base_dir, cell).await {
        Err(Error::CorruptPersisted(msg)) => {
            warn!("Resetting corrupt grid file for cell {}: {}", cell, msg);
            Ok(Some(VoxelGrid::new(geometry)))
        }
        other => other,
    }
}

/// Delete a grid from disk
pub async fn delete_grid(base_dir: &Path, cell: IVec3) -> Result<()> {
    let path = grid_path(base_dir, cell);

    if tokio::fs::try_exists(&path).await? {
        tokio::fs::remove_file(&path).await?;
    }

    Ok(())
}

/// Check if a grid exists on disk
pub async fn grid_exists(base_dir: &Path, cell: IVec3) -> bool {
    tokio::fs::try_exists(grid_path(base_dir, cell)).await.unwrap_or(false)
}
