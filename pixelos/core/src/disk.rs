use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::image::{self, DiskImageMetadata, PixelGrid, DISK_IMAGE_MAGIC, DISK_IMAGE_VERSION};
use crate::memory::{AddressSpace, BLANK};
use crate::{CoreError, Result};

pub const DEFAULT_BLOCKS: u32 = 1024;
pub const DEFAULT_BLOCK_SIZE: u32 = 512;

/// Fixed-block-size storage layered on its own [`AddressSpace`].
///
/// Block `i`, offset `o` lives at linear address `i * block_size + o`.
/// When rendered to an image the store is one block per row: the grid is
/// `block_size` wide and `blocks` tall, so a saved disk reads
/// block-by-block top to bottom.
pub struct BlockStore {
    blocks: u32,
    block_size: u32,
    memory: AddressSpace,
    /// Free block indices, kept sorted ascending.
    free: Vec<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskStats {
    pub blocks: u32,
    pub block_size: u32,
    pub capacity_bytes: u64,
    pub free_blocks: u32,
    pub used_blocks: u32,
}

impl DiskStats {
    pub fn usage_percent(&self) -> f64 {
        self.used_blocks as f64 / self.blocks as f64 * 100.0
    }
}

impl BlockStore {
    pub fn new(blocks: u32, block_size: u32) -> Result<Self> {
        Self::validate_geometry(blocks, block_size)?;
        Ok(Self {
            blocks,
            block_size,
            memory: AddressSpace::new(),
            free: (0..blocks).collect(),
        })
    }

    fn validate_geometry(blocks: u32, block_size: u32) -> Result<()> {
        if blocks == 0 || block_size == 0 {
            return Err(CoreError::InvalidGeometry(format!(
                "blocks and block size must be nonzero (got {blocks} x {block_size})"
            )));
        }
        // Capacity must fit the linear address space.
        if blocks as u64 * block_size as u64 > u32::MAX as u64 + 1 {
            return Err(CoreError::InvalidGeometry(format!(
                "{blocks} x {block_size} exceeds the addressable capacity"
            )));
        }
        Ok(())
    }

    pub fn blocks(&self) -> u32 {
        self.blocks
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.blocks as u64 * self.block_size as u64
    }

    fn check_index(&self, index: u32) -> Result<()> {
        if index >= self.blocks {
            return Err(CoreError::BlockOutOfRange {
                index,
                blocks: self.blocks,
            });
        }
        Ok(())
    }

    /// The `block_size` bytes of block `index`. Never-written regions read
    /// as zero.
    pub fn read_block(&self, index: u32) -> Result<Vec<u8>> {
        self.check_index(index)?;
        let start = index * self.block_size;
        Ok((0..self.block_size)
            .map(|offset| self.memory.read(start + offset))
            .collect())
    }

    /// Write one full block. The payload length must equal the block size
    /// exactly; no truncation, no padding, no partial writes.
    pub fn write_block(&mut self, index: u32, data: &[u8]) -> Result<()> {
        self.check_index(index)?;
        if data.len() != self.block_size as usize {
            return Err(CoreError::InvalidBlockSize {
                expected: self.block_size as usize,
                actual: data.len(),
            });
        }
        let start = index * self.block_size;
        for (offset, byte) in data.iter().enumerate() {
            self.memory.write(start + offset as u32, *byte);
        }
        Ok(())
    }

    /// Take `count` blocks off the free list, lowest indices first.
    pub fn allocate(&mut self, count: usize) -> Result<Vec<u32>> {
        if count > self.free.len() {
            return Err(CoreError::DiskFull {
                requested: count,
                available: self.free.len(),
            });
        }
        let granted: Vec<u32> = self.free.drain(..count).collect();
        debug!(?granted, "allocated blocks");
        Ok(granted)
    }

    /// Zero-fill and free the given blocks. Out-of-range indices fail the
    /// whole call before anything is released; already-free indices are
    /// logged and skipped.
    pub fn release(&mut self, indices: &[u32]) -> Result<()> {
        for &index in indices {
            self.check_index(index)?;
        }
        for &index in indices {
            if self.free.contains(&index) {
                warn!(index, "release of a block that is already free");
                continue;
            }
            let start = index * self.block_size;
            for offset in 0..self.block_size {
                self.memory.erase(start + offset);
            }
            self.free.push(index);
        }
        self.free.sort_unstable();
        Ok(())
    }

    pub fn is_allocated(&self, index: u32) -> Result<bool> {
        self.check_index(index)?;
        Ok(!self.free.contains(&index))
    }

    /// Clear the whole store: every block reads as zero and every block is
    /// free again.
    pub fn format(&mut self) {
        self.memory.clear();
        self.free = (0..self.blocks).collect();
        debug!(blocks = self.blocks, block_size = self.block_size, "formatted");
    }

    pub fn stats(&self) -> DiskStats {
        DiskStats {
            blocks: self.blocks,
            block_size: self.block_size,
            capacity_bytes: self.capacity_bytes(),
            free_blocks: self.free.len() as u32,
            used_blocks: self.blocks - self.free.len() as u32,
        }
    }

    fn allocated_blocks(&self) -> Vec<u32> {
        (0..self.blocks)
            .filter(|index| !self.free.contains(index))
            .collect()
    }

    fn to_grid(&self) -> PixelGrid {
        PixelGrid::from_fn(self.block_size, self.blocks, |address| {
            self.memory.read_color(address)
        })
    }

    /// Persist the whole store as a disk image at `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let metadata = DiskImageMetadata {
            magic: DISK_IMAGE_MAGIC.to_string(),
            version: DISK_IMAGE_VERSION,
            blocks: self.blocks,
            block_size: self.block_size,
            allocated: self.allocated_blocks(),
        };
        image::save_disk_image(path, &metadata, &self.to_grid())?;
        debug!(path = %path.display(), blocks = self.blocks, "saved disk image");
        Ok(())
    }

    /// Replace this store wholesale with the image at `path`.
    ///
    /// The replacement is decoded and validated in full before any field
    /// of the live store is touched; on failure the store is unchanged.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let (metadata, grid) = image::load_disk_image(path)?;
        let restored = Self::from_image(metadata, grid)?;
        *self = restored;
        debug!(path = %path.display(), blocks = self.blocks, "loaded disk image");
        Ok(())
    }

    fn from_image(metadata: DiskImageMetadata, grid: PixelGrid) -> Result<Self> {
        Self::validate_geometry(metadata.blocks, metadata.block_size)
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        if grid.width() != metadata.block_size || grid.height() != metadata.blocks {
            return Err(CoreError::StorageUnavailable(format!(
                "pixel grid is {}x{} but metadata declares {} blocks of {} bytes",
                grid.width(),
                grid.height(),
                metadata.blocks,
                metadata.block_size
            )));
        }
        if let Some(index) = metadata
            .allocated
            .iter()
            .find(|index| **index >= metadata.blocks)
        {
            return Err(CoreError::StorageUnavailable(format!(
                "allocation table references block {index} past the end of the disk"
            )));
        }

        let mut memory = AddressSpace::new();
        for (address, color) in grid.pixels().iter().enumerate() {
            // Blank cells stay unwritten so the space remains sparse.
            if *color != BLANK {
                memory.write_color(address as u32, *color);
            }
        }
        let free = (0..metadata.blocks)
            .filter(|index| !metadata.allocated.contains(index))
            .collect();
        Ok(Self {
            blocks: metadata.blocks,
            block_size: metadata.block_size,
            memory,
            free,
        })
    }
}
