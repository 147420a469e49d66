//! Pixel-native computing core.
//!
//! The state of this machine is colored pixels: an addressable memory that
//! encodes bytes as colors, an instruction unit that dispatches on exact
//! color matches, and a block-structured disk that persists its contents to
//! a real image file. Rendering, shells, and other host surfaces live
//! outside this crate.

use thiserror::Error;

pub mod cpu;
pub mod disk;
pub mod image;
pub mod memory;

pub use cpu::{Event, InstructionUnit, Opcode, RegisterFile, StopReason, NUM_REGISTERS};
pub use disk::{BlockStore, DiskStats, DEFAULT_BLOCKS, DEFAULT_BLOCK_SIZE};
pub use image::{
    decode_ppm, encode_ppm, load_disk_image, save_disk_image, DiskImageMetadata, PixelGrid,
    DISK_IMAGE_MAGIC, DISK_IMAGE_VERSION,
};
pub use memory::{AddressSpace, Color, MemoryStats, BLANK};

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("serialize error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("block {index} out of range (disk has {blocks} blocks)")]
    BlockOutOfRange { index: u32, blocks: u32 },
    #[error("block payload must be exactly {expected} bytes, got {actual}")]
    InvalidBlockSize { expected: usize, actual: usize },
    #[error("register index {0} out of range")]
    RegisterOutOfRange(usize),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("invalid disk geometry: {0}")]
    InvalidGeometry(String),
    #[error("disk full: requested {requested} blocks, {available} free")]
    DiskFull { requested: usize, available: usize },
}
