use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One memory cell: a color triple. Channel 0 carries the byte value;
/// channels 1-2 are reserved for extension and are always zero when a cell
/// is written through the byte interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color(pub u8, pub u8, pub u8);

/// The color an unwritten cell reads back as.
pub const BLANK: Color = Color(0, 0, 0);

impl Color {
    pub fn from_byte(byte: u8) -> Self {
        Color(byte, 0, 0)
    }

    /// Decode reads channel 0 only. Any color sharing the first channel
    /// decodes to the same byte regardless of the reserved channels.
    pub fn byte(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0, self.1, self.2)
    }
}

/// Sparse byte-addressable store keyed by flat linear address.
///
/// There is no upper address bound at this layer; block-level bounds are
/// enforced by [`crate::disk::BlockStore`]. Reads never fail: an absent
/// address yields [`BLANK`], which decodes to zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSpace {
    cells: HashMap<u32, Color>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub written_cells: usize,
    pub highest_address: Option<u32>,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `byte` at `address`, silently overwriting. Reserved channels
    /// are zero-filled.
    pub fn write(&mut self, address: u32, byte: u8) {
        self.cells.insert(address, Color::from_byte(byte));
    }

    /// Store a raw color cell. This is the instruction-loading path: opcode
    /// colors use the reserved channels and are not reachable through
    /// [`AddressSpace::write`].
    pub fn write_color(&mut self, address: u32, color: Color) {
        self.cells.insert(address, color);
    }

    pub fn read(&self, address: u32) -> u8 {
        self.read_color(address).byte()
    }

    /// The stored color at `address`, or [`BLANK`] if never written. The
    /// instruction unit dispatches on this value, not on the decoded byte.
    pub fn read_color(&self, address: u32) -> Color {
        self.cells.get(&address).copied().unwrap_or(BLANK)
    }

    /// Drop the cell at `address`, returning it to the zero-fill state.
    pub fn erase(&mut self, address: u32) {
        self.cells.remove(&address);
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Full copy of the mapping, suitable for checkpointing.
    pub fn dump(&self) -> HashMap<u32, Color> {
        self.cells.clone()
    }

    /// Replace the mapping wholesale with a previously dumped snapshot.
    pub fn load(&mut self, snapshot: HashMap<u32, Color>) {
        self.cells = snapshot;
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            written_cells: self.cells.len(),
            highest_address: self.cells.keys().max().copied(),
        }
    }
}
