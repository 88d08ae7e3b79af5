use std::{cell::RefCell, fmt::Debug, rc::Rc};

use crate::{error::MapError, memory::Storage};

/// Size of the 16-bit address spaces the decoders cover.
pub const ADDRESS_SPACE_SIZE: u32 = 0x10000;

/// Width of a single bus access. Wider values are composed little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessWidth {
    Byte,
    Word,
    Long,
}

impl AccessWidth {
    pub fn bytes(self) -> u32 {
        match self {
            AccessWidth::Byte => 1,
            AccessWidth::Word => 2,
            AccessWidth::Long => 4,
        }
    }
}

/// A device that services accesses to a cell instead of plain storage.
///
/// Offsets are relative to the start of the cell the handler is bound to.
/// Handlers may have side effects on read (status registers clearing flags,
/// data ports advancing an address latch).
pub trait AccessHandler: Debug {
    fn load(&mut self, offset: u16, width: AccessWidth) -> u32;
    fn store(&mut self, offset: u16, width: AccessWidth, value: u32);
}

pub type SharedHandler = Rc<RefCell<dyn AccessHandler>>;

/// What backs a cell.
#[derive(Debug, Clone)]
pub enum CellKind {
    Storage {
        storage: Storage,
        offset: usize,
        writable: bool,
    },
    Callback(SharedHandler),
}

/// One bound region of an address space.
#[derive(Debug, Clone)]
pub struct MapCell {
    start: u16,
    len: u32,
    kind: CellKind,
}

impl MapCell {
    /// Binds `len` bytes at `start` over `storage[offset..offset + len]`.
    pub fn storage(
        start: u16,
        len: u32,
        storage: Storage,
        offset: usize,
        writable: bool,
    ) -> Result<Self, MapError> {
        Self::check_range(start, len)?;
        let needed = offset + len as usize;
        if needed > storage.len() {
            return Err(MapError::StorageTooSmall {
                needed,
                available: storage.len(),
            });
        }

        Ok(Self {
            start,
            len,
            kind: CellKind::Storage {
                storage,
                offset,
                writable,
            },
        })
    }

    pub fn ram(start: u16, len: u32, storage: Storage) -> Result<Self, MapError> {
        Self::storage(start, len, storage, 0, true)
    }

    pub fn rom(start: u16, len: u32, storage: Storage, offset: usize) -> Result<Self, MapError> {
        Self::storage(start, len, storage, offset, false)
    }

    pub fn callback(start: u16, len: u32, handler: SharedHandler) -> Result<Self, MapError> {
        Self::check_range(start, len)?;
        Ok(Self {
            start,
            len,
            kind: CellKind::Callback(handler),
        })
    }

    fn check_range(start: u16, len: u32) -> Result<(), MapError> {
        if len == 0 {
            return Err(MapError::EmptyRange { start });
        }
        if start as u32 + len > ADDRESS_SPACE_SIZE {
            return Err(MapError::RangeOverflow { start, len });
        }
        Ok(())
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    /// One past the last address of the cell.
    pub fn end(&self) -> u32 {
        self.start as u32 + self.len
    }

    pub fn kind(&self) -> &CellKind {
        &self.kind
    }

    pub fn contains(&self, address: u16) -> bool {
        self.is_valid_for(address, AccessWidth::Byte)
    }

    /// The whole access `[address, address + width)` lies inside the cell.
    pub fn is_valid_for(&self, address: u16, width: AccessWidth) -> bool {
        self.start <= address && address as u32 + width.bytes() <= self.end()
    }

    pub fn overlaps(&self, other: &MapCell) -> bool {
        (self.start as u32) < other.end() && (other.start as u32) < self.end()
    }

    /// Performs a load the caller already validated with `is_valid_for`.
    pub fn load(&self, address: u16, width: AccessWidth) -> u32 {
        let relative = address - self.start;
        match &self.kind {
            CellKind::Storage {
                storage, offset, ..
            } => {
                let base = offset + relative as usize;
                (0..width.bytes()).fold(0, |value, i| {
                    value | (storage.read_byte(base + i as usize) as u32) << (8 * i)
                })
            }
            CellKind::Callback(handler) => handler.borrow_mut().load(relative, width),
        }
    }

    /// Performs a store the caller already validated with `is_valid_for`.
    pub fn store(&self, address: u16, width: AccessWidth, value: u32) {
        let relative = address - self.start;
        match &self.kind {
            CellKind::Storage {
                storage,
                offset,
                writable,
            } => {
                if !writable {
                    tracing::trace!(
                        "[CELL] Ignored write to read-only cell at {:#06X} = {:#X}",
                        address,
                        value
                    );
                    return;
                }
                let base = offset + relative as usize;
                for i in 0..width.bytes() {
                    storage.write_byte(base + i as usize, (value >> (8 * i)) as u8);
                }
            }
            CellKind::Callback(handler) => handler.borrow_mut().store(relative, width, value),
        }
    }
}
