use std::fmt;

use crate::{
    error::MapError,
    map_cell::{AccessWidth, CellKind, MapCell},
    memory::Storage,
};

/// Handle to a binding slot inside an [`AddressDecoder`]. Whoever holds the
/// handle holds the right to rebind that window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(usize);

/// Outcome of decoding one access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Cell(CellId),
    Unmapped,
}

/// Comparable description of one live binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub id: CellId,
    pub start: u16,
    pub len: u32,
    pub target: BindingTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingTarget {
    Storage {
        storage_id: usize,
        offset: usize,
        writable: bool,
    },
    Callback,
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:04X} - 0x{:04X}: ",
            self.start,
            self.start as u32 + self.len - 1
        )?;
        match &self.target {
            BindingTarget::Storage {
                storage_id,
                offset,
                writable,
            } => write!(
                f,
                "{} {:#x} + 0x{:05X}",
                if *writable { "rw" } else { "ro" },
                storage_id,
                offset
            ),
            BindingTarget::Callback => write!(f, "callback"),
        }
    }
}

/// Composes map cells into one address space.
///
/// At most one cell may claim any address. That is the caller's obligation
/// and is not checked on bind; `find_overlap` exists for tests.
#[derive(Debug, Clone)]
pub struct AddressDecoder {
    name: &'static str,
    slots: Vec<Option<MapCell>>,
    open_bus: u8,
}

impl AddressDecoder {
    pub fn new(name: &'static str) -> Self {
        Self::with_open_bus(name, 0xFF)
    }

    pub fn with_open_bus(name: &'static str, open_bus: u8) -> Self {
        Self {
            name,
            slots: Vec::new(),
            open_bus,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn open_bus(&self) -> u8 {
        self.open_bus
    }

    pub fn bind(&mut self, cell: MapCell) -> CellId {
        tracing::trace!(
            "[DECODER] [{}] bind {:#06X}..{:#06X}",
            self.name,
            cell.start(),
            cell.end()
        );
        self.slots.push(Some(cell));
        CellId(self.slots.len() - 1)
    }

    /// Allocates an empty slot to be filled later with `rebind`.
    pub fn reserve(&mut self) -> CellId {
        self.slots.push(None);
        CellId(self.slots.len() - 1)
    }

    /// Replaces whatever is bound under `id`.
    pub fn rebind(&mut self, id: CellId, cell: MapCell) {
        match self.slots.get_mut(id.0) {
            Some(slot) => *slot = Some(cell),
            None => tracing::warn!("[DECODER] [{}] rebind of unknown cell {:?}", self.name, id),
        }
    }

    /// Leaves the slot in place but empty; its range becomes unmapped.
    pub fn unbind(&mut self, id: CellId) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            *slot = None;
        }
    }

    pub fn cell(&self, id: CellId) -> Option<&MapCell> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn cells(&self) -> impl Iterator<Item = (CellId, &MapCell)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|cell| (CellId(i), cell)))
    }

    pub fn resolve(&self, address: u16, width: AccessWidth) -> Resolved {
        self.cells()
            .find(|(_, cell)| cell.is_valid_for(address, width))
            .map_or(Resolved::Unmapped, |(id, _)| Resolved::Cell(id))
    }

    pub fn load(&self, address: u16, width: AccessWidth) -> u32 {
        match self.cells().find(|(_, cell)| cell.is_valid_for(address, width)) {
            Some((_, cell)) => cell.load(address, width),
            None => {
                tracing::trace!("[DECODER] [{}] unmapped read {:#06X}", self.name, address);
                (0..width.bytes()).fold(0, |value, i| value | (self.open_bus as u32) << (8 * i))
            }
        }
    }

    pub fn store(&self, address: u16, width: AccessWidth, value: u32) {
        match self.cells().find(|(_, cell)| cell.is_valid_for(address, width)) {
            Some((_, cell)) => cell.store(address, width, value),
            None => tracing::trace!(
                "[DECODER] [{}] unmapped write {:#06X} = {:#X}",
                self.name,
                address,
                value
            ),
        }
    }

    pub fn read_byte(&self, address: u16) -> u8 {
        self.load(address, AccessWidth::Byte) as u8
    }

    pub fn write_byte(&self, address: u16, value: u8) {
        self.store(address, AccessWidth::Byte, value as u32)
    }

    pub fn read_word(&self, address: u16) -> u16 {
        self.load(address, AccessWidth::Word) as u16
    }

    pub fn write_word(&self, address: u16, value: u16) {
        self.store(address, AccessWidth::Word, value as u32)
    }

    /// First pair of live cells claiming a common address, if any.
    pub fn find_overlap(&self) -> Option<(CellId, CellId)> {
        let cells: Vec<_> = self.cells().collect();
        for (i, (a_id, a)) in cells.iter().enumerate() {
            for (b_id, b) in &cells[i + 1..] {
                if a.overlaps(b) {
                    return Some((*a_id, *b_id));
                }
            }
        }
        None
    }

    pub fn bindings(&self) -> Vec<Binding> {
        self.cells()
            .map(|(id, cell)| Binding {
                id,
                start: cell.start(),
                len: cell.len(),
                target: match cell.kind() {
                    CellKind::Storage {
                        storage,
                        offset,
                        writable,
                    } => BindingTarget::Storage {
                        storage_id: storage.id(),
                        offset: *offset,
                        writable: *writable,
                    },
                    CellKind::Callback(_) => BindingTarget::Callback,
                },
            })
            .collect()
    }

    /// Binds `count` consecutive copies of the same `len` bytes of `storage`,
    /// starting at `start`. Used for the console's mirrored RAM regions.
    pub fn bind_mirrored(
        &mut self,
        start: u16,
        len: u32,
        count: u32,
        storage: &Storage,
    ) -> Result<Vec<CellId>, MapError> {
        (0..count)
            .map(|i| -> Result<CellId, MapError> {
                let cell_start = start as u32 + i * len;
                let cell_start = u16::try_from(cell_start).map_err(|_| MapError::RangeOverflow {
                    start,
                    len: len * count,
                })?;
                let cell = MapCell::ram(cell_start, len, storage.clone())?;
                Ok(self.bind(cell))
            })
            .collect()
    }
}
