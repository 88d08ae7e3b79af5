/*!
Cartridge mapper interface.

A mapper owns the bank-select state of a cartridge board and turns it into
decoder bindings: which physical PRG/CHR bank backs each CPU/PPU window, and
which half of console VRAM each nametable window shows. The bus hands every
write the mapper claims to `write`/`chr_write`; the mapper updates its
registers and rebinds the affected cells in `AddressSpaces`.

Mappers are single-threaded. The video unit's scanline notifications reach
`signal_scanline` through the bus thread.
*/

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::{decoder::AddressDecoder, memory::Storage};

/// Size of the console's own nametable RAM.
pub const VRAM_SIZE: usize = 0x800;

/// Nametable mirroring as selected by the board.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mirroring {
    Vertical,
    Horizontal,
}

impl Mirroring {
    /// Which 1 KiB half of VRAM backs each of the four nametable windows.
    pub fn nametable_pages(self) -> [usize; 4] {
        match self {
            Mirroring::Horizontal => [0, 0, 1, 1],
            Mirroring::Vertical => [0, 1, 0, 1],
        }
    }
}

/// The address spaces a mapper is allowed to rebind.
#[derive(Debug)]
pub struct AddressSpaces {
    pub cpu: AddressDecoder,
    pub ppu: AddressDecoder,
    /// Console nametable RAM, bound into PPU space by the mapper.
    pub vram: Storage,
}

impl AddressSpaces {
    pub fn new(open_bus: u8) -> Self {
        Self {
            cpu: AddressDecoder::with_open_bus("cpu", open_bus),
            ppu: AddressDecoder::with_open_bus("ppu", open_bus),
            vram: Storage::new(VRAM_SIZE),
        }
    }
}

pub trait Mapper: Debug {
    /// iNES mapper number.
    fn mapper_id(&self) -> u16;

    /// Whether a CPU write to `addr` is a mapper register write rather than
    /// a plain store.
    fn intercepts(&self, addr: u16) -> bool;

    /// Handles a CPU write the mapper claimed. Returns the value written.
    fn write(&mut self, addr: u16, value: u8, spaces: &mut AddressSpaces) -> u8;

    /// Whether a PPU write to `addr` is interpreted by the mapper.
    fn intercepts_chr(&self, _addr: u16) -> bool {
        false
    }

    /// Handles a PPU write the mapper claimed. Returns the value written.
    fn chr_write(&mut self, _addr: u16, value: u8, _spaces: &mut AddressSpaces) -> u8 {
        value
    }

    /// Called once per rendered scanline.
    fn signal_scanline(&mut self) {}

    fn mirroring(&self) -> Mirroring;
}
