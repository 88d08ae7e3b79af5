/*!
Mapper 52: an MMC3-style board with an outer bank register, used by
multicarts.

Registers:
- `$8000` even: bank select (bits 0-2 register index, bit 6 PRG mode, bit 7
  CHR inversion). `$8001` odd: bank data for the selected register.
- `$A000` even: mirroring (bit 0 set = horizontal). `$A001` odd: PRG RAM
  enable (bit 7) and write protect (bit 6).
- `$C000` even: IRQ period. `$C001` odd: reload the counter from the period.
- `$E000` even: IRQ disable. `$E001` odd: IRQ enable.
- `$6000-$7FFF`: outer bank register until a write with bit 7 set locks it;
  afterwards the range is plain PRG RAM.

Every register write ends in `apply`, which recomputes the complete bank
layout and rebinds the PRG, CHR and nametable windows. The `$E000` PRG
window is bound to the last bank of the image at construction and never
moves.
*/

use crate::{
    cartridge::{CartridgeImage, CHR_BANK_SIZE, PRG_BANK_SIZE},
    decoder::CellId,
    error::MapError,
    interrupt::InterruptLine,
    map_cell::MapCell,
    mapper::{AddressSpaces, Mapper, Mirroring},
    memory::Storage,
};

pub const MAPPER_ID: u16 = 52;

const PRG_WINDOW_BASE: u16 = 0x8000;
const PRG_RAM_BASE: u16 = 0x6000;
const PRG_RAM_WINDOW: usize = 0x2000;
const NAMETABLE_BASE: u16 = 0x2000;
const NAMETABLE_SIZE: usize = 0x400;
const REGISTER_COUNT: usize = 8;

/// Physical banks currently backing each window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankLayout {
    /// 8 KiB PRG banks for `$8000`, `$A000`, `$C000`, `$E000`.
    pub prg: [usize; 4],
    /// 1 KiB CHR banks for `$0000`..`$1C00`.
    pub chr: [usize; 8],
    pub mirroring: Mirroring,
}

#[derive(Debug)]
pub struct Mapper52 {
    image: CartridgeImage,
    prg_ram: Storage,
    irq: InterruptLine,

    // Outer bank register and its lock
    cartridge_switch: u8,
    switch_locked: bool,

    // Bank select ($8000) and R0..R7
    bank_select: u8,
    regs: [u8; REGISTER_COUNT],
    horizontal_mirroring: bool,
    prg_ram_enabled: bool,
    prg_ram_write_protect: bool,

    irq_period: u8,
    irq_counter: u8,
    irq_enabled: bool,

    prg_cells: [CellId; 4],
    chr_cells: [CellId; 8],
    nametable_cells: [CellId; 4],
    prg_ram_cell: Option<CellId>,
    layout: BankLayout,
}

impl Mapper52 {
    /// Builds the mapper in its power-on state and binds its windows into
    /// `spaces`.
    pub fn new(
        image: CartridgeImage,
        irq: InterruptLine,
        spaces: &mut AddressSpaces,
        prg_ram_size: usize,
    ) -> Result<Self, MapError> {
        let last_bank = image.prg_banks() - 1;

        let prg_cells: [CellId; 4] = std::array::from_fn(|_| spaces.cpu.reserve());
        let chr_cells: [CellId; 8] = std::array::from_fn(|_| spaces.ppu.reserve());
        let nametable_cells: [CellId; 4] = std::array::from_fn(|_| spaces.ppu.reserve());
        spaces
            .cpu
            .rebind(prg_cells[3], prg_window(&image, 3, last_bank)?);

        let prg_ram = Storage::new(prg_ram_size);
        let prg_ram_cell = if prg_ram.is_empty() {
            None
        } else {
            Some(spaces.cpu.reserve())
        };

        let mut mapper = Self {
            image,
            prg_ram,
            irq,
            cartridge_switch: 0,
            switch_locked: false,
            bank_select: 0,
            regs: [0; REGISTER_COUNT],
            horizontal_mirroring: true,
            prg_ram_enabled: true,
            prg_ram_write_protect: false,
            irq_period: 0,
            irq_counter: 0,
            irq_enabled: false,
            prg_cells,
            chr_cells,
            nametable_cells,
            prg_ram_cell,
            layout: BankLayout {
                prg: [0, 0, 0, last_bank],
                chr: [0; 8],
                mirroring: Mirroring::Horizontal,
            },
        };
        mapper.try_apply(spaces)?;

        Ok(mapper)
    }

    /// Sets bank register `index`. Indices past R7 are ignored.
    pub fn set_register(&mut self, index: usize, value: u8) -> bool {
        match self.regs.get_mut(index) {
            Some(reg) => {
                *reg = value;
                true
            }
            None => {
                tracing::debug!("[MAPPER52] Ignored write to register {} = {:02X}", index, value);
                false
            }
        }
    }

    pub fn registers(&self) -> [u8; REGISTER_COUNT] {
        self.regs
    }

    pub fn bank_select(&self) -> u8 {
        self.bank_select
    }

    pub fn cartridge_switch(&self) -> u8 {
        self.cartridge_switch
    }

    pub fn is_switch_locked(&self) -> bool {
        self.switch_locked
    }

    pub fn horizontal_mirroring(&self) -> bool {
        self.horizontal_mirroring
    }

    pub fn irq_period(&self) -> u8 {
        self.irq_period
    }

    pub fn irq_counter(&self) -> u8 {
        self.irq_counter
    }

    pub fn irq_enabled(&self) -> bool {
        self.irq_enabled
    }

    pub fn layout(&self) -> BankLayout {
        self.layout
    }

    pub fn prg_ram(&self) -> &Storage {
        &self.prg_ram
    }

    fn prg_bank(&self, value: u8) -> usize {
        let o = self.cartridge_switch;
        let mask = 0x1F ^ ((o & 0x08) << 1);
        let outer = (((o & 0x06) | ((o >> 3) & o & 0x01)) as usize) << 4;
        (outer | (value & mask) as usize) % self.image.prg_banks()
    }

    fn chr_bank(&self, value: u8) -> usize {
        let o = self.cartridge_switch;
        let mask = 0xFF ^ ((o & 0x40) << 1);
        let outer = ((((o >> 4) & 0x02) | (o & 0x04) | ((o >> 6) & (o >> 4) & 0x01)) as usize) << 7;
        (outer | (value & mask) as usize) % self.image.chr_banks()
    }

    /// Bank layout implied by the current register values.
    fn compute_layout(&self) -> BankLayout {
        let last = self.image.prg_banks() - 1;
        let second_last = self.prg_bank(0xFE);
        let r6 = self.prg_bank(self.regs[6]);
        let r7 = self.prg_bank(self.regs[7]);

        let prg = if self.bank_select & 0x40 == 0 {
            [r6, r7, second_last, last]
        } else {
            [second_last, r7, r6, last]
        };

        let (r0, r1) = (self.regs[0] & 0xFE, self.regs[1] & 0xFE);
        let pairs = [
            self.chr_bank(r0),
            self.chr_bank(r0 | 1),
            self.chr_bank(r1),
            self.chr_bank(r1 | 1),
        ];
        let singles = [
            self.chr_bank(self.regs[2]),
            self.chr_bank(self.regs[3]),
            self.chr_bank(self.regs[4]),
            self.chr_bank(self.regs[5]),
        ];
        let (low, high) = if self.bank_select & 0x80 == 0 {
            (pairs, singles)
        } else {
            (singles, pairs)
        };
        let mut chr = [0; 8];
        chr[..4].copy_from_slice(&low);
        chr[4..].copy_from_slice(&high);

        let mirroring = if self.horizontal_mirroring {
            Mirroring::Horizontal
        } else {
            Mirroring::Vertical
        };

        BankLayout {
            prg,
            chr,
            mirroring,
        }
    }

    /// Recomputes every window from the registers and rebinds the cells.
    /// Calling it again with unchanged registers leaves the bindings as
    /// they are.
    pub fn apply(&mut self, spaces: &mut AddressSpaces) {
        if let Err(e) = self.try_apply(spaces) {
            tracing::error!("[MAPPER52] Unable to rebind windows: {}", e);
        }
    }

    fn try_apply(&mut self, spaces: &mut AddressSpaces) -> Result<(), MapError> {
        let layout = self.compute_layout();

        // The last PRG window stays on the bank bound at power-on.
        for window in 0..3 {
            let cell = prg_window(&self.image, window, layout.prg[window])?;
            spaces.cpu.rebind(self.prg_cells[window], cell);
        }
        for (window, bank) in layout.chr.iter().enumerate() {
            let cell = chr_window(&self.image, window, *bank)?;
            spaces.ppu.rebind(self.chr_cells[window], cell);
        }
        for (window, page) in layout.mirroring.nametable_pages().iter().enumerate() {
            let cell = nametable_window(&spaces.vram, window, *page)?;
            spaces.ppu.rebind(self.nametable_cells[window], cell);
        }

        if let Some(id) = self.prg_ram_cell {
            if self.prg_ram_enabled {
                let len = self.prg_ram.len().min(PRG_RAM_WINDOW) as u32;
                let cell = MapCell::storage(
                    PRG_RAM_BASE,
                    len,
                    self.prg_ram.clone(),
                    0,
                    !self.prg_ram_write_protect,
                )?;
                spaces.cpu.rebind(id, cell);
            } else {
                spaces.cpu.unbind(id);
            }
        }

        if layout != self.layout {
            tracing::debug!(
                "[MAPPER52] PRG {:?} CHR {:?} {:?}",
                layout.prg,
                layout.chr,
                layout.mirroring
            );
        }
        self.layout = layout;
        Ok(())
    }

    fn write_outer(&mut self, value: u8, spaces: &mut AddressSpaces) {
        self.cartridge_switch = value;
        self.switch_locked = value & 0x80 != 0;
        tracing::debug!(
            "[MAPPER52] Outer bank {:02X}{}",
            value,
            if self.switch_locked { " (locked)" } else { "" }
        );
        self.apply(spaces);
    }
}

impl Mapper for Mapper52 {
    fn mapper_id(&self) -> u16 {
        MAPPER_ID
    }

    fn intercepts(&self, addr: u16) -> bool {
        match addr {
            0x6000..=0x7FFF => !self.switch_locked,
            0x8000..=0xFFFF => true,
            _ => false,
        }
    }

    fn write(&mut self, addr: u16, value: u8, spaces: &mut AddressSpaces) -> u8 {
        match addr {
            0x6000..=0x7FFF => {
                if self.switch_locked {
                    spaces.cpu.write_byte(addr, value);
                } else {
                    self.write_outer(value, spaces);
                }
            }
            0x8000..=0xFFFF => {
                match addr & 0xE001 {
                    0x8000 => self.bank_select = value,
                    0x8001 => {
                        self.set_register((self.bank_select & 0x07) as usize, value);
                    }
                    0xA000 => self.horizontal_mirroring = value & 0x01 != 0,
                    0xA001 => {
                        self.prg_ram_enabled = value & 0x80 != 0;
                        self.prg_ram_write_protect = value & 0x40 != 0;
                    }
                    0xC000 => self.irq_period = value,
                    0xC001 => self.irq_counter = self.irq_period,
                    0xE000 => self.irq_enabled = false,
                    _ => self.irq_enabled = true,
                }
                self.apply(spaces);
            }
            _ => tracing::trace!("[MAPPER52] Ignored write {:04X} = {:02X}", addr, value),
        }
        value
    }

    fn intercepts_chr(&self, addr: u16) -> bool {
        addr < 0x2000 && !self.image.chr_is_ram
    }

    /// On CHR ROM boards a pattern-table write selects a bank for the CHR
    /// register currently chosen by `$8000`.
    fn chr_write(&mut self, addr: u16, value: u8, spaces: &mut AddressSpaces) -> u8 {
        let index = (self.bank_select & 0x07) as usize;
        if index < 6 {
            self.set_register(index, value);
            self.apply(spaces);
        } else {
            tracing::debug!(
                "[MAPPER52] Ignored CHR write {:04X} = {:02X} with R{} selected",
                addr,
                value,
                index
            );
        }
        value
    }

    /// Counts down while enabled. An empty counter is loaded from the period
    /// without firing; reaching zero raises the IRQ and reloads.
    fn signal_scanline(&mut self) {
        if !self.irq_enabled {
            return;
        }
        if self.irq_counter == 0 {
            self.irq_counter = self.irq_period;
            return;
        }

        self.irq_counter -= 1;
        if self.irq_counter == 0 {
            tracing::trace!("[MAPPER52] IRQ");
            self.irq.raise();
            self.irq_counter = self.irq_period;
        }
    }

    fn mirroring(&self) -> Mirroring {
        self.layout.mirroring
    }
}

fn prg_window(image: &CartridgeImage, window: usize, bank: usize) -> Result<MapCell, MapError> {
    MapCell::rom(
        PRG_WINDOW_BASE + (window * PRG_BANK_SIZE) as u16,
        PRG_BANK_SIZE as u32,
        image.prg.clone(),
        bank * PRG_BANK_SIZE,
    )
}

fn chr_window(image: &CartridgeImage, window: usize, bank: usize) -> Result<MapCell, MapError> {
    MapCell::storage(
        (window * CHR_BANK_SIZE) as u16,
        CHR_BANK_SIZE as u32,
        image.chr.clone(),
        bank * CHR_BANK_SIZE,
        image.chr_is_ram,
    )
}

fn nametable_window(vram: &Storage, window: usize, page: usize) -> Result<MapCell, MapError> {
    MapCell::storage(
        NAMETABLE_BASE + (window * NAMETABLE_SIZE) as u16,
        NAMETABLE_SIZE as u32,
        vram.clone(),
        page * NAMETABLE_SIZE,
        true,
    )
}
