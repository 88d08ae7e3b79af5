use std::{cell::RefCell, fmt, rc::Rc};

use crate::{
    decoder::Binding,
    error::MapError,
    map_cell::{AccessWidth, MapCell},
    mapper::{AddressSpaces, Mapper},
    memory::Storage,
    ppu::{PpuPorts, PALETTE_BASE, PPUDATA},
};

pub const RAM_SIZE: usize = 0x800;
pub const PALETTE_SIZE: usize = 0x20;

const RAM_MIRRORS: u32 = 4;
const PORTS_START: u16 = 0x2000;
const PORTS_LEN: u32 = 0x2000;
const PALETTE_MIRRORS: u32 = 8;

/// CPU and PPU bus glue.
///
/// Owns both address decoders together with the console memories bound into
/// them, the PPU register file and the cartridge mapper. Writes the mapper
/// claims go to the mapper; PPUDATA accesses walk the PPU address space;
/// everything else is a plain decoder access.
pub struct Bus {
    spaces: AddressSpaces,
    ram: Storage,
    palette: Storage,
    ports: Rc<RefCell<PpuPorts>>,
    mapper: Box<dyn Mapper>,
}

impl Bus {
    /// Binds the console's own memories and ports, then lets `mapper` bind
    /// the cartridge windows.
    pub fn new<F>(ports: PpuPorts, open_bus: u8, mapper: F) -> Result<Self, MapError>
    where
        F: FnOnce(&mut AddressSpaces) -> Result<Box<dyn Mapper>, MapError>,
    {
        let mut spaces = AddressSpaces::new(open_bus);
        let ram = Storage::new(RAM_SIZE);
        let palette = Storage::new(PALETTE_SIZE);
        let ports = Rc::new(RefCell::new(ports));

        spaces
            .cpu
            .bind_mirrored(0x0000, RAM_SIZE as u32, RAM_MIRRORS, &ram)?;
        spaces
            .cpu
            .bind(MapCell::callback(PORTS_START, PORTS_LEN, ports.clone())?);
        spaces.ppu.bind_mirrored(
            PALETTE_BASE,
            PALETTE_SIZE as u32,
            PALETTE_MIRRORS,
            &palette,
        )?;

        let mapper = mapper(&mut spaces)?;
        tracing::info!("[BUS] mapper {} attached", mapper.mapper_id());

        Ok(Self {
            spaces,
            ram,
            palette,
            ports,
            mapper,
        })
    }

    pub fn reset(&mut self) {
        self.ram.fill(0);
        self.ports.borrow_mut().reset();
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        if is_ppu_data(addr) {
            return self.ppu_data_read();
        }
        self.spaces.cpu.read_byte(addr)
    }

    pub fn write_byte(&mut self, addr: u16, data: u8) {
        if self.mapper.intercepts(addr) {
            self.mapper.write(addr, data, &mut self.spaces);
        } else if is_ppu_data(addr) {
            self.ppu_data_write(data);
        } else {
            self.spaces.cpu.write_byte(addr, data);
        }
    }

    pub fn read_word(&self, address: u16) -> u16 {
        let low_byte = self.read_byte(address) as u16;
        let high_byte = self.read_byte(address.wrapping_add(1)) as u16;
        (high_byte << 8) | low_byte
    }

    pub fn write_word(&mut self, address: u16, value: u16) {
        self.write_byte(address, (value & 0x00FF) as u8);
        self.write_byte(address.wrapping_add(1), (value >> 8) as u8);
    }

    pub fn write_block(&mut self, start_addr: u16, data: &[u8]) {
        let mut addr = start_addr;
        for &byte in data {
            self.write_byte(addr, byte);
            addr = addr.wrapping_add(1);
        }
    }

    /// Width-aware load. A wide load over PPUDATA is split into byte reads
    /// so the VRAM address advances once per byte.
    pub fn load(&self, addr: u16, width: AccessWidth) -> u32 {
        if width == AccessWidth::Byte || touches(addr, width, is_ppu_data) {
            (0..width.bytes()).fold(0, |value, i| {
                value | (self.read_byte(addr.wrapping_add(i as u16)) as u32) << (8 * i)
            })
        } else {
            self.spaces.cpu.load(addr, width)
        }
    }

    /// Width-aware store. A wide store touching a mapper register or PPUDATA
    /// is split into byte writes so each byte takes the byte path.
    pub fn store(&mut self, addr: u16, width: AccessWidth, value: u32) {
        let split = touches(addr, width, |a| {
            self.mapper.intercepts(a) || is_ppu_data(a)
        });
        if width == AccessWidth::Byte || split {
            for i in 0..width.bytes() {
                self.write_byte(addr.wrapping_add(i as u16), (value >> (8 * i)) as u8);
            }
        } else {
            self.spaces.cpu.store(addr, width, value);
        }
    }

    pub fn ppu_read(&self, addr: u16) -> u8 {
        self.spaces.ppu.read_byte(ppu_address(addr))
    }

    pub fn ppu_write(&mut self, addr: u16, data: u8) {
        let addr = ppu_address(addr);
        if self.mapper.intercepts_chr(addr) {
            self.mapper.chr_write(addr, data, &mut self.spaces);
        } else {
            self.spaces.ppu.write_byte(addr, data);
        }
    }

    fn ppu_data_read(&self) -> u8 {
        let addr = self.ports.borrow_mut().data_address();
        let fresh = self.ppu_read(addr);
        self.ports.borrow_mut().buffered_read(addr, fresh)
    }

    fn ppu_data_write(&mut self, data: u8) {
        let addr = self.ports.borrow_mut().data_address();
        self.ppu_write(addr, data);
    }

    pub fn signal_scanline(&mut self) {
        self.mapper.signal_scanline();
    }

    pub fn mapper(&self) -> &dyn Mapper {
        self.mapper.as_ref()
    }

    pub fn spaces(&self) -> &AddressSpaces {
        &self.spaces
    }

    pub fn ram(&self) -> &Storage {
        &self.ram
    }

    pub fn palette(&self) -> &Storage {
        &self.palette
    }

    pub fn ports(&self) -> &Rc<RefCell<PpuPorts>> {
        &self.ports
    }

    /// CPU address space as seen without side effects: the PPU port window
    /// reads as open bus.
    pub fn memory(&self) -> Vec<u8> {
        (0..=u16::MAX)
            .map(|addr| {
                if is_ppu_port(addr) {
                    self.spaces.cpu.open_bus()
                } else {
                    self.spaces.cpu.read_byte(addr)
                }
            })
            .collect()
    }

    pub fn cpu_bindings(&self) -> Vec<Binding> {
        self.spaces.cpu.bindings()
    }

    pub fn ppu_bindings(&self) -> Vec<Binding> {
        self.spaces.ppu.bindings()
    }

    pub fn print_memory_map(&self) {
        for (name, bindings) in [("cpu", self.cpu_bindings()), ("ppu", self.ppu_bindings())] {
            for binding in bindings {
                println!("{}: {}", name, binding);
            }
        }
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("mapper", &self.mapper)
            .field("cpu_cells", &self.spaces.cpu.bindings().len())
            .field("ppu_cells", &self.spaces.ppu.bindings().len())
            .finish()
    }
}

fn is_ppu_port(addr: u16) -> bool {
    addr >= PORTS_START && (addr as u32) < PORTS_START as u32 + PORTS_LEN
}

fn touches(addr: u16, width: AccessWidth, claims: impl Fn(u16) -> bool) -> bool {
    (0..width.bytes()).any(|i| claims(addr.wrapping_add(i as u16)))
}

fn is_ppu_data(addr: u16) -> bool {
    is_ppu_port(addr) && addr & 7 == PPUDATA
}

/// Folds PPU mirrors: `$3000-$3EFF` onto the nametables and the palette
/// backdrop entries `$3F10/$3F14/$3F18/$3F1C` onto `$3F00/$3F04/$3F08/$3F0C`.
fn ppu_address(addr: u16) -> u16 {
    let addr = addr & 0x3FFF;
    match addr {
        0x3000..=0x3EFF => addr - 0x1000,
        0x3F00..=0x3FFF if addr & 0x13 == 0x10 => addr & !0x10,
        _ => addr,
    }
}
