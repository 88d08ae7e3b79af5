pub mod bus;
pub mod cartridge;
pub mod clock;
pub mod config;
pub mod decoder;
pub mod error;
pub mod interrupt;
pub mod machine;
pub mod map_cell;
pub mod mapper;
pub mod mapper52;
pub mod memory;
pub mod ppu;
pub mod triple_buffer;
pub mod utils;

pub use config::MachineConfig;
pub use machine::{Machine, MachineBuilder};
pub use ppu::FrameData;
pub use utils::{hexdump, init_tracing, partial_hexdump};

/// A machine for a cartridge given as raw PRG and CHR payloads, with the
/// default configuration.
pub fn get_machine(prg: &[u8], chr: &[u8]) -> anyhow::Result<Machine> {
    MachineBuilder::new().prg(prg).chr(chr).build()
}
