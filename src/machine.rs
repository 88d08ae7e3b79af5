use std::time::Duration;

use anyhow::Context;

use crate::{
    bus::Bus,
    cartridge::CartridgeImage,
    config::MachineConfig,
    error::{MapError, VideoError},
    interrupt::InterruptLine,
    mapper::Mapper,
    mapper52::Mapper52,
    partial_hexdump,
    ppu::{FrameData, VideoUnit},
};

/// The emulated console: bus, cartridge, video unit and interrupt lines.
///
/// The bus side (decoders, mapper) lives on the thread that owns the
/// `Machine`; the video unit runs on its own thread once started.
#[derive(Debug)]
pub struct Machine {
    pub bus: Bus,
    pub video: VideoUnit,
    pub irq: InterruptLine,
    pub nmi: InterruptLine,
    pub cycles: u64,
    config: MachineConfig,
}

impl Machine {
    pub fn new(image: CartridgeImage, config: MachineConfig) -> Result<Self, MapError> {
        tracing::info!(
            "[MACHINE] Initializing with {} PRG / {} CHR banks",
            image.prg_banks(),
            image.chr_banks()
        );

        let irq = InterruptLine::new();
        let nmi = InterruptLine::new();
        let video = VideoUnit::new(nmi.clone(), config.idle_park());

        let mapper_irq = irq.clone();
        let prg_ram_size = config.prg_ram_size;
        let bus = Bus::new(video.ports(), config.open_bus, move |spaces| {
            let mapper = Mapper52::new(image, mapper_irq, spaces, prg_ram_size)?;
            Ok(Box::new(mapper) as Box<dyn Mapper>)
        })?;

        Ok(Self {
            bus,
            video,
            irq,
            nmi,
            cycles: 0,
            config,
        })
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn get_cycles(&self) -> u64 {
        self.cycles
    }

    pub fn start(&mut self) -> Result<(), VideoError> {
        self.video.start()
    }

    pub fn stop(&mut self) -> Result<(), VideoError> {
        self.video.stop()
    }

    pub fn is_running(&self) -> bool {
        self.video.is_running()
    }

    /// Clears console RAM and port state and restarts the video unit from
    /// the top of a frame. Cartridge state is kept.
    pub fn reset(&mut self) -> Result<(), VideoError> {
        tracing::info!("[MACHINE] Reset at cycle {}", self.cycles);
        self.bus.reset();
        self.cycles = 0;
        self.video.reset()
    }

    /// Grants the video unit `cycles` CPU cycles of time and forwards any
    /// scanline notifications it has produced so far to the cartridge.
    ///
    /// The granted dots run on the video thread after this returns, so their
    /// scanline IRQs reach the mapper on the next `step_for` or
    /// [`Machine::sync_video`]. Call `sync_video` after each step when IRQs
    /// must land within the step that caused them.
    pub fn step_for(&mut self, cycles: u64) {
        self.video.clock(cycles);
        self.cycles += cycles;
        self.service_scanlines();
    }

    /// Delivers pending scanline notifications to the mapper. Returns how
    /// many were delivered.
    pub fn service_scanlines(&mut self) -> u32 {
        let pending = self.video.take_scanlines();
        for _ in 0..pending {
            self.bus.signal_scanline();
        }
        if pending > 0 {
            tracing::trace!("[MACHINE] delivered {} scanline signals", pending);
        }
        pending
    }

    /// Waits for the video unit to run every granted dot, then services the
    /// resulting scanlines.
    pub fn sync_video(&mut self, timeout: Duration) -> bool {
        let caught_up = self.video.wait_caught_up(timeout);
        self.service_scanlines();
        caught_up
    }

    /// See [`VideoUnit::fetch`].
    pub fn fetch_frame(&mut self) -> bool {
        self.video.fetch()
    }

    pub fn frame(&self) -> &FrameData {
        self.video.frame()
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        self.bus.read_byte(addr)
    }

    pub fn write_byte(&mut self, addr: u16, value: u8) {
        self.bus.write_byte(addr, value)
    }

    pub fn memory(&self) -> Vec<u8> {
        self.bus.memory()
    }

    pub fn memory_dump(&self, start: u16, end: u16) -> String {
        partial_hexdump(&self.memory(), start, end)
    }

    pub fn vram_dump(&self) -> String {
        let vram = self.bus.spaces().vram.to_vec(0..crate::mapper::VRAM_SIZE);
        partial_hexdump(&vram, 0, (crate::mapper::VRAM_SIZE - 1) as u16)
    }
}

#[derive(Default)]
pub struct MachineBuilder {
    prg: Vec<u8>,
    chr: Vec<u8>,
    config: MachineConfig,
}

impl MachineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prg(&mut self, data: &[u8]) -> &mut Self {
        self.prg = data.to_vec();
        self
    }

    pub fn chr(&mut self, data: &[u8]) -> &mut Self {
        self.chr = data.to_vec();
        self
    }

    pub fn config(&mut self, config: MachineConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn open_bus(&mut self, value: u8) -> &mut Self {
        self.config.open_bus = value;
        self
    }

    pub fn prg_ram_size(&mut self, size: usize) -> &mut Self {
        self.config.prg_ram_size = size;
        self
    }

    /// Builds the machine. Installs the global tracing subscriber with the
    /// configured `log_filter` unless one is already in place.
    pub fn build(&self) -> anyhow::Result<Machine> {
        if crate::init_tracing(&self.config.log_filter) {
            tracing::debug!("[MACHINE] tracing filter {}", self.config.log_filter);
        }
        let image = CartridgeImage::new(self.prg.clone(), self.chr.clone())
            .context("MachineBuilder: invalid cartridge image")?;
        Machine::new(image, self.config.clone()).context("MachineBuilder: unable to map cartridge")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> Machine {
        let prg: Vec<u8> = (0..8u8).flat_map(|bank| vec![bank; 0x2000]).collect();
        MachineBuilder::new().prg(&prg).build().unwrap()
    }

    #[test]
    fn test_build_rejects_bad_image() {
        assert!(MachineBuilder::new().build().is_err());
        assert!(MachineBuilder::new().prg(&[0; 0x1000]).build().is_err());
    }

    #[test]
    fn test_build_installs_tracing() {
        let config = MachineConfig {
            log_filter: "famicore=trace".to_string(),
            ..MachineConfig::default()
        };
        let prg = vec![0u8; 0x4000];
        MachineBuilder::new().prg(&prg).config(config).build().unwrap();

        assert!(!crate::init_tracing("famicore=info"));
    }

    #[test]
    fn test_stopped_machine_ignores_cycles() {
        let mut machine = machine();

        machine.step_for(100_000);

        assert_eq!(machine.get_cycles(), 100_000);
        assert_eq!(machine.video.frames_committed(), 0);
        assert!(!machine.fetch_frame());
    }

    #[test]
    fn test_memory_dump() {
        let mut machine = machine();
        machine.write_byte(0x0010, 0x41);

        let dump = machine.memory_dump(0x0010, 0x001F);
        assert!(dump.contains("41"), "{}", dump);
        assert_eq!(machine.read_byte(0xE000), 7);
    }
}
