/*!
Video unit.

The unit is split along the thread boundary:

- [`PpuPorts`] is the bus-side register file. It lives in a callback map cell
  on the CPU bus and owns everything only the bus thread touches (VRAM
  address, write toggle, read buffer, OAM).
- [`PpuCore`] is the dot-stepped state machine. It runs on the video thread
  and owns the producer end of the frame triple buffer.
- [`VideoUnit`] is the thread shell: start/stop/reset, the dot budget granted
  by the bus thread and the consumer end of the triple buffer.

Registers both sides need (control, mask, status, scroll, OAM address) are
single-byte atomics. Each one is meaningful on its own, so they use relaxed
ordering except for the status read-modify-writes. Completed frames cross
threads only through the triple buffer; scanline notifications for the
cartridge cross through an atomic counter that the bus thread drains.
*/

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use derivative::Derivative;
use serde::{Deserialize, Serialize};

use crate::{
    clock::{self, Clock, ClockEvent, TimingInfo, DOTS_PER_SCANLINE, VISIBLE_SCANLINES},
    error::VideoError,
    interrupt::InterruptLine,
    map_cell::{AccessHandler, AccessWidth},
    triple_buffer::{triple_buffer, Consumer, Producer},
};

pub const FRAME_WIDTH: usize = 256;
pub const FRAME_HEIGHT: usize = 240;
pub const OAM_SIZE: usize = 256;

/// Register index of PPUDATA within the eight-byte port window.
pub const PPUDATA: u16 = 7;
pub const PALETTE_BASE: u16 = 0x3F00;

pub const CTRL_INCREMENT_32: u8 = 0x04;
pub const CTRL_NMI_ENABLE: u8 = 0x80;
pub const MASK_SHOW_BACKGROUND: u8 = 0x08;
pub const MASK_SHOW_SPRITES: u8 = 0x10;
pub const STATUS_OVERFLOW: u8 = 0x20;
pub const STATUS_SPRITE_ZERO: u8 = 0x40;
pub const STATUS_VBLANK: u8 = 0x80;

/// Most dots the video thread runs between stop-flag checks.
const BUDGET_CHUNK: u64 = DOTS_PER_SCANLINE as u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSnapshot {
    pub ctrl: u8,
    pub mask: u8,
    pub status: u8,
    pub oam_addr: u8,
    pub scroll_x: u8,
    pub scroll_y: u8,
}

/// One completed frame as handed to the renderer.
#[derive(Derivative, Clone, PartialEq, Eq)]
#[derivative(Debug)]
pub struct FrameData {
    pub number: u64,
    pub registers: RegisterSnapshot,
    #[derivative(Debug = "ignore")]
    pub pixels: Vec<u8>,
}

impl FrameData {
    pub fn new() -> Self {
        Self {
            number: 0,
            registers: RegisterSnapshot::default(),
            pixels: vec![0; FRAME_WIDTH * FRAME_HEIGHT],
        }
    }

    /// Whether every pixel carries the shade painted for this frame's number.
    pub fn is_consistent(&self) -> bool {
        let shade = self.number as u8;
        self.pixels.iter().all(|pixel| *pixel == shade)
    }
}

impl Default for FrameData {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct SharedState {
    ctrl: AtomicU8,
    mask: AtomicU8,
    status: AtomicU8,
    oam_addr: AtomicU8,
    scroll_x: AtomicU8,
    scroll_y: AtomicU8,

    running: AtomicBool,
    dot_budget: AtomicU64,
    dots_granted: AtomicU64,
    dots_done: AtomicU64,
    pending_scanlines: AtomicU32,
    frames_committed: AtomicU64,
}

impl SharedState {
    fn snapshot(&self) -> RegisterSnapshot {
        RegisterSnapshot {
            ctrl: self.ctrl.load(Ordering::Relaxed),
            mask: self.mask.load(Ordering::Relaxed),
            status: self.status.load(Ordering::Acquire),
            oam_addr: self.oam_addr.load(Ordering::Relaxed),
            scroll_x: self.scroll_x.load(Ordering::Relaxed),
            scroll_y: self.scroll_y.load(Ordering::Relaxed),
        }
    }

    fn rendering_enabled(&self) -> bool {
        self.mask.load(Ordering::Relaxed) & (MASK_SHOW_BACKGROUND | MASK_SHOW_SPRITES) != 0
    }

    fn clear(&self) {
        for register in [
            &self.ctrl,
            &self.mask,
            &self.status,
            &self.oam_addr,
            &self.scroll_x,
            &self.scroll_y,
        ] {
            register.store(0, Ordering::Relaxed);
        }
        self.dot_budget.store(0, Ordering::Release);
        self.dots_granted.store(0, Ordering::Release);
        self.dots_done.store(0, Ordering::Release);
        self.pending_scanlines.store(0, Ordering::Release);
        self.frames_committed.store(0, Ordering::Release);
    }
}

/// Bus-side PPU register file, mapped at `$2000-$3FFF`.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct PpuPorts {
    shared: Arc<SharedState>,
    nmi: InterruptLine,
    vram_addr: u16,
    temp_addr: u16,
    write_toggle: bool,
    read_buffer: u8,
    /// Last value driven onto the port data lines.
    latch: u8,
    #[derivative(Debug = "ignore")]
    oam: [u8; OAM_SIZE],
}

impl PpuPorts {
    fn new(shared: Arc<SharedState>, nmi: InterruptLine) -> Self {
        Self {
            shared,
            nmi,
            vram_addr: 0,
            temp_addr: 0,
            write_toggle: false,
            read_buffer: 0,
            latch: 0,
            oam: [0; OAM_SIZE],
        }
    }

    pub fn access_read(&mut self, register: u16) -> u8 {
        let value = match register & 7 {
            2 => {
                let status = self.shared.status.fetch_and(!STATUS_VBLANK, Ordering::AcqRel);
                self.write_toggle = false;
                (status & 0xE0) | (self.latch & 0x1F)
            }
            4 => self.oam[self.shared.oam_addr.load(Ordering::Relaxed) as usize],
            PPUDATA => self.read_buffer,
            _ => self.latch,
        };
        self.latch = value;
        value
    }

    pub fn access_write(&mut self, register: u16, value: u8) {
        self.latch = value;
        match register & 7 {
            0 => {
                let previous = self.shared.ctrl.swap(value, Ordering::Relaxed);
                self.temp_addr = (self.temp_addr & !0x0C00) | (((value & 0x03) as u16) << 10);

                let in_vblank = self.shared.status.load(Ordering::Acquire) & STATUS_VBLANK != 0;
                if in_vblank && previous & CTRL_NMI_ENABLE == 0 && value & CTRL_NMI_ENABLE != 0 {
                    self.nmi.raise();
                }
            }
            1 => self.shared.mask.store(value, Ordering::Relaxed),
            3 => self.shared.oam_addr.store(value, Ordering::Relaxed),
            4 => {
                let addr = self.shared.oam_addr.fetch_add(1, Ordering::Relaxed);
                self.oam[addr as usize] = value;
            }
            5 => {
                if self.write_toggle {
                    self.shared.scroll_y.store(value, Ordering::Relaxed);
                    self.temp_addr = (self.temp_addr & !0x73E0)
                        | (((value & 0x07) as u16) << 12)
                        | (((value & 0xF8) as u16) << 2);
                } else {
                    self.shared.scroll_x.store(value, Ordering::Relaxed);
                    self.temp_addr = (self.temp_addr & !0x001F) | ((value >> 3) as u16);
                }
                self.write_toggle = !self.write_toggle;
            }
            6 => {
                if self.write_toggle {
                    self.temp_addr = (self.temp_addr & 0xFF00) | value as u16;
                    self.vram_addr = self.temp_addr;
                } else {
                    self.temp_addr = (self.temp_addr & 0x00FF) | (((value & 0x3F) as u16) << 8);
                }
                self.write_toggle = !self.write_toggle;
            }
            _ => tracing::trace!("[PPU] data write {:#04X} outside the bus path", value),
        }
    }

    /// Address of the next PPUDATA access. Advances the VRAM address by 1 or
    /// 32 depending on PPUCTRL.
    pub fn data_address(&mut self) -> u16 {
        let addr = self.vram_addr & 0x3FFF;
        let step = if self.shared.ctrl.load(Ordering::Relaxed) & CTRL_INCREMENT_32 != 0 {
            32
        } else {
            1
        };
        self.vram_addr = self.vram_addr.wrapping_add(step) & 0x7FFF;
        addr
    }

    /// PPUDATA reads below the palette return the previously buffered byte;
    /// palette reads are immediate.
    pub fn buffered_read(&mut self, addr: u16, fresh: u8) -> u8 {
        let value = if addr >= PALETTE_BASE {
            self.read_buffer = fresh;
            fresh
        } else {
            std::mem::replace(&mut self.read_buffer, fresh)
        };
        self.latch = value;
        value
    }

    pub fn vram_addr(&self) -> u16 {
        self.vram_addr
    }

    pub fn oam(&self) -> &[u8] {
        &self.oam
    }

    pub fn reset(&mut self) {
        self.vram_addr = 0;
        self.temp_addr = 0;
        self.write_toggle = false;
        self.read_buffer = 0;
        self.latch = 0;
        self.oam = [0; OAM_SIZE];
    }
}

impl AccessHandler for PpuPorts {
    fn load(&mut self, offset: u16, width: AccessWidth) -> u32 {
        (0..width.bytes()).fold(0, |value, i| {
            value | (self.access_read(offset.wrapping_add(i as u16)) as u32) << (8 * i)
        })
    }

    fn store(&mut self, offset: u16, width: AccessWidth, value: u32) {
        for i in 0..width.bytes() {
            self.access_write(offset.wrapping_add(i as u16), (value >> (8 * i)) as u8);
        }
    }
}

/// Dot-stepped video state machine. Runs on the video thread while the unit
/// is started and is handed back to the [`VideoUnit`] when it stops.
#[derive(Debug)]
pub struct PpuCore {
    clock: Clock,
    shared: Arc<SharedState>,
    nmi: InterruptLine,
    producer: Producer<FrameData>,
    frame_number: u64,
    events: Vec<ClockEvent>,
}

impl PpuCore {
    fn new(shared: Arc<SharedState>, nmi: InterruptLine, producer: Producer<FrameData>) -> Self {
        Self {
            clock: Clock::new(),
            shared,
            nmi,
            producer,
            frame_number: 0,
            events: Vec::with_capacity(4),
        }
    }

    /// Advances one dot.
    pub fn step(&mut self) {
        let (line, dot) = (self.clock.scanline(), self.clock.dot());
        if line < VISIBLE_SCANLINES && (dot as usize) < FRAME_WIDTH {
            let shade = self.frame_number as u8;
            self.producer.work_buffer().pixels[line as usize * FRAME_WIDTH + dot as usize] = shade;
        }

        let mut events = std::mem::take(&mut self.events);
        events.clear();
        self.clock.step(&mut events);
        for event in &events {
            self.handle_event(*event);
        }
        self.events = events;
    }

    fn handle_event(&mut self, event: ClockEvent) {
        match event {
            ClockEvent::MapperSignal => {
                if self.shared.rendering_enabled() {
                    self.shared.pending_scanlines.fetch_add(1, Ordering::AcqRel);
                }
            }
            ClockEvent::FrameEnd => self.commit_frame(),
            ClockEvent::VBlankStart => {
                self.shared.status.fetch_or(STATUS_VBLANK, Ordering::AcqRel);
                if self.shared.ctrl.load(Ordering::Relaxed) & CTRL_NMI_ENABLE != 0 {
                    self.nmi.raise();
                }
            }
            ClockEvent::VBlankEnd => {
                self.shared.status.fetch_and(
                    !(STATUS_VBLANK | STATUS_SPRITE_ZERO | STATUS_OVERFLOW),
                    Ordering::AcqRel,
                );
            }
            ClockEvent::ScanlineStart(_) => {}
        }
    }

    fn commit_frame(&mut self) {
        let registers = self.shared.snapshot();
        let frame = self.producer.work_buffer();
        frame.number = self.frame_number;
        frame.registers = registers;
        self.producer.commit(false);

        tracing::trace!("[PPU] committed frame {}", self.frame_number);
        self.frame_number += 1;
        self.shared
            .frames_committed
            .store(self.frame_number, Ordering::Release);
    }

    /// Number of the frame currently being drawn.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn timing(&self) -> TimingInfo {
        self.clock.timing_info()
    }
}

fn take_chunk(budget: &AtomicU64) -> u64 {
    budget
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |dots| {
            (dots > 0).then(|| dots.saturating_sub(BUDGET_CHUNK))
        })
        .map_or(0, |granted| granted.min(BUDGET_CHUNK))
}

fn run(mut core: PpuCore, idle: Duration) -> PpuCore {
    let shared = core.shared.clone();
    tracing::debug!("[PPU] video thread running from frame {}", core.frame_number);

    while shared.running.load(Ordering::Acquire) {
        let granted = take_chunk(&shared.dot_budget);
        if granted == 0 {
            thread::park_timeout(idle);
            continue;
        }
        for _ in 0..granted {
            core.step();
        }
        shared.dots_done.fetch_add(granted, Ordering::Release);
    }

    tracing::debug!("[PPU] video thread exiting at frame {}", core.frame_number);
    core
}

/// Thread shell around [`PpuCore`].
#[derive(Debug)]
pub struct VideoUnit {
    shared: Arc<SharedState>,
    nmi: InterruptLine,
    consumer: Consumer<FrameData>,
    core: Option<PpuCore>,
    handle: Option<JoinHandle<PpuCore>>,
    idle: Duration,
}

impl VideoUnit {
    pub fn new(nmi: InterruptLine, idle: Duration) -> Self {
        let shared = Arc::new(SharedState::default());
        let (producer, consumer) = triple_buffer(FrameData::new());
        let core = PpuCore::new(shared.clone(), nmi.clone(), producer);

        Self {
            shared,
            nmi,
            consumer,
            core: Some(core),
            handle: None,
            idle,
        }
    }

    /// A register file bound to this unit, to be mapped on the CPU bus.
    pub fn ports(&self) -> PpuPorts {
        PpuPorts::new(self.shared.clone(), self.nmi.clone())
    }

    pub fn start(&mut self) -> Result<(), VideoError> {
        if self.handle.is_some() {
            tracing::warn!("[PPU] start requested while already running");
            return Ok(());
        }

        let core = match self.core.take() {
            Some(core) => core,
            None => self.fresh_core(),
        };
        let idle = self.idle;

        self.shared.running.store(true, Ordering::Release);
        match thread::Builder::new()
            .name("ppu".into())
            .spawn(move || run(core, idle))
        {
            Ok(handle) => {
                tracing::info!("[PPU] video thread started");
                self.handle = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::Release);
                tracing::error!("[PPU] unable to spawn video thread: {}", err);
                Err(VideoError::Spawn(err))
            }
        }
    }

    /// Requests the video thread to exit and joins it.
    pub fn stop(&mut self) -> Result<(), VideoError> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => {
                tracing::debug!("[PPU] stop requested while stopped");
                return Ok(());
            }
        };

        self.shared.running.store(false, Ordering::Release);
        handle.thread().unpark();
        let joined = handle.join();

        // Whatever was granted but not run is dropped.
        self.shared.dot_budget.store(0, Ordering::Release);
        let done = self.shared.dots_done.load(Ordering::Acquire);
        self.shared.dots_granted.store(done, Ordering::Release);

        match joined {
            Ok(core) => {
                tracing::info!("[PPU] video thread stopped at frame {}", core.frame_number);
                self.core = Some(core);
                Ok(())
            }
            Err(_) => {
                tracing::error!("[PPU] video thread panicked");
                Err(VideoError::ThreadPanicked)
            }
        }
    }

    /// Stops the thread, reinitialises timing, registers and frame buffers,
    /// and starts again.
    pub fn reset(&mut self) -> Result<(), VideoError> {
        if let Err(err) = self.stop() {
            tracing::warn!("[PPU] resetting after failure: {}", err);
        }

        let core = self.fresh_core();
        self.core = Some(core);
        self.shared.clear();

        self.start()
    }

    fn fresh_core(&mut self) -> PpuCore {
        let (producer, consumer) = triple_buffer(FrameData::new());
        self.consumer = consumer;
        PpuCore::new(self.shared.clone(), self.nmi.clone(), producer)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Grants the video thread the dots matching `cpu_cycles`. Ignored while
    /// stopped.
    pub fn clock(&self, cpu_cycles: u64) {
        match &self.handle {
            Some(handle) => {
                let dots = clock::cpu_cycles_to_dots(cpu_cycles);
                self.shared.dots_granted.fetch_add(dots, Ordering::AcqRel);
                self.shared.dot_budget.fetch_add(dots, Ordering::AcqRel);
                handle.thread().unpark();
            }
            None => tracing::trace!("[PPU] ignoring {} cycles while stopped", cpu_cycles),
        }
    }

    /// Dots granted but not yet executed.
    pub fn pending_dots(&self) -> u64 {
        let done = self.shared.dots_done.load(Ordering::Acquire);
        self.shared
            .dots_granted
            .load(Ordering::Acquire)
            .saturating_sub(done)
    }

    /// Polls until the video thread has run every granted dot or `timeout`
    /// elapses. Returns whether it caught up.
    pub fn wait_caught_up(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.pending_dots() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_micros(100));
        }
    }

    /// Drains the scanline notifications raised since the last call.
    pub fn take_scanlines(&self) -> u32 {
        self.shared.pending_scanlines.swap(0, Ordering::AcqRel)
    }

    pub fn frames_committed(&self) -> u64 {
        self.shared.frames_committed.load(Ordering::Acquire)
    }

    pub fn registers(&self) -> RegisterSnapshot {
        self.shared.snapshot()
    }

    /// See [`Consumer::fetch`].
    pub fn fetch(&mut self) -> bool {
        self.consumer.fetch()
    }

    pub fn frame(&self) -> &FrameData {
        self.consumer.feed_buffer()
    }

    /// The state machine, available while the unit is stopped.
    pub fn core(&self) -> Option<&PpuCore> {
        self.core.as_ref()
    }
}

impl Drop for VideoUnit {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::error!("[PPU] {}", err);
        }
    }
}
