/// NTSC video timing constants
pub const DOTS_PER_SCANLINE: u32 = 341;
pub const SCANLINES_PER_FRAME: u32 = 262;
pub const VISIBLE_SCANLINES: u32 = 240;
pub const POST_RENDER_LINE: u32 = 240;
pub const VBLANK_START_LINE: u32 = 241;
pub const PRE_RENDER_LINE: u32 = 261;
/// Dot at which the cartridge scanline counter is clocked.
pub const MAPPER_SIGNAL_DOT: u32 = 260;
pub const DOTS_PER_CPU_CYCLE: u32 = 3;
pub const DOTS_PER_FRAME: u32 = DOTS_PER_SCANLINE * SCANLINES_PER_FRAME;
pub const CPU_CYCLES_PER_FRAME: u32 = DOTS_PER_FRAME / DOTS_PER_CPU_CYCLE;

/// Timing events, reported for the dot on which they happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    ScanlineStart(u32),
    /// Scanline counter clock for the cartridge (visible and pre-render lines)
    MapperSignal,
    /// Last visible line finished; the frame is complete
    FrameEnd,
    VBlankStart,
    VBlankEnd,
}

/// Dot-granular video clock
#[derive(Debug, Clone)]
pub struct Clock {
    /// Total dots executed
    total_dots: u64,

    /// Current scanline (0-261)
    scanline: u32,

    /// Dot within the current scanline (0-340)
    dot: u32,

    /// Frames wrapped since reset
    frame_count: u64,

    /// VBlank active flag
    vblank_active: bool,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            total_dots: 0,
            scanline: 0,
            dot: 0,
            frame_count: 0,
            vblank_active: false,
        }
    }

    /// Reset the clock to initial state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Execute the current dot, appending its events to `events`, then move
    /// to the next dot.
    pub fn step(&mut self, events: &mut Vec<ClockEvent>) {
        match (self.scanline, self.dot) {
            (POST_RENDER_LINE, 0) => {
                events.push(ClockEvent::ScanlineStart(POST_RENDER_LINE));
                events.push(ClockEvent::FrameEnd);
            }
            (line, 0) => events.push(ClockEvent::ScanlineStart(line)),
            (VBLANK_START_LINE, 1) => {
                self.vblank_active = true;
                events.push(ClockEvent::VBlankStart);
            }
            (PRE_RENDER_LINE, 1) => {
                self.vblank_active = false;
                events.push(ClockEvent::VBlankEnd);
            }
            (line, MAPPER_SIGNAL_DOT) if is_render_line(line) => {
                events.push(ClockEvent::MapperSignal)
            }
            _ => {}
        }

        self.total_dots += 1;
        self.dot += 1;
        if self.dot >= DOTS_PER_SCANLINE {
            self.dot = 0;
            self.scanline += 1;
            if self.scanline >= SCANLINES_PER_FRAME {
                self.scanline = 0;
                self.frame_count += 1;
            }
        }
    }

    /// Advance the clock by the specified number of dots
    pub fn tick(&mut self, dots: u32) -> Vec<ClockEvent> {
        let mut triggered_events = Vec::new();
        for _ in 0..dots {
            self.step(&mut triggered_events);
        }
        triggered_events
    }

    /// Get current timing information
    pub fn timing_info(&self) -> TimingInfo {
        TimingInfo {
            total_dots: self.total_dots,
            scanline: self.scanline,
            dot: self.dot,
            frame_count: self.frame_count,
            vblank_active: self.vblank_active,
        }
    }

    fn dots_into_frame(&self) -> u64 {
        self.scanline as u64 * DOTS_PER_SCANLINE as u64 + self.dot as u64
    }

    /// Get dots until the clock wraps to the next frame
    pub fn dots_until_frame_end(&self) -> u64 {
        DOTS_PER_FRAME as u64 - self.dots_into_frame()
    }

    /// Get progress through current frame (0.0 - 1.0)
    pub fn frame_progress(&self) -> f64 {
        self.dots_into_frame() as f64 / DOTS_PER_FRAME as f64
    }

    /// Check if we're on a visible line
    pub fn is_visible(&self) -> bool {
        self.scanline < VISIBLE_SCANLINES
    }

    pub fn scanline(&self) -> u32 {
        self.scanline
    }

    pub fn dot(&self) -> u32 {
        self.dot
    }

    pub fn total_dots(&self) -> u64 {
        self.total_dots
    }

    pub fn is_vblank(&self) -> bool {
        self.vblank_active
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

/// Lines on which the video unit fetches tiles and clocks the cartridge
/// counter.
pub fn is_render_line(line: u32) -> bool {
    line < VISIBLE_SCANLINES || line == PRE_RENDER_LINE
}

pub fn cpu_cycles_to_dots(cycles: u64) -> u64 {
    cycles * DOTS_PER_CPU_CYCLE as u64
}

/// Timing information snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingInfo {
    pub total_dots: u64,
    pub scanline: u32,
    pub dot: u32,
    pub frame_count: u64,
    pub vblank_active: bool,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
