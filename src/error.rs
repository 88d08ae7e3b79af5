// Error types for the places where the core can actually fail: binding a map
// cell, accepting a cartridge image and driving the video thread. Bus
// accesses themselves never fail.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("cell at {start:#06X} has zero length")]
    EmptyRange { start: u16 },

    #[error("cell at {start:#06X} with length {len:#X} runs past the end of the address space")]
    RangeOverflow { start: u16, len: u32 },

    #[error("cell window needs {needed:#X} bytes of storage but only {available:#X} are available")]
    StorageTooSmall { needed: usize, available: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartridgeError {
    #[error("cartridge image has no PRG data")]
    EmptyPrg,

    #[error("PRG size {0:#X} is not a multiple of 8 KiB")]
    MisalignedPrg(usize),

    #[error("CHR size {0:#X} is not a multiple of 1 KiB")]
    MisalignedChr(usize),

    #[error("PRG length {prg_len:#X} exceeds image size {image_len:#X}")]
    Truncated { prg_len: usize, image_len: usize },
}

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("unable to spawn the video thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("the video thread panicked")]
    ThreadPanicked,
}
