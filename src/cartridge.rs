use crate::{error::CartridgeError, memory::Storage};

pub const PRG_BANK_SIZE: usize = 0x2000;
pub const CHR_BANK_SIZE: usize = 0x0400;
pub const CHR_RAM_SIZE: usize = 0x2000;

/// Raw cartridge contents split into PRG and CHR storage.
///
/// Header parsing is not handled here; callers hand over the PRG and CHR
/// payloads directly. A board without CHR ROM gets 8 KiB of CHR RAM.
#[derive(Debug, Clone)]
pub struct CartridgeImage {
    pub prg: Storage,
    pub chr: Storage,
    pub chr_is_ram: bool,
}

impl CartridgeImage {
    pub fn new(prg: Vec<u8>, chr: Vec<u8>) -> Result<Self, CartridgeError> {
        if prg.is_empty() {
            return Err(CartridgeError::EmptyPrg);
        }
        if prg.len() % PRG_BANK_SIZE != 0 {
            return Err(CartridgeError::MisalignedPrg(prg.len()));
        }
        if chr.len() % CHR_BANK_SIZE != 0 {
            return Err(CartridgeError::MisalignedChr(chr.len()));
        }

        let chr_is_ram = chr.is_empty();
        let chr = if chr_is_ram {
            Storage::new(CHR_RAM_SIZE)
        } else {
            Storage::from_vec(chr)
        };

        tracing::info!(
            "[CARTRIDGE] PRG {} KiB, CHR {} KiB{}",
            prg.len() / 1024,
            chr.len() / 1024,
            if chr_is_ram { " (RAM)" } else { "" }
        );

        Ok(Self {
            prg: Storage::from_vec(prg),
            chr,
            chr_is_ram,
        })
    }

    /// Splits a single buffer holding PRG followed by CHR.
    pub fn from_raw(raw: &[u8], prg_len: usize) -> Result<Self, CartridgeError> {
        if prg_len > raw.len() {
            return Err(CartridgeError::Truncated {
                prg_len,
                image_len: raw.len(),
            });
        }
        let (prg, chr) = raw.split_at(prg_len);
        Self::new(prg.to_vec(), chr.to_vec())
    }

    /// Number of 8 KiB PRG banks.
    pub fn prg_banks(&self) -> usize {
        self.prg.len() / PRG_BANK_SIZE
    }

    /// Number of 1 KiB CHR banks.
    pub fn chr_banks(&self) -> usize {
        self.chr.len() / CHR_BANK_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_sizes() {
        assert_eq!(
            CartridgeImage::new(vec![], vec![]).unwrap_err(),
            CartridgeError::EmptyPrg
        );
        assert_eq!(
            CartridgeImage::new(vec![0; 0x1000], vec![]).unwrap_err(),
            CartridgeError::MisalignedPrg(0x1000)
        );
        assert_eq!(
            CartridgeImage::new(vec![0; 0x2000], vec![0; 0x100]).unwrap_err(),
            CartridgeError::MisalignedChr(0x100)
        );
    }

    #[test]
    fn test_empty_chr_becomes_ram() {
        let image = CartridgeImage::new(vec![0; 0x8000], vec![]).unwrap();

        assert!(image.chr_is_ram);
        assert_eq!(image.prg_banks(), 4);
        assert_eq!(image.chr_banks(), 8);
    }

    #[test]
    fn test_from_raw_splits() {
        let mut raw = vec![0xAA; 0x4000];
        raw.extend(vec![0xBB; 0x2000]);
        let image = CartridgeImage::from_raw(&raw, 0x4000).unwrap();

        assert_eq!(image.prg_banks(), 2);
        assert_eq!(image.chr.read_byte(0), 0xBB);
        assert!(!image.chr_is_ram);
        assert!(CartridgeImage::from_raw(&raw, 0x8000).is_err());
    }
}
