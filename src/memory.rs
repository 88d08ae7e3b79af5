use std::{cell::RefCell, ops::Range, rc::Rc};

use derivative::Derivative;

/// A block of backing memory (console RAM, VRAM, PRG/CHR banks).
///
/// The subsystem that supplies the block owns it; decoder cells only keep a
/// handle to it, so several cells can alias the same bytes (mirrors) and a
/// mapper can rebind windows over it without copying.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct Storage {
    #[derivative(Debug = "ignore")]
    data: Rc<RefCell<Vec<u8>>>,
    len: usize,
}

impl Storage {
    pub fn new(size: usize) -> Self {
        Self::filled(size, 0x00)
    }

    pub fn filled(size: usize, value: u8) -> Self {
        Self::from_vec(vec![value; size])
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            data: Rc::new(RefCell::new(data)),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn read_byte(&self, offset: usize) -> u8 {
        match self.data.borrow().get(offset) {
            Some(value) => *value,
            None => {
                tracing::trace!("[MEMORY] Read past end of storage at {:#X}", offset);
                0xFF
            }
        }
    }

    pub fn write_byte(&self, offset: usize, value: u8) {
        if let Some(slot) = self.data.borrow_mut().get_mut(offset) {
            *slot = value;
        }
    }

    pub fn read_word(&self, offset: usize) -> u16 {
        let low_byte = self.read_byte(offset) as u16;
        let high_byte = self.read_byte(offset + 1) as u16;
        (high_byte << 8) | low_byte
    }

    pub fn write_word(&self, offset: usize, value: u16) {
        let low_byte = (value & 0x00FF) as u8;
        let high_byte = ((value & 0xFF00) >> 8) as u8;
        self.write_byte(offset, low_byte);
        self.write_byte(offset + 1, high_byte);
    }

    /// Copies `bytes` in at `offset`, truncating whatever does not fit.
    pub fn load(&self, offset: usize, bytes: &[u8]) {
        let mut data = self.data.borrow_mut();
        if offset >= data.len() {
            return;
        }
        let end = (offset + bytes.len()).min(data.len());
        data[offset..end].copy_from_slice(&bytes[..end - offset]);
    }

    pub fn fill(&self, value: u8) {
        self.data.borrow_mut().iter_mut().for_each(|b| *b = value);
    }

    /// Copy of a byte range, clamped to the storage length.
    pub fn to_vec(&self, range: Range<usize>) -> Vec<u8> {
        let data = self.data.borrow();
        let end = range.end.min(data.len());
        let start = range.start.min(end);
        data[start..end].to_vec()
    }

    pub fn ptr_eq(&self, other: &Storage) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    /// Identity of the underlying block, stable for the block's lifetime.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.data) as *const () as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_alias_the_same_block() {
        let ram = Storage::new(0x800);
        let mirror = ram.clone();

        mirror.write_byte(0x10, 0x42);

        assert_eq!(ram.read_byte(0x10), 0x42);
        assert!(ram.ptr_eq(&mirror));
        assert_eq!(ram.id(), mirror.id());
    }

    #[test]
    fn test_words_are_little_endian() {
        let ram = Storage::new(4);
        ram.write_word(1, 0xBEEF);

        assert_eq!(ram.read_byte(1), 0xEF);
        assert_eq!(ram.read_byte(2), 0xBE);
        assert_eq!(ram.read_word(1), 0xBEEF);
    }

    #[test]
    fn test_out_of_range_access_is_harmless() {
        let ram = Storage::filled(2, 0x11);
        ram.write_byte(5, 0x22);

        assert_eq!(ram.read_byte(5), 0xFF);
        assert_eq!(ram.to_vec(0..8), vec![0x11, 0x11]);
    }

    #[test]
    fn test_load_truncates() {
        let rom = Storage::new(4);
        rom.load(2, &[1, 2, 3, 4]);

        assert_eq!(rom.to_vec(0..4), vec![0, 0, 1, 2]);
    }
}
