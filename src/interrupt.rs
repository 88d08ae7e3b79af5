use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

/// An interrupt request line shared between the device raising it and the
/// processor servicing it.
///
/// Devices only ever call [`raise`](InterruptLine::raise); clearing the line
/// is the consumer's job. Clones refer to the same line, and the line may be
/// raised from the video thread while the bus thread polls it.
#[derive(Debug, Clone, Default)]
pub struct InterruptLine {
    inner: Arc<LineState>,
}

#[derive(Debug, Default)]
struct LineState {
    asserted: AtomicBool,
    raised_count: AtomicU64,
}

impl InterruptLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.inner.raised_count.fetch_add(1, Ordering::Relaxed);
        self.inner.asserted.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.inner.asserted.load(Ordering::Acquire)
    }

    /// Clears the line and reports whether it was asserted.
    pub fn acknowledge(&self) -> bool {
        self.inner.asserted.swap(false, Ordering::AcqRel)
    }

    /// Number of times the line has been raised since creation.
    pub fn raised_count(&self) -> u64 {
        self.inner.raised_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_and_acknowledge() {
        let line = InterruptLine::new();
        let device_side = line.clone();

        assert!(!line.is_raised());
        device_side.raise();
        device_side.raise();

        assert!(line.is_raised());
        assert_eq!(line.raised_count(), 2);
        assert!(line.acknowledge());
        assert!(!line.acknowledge());
        assert!(!device_side.is_raised());
    }
}
