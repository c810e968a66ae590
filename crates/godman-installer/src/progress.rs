use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use godman_core::InstallError;

/// Shared cancellation flag, checked between download chunks and archive entries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    canceled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            return Err(InstallError::Canceled.into());
        }
        Ok(())
    }
}

/// Maps per-phase percentages onto one overall 0..=100 scale.
///
/// Emitted values never decrease, and [`PhaseProgress::finish`] guarantees the last one is
/// exactly 100.
pub struct PhaseProgress<'a> {
    sink: &'a mut dyn FnMut(u8),
    start: u8,
    end: u8,
    last: Option<u8>,
}

impl<'a> PhaseProgress<'a> {
    pub fn new(sink: &'a mut dyn FnMut(u8)) -> Self {
        Self {
            sink,
            start: 0,
            end: 100,
            last: None,
        }
    }

    pub fn enter_phase(&mut self, start: u8, end: u8) {
        self.start = start.min(100);
        self.end = end.clamp(self.start, 100);
    }

    pub fn report(&mut self, percent_in_phase: u8) {
        let span = u32::from(self.end - self.start);
        let within = u32::from(percent_in_phase.min(100));
        let overall = u32::from(self.start) + span * within / 100;
        self.emit(overall.min(100) as u8);
    }

    pub fn finish(&mut self) {
        self.emit(100);
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }

    fn emit(&mut self, value: u8) {
        if self.last.is_some_and(|last| value <= last) {
            return;
        }
        self.last = Some(value);
        (self.sink)(value);
    }
}
