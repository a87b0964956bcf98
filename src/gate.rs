//! Per-class initialization gate.
//!
//! The device rejects commands for protocol classes the host application has
//! not brought up, so the host tracks which classes were initialized and
//! refuses to encode commands for the rest. Initialization is a host-side
//! latch: once a class is marked, it stays marked for the life of the link.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{BgError, Result};

/// Tracks which protocol classes are initialized.
///
/// Lock-free: the class space is 256 IDs, held as four 64-bit atomic
/// bitmaps. Marking a class twice is harmless.
#[derive(Debug, Default)]
pub struct ClassGate {
    words: [AtomicU64; 4],
}

impl ClassGate {
    /// Create a gate with no classes initialized.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a class as initialized. Idempotent.
    pub fn init_class(&self, class_id: u8) {
        let (word, bit) = Self::locate(class_id);
        self.words[word].fetch_or(1 << bit, Ordering::Relaxed);
    }

    /// Check whether a class has been initialized.
    pub fn is_initialized(&self, class_id: u8) -> bool {
        let (word, bit) = Self::locate(class_id);
        self.words[word].load(Ordering::Relaxed) & (1 << bit) != 0
    }

    /// Fail with `ClassNotInitialized` unless the class is marked.
    pub fn require_initialized(&self, class_id: u8) -> Result<()> {
        if self.is_initialized(class_id) {
            Ok(())
        } else {
            Err(BgError::ClassNotInitialized(class_id))
        }
    }

    fn locate(class_id: u8) -> (usize, u32) {
        ((class_id / 64) as usize, (class_id % 64) as u32)
    }
}
