//! Reentrancy guard for the edge handler.
//!
//! Edges on both channels are delivered from separate threads, so two decodes
//! can race. Only one may touch the decoder state at a time; an edge arriving
//! while another decode holds the guard is dropped, not queued.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EdgeGuard {
    busy: AtomicBool,
    dropped: AtomicU64,
}

/// Held for the duration of one decode. Releases the guard on drop.
#[derive(Debug)]
pub struct GuardToken<'a> {
    guard: &'a EdgeGuard,
}

impl EdgeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the guard. Counts a dropped edge and returns `None` when
    /// another decode is in progress.
    pub fn try_enter(&self) -> Option<GuardToken<'_>> {
        match self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        {
            Ok(_) => Some(GuardToken { guard: self }),
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Relaxed)
    }

    /// Edges rejected since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}
