// tabular-ingest - streaming tabular-data ingestion and format-detection
// engine.
//
// Components:
// A: Encoding Detector (encoding.rs)
// B: Dialect Detector (dialect.rs)
// C: Parsing State Machine (state_machine.rs)
// D: Streaming Parser Driver (driver.rs)
// E: Alternate-Format Parsers (parsers/)
// F: Parser Registry (registry.rs)
// G: Common Parser Contract (parsers/mod.rs)
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod core;
pub mod dialect;
pub mod driver;
pub mod encoding;
pub mod error;
pub mod logging;
pub mod model;
pub mod parsers;
pub mod registry;
pub mod state_machine;

/// A convenient single import for the common path: pick a registered parser,
/// read rows, inspect stats.
pub mod prelude {
    pub use crate::config::{ParseMode, ParserOptions, RecoveryStrategy};
    pub use crate::error::{ErrorCode, IngestError, ParseError};
    pub use crate::model::{ParsedRow, ParserFormat, ParserStats};
    pub use crate::parsers::{BaseParser, DetectionResult, Parser, ValidationResult};
    pub use crate::registry::{ParserRegistration, ParserRegistry};
}

// ============================================================================
// Allocator configuration
// ============================================================================
//
// Tracks live and peak heap allocation so `driver::ParserDriver` can honour
// the in-memory/streaming size-trigger and the `MEMORY_LIMIT` retry path
// (spec.md §4.D, §6) without a dependency on an external profiler.

#[cfg(feature = "memory_tracking")]
mod tracking {
    use std::alloc::{GlobalAlloc, Layout};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub static ALLOCATED: AtomicUsize = AtomicUsize::new(0);
    pub static PEAK_ALLOCATED: AtomicUsize = AtomicUsize::new(0);

    pub struct TrackingAllocator;

    #[cfg(feature = "mimalloc")]
    static UNDERLYING: mimalloc::MiMalloc = mimalloc::MiMalloc;

    #[cfg(not(feature = "mimalloc"))]
    static UNDERLYING: std::alloc::System = std::alloc::System;

    unsafe impl GlobalAlloc for TrackingAllocator {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            let ptr = UNDERLYING.alloc(layout);
            if !ptr.is_null() {
                let current = ALLOCATED.fetch_add(layout.size(), Ordering::Relaxed) + layout.size();
                let mut peak = PEAK_ALLOCATED.load(Ordering::Relaxed);
                while current > peak {
                    match PEAK_ALLOCATED.compare_exchange_weak(
                        peak,
                        current,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => break,
                        Err(p) => peak = p,
                    }
                }
            }
            ptr
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            ALLOCATED.fetch_sub(layout.size(), Ordering::Relaxed);
            UNDERLYING.dealloc(ptr, layout)
        }
    }
}

#[cfg(feature = "memory_tracking")]
#[global_allocator]
static GLOBAL: tracking::TrackingAllocator = tracking::TrackingAllocator;

#[cfg(all(feature = "mimalloc", not(feature = "memory_tracking")))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Current live heap allocation in bytes, or `None` when `memory_tracking`
/// is compiled out. Consumed by `driver::ParserDriver` at its 10,000-row
/// check cadence (spec.md §4.D, §9 Open Questions).
#[cfg(feature = "memory_tracking")]
pub fn current_allocated_bytes() -> Option<usize> {
    use std::sync::atomic::Ordering;
    Some(tracking::ALLOCATED.load(Ordering::SeqCst))
}

#[cfg(not(feature = "memory_tracking"))]
pub fn current_allocated_bytes() -> Option<usize> {
    None
}

/// Peak heap allocation since the process started, or since the last reset.
#[cfg(feature = "memory_tracking")]
pub fn peak_allocated_bytes() -> Option<usize> {
    use std::sync::atomic::Ordering;
    Some(tracking::PEAK_ALLOCATED.load(Ordering::SeqCst))
}

#[cfg(not(feature = "memory_tracking"))]
pub fn peak_allocated_bytes() -> Option<usize> {
    None
}

/// Resets the peak counter to the current allocation and returns
/// `(current, previous_peak)`. No-op returning `(0, 0)` without
/// `memory_tracking`.
#[cfg(feature = "memory_tracking")]
pub fn reset_peak_allocated_bytes() -> (usize, usize) {
    use std::sync::atomic::Ordering;
    let current = tracking::ALLOCATED.load(Ordering::SeqCst);
    let peak = tracking::PEAK_ALLOCATED.swap(current, Ordering::SeqCst);
    (current, peak)
}

#[cfg(not(feature = "memory_tracking"))]
pub fn reset_peak_allocated_bytes() -> (usize, usize) {
    (0, 0)
}
