//! # GEM Tracepoints
//!
//! Eventos emitidos pelo shrinker. Cada device tem seus contadores; com a
//! feature `mm_trace` cada evento também vai para o log.
//!
//! - `gem_purge`: purge concluído, N bytes liberados
//! - `gem_purge_vmaps`: purge de vmaps concluído, N mapeamentos derrubados
//!
//! Não é API estável.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub struct GemTrace {
    enabled: AtomicBool,
    purge_events: AtomicU64,
    purged_bytes: AtomicU64,
    vmap_purge_events: AtomicU64,
    vmaps_purged: AtomicU64,
}

impl GemTrace {
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            purge_events: AtomicU64::new(0),
            purged_bytes: AtomicU64::new(0),
            vmap_purge_events: AtomicU64::new(0),
            vmaps_purged: AtomicU64::new(0),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn gem_purge(&self, bytes: usize) {
        if !self.is_enabled() {
            return;
        }
        self.purge_events.fetch_add(1, Ordering::Relaxed);
        self.purged_bytes.fetch_add(bytes as u64, Ordering::Relaxed);

        #[cfg(feature = "mm_trace")]
        crate::ktrace!("(GEM) purge bytes=", bytes);
    }

    pub fn gem_purge_vmaps(&self, unmapped: usize) {
        if !self.is_enabled() {
            return;
        }
        self.vmap_purge_events.fetch_add(1, Ordering::Relaxed);
        self.vmaps_purged.fetch_add(unmapped as u64, Ordering::Relaxed);

        #[cfg(feature = "mm_trace")]
        crate::ktrace!("(GEM) purge_vmaps unmapped=", unmapped);
    }

    pub fn stats(&self) -> TraceStats {
        TraceStats {
            purge_events: self.purge_events.load(Ordering::Relaxed),
            purged_bytes: self.purged_bytes.load(Ordering::Relaxed),
            vmap_purge_events: self.vmap_purge_events.load(Ordering::Relaxed),
            vmaps_purged: self.vmaps_purged.load(Ordering::Relaxed),
        }
    }
}

impl Default for GemTrace {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceStats {
    pub purge_events: u64,
    pub purged_bytes: u64,
    pub vmap_purge_events: u64,
    pub vmaps_purged: u64,
}
