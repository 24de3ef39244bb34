//! Estatísticas dos caches
//!
//! Os contadores só existem com a feature `alloc_stats`; sem ela
//! `StatCounters` é vazio e todas as chamadas somem.

#[cfg(feature = "alloc_stats")]
use super::geometry::SlabGeometry;

/// Retrato das estatísticas de um cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub buffer_size: usize,
    pub slab_size: usize,
    pub slab_buffer_count: usize,
    pub total_slabs: usize,
    pub free_slabs: usize,
    pub partial_slabs: usize,
    pub in_use_slabs: usize,
    pub free_buffer_count: usize,
    pub allocations: u64,
    pub frees: u64,
    pub grows: u64,
    pub failed_allocations: u64,
    pub peak_slabs_in_use: usize,
}

/// Contagens estruturais, sempre disponíveis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounters {
    pub total_slabs: usize,
    pub free_slabs: usize,
    pub partial_slabs: usize,
    pub in_use_slabs: usize,
    pub free_buffer_count: usize,
}

#[cfg(feature = "alloc_stats")]
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    allocations: u64,
    frees: u64,
    grows: u64,
    failed_allocations: u64,
    peak_slabs_in_use: usize,
}

#[cfg(feature = "alloc_stats")]
impl StatCounters {
    #[inline]
    pub fn on_alloc(&mut self, slabs_in_use: usize) {
        self.allocations += 1;
        if slabs_in_use > self.peak_slabs_in_use {
            self.peak_slabs_in_use = slabs_in_use;
        }
    }

    #[inline]
    pub fn on_free(&mut self) {
        self.frees += 1;
    }

    #[inline]
    pub fn on_grow(&mut self) {
        self.grows += 1;
    }

    #[inline]
    pub fn on_failure(&mut self) {
        self.failed_allocations += 1;
    }

    pub fn snapshot(&self, geometry: &SlabGeometry, counters: CacheCounters) -> CacheStats {
        CacheStats {
            buffer_size: geometry.buffer_size,
            slab_size: geometry.slab_size,
            slab_buffer_count: geometry.buffer_count,
            total_slabs: counters.total_slabs,
            free_slabs: counters.free_slabs,
            partial_slabs: counters.partial_slabs,
            in_use_slabs: counters.in_use_slabs,
            free_buffer_count: counters.free_buffer_count,
            allocations: self.allocations,
            frees: self.frees,
            grows: self.grows,
            failed_allocations: self.failed_allocations,
            peak_slabs_in_use: self.peak_slabs_in_use,
        }
    }
}

#[cfg(not(feature = "alloc_stats"))]
#[derive(Debug, Default)]
pub(crate) struct StatCounters;

#[cfg(not(feature = "alloc_stats"))]
impl StatCounters {
    #[inline(always)]
    pub fn on_alloc(&mut self, _slabs_in_use: usize) {}
    #[inline(always)]
    pub fn on_free(&mut self) {}
    #[inline(always)]
    pub fn on_grow(&mut self) {}
    #[inline(always)]
    pub fn on_failure(&mut self) {}
}
