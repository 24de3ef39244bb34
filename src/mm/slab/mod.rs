//! # Slab Allocator
//!
//! Caches de objetos de tamanho fixo recortados de slabs.
//!
//! - `geometry` - layout de um slab (tamanho, buffers, offset dos metadados)
//! - `slab`     - máquina de estados e registro de cada slab (no fim do slab)
//! - `cache`    - alocação/liberação de buffers, crescimento, destruição
//! - `stats`    - contadores de diagnóstico (feature `alloc_stats`)
//!
//! Violação de invariante interna não vira erro: termina em `fatal`.

pub mod cache;
pub mod geometry;
pub mod slab;
pub mod stats;

pub use cache::{AllocFlags, Cache, CacheConfig, CachePolicy, ObjectHooks, SlabReport};
pub use geometry::SlabGeometry;
pub use slab::{SlabId, SlabState};
pub use stats::{CacheCounters, CacheStats};

/// Alocador corrompido: registra e para.
#[cold]
pub(crate) fn fatal(cache: &str, reason: &'static str) -> ! {
    crate::kerror!("(Slab) FATAL no cache:");
    crate::kerror!(cache);
    crate::kerror!(reason);
    panic!("kmem: {}: {}", cache, reason)
}
