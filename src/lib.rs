//! kmem - Alocador de Memória do Kernel Redstone.
//!
//! Slab allocator (caches de objetos de tamanho fixo) e o heap do kernel
//! construído sobre ele.
//!
//! - `debug` - saída de log e macros `kinfo!`/`kerror!`/...
//! - `klib`  - bitmap, lista intrusiva, índice por endereço, alinhamento
//! - `mm`    - Page Source, caches, heap

#![no_std]

#[cfg(test)]
extern crate std;

pub mod debug;
pub mod klib;
pub mod mm;

pub use mm::heap::{Heap, HeapStats, KernelAllocator};
pub use mm::page_source::{PageGeometry, PageSource, Protection, RegionPageSource};
pub use mm::slab::{
    AllocFlags, Cache, CacheConfig, CachePolicy, CacheStats, ObjectHooks, SlabState,
};
pub use mm::{MmError, MmResult};
